use anyhow::anyhow;
use warden_core::{Permission, PermissionCatalog, PermissionName};

/// Needed by the invoker of an administrative command.
pub const ADMIN_PERMISSION: &str = "command.permissions";

const KNOWN_PERMISSIONS: [(&str, bool); 9] = [
    ("command.master", false),
    ("command.support", false),
    ("command.status", true),
    ("command.files", false),
    ("command.roster", false),
    ("command.metrics", true),
    ("command.announce", false),
    (ADMIN_PERMISSION, false),
    ("support.publish", false),
];

/// The built-in permissions followed by `extra`.
///
/// # Errors
/// Returns an error if an extra permission reuses a known name.
pub fn builtin_catalog(
    extra: impl IntoIterator<Item = Permission>,
) -> anyhow::Result<PermissionCatalog> {
    let mut catalog = PermissionCatalog::new();
    for (name, default_allow) in KNOWN_PERMISSIONS {
        let name = PermissionName::try_from(name)
            .map_err(|e| anyhow!("built-in permission `{name}` is invalid: {e}"))?;
        catalog
            .register(Permission::new(name, default_allow))
            .map_err(|e| anyhow!("built-in catalog init failed: {e}"))?;
    }
    for permission in extra {
        catalog
            .register(permission)
            .map_err(|e| anyhow!("extra permission rejected: {e}"))?;
    }
    Ok(catalog)
}

/// Parse `name=allow|deny` pairs separated by commas. Blank input yields none.
///
/// # Errors
/// Returns an error for a malformed pair, an invalid name, or a default other
/// than `allow`/`deny`.
pub fn parse_extra_permissions(raw: &str) -> anyhow::Result<Vec<Permission>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, default) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("extra permission `{pair}` must look like name=allow|deny"))?;
            let name = PermissionName::try_from(name.trim())
                .map_err(|e| anyhow!("extra permission `{pair}`: {e}"))?;
            let default_allow = match default.trim() {
                "allow" => true,
                "deny" => false,
                other => {
                    return Err(anyhow!(
                        "extra permission `{pair}` has unknown default `{other}`"
                    ))
                }
            };
            Ok(Permission::new(name, default_allow))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{builtin_catalog, parse_extra_permissions, ADMIN_PERMISSION};

    #[test]
    fn builtin_catalog_carries_known_defaults() {
        let catalog = builtin_catalog([]).unwrap();
        assert_eq!(catalog.len(), 9);
        assert!(catalog.get("command.status").unwrap().default_allow());
        assert!(!catalog.get("command.master").unwrap().default_allow());
        assert!(!catalog.get(ADMIN_PERMISSION).unwrap().default_allow());
    }

    #[test]
    fn extra_permissions_extend_the_catalog() {
        let extra = parse_extra_permissions(" game.host=allow, game.kick=deny ,").unwrap();
        assert_eq!(extra.len(), 2);
        let catalog = builtin_catalog(extra).unwrap();
        assert!(catalog.get("game.host").unwrap().default_allow());
        assert!(!catalog.get("game.kick").unwrap().default_allow());
        assert!(parse_extra_permissions("").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_or_duplicate_extras() {
        assert!(parse_extra_permissions("game.host").is_err());
        assert!(parse_extra_permissions("game.host=maybe").is_err());
        assert!(parse_extra_permissions("Game Host=allow").is_err());

        let duplicate = parse_extra_permissions("command.master=allow").unwrap();
        assert!(builtin_catalog(duplicate).is_err());
    }
}
