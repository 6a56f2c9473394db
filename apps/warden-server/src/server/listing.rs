use warden_core::{PermissionCatalog, PermissionState, Principal};

/// Audit listing: for every permission whose name contains `filter`, a line for
/// its default when that default is allow, then one line per explicit allow or
/// deny on a stored record. Records are ordered guilds, roles, channels, users,
/// each by id.
pub(crate) fn list_matches(
    catalog: &PermissionCatalog,
    principals: Vec<Principal>,
    filter: &str,
) -> String {
    let mut guilds = Vec::new();
    let mut roles = Vec::new();
    let mut channels = Vec::new();
    let mut users = Vec::new();
    for principal in principals {
        match principal {
            Principal::Guild(mut guild) => {
                roles.extend(std::mem::take(&mut guild.roles).into_values());
                guilds.push(guild);
            }
            Principal::Role(role) => roles.push(role),
            Principal::Channel(channel) => channels.push(channel),
            Principal::User(user) => users.push(user),
        }
    }
    guilds.sort_by_key(|guild| guild.id);
    roles.sort_by_key(|role| (role.id, role.guild_id));
    channels.sort_by_key(|channel| channel.id);
    users.sort_by_key(|user| user.id);

    let ordered: Vec<Principal> = guilds
        .into_iter()
        .map(Principal::Guild)
        .chain(roles.into_iter().map(Principal::Role))
        .chain(channels.into_iter().map(Principal::Channel))
        .chain(users.into_iter().map(Principal::User))
        .collect();

    let mut lines = Vec::new();
    let mut matched = false;
    for permission in catalog.matching(filter) {
        matched = true;
        let name = permission.name();
        if permission.default_allow() {
            lines.push(format!("`{name}` is allowed by default"));
        }
        for principal in &ordered {
            match principal.permissions().state_of(name.as_str()) {
                PermissionState::Allowed => {
                    lines.push(format!("`{name}` allowed for {}", principal.describe()));
                }
                PermissionState::Denied => {
                    lines.push(format!("`{name}` denied for {}", principal.describe()));
                }
                PermissionState::Unset => {}
            }
        }
    }

    if !matched {
        return format!("no permission matches `{filter}`");
    }
    if lines.is_empty() {
        return format!("no explicit settings for permissions matching `{filter}`");
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use warden_core::{
        ChannelId, ChannelRecord, GuildId, GuildRecord, Permission, PermissionCatalog,
        PermissionName, Principal, RoleId, RoleRecord, UserId, UserRecord,
    };

    use super::list_matches;

    fn name(value: &str) -> PermissionName {
        PermissionName::try_from(value).unwrap()
    }

    fn catalog() -> PermissionCatalog {
        PermissionCatalog::from_permissions([
            Permission::new(name("command.master"), false),
            Permission::new(name("command.status"), true),
            Permission::new(name("support.publish"), false),
        ])
        .unwrap()
    }

    #[test]
    fn lists_defaults_then_explicit_settings_in_record_order() {
        let mut guild = GuildRecord::new(GuildId::new(10), "League");
        let mut role = RoleRecord::new(RoleId::new(5), GuildId::new(10), "Helper");
        role.permissions.deny(&name("command.master"));
        guild.roles.insert(role.id, role);
        let mut user = UserRecord::new(UserId::new(1), "alice");
        user.permissions.allow(&name("command.master"));
        let mut channel = ChannelRecord::new(ChannelId::new(7), GuildId::new(10), "general");
        channel.permissions.deny(&name("command.status"));
        channel.permissions.allow(&name("support.publish"));

        let listing = list_matches(
            &catalog(),
            vec![
                Principal::User(user),
                Principal::Channel(channel),
                Principal::Guild(guild),
            ],
            "command",
        );
        assert_eq!(
            listing,
            "`command.master` denied for role Helper (5) in guild 10\n\
             `command.master` allowed for user alice (1)\n\
             `command.status` is allowed by default\n\
             `command.status` denied for channel #general (7)"
        );
    }

    #[test]
    fn reports_when_nothing_matches() {
        assert_eq!(
            list_matches(&catalog(), Vec::new(), "voice"),
            "no permission matches `voice`"
        );
        assert_eq!(
            list_matches(&catalog(), Vec::new(), "master"),
            "no explicit settings for permissions matching `master`"
        );
    }
}
