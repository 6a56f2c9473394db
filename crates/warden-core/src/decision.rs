use crate::{Permission, PermissionOverwrite, RoleId};

/// One scope of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionLayer {
    User,
    Guild,
    Role(RoleId),
    Channel,
}

impl core::fmt::Display for ResolutionLayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Guild => f.write_str("guild"),
            Self::Role(role) => write!(f, "role {role}"),
            Self::Channel => f.write_str("channel"),
        }
    }
}

/// Permission sets gathered for a single scope, in the order user, guild, roles, channel.
#[derive(Debug, Default)]
pub struct ResolutionChain<'a> {
    layers: Vec<(ResolutionLayer, &'a PermissionOverwrite)>,
}

impl<'a> ResolutionChain<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: ResolutionLayer, overwrite: &'a PermissionOverwrite) {
        self.layers.push((layer, overwrite));
    }

    #[must_use]
    pub fn with(mut self, layer: ResolutionLayer, overwrite: &'a PermissionOverwrite) -> Self {
        self.push(layer, overwrite);
        self
    }

    pub fn layers(&self) -> impl Iterator<Item = (ResolutionLayer, &'a PermissionOverwrite)> + '_ {
        self.layers.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Denied { layer: ResolutionLayer },
    Allowed { layer: ResolutionLayer },
    DefaultAllowed,
    NotGranted,
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed { .. } | Self::DefaultAllowed)
    }

    #[must_use]
    pub const fn outcome(self) -> &'static str {
        match self {
            Self::Denied { .. } => "denied",
            Self::Allowed { .. } => "allowed",
            Self::DefaultAllowed => "default_allowed",
            Self::NotGranted => "not_granted",
        }
    }
}

impl core::fmt::Display for Decision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Denied { layer } => write!(f, "denied by {layer}"),
            Self::Allowed { layer } => write!(f, "allowed by {layer}"),
            Self::DefaultAllowed => f.write_str("allowed by default"),
            Self::NotGranted => f.write_str("not granted"),
        }
    }
}

/// Deny anywhere wins, then allow anywhere, then the permission's default.
#[must_use]
pub fn decide(permission: &Permission, chain: &ResolutionChain<'_>) -> Decision {
    let name = permission.name().as_str();
    if let Some((layer, _)) = chain
        .layers()
        .find(|(_, overwrite)| overwrite.denied().contains(name))
    {
        return Decision::Denied { layer };
    }
    if let Some((layer, _)) = chain
        .layers()
        .find(|(_, overwrite)| overwrite.allowed().contains(name))
    {
        return Decision::Allowed { layer };
    }
    if permission.default_allow() {
        return Decision::DefaultAllowed;
    }
    Decision::NotGranted
}

#[cfg(test)]
mod tests {
    use super::{decide, Decision, ResolutionChain, ResolutionLayer};
    use crate::{Permission, PermissionName, PermissionOverwrite, RoleId};

    fn permission(value: &str, default_allow: bool) -> Permission {
        Permission::new(PermissionName::try_from(value).unwrap(), default_allow)
    }

    fn allowing(value: &str) -> PermissionOverwrite {
        let mut overwrite = PermissionOverwrite::new();
        overwrite.allow(&PermissionName::try_from(value).unwrap());
        overwrite
    }

    fn denying(value: &str) -> PermissionOverwrite {
        let mut overwrite = PermissionOverwrite::new();
        overwrite.deny(&PermissionName::try_from(value).unwrap());
        overwrite
    }

    #[test]
    fn deny_in_any_layer_beats_default_allow_and_explicit_allow() {
        let status = permission("command.status", true);
        let empty = PermissionOverwrite::new();
        let allow = allowing("command.status");
        let deny = denying("command.status");

        let layers = [
            ResolutionLayer::User,
            ResolutionLayer::Guild,
            ResolutionLayer::Role(RoleId::new(5)),
            ResolutionLayer::Channel,
        ];
        for deny_at in 0..layers.len() {
            let mut chain = ResolutionChain::new();
            for (index, layer) in layers.iter().enumerate() {
                let overwrite = if index == deny_at { &deny } else { &allow };
                chain.push(*layer, overwrite);
            }
            assert_eq!(
                decide(&status, &chain),
                Decision::Denied {
                    layer: layers[deny_at]
                }
            );
        }

        let chain = ResolutionChain::new()
            .with(ResolutionLayer::User, &empty)
            .with(ResolutionLayer::Channel, &empty);
        assert_eq!(decide(&status, &chain), Decision::DefaultAllowed);
    }

    #[test]
    fn explicit_allow_or_default_is_required() {
        let master = permission("command.master", false);
        let empty = PermissionOverwrite::new();
        let unrelated = allowing("command.files");
        let chain = ResolutionChain::new()
            .with(ResolutionLayer::User, &empty)
            .with(ResolutionLayer::Guild, &unrelated);
        let decision = decide(&master, &chain);
        assert_eq!(decision, Decision::NotGranted);
        assert!(!decision.is_allowed());

        let allow = allowing("command.master");
        let chain = ResolutionChain::new()
            .with(ResolutionLayer::User, &empty)
            .with(ResolutionLayer::Channel, &allow);
        let decision = decide(&master, &chain);
        assert_eq!(
            decision,
            Decision::Allowed {
                layer: ResolutionLayer::Channel
            }
        );
        assert_eq!(decision.to_string(), "allowed by channel");
    }

    #[test]
    fn role_deny_overrides_personal_allow() {
        let support = permission("command.support", false);
        let personal = allowing("command.support");
        let helper = denying("command.support");
        let chain = ResolutionChain::new()
            .with(ResolutionLayer::User, &personal)
            .with(ResolutionLayer::Role(RoleId::new(5)), &helper);
        let decision = decide(&support, &chain);
        assert!(!decision.is_allowed());
        assert_eq!(decision.to_string(), "denied by role 5");
    }
}
