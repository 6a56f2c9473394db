use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ChannelId, DomainError, GuildId, PermissionOverwrite, RoleId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Role,
    Channel,
    Guild,
}

impl PrincipalKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Role => "role",
            Self::Channel => "channel",
            Self::Guild => "guild",
        }
    }
}

impl TryFrom<&str> for PrincipalKind {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "role" => Ok(Self::Role),
            "channel" => Ok(Self::Channel),
            "guild" => Ok(Self::Guild),
            _ => Err(DomainError::InvalidPrincipalKind),
        }
    }
}

impl core::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub permissions: PermissionOverwrite,
}

impl UserRecord {
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            permissions: PermissionOverwrite::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub guild_id: GuildId,
    pub name: String,
    pub permissions: PermissionOverwrite,
}

impl RoleRecord {
    #[must_use]
    pub fn new(id: RoleId, guild_id: GuildId, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            name: name.into(),
            permissions: PermissionOverwrite::new(),
        }
    }
}

/// A guild channel. Direct-message channels are never materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub name: String,
    pub permissions: PermissionOverwrite,
}

impl ChannelRecord {
    #[must_use]
    pub fn new(id: ChannelId, guild_id: GuildId, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            name: name.into(),
            permissions: PermissionOverwrite::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: GuildId,
    pub name: String,
    pub permissions: PermissionOverwrite,
    pub roles: BTreeMap<RoleId, RoleRecord>,
}

impl GuildRecord {
    #[must_use]
    pub fn new(id: GuildId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            permissions: PermissionOverwrite::new(),
            roles: BTreeMap::new(),
        }
    }

    /// Mirror a platform role into this guild. Returns `true` if the record changed.
    pub fn ensure_role(&mut self, role: RoleId, name: &str) -> bool {
        if let Some(existing) = self.roles.get_mut(&role) {
            if name.is_empty() || existing.name == name {
                return false;
            }
            name.clone_into(&mut existing.name);
            return true;
        }
        self.roles.insert(role, RoleRecord::new(role, self.id, name));
        true
    }
}

/// Storage identity of a principal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalKey {
    User(UserId),
    Guild(GuildId),
    Channel { guild: GuildId, channel: ChannelId },
    Role { guild: GuildId, role: RoleId },
}

impl PrincipalKey {
    #[must_use]
    pub const fn kind(self) -> PrincipalKind {
        match self {
            Self::User(_) => PrincipalKind::User,
            Self::Guild(_) => PrincipalKind::Guild,
            Self::Channel { .. } => PrincipalKind::Channel,
            Self::Role { .. } => PrincipalKind::Role,
        }
    }

    /// The platform id of the keyed record, as stored.
    #[must_use]
    pub fn id_string(self) -> String {
        match self {
            Self::User(id) => id.to_string(),
            Self::Guild(id) => id.to_string(),
            Self::Channel { channel, .. } => channel.to_string(),
            Self::Role { role, .. } => role.to_string(),
        }
    }

    /// A fresh record with empty allow/deny sets.
    #[must_use]
    pub fn materialize(self, name: &str) -> Principal {
        match self {
            Self::User(id) => Principal::User(UserRecord::new(id, name)),
            Self::Guild(id) => Principal::Guild(GuildRecord::new(id, name)),
            Self::Channel { guild, channel } => {
                Principal::Channel(ChannelRecord::new(channel, guild, name))
            }
            Self::Role { guild, role } => Principal::Role(RoleRecord::new(role, guild, name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User(UserRecord),
    Role(RoleRecord),
    Channel(ChannelRecord),
    Guild(GuildRecord),
}

impl Principal {
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        match self {
            Self::User(_) => PrincipalKind::User,
            Self::Role(_) => PrincipalKind::Role,
            Self::Channel(_) => PrincipalKind::Channel,
            Self::Guild(_) => PrincipalKind::Guild,
        }
    }

    #[must_use]
    pub fn key(&self) -> PrincipalKey {
        match self {
            Self::User(user) => PrincipalKey::User(user.id),
            Self::Role(role) => PrincipalKey::Role {
                guild: role.guild_id,
                role: role.id,
            },
            Self::Channel(channel) => PrincipalKey::Channel {
                guild: channel.guild_id,
                channel: channel.id,
            },
            Self::Guild(guild) => PrincipalKey::Guild(guild.id),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::User(user) => &user.name,
            Self::Role(role) => &role.name,
            Self::Channel(channel) => &channel.name,
            Self::Guild(guild) => &guild.name,
        }
    }

    pub fn set_name(&mut self, name: &str) {
        let slot = match self {
            Self::User(user) => &mut user.name,
            Self::Role(role) => &mut role.name,
            Self::Channel(channel) => &mut channel.name,
            Self::Guild(guild) => &mut guild.name,
        };
        name.clone_into(slot);
    }

    #[must_use]
    pub fn id_string(&self) -> String {
        match self {
            Self::User(user) => user.id.to_string(),
            Self::Role(role) => role.id.to_string(),
            Self::Channel(channel) => channel.id.to_string(),
            Self::Guild(guild) => guild.id.to_string(),
        }
    }

    #[must_use]
    pub fn permissions(&self) -> &PermissionOverwrite {
        match self {
            Self::User(user) => &user.permissions,
            Self::Role(role) => &role.permissions,
            Self::Channel(channel) => &channel.permissions,
            Self::Guild(guild) => &guild.permissions,
        }
    }

    pub fn permissions_mut(&mut self) -> &mut PermissionOverwrite {
        match self {
            Self::User(user) => &mut user.permissions,
            Self::Role(role) => &mut role.permissions,
            Self::Channel(channel) => &mut channel.permissions,
            Self::Guild(guild) => &mut guild.permissions,
        }
    }

    /// Human-readable label, e.g. `role Helper (5) in guild 10`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Role(role) => format!(
                "role {} ({}) in guild {}",
                role.name, role.id, role.guild_id
            ),
            Self::Channel(channel) => format!("channel #{} ({})", channel.name, channel.id),
            _ => format!("{} {} ({})", self.kind(), self.name(), self.id_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuildRecord, Principal, PrincipalKey, PrincipalKind};
    use crate::{ChannelId, DomainError, GuildId, PermissionName, RoleId, UserId};

    #[test]
    fn principal_kind_round_trips_through_strings() {
        for kind in [
            PrincipalKind::User,
            PrincipalKind::Role,
            PrincipalKind::Channel,
            PrincipalKind::Guild,
        ] {
            assert_eq!(PrincipalKind::try_from(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(
            PrincipalKind::try_from("member").unwrap_err(),
            DomainError::InvalidPrincipalKind
        );
    }

    #[test]
    fn materialized_principals_start_empty() {
        let key = PrincipalKey::Channel {
            guild: GuildId::new(10),
            channel: ChannelId::new(7),
        };
        let principal = key.materialize("general");
        assert_eq!(principal.kind(), PrincipalKind::Channel);
        assert_eq!(principal.key(), key);
        assert_eq!(key.id_string(), principal.id_string());
        assert!(principal.permissions().is_empty());
        assert_eq!(principal.describe(), "channel #general (7)");

        let user = PrincipalKey::User(UserId::new(1)).materialize("alice");
        assert_eq!(user.describe(), "user alice (1)");
    }

    #[test]
    fn guild_mirrors_roles_and_refreshes_names() {
        let mut guild = GuildRecord::new(GuildId::new(10), "League");
        assert!(guild.ensure_role(RoleId::new(5), "Helper"));
        assert!(!guild.ensure_role(RoleId::new(5), "Helper"));
        assert!(!guild.ensure_role(RoleId::new(5), ""));
        assert!(guild.ensure_role(RoleId::new(5), "Helpers"));
        assert_eq!(guild.roles[&RoleId::new(5)].name, "Helpers");
        assert_eq!(guild.roles[&RoleId::new(5)].guild_id, GuildId::new(10));
    }

    #[test]
    fn permissions_mut_reaches_every_kind() {
        let master = PermissionName::try_from("command.master").unwrap();
        let mut principals = vec![
            PrincipalKey::User(UserId::new(1)).materialize("alice"),
            PrincipalKey::Guild(GuildId::new(10)).materialize("League"),
            PrincipalKey::Role {
                guild: GuildId::new(10),
                role: RoleId::new(5),
            }
            .materialize("Helper"),
        ];
        for principal in &mut principals {
            principal.permissions_mut().allow(&master);
            assert!(principal.permissions().allowed().contains("command.master"));
        }
        let mut renamed: Principal = principals.remove(0);
        renamed.set_name("alice2");
        assert_eq!(renamed.name(), "alice2");
    }
}
