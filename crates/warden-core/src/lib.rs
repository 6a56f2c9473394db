#![forbid(unsafe_code)]

mod decision;
mod permission;
mod principal;

use serde::{Deserialize, Serialize};

pub use decision::{decide, Decision, ResolutionChain, ResolutionLayer};
pub use permission::{
    Permission, PermissionCatalog, PermissionEdit, PermissionName, PermissionOverwrite,
    PermissionSet, PermissionState,
};
pub use principal::{
    ChannelRecord, GuildRecord, Principal, PrincipalKey, PrincipalKind, RoleRecord, UserRecord,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("snowflake id is invalid")]
    InvalidSnowflake,
    #[error("permission name is invalid")]
    InvalidPermissionName,
    #[error("permission `{0}` is already registered")]
    DuplicatePermission(String),
    #[error("principal kind is invalid")]
    InvalidPrincipalKind,
}

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl core::str::FromStr for $name {
            type Err = DomainError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                parse_snowflake(value).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0.to_string()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// Platform-assigned identity of a chat user.
    UserId
);
snowflake_id!(
    /// Platform-assigned identity of a role inside a guild.
    RoleId
);
snowflake_id!(
    /// Platform-assigned identity of a channel, guild or direct-message.
    ChannelId
);
snowflake_id!(
    /// Platform-assigned identity of a guild.
    GuildId
);

impl RoleId {
    /// The default role every guild member holds shares its guild's id.
    #[must_use]
    pub const fn everyone_of(guild: GuildId) -> Self {
        Self(guild.get())
    }
}

fn parse_snowflake(value: &str) -> Result<u64, DomainError> {
    if value.is_empty() || value.len() > 20 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::InvalidSnowflake);
    }
    value.parse().map_err(|_| DomainError::InvalidSnowflake)
}

#[cfg(test)]
mod tests {
    use super::{ChannelId, DomainError, GuildId, RoleId, UserId};

    #[test]
    fn snowflakes_parse_decimal_only() {
        let user: UserId = "80351110224678912".parse().unwrap();
        assert_eq!(user.get(), 80_351_110_224_678_912);
        assert_eq!(user.to_string(), "80351110224678912");

        assert_eq!(
            "".parse::<GuildId>().unwrap_err(),
            DomainError::InvalidSnowflake
        );
        assert_eq!(
            "+12".parse::<ChannelId>().unwrap_err(),
            DomainError::InvalidSnowflake
        );
        assert_eq!(
            "99999999999999999999".parse::<RoleId>().unwrap_err(),
            DomainError::InvalidSnowflake
        );
    }

    #[test]
    fn snowflakes_serialize_as_strings() {
        let id = GuildId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"42\"");
        let back: GuildId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<GuildId>("\"abc\"").is_err());
    }

    #[test]
    fn everyone_role_shares_guild_id() {
        assert_eq!(RoleId::everyone_of(GuildId::new(7)), RoleId::new(7));
    }
}
