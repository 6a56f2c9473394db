use std::{
    collections::{BTreeMap, HashMap},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};
use warden_core::{ChannelId, GuildId, RoleId, UserId};

/// Name of the default role every guild member implicitly holds.
pub(crate) const EVERYONE_ROLE_NAME: &str = "@everyone";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    /// `None` for direct-message channels.
    pub guild_id: Option<GuildId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: RoleId,
    pub guild_id: GuildId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
}

/// In-process view of platform state: guilds the bot participates in, their
/// channels and roles, and which roles each member holds.
///
/// Role membership is platform-authoritative; the resolver reads it here and
/// never stores it. Implementations must answer from memory.
pub trait Directory: Send + Sync {
    fn guilds(&self) -> Vec<GuildInfo>;

    fn guild(&self, id: GuildId) -> Option<GuildInfo>;

    fn channel(&self, id: ChannelId) -> Option<ChannelInfo>;

    fn channels(&self, guild: GuildId) -> Vec<ChannelInfo>;

    fn roles(&self, guild: GuildId) -> Vec<RoleInfo>;

    fn user(&self, id: UserId) -> Option<UserInfo>;

    fn users(&self) -> Vec<UserInfo>;

    /// Roles `user` holds in `guild`, including the default role, or `None`
    /// when the user is not a member.
    fn member_roles(&self, guild: GuildId, user: UserId) -> Option<Vec<RoleId>>;
}

/// Platform observations pushed by the chat client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum DirectoryEvent {
    GuildUpsert {
        guild_id: GuildId,
        name: String,
    },
    GuildRemove {
        guild_id: GuildId,
    },
    ChannelUpsert {
        channel_id: ChannelId,
        name: String,
        guild_id: Option<GuildId>,
    },
    RoleUpsert {
        guild_id: GuildId,
        role_id: RoleId,
        name: String,
    },
    UserUpsert {
        user_id: UserId,
        name: String,
    },
    MemberUpdate {
        guild_id: GuildId,
        user_id: UserId,
        roles: Vec<RoleId>,
    },
    MemberRemove {
        guild_id: GuildId,
        user_id: UserId,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("guild {0} is not known")]
    UnknownGuild(GuildId),
    #[error("role {role} is not defined in guild {guild}")]
    UnknownRole { guild: GuildId, role: RoleId },
}

#[derive(Debug, Default)]
struct GuildEntry {
    name: String,
    roles: BTreeMap<RoleId, String>,
    members: HashMap<UserId, Vec<RoleId>>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    guilds: BTreeMap<GuildId, GuildEntry>,
    channels: BTreeMap<ChannelId, ChannelInfo>,
    users: BTreeMap<UserId, UserInfo>,
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Errors
    /// Returns [`DirectoryError`] when the event references a guild or role that
    /// has not been announced yet.
    pub fn apply(&self, event: DirectoryEvent) -> Result<(), DirectoryError> {
        let mut state = self.write();
        match event {
            DirectoryEvent::GuildUpsert { guild_id, name } => {
                let entry = state.guilds.entry(guild_id).or_default();
                entry.name = name;
                entry
                    .roles
                    .entry(RoleId::everyone_of(guild_id))
                    .or_insert_with(|| EVERYONE_ROLE_NAME.to_owned());
            }
            DirectoryEvent::GuildRemove { guild_id } => {
                state.guilds.remove(&guild_id);
                state
                    .channels
                    .retain(|_, channel| channel.guild_id != Some(guild_id));
            }
            DirectoryEvent::ChannelUpsert {
                channel_id,
                name,
                guild_id,
            } => {
                if let Some(guild_id) = guild_id {
                    if !state.guilds.contains_key(&guild_id) {
                        return Err(DirectoryError::UnknownGuild(guild_id));
                    }
                }
                state.channels.insert(
                    channel_id,
                    ChannelInfo {
                        id: channel_id,
                        name,
                        guild_id,
                    },
                );
            }
            DirectoryEvent::RoleUpsert {
                guild_id,
                role_id,
                name,
            } => {
                let entry = state
                    .guilds
                    .get_mut(&guild_id)
                    .ok_or(DirectoryError::UnknownGuild(guild_id))?;
                entry.roles.insert(role_id, name);
            }
            DirectoryEvent::UserUpsert { user_id, name } => {
                state.users.insert(user_id, UserInfo { id: user_id, name });
            }
            DirectoryEvent::MemberUpdate {
                guild_id,
                user_id,
                roles,
            } => {
                let entry = state
                    .guilds
                    .get_mut(&guild_id)
                    .ok_or(DirectoryError::UnknownGuild(guild_id))?;
                if let Some(role) = roles.iter().find(|role| !entry.roles.contains_key(*role)) {
                    return Err(DirectoryError::UnknownRole {
                        guild: guild_id,
                        role: *role,
                    });
                }
                entry.members.insert(user_id, roles);
            }
            DirectoryEvent::MemberRemove { guild_id, user_id } => {
                let entry = state
                    .guilds
                    .get_mut(&guild_id)
                    .ok_or(DirectoryError::UnknownGuild(guild_id))?;
                entry.members.remove(&user_id);
            }
        }
        Ok(())
    }
}

impl Directory for InMemoryDirectory {
    fn guilds(&self) -> Vec<GuildInfo> {
        self.read()
            .guilds
            .iter()
            .map(|(id, entry)| GuildInfo {
                id: *id,
                name: entry.name.clone(),
            })
            .collect()
    }

    fn guild(&self, id: GuildId) -> Option<GuildInfo> {
        self.read().guilds.get(&id).map(|entry| GuildInfo {
            id,
            name: entry.name.clone(),
        })
    }

    fn channel(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.read().channels.get(&id).cloned()
    }

    fn channels(&self, guild: GuildId) -> Vec<ChannelInfo> {
        self.read()
            .channels
            .values()
            .filter(|channel| channel.guild_id == Some(guild))
            .cloned()
            .collect()
    }

    fn roles(&self, guild: GuildId) -> Vec<RoleInfo> {
        self.read()
            .guilds
            .get(&guild)
            .map(|entry| {
                entry
                    .roles
                    .iter()
                    .map(|(id, name)| RoleInfo {
                        id: *id,
                        guild_id: guild,
                        name: name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn user(&self, id: UserId) -> Option<UserInfo> {
        self.read().users.get(&id).cloned()
    }

    fn users(&self) -> Vec<UserInfo> {
        self.read().users.values().cloned().collect()
    }

    fn member_roles(&self, guild: GuildId, user: UserId) -> Option<Vec<RoleId>> {
        let state = self.read();
        let roles = state.guilds.get(&guild)?.members.get(&user)?;
        let everyone = RoleId::everyone_of(guild);
        let mut held = Vec::with_capacity(roles.len() + 1);
        held.push(everyone);
        held.extend(roles.iter().copied().filter(|role| *role != everyone));
        Some(held)
    }
}
