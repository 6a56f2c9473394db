use warden_core::{ChannelId, GuildId, PrincipalKey, PrincipalKind, UserId};
use warden_protocol::{Lookup, PrincipalRef};

use super::{
    directory::{ChannelInfo, Directory},
    errors::PermissionError,
    resolver::Invocation,
};

/// A resolved mutation target and the freshest name the directory has for it.
pub(crate) struct Target {
    pub(crate) key: PrincipalKey,
    pub(crate) name: String,
}

pub(crate) fn resolve_target(
    directory: &dyn Directory,
    target: &PrincipalRef,
    invocation: &Invocation,
) -> Result<Target, PermissionError> {
    match target {
        PrincipalRef::User { lookup } => resolve_user(directory, lookup, invocation),
        PrincipalRef::Guild { lookup } => {
            let guild = resolve_guild(directory, lookup, invocation)?;
            Ok(Target {
                key: PrincipalKey::Guild(guild.0),
                name: guild.1,
            })
        }
        PrincipalRef::Channel { lookup } => resolve_channel(directory, lookup, invocation),
        PrincipalRef::Role { role, guild } => {
            let (guild_id, _) = match guild {
                Some(lookup) => resolve_guild(directory, lookup, invocation)?,
                None => {
                    let guild_id = invocation_guild(directory, invocation)?.ok_or_else(|| {
                        PermissionError::InvalidTarget(String::from(
                            "roles must be qualified with `in <guild>` outside a guild channel",
                        ))
                    })?;
                    (guild_id, String::new())
                }
            };
            let found = pick(
                PrincipalKind::Role,
                role,
                directory.roles(guild_id),
                |role| role.id.to_string(),
                |role| &role.name,
            )?;
            Ok(Target {
                key: PrincipalKey::Role {
                    guild: guild_id,
                    role: found.id,
                },
                name: found.name,
            })
        }
    }
}

fn resolve_user(
    directory: &dyn Directory,
    lookup: &Lookup,
    invocation: &Invocation,
) -> Result<Target, PermissionError> {
    let user = match lookup {
        Lookup::This => directory.user(invocation.user).map_or_else(
            || (invocation.user, String::new()),
            |user| (user.id, user.name),
        ),
        Lookup::Key(key) => {
            let found = pick(
                PrincipalKind::User,
                key,
                directory.users(),
                |user| user.id.to_string(),
                |user| &user.name,
            );
            match (found, key.parse::<UserId>()) {
                (Ok(user), _) => (user.id, user.name),
                // A user the bot has never seen can still be named by id.
                (Err(PermissionError::NotFound { .. }), Ok(id)) => (id, String::new()),
                (Err(error), _) => return Err(error),
            }
        }
    };
    Ok(Target {
        key: PrincipalKey::User(user.0),
        name: user.1,
    })
}

fn resolve_guild(
    directory: &dyn Directory,
    lookup: &Lookup,
    invocation: &Invocation,
) -> Result<(GuildId, String), PermissionError> {
    match lookup {
        Lookup::This => {
            let guild_id = invocation_guild(directory, invocation)?.ok_or_else(|| {
                PermissionError::InvalidTarget(String::from(
                    "`this` guild needs a guild channel; direct messages have none",
                ))
            })?;
            let name = directory
                .guild(guild_id)
                .map(|guild| guild.name)
                .unwrap_or_default();
            Ok((guild_id, name))
        }
        Lookup::Key(key) => {
            let guild = pick(
                PrincipalKind::Guild,
                key,
                directory.guilds(),
                |guild| guild.id.to_string(),
                |guild| &guild.name,
            )?;
            Ok((guild.id, guild.name))
        }
    }
}

fn resolve_channel(
    directory: &dyn Directory,
    lookup: &Lookup,
    invocation: &Invocation,
) -> Result<Target, PermissionError> {
    let channel = match lookup {
        Lookup::This => invocation_channel(directory, invocation)?,
        Lookup::Key(key) => {
            let by_id = key
                .parse::<ChannelId>()
                .ok()
                .and_then(|id| directory.channel(id));
            match by_id {
                Some(channel) => channel,
                None => {
                    let scope = match invocation_guild(directory, invocation)? {
                        Some(guild) => directory.channels(guild),
                        None => directory
                            .guilds()
                            .into_iter()
                            .flat_map(|guild| directory.channels(guild.id))
                            .collect(),
                    };
                    pick(
                        PrincipalKind::Channel,
                        key.trim_start_matches('#'),
                        scope,
                        |channel| channel.id.to_string(),
                        |channel| &channel.name,
                    )?
                }
            }
        }
    };
    let guild = channel.guild_id.ok_or_else(|| {
        PermissionError::InvalidTarget(format!(
            "channel {} is a direct-message channel and carries no permissions",
            channel.id
        ))
    })?;
    Ok(Target {
        key: PrincipalKey::Channel {
            guild,
            channel: channel.id,
        },
        name: channel.name,
    })
}

fn invocation_channel(
    directory: &dyn Directory,
    invocation: &Invocation,
) -> Result<ChannelInfo, PermissionError> {
    directory
        .channel(invocation.channel)
        .ok_or_else(|| PermissionError::NotFound {
            kind: PrincipalKind::Channel,
            key: invocation.channel.to_string(),
        })
}

fn invocation_guild(
    directory: &dyn Directory,
    invocation: &Invocation,
) -> Result<Option<GuildId>, PermissionError> {
    Ok(invocation_channel(directory, invocation)?.guild_id)
}

/// Id match first, then case-insensitive name match. Several name matches are
/// an error rather than a guess.
fn pick<T>(
    kind: PrincipalKind,
    key: &str,
    items: Vec<T>,
    id_of: impl Fn(&T) -> String,
    name_of: impl Fn(&T) -> &str,
) -> Result<T, PermissionError> {
    let not_found = || PermissionError::NotFound {
        kind,
        key: key.to_owned(),
    };
    if key.is_empty() {
        return Err(not_found());
    }
    let needle = key.to_lowercase();
    let mut by_name = Vec::new();
    for item in items {
        if id_of(&item) == key {
            return Ok(item);
        }
        if name_of(&item).to_lowercase() == needle {
            by_name.push(item);
        }
    }
    match by_name.len() {
        0 => Err(not_found()),
        1 => by_name.pop().ok_or_else(not_found),
        _ => Err(PermissionError::Ambiguous {
            kind,
            key: key.to_owned(),
            candidates: by_name
                .iter()
                .map(|item| (name_of(item).to_owned(), id_of(item)))
                .collect(),
        }),
    }
}
