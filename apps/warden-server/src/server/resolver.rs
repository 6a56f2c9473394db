use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use warden_core::{
    decide, ChannelId, Decision, GuildId, GuildRecord, Permission, PermissionCatalog,
    PermissionEdit, PermissionOverwrite, Principal, PrincipalKey, PrincipalKind, ResolutionChain,
    ResolutionLayer, RoleId, UserId,
};
use warden_protocol::{AdminCommand, PermissionAction, PrincipalRef};

use super::{
    cache::ResolutionCache,
    directory::Directory,
    errors::PermissionError,
    listing,
    metrics::{
        record_check, record_failed_closed, record_mutation, FAIL_CLOSED_STORAGE,
        FAIL_CLOSED_UNKNOWN_CHANNEL, FAIL_CLOSED_UNKNOWN_PERMISSION, SURFACE_DISPLAY,
        SURFACE_PERFORM,
    },
    store::{PrincipalStore, StoreError},
    targets::resolve_target,
};

/// Where an administrative command was issued from. Anchors `this` and the
/// implicit guild of role and channel references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub user: UserId,
    pub channel: ChannelId,
}

#[derive(Debug, Clone, Copy)]
enum Actor {
    User(UserId),
    /// No personal grants; holds only the guild's default role.
    Anyone,
}

/// One guild scope of a check, with the channel layer when the check happens
/// inside a guild channel.
#[derive(Debug, Clone, Copy)]
struct Scope {
    guild: GuildId,
    channel: Option<ChannelId>,
}

#[derive(Debug)]
enum CheckFailure {
    UnknownPermission,
    UnknownChannel,
    Storage(StoreError),
}

pub struct PermissionResolver {
    catalog: Arc<PermissionCatalog>,
    store: Arc<dyn PrincipalStore>,
    directory: Arc<dyn Directory>,
    cache: ResolutionCache,
}

impl PermissionResolver {
    #[must_use]
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        store: Arc<dyn PrincipalStore>,
        directory: Arc<dyn Directory>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            directory,
            cache: ResolutionCache::new(cache_ttl),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Whether `user` may perform `permission` in `channel`.
    ///
    /// Never errors: an unknown permission or channel and any storage failure
    /// answer `false`.
    pub async fn can_perform(&self, permission: &str, user: UserId, channel: ChannelId) -> bool {
        self.check(SURFACE_PERFORM, permission, Actor::User(user), channel)
            .await
    }

    /// Whether the output of a command guarded by `permission` may be shown in
    /// `channel`. Judged on guild, role and channel configuration only.
    pub async fn can_display_result(&self, permission: &str, channel: ChannelId) -> bool {
        if let Some(info) = self.directory.channel(channel) {
            if info.guild_id.is_none() {
                record_check(SURFACE_DISPLAY, "direct_message");
                return true;
            }
        }
        self.check(SURFACE_DISPLAY, permission, Actor::Anyone, channel)
            .await
    }

    async fn check(
        &self,
        surface: &'static str,
        permission: &str,
        actor: Actor,
        channel: ChannelId,
    ) -> bool {
        match self.resolve(permission, actor, channel).await {
            Ok(decisions) => {
                let decision = decisions
                    .iter()
                    .map(|(_, decision)| *decision)
                    .find(|decision| decision.is_allowed())
                    .or_else(|| decisions.first().map(|(_, decision)| *decision))
                    .unwrap_or(Decision::NotGranted);
                record_check(surface, decision.outcome());
                tracing::debug!(
                    event = "permissions.check",
                    surface,
                    permission,
                    channel_id = %channel,
                    scopes = decisions.len(),
                    outcome = decision.outcome(),
                    reason = %decision,
                );
                decision.is_allowed()
            }
            Err(failure) => {
                record_check(surface, "failed_closed");
                match failure {
                    CheckFailure::UnknownPermission => {
                        record_failed_closed(FAIL_CLOSED_UNKNOWN_PERMISSION);
                        tracing::warn!(
                            event = "permissions.check",
                            outcome = "unknown_permission",
                            surface,
                            permission,
                        );
                    }
                    CheckFailure::UnknownChannel => {
                        record_failed_closed(FAIL_CLOSED_UNKNOWN_CHANNEL);
                        tracing::warn!(
                            event = "permissions.check",
                            outcome = "unknown_channel",
                            surface,
                            permission,
                            channel_id = %channel,
                        );
                    }
                    CheckFailure::Storage(error) => {
                        record_failed_closed(FAIL_CLOSED_STORAGE);
                        tracing::error!(
                            event = "permissions.check",
                            outcome = "storage_failed",
                            surface,
                            permission,
                            error = %error,
                        );
                    }
                }
                false
            }
        }
    }

    /// Decisions per evaluated guild scope. A direct message is judged in every
    /// guild the actor shares with the bot.
    async fn resolve(
        &self,
        permission: &str,
        actor: Actor,
        channel: ChannelId,
    ) -> Result<Vec<(GuildId, Decision)>, CheckFailure> {
        let permission = self
            .catalog
            .get(permission)
            .ok_or(CheckFailure::UnknownPermission)?;
        let info = self
            .directory
            .channel(channel)
            .ok_or(CheckFailure::UnknownChannel)?;

        let scopes: Vec<Scope> = match info.guild_id {
            Some(guild) => vec![Scope {
                guild,
                channel: Some(channel),
            }],
            None => match actor {
                Actor::User(user) => self
                    .directory
                    .guilds()
                    .into_iter()
                    .filter(|guild| self.directory.member_roles(guild.id, user).is_some())
                    .map(|guild| Scope {
                        guild: guild.id,
                        channel: None,
                    })
                    .collect(),
                Actor::Anyone => Vec::new(),
            },
        };

        let mut decisions = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let decision = self
                .evaluate(permission, actor, scope)
                .await
                .map_err(CheckFailure::Storage)?;
            decisions.push((scope.guild, decision));
            if decision.is_allowed() {
                break;
            }
        }
        Ok(decisions)
    }

    async fn evaluate(
        &self,
        permission: &Permission,
        actor: Actor,
        scope: Scope,
    ) -> Result<Decision, StoreError> {
        let held = self.held_roles(actor, scope.guild);
        let guild = self.load_guild(scope.guild, &held).await?;
        let guild_record = guild_of(&guild)?;

        let user = match actor {
            Actor::User(id) => {
                let name = self
                    .directory
                    .user(id)
                    .map(|user| user.name)
                    .unwrap_or_default();
                Some(self.load(PrincipalKey::User(id), &name).await?)
            }
            Actor::Anyone => None,
        };
        let channel = match scope.channel {
            Some(id) => {
                let name = self
                    .directory
                    .channel(id)
                    .map(|channel| channel.name)
                    .unwrap_or_default();
                let key = PrincipalKey::Channel {
                    guild: scope.guild,
                    channel: id,
                };
                Some(self.load(key, &name).await?)
            }
            None => None,
        };

        let empty = PermissionOverwrite::new();
        let mut chain = ResolutionChain::new().with(
            ResolutionLayer::User,
            user.as_deref().map_or(&empty, Principal::permissions),
        );
        chain.push(ResolutionLayer::Guild, &guild_record.permissions);
        for role in &held {
            if let Some(record) = guild_record.roles.get(role) {
                chain.push(ResolutionLayer::Role(*role), &record.permissions);
            }
        }
        if let Some(channel) = channel.as_deref() {
            chain.push(ResolutionLayer::Channel, channel.permissions());
        }
        Ok(decide(permission, &chain))
    }

    fn held_roles(&self, actor: Actor, guild: GuildId) -> Vec<RoleId> {
        let everyone = RoleId::everyone_of(guild);
        let member = match actor {
            Actor::User(user) => self.directory.member_roles(guild, user),
            Actor::Anyone => None,
        };
        member.unwrap_or_else(|| {
            self.directory
                .roles(guild)
                .into_iter()
                .any(|role| role.id == everyone)
                .then_some(everyone)
                .into_iter()
                .collect()
        })
    }

    /// Load the guild record, first mirroring any held role it does not carry yet.
    async fn load_guild(
        &self,
        guild: GuildId,
        held: &[RoleId],
    ) -> Result<Arc<Principal>, StoreError> {
        let key = PrincipalKey::Guild(guild);
        let name = self
            .directory
            .guild(guild)
            .map(|guild| guild.name)
            .unwrap_or_default();
        let principal = self.load(key, &name).await?;

        let missing: Vec<RoleId> = {
            let record = guild_of(&principal)?;
            held.iter()
                .copied()
                .filter(|role| !record.roles.contains_key(role))
                .collect()
        };
        if missing.is_empty() {
            return Ok(principal);
        }

        let names: HashMap<RoleId, String> = self
            .directory
            .roles(guild)
            .into_iter()
            .map(|role| (role.id, role.name))
            .collect();
        for role in &missing {
            let role_name = names.get(role).map_or("", String::as_str);
            self.store
                .get_or_create(PrincipalKey::Role { guild, role: *role }, role_name)
                .await?;
        }
        tracing::debug!(
            event = "permissions.roles.mirrored",
            guild_id = %guild,
            count = missing.len(),
        );
        self.cache.remove(&key);
        self.load(key, &name).await
    }

    async fn load(
        &self,
        key: PrincipalKey,
        observed_name: &str,
    ) -> Result<Arc<Principal>, StoreError> {
        if let Some(principal) = self.cache.get(&key) {
            return Ok(principal);
        }
        let generation = self.cache.generation();
        let principal = Arc::new(self.store.get_or_create(key, observed_name).await?);
        self.cache.insert(key, generation, Arc::clone(&principal));
        Ok(principal)
    }

    /// # Errors
    /// See [`PermissionResolver::mutate`].
    pub async fn grant(
        &self,
        permission: &str,
        target: &PrincipalRef,
        invocation: &Invocation,
    ) -> Result<String, PermissionError> {
        self.mutate(PermissionAction::Grant, permission, target, invocation)
            .await
    }

    /// # Errors
    /// See [`PermissionResolver::mutate`].
    pub async fn deny(
        &self,
        permission: &str,
        target: &PrincipalRef,
        invocation: &Invocation,
    ) -> Result<String, PermissionError> {
        self.mutate(PermissionAction::Deny, permission, target, invocation)
            .await
    }

    /// Clearing a permission that was never set is a successful no-op.
    ///
    /// # Errors
    /// See [`PermissionResolver::mutate`].
    pub async fn reset(
        &self,
        permission: &str,
        target: &PrincipalRef,
        invocation: &Invocation,
    ) -> Result<String, PermissionError> {
        self.mutate(PermissionAction::Reset, permission, target, invocation)
            .await
    }

    /// Apply `action` to the target's sets in one atomic store update, then
    /// evict the cache.
    ///
    /// # Errors
    /// Returns [`PermissionError`] when the permission is unknown, the target
    /// cannot be resolved uniquely or is not a valid target, or the store fails.
    /// Nothing is written in any of these cases.
    pub async fn mutate(
        &self,
        action: PermissionAction,
        permission: &str,
        target: &PrincipalRef,
        invocation: &Invocation,
    ) -> Result<String, PermissionError> {
        let name = self
            .catalog
            .get(permission)
            .ok_or_else(|| PermissionError::UnknownPermission(permission.to_owned()))?
            .name()
            .clone();
        let target = resolve_target(self.directory.as_ref(), target, invocation)?;

        let edit = match action {
            PermissionAction::Grant => PermissionEdit::Allow(name.clone()),
            PermissionAction::Deny => PermissionEdit::Deny(name.clone()),
            PermissionAction::Reset => PermissionEdit::Reset(name.clone()),
        };
        let updated = self.store.update(target.key, &target.name, &edit).await;
        self.cache.evict("mutation");
        let (principal, previous) = updated?;
        let changed = previous != edit.target_state();

        let described = principal.describe();
        if changed {
            record_mutation(action.as_str());
        }
        tracing::info!(
            event = "permissions.mutation",
            action = action.as_str(),
            permission = %name,
            principal = %described,
            previous = previous.as_str(),
            changed,
        );

        Ok(match action {
            PermissionAction::Grant => {
                format!("granted `{name}` to {described} (was {})", previous.as_str())
            }
            PermissionAction::Deny => {
                format!("denied `{name}` for {described} (was {})", previous.as_str())
            }
            PermissionAction::Reset if changed => {
                format!("reset `{name}` on {described} (was {})", previous.as_str())
            }
            PermissionAction::Reset => format!("`{name}` had no explicit setting on {described}"),
        })
    }

    /// # Errors
    /// Returns [`PermissionError::Storage`] if the store cannot list its records.
    pub async fn list_matches(&self, filter: &str) -> Result<String, PermissionError> {
        let principals = self.store.all_principals().await?;
        Ok(listing::list_matches(&self.catalog, principals, filter))
    }

    /// The decision for `user` in `channel` and the layer that produced it, per
    /// evaluated guild scope.
    ///
    /// # Errors
    /// Returns [`PermissionError`] for an unknown permission or channel, or a
    /// storage failure.
    pub async fn explain(
        &self,
        permission: &str,
        user: UserId,
        channel: ChannelId,
    ) -> Result<String, PermissionError> {
        let decisions = self
            .resolve(permission, Actor::User(user), channel)
            .await
            .map_err(|failure| match failure {
                CheckFailure::UnknownPermission => {
                    PermissionError::UnknownPermission(permission.to_owned())
                }
                CheckFailure::UnknownChannel => PermissionError::NotFound {
                    kind: PrincipalKind::Channel,
                    key: channel.to_string(),
                },
                CheckFailure::Storage(error) => PermissionError::Storage(error),
            })?;

        if decisions.is_empty() {
            return Ok(format!(
                "`{permission}` for user {user}: not granted (no guild shared with the bot)"
            ));
        }
        let lines: Vec<String> = decisions
            .iter()
            .map(|(guild, decision)| {
                let guild_name = self
                    .directory
                    .guild(*guild)
                    .map(|guild| guild.name)
                    .unwrap_or_default();
                format!("`{permission}` for user {user} in guild {guild_name} ({guild}): {decision}")
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Drop every cached record.
    pub fn evict(&self) {
        self.cache.evict("explicit");
        tracing::info!(event = "permissions.cache.evict", reason = "explicit");
    }

    /// Run a parsed administrative command on behalf of `invocation`.
    ///
    /// # Errors
    /// Propagates the error of the underlying operation.
    pub async fn execute(
        &self,
        command: &AdminCommand,
        invocation: &Invocation,
    ) -> Result<String, PermissionError> {
        match command {
            AdminCommand::Mutate {
                op,
                permission,
                target,
            } => {
                self.mutate(*op, permission.as_str(), target, invocation)
                    .await
            }
            AdminCommand::List { filter } => self.list_matches(filter).await,
            AdminCommand::Explain { permission, user } => {
                let user = match user {
                    None => invocation.user,
                    Some(lookup) => {
                        let reference = PrincipalRef::User {
                            lookup: lookup.clone(),
                        };
                        match resolve_target(self.directory.as_ref(), &reference, invocation)?.key
                        {
                            PrincipalKey::User(id) => id,
                            _ => {
                                return Err(PermissionError::InvalidTarget(String::from(
                                    "explain expects a user",
                                )))
                            }
                        }
                    }
                };
                self.explain(permission.as_str(), user, invocation.channel)
                    .await
            }
            AdminCommand::Evict => {
                self.evict();
                Ok(String::from("permission cache evicted"))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_records(&self) -> usize {
        self.cache.len()
    }
}

fn guild_of(principal: &Principal) -> Result<&GuildRecord, StoreError> {
    match principal {
        Principal::Guild(guild) => Ok(guild),
        other => Err(StoreError::Corrupt(format!(
            "expected a guild record, found {}",
            other.kind()
        ))),
    }
}
