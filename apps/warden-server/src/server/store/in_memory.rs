use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_core::{
    ChannelId, ChannelRecord, GuildId, GuildRecord, PermissionEdit, PermissionState, Principal,
    PrincipalKey, RoleRecord, UserId, UserRecord,
};

use super::{refresh_name, PrincipalStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
    guilds: RwLock<HashMap<GuildId, GuildRecord>>,
    channels: RwLock<HashMap<ChannelId, ChannelRecord>>,
}

impl InMemoryPrincipalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_guild(&self, id: GuildId) -> Result<Option<GuildRecord>, StoreError> {
        Ok(self.guilds.read().await.get(&id).cloned())
    }

    async fn find_channel(&self, id: ChannelId) -> Result<Option<ChannelRecord>, StoreError> {
        Ok(self.channels.read().await.get(&id).cloned())
    }

    async fn save(&self, principal: &Principal) -> Result<(), StoreError> {
        match principal {
            Principal::User(user) => {
                self.users.write().await.insert(user.id, user.clone());
            }
            Principal::Channel(channel) => {
                self.channels
                    .write()
                    .await
                    .insert(channel.id, channel.clone());
            }
            Principal::Guild(guild) => {
                let mut guilds = self.guilds.write().await;
                let stored = guilds
                    .entry(guild.id)
                    .or_insert_with(|| GuildRecord::new(guild.id, ""));
                stored.name.clone_from(&guild.name);
                stored.permissions = guild.permissions.clone();
                for (role_id, role) in &guild.roles {
                    stored
                        .roles
                        .entry(*role_id)
                        .or_insert_with(|| role.clone());
                }
            }
            Principal::Role(role) => {
                let mut guilds = self.guilds.write().await;
                guilds
                    .entry(role.guild_id)
                    .or_insert_with(|| GuildRecord::new(role.guild_id, ""))
                    .roles
                    .insert(role.id, role.clone());
            }
        }
        Ok(())
    }

    async fn create(&self, principal: &Principal) -> Result<Principal, StoreError> {
        Ok(match principal {
            Principal::User(user) => Principal::User(
                self.users
                    .write()
                    .await
                    .entry(user.id)
                    .or_insert_with(|| user.clone())
                    .clone(),
            ),
            Principal::Channel(channel) => Principal::Channel(
                self.channels
                    .write()
                    .await
                    .entry(channel.id)
                    .or_insert_with(|| channel.clone())
                    .clone(),
            ),
            Principal::Guild(guild) => {
                let mut guilds = self.guilds.write().await;
                let stored = guilds
                    .entry(guild.id)
                    .or_insert_with(|| guild.clone());
                for (role_id, role) in &guild.roles {
                    stored
                        .roles
                        .entry(*role_id)
                        .or_insert_with(|| role.clone());
                }
                Principal::Guild(stored.clone())
            }
            Principal::Role(role) => {
                let mut guilds = self.guilds.write().await;
                let stored = guilds
                    .entry(role.guild_id)
                    .or_insert_with(|| GuildRecord::new(role.guild_id, ""))
                    .roles
                    .entry(role.id)
                    .or_insert_with(|| role.clone());
                Principal::Role(stored.clone())
            }
        })
    }

    async fn rename(&self, key: PrincipalKey, name: &str) -> Result<(), StoreError> {
        match key {
            PrincipalKey::User(id) => {
                if let Some(user) = self.users.write().await.get_mut(&id) {
                    refresh_name(&mut user.name, name);
                }
            }
            PrincipalKey::Channel { channel, .. } => {
                if let Some(record) = self.channels.write().await.get_mut(&channel) {
                    refresh_name(&mut record.name, name);
                }
            }
            PrincipalKey::Guild(id) => {
                if let Some(guild) = self.guilds.write().await.get_mut(&id) {
                    refresh_name(&mut guild.name, name);
                }
            }
            PrincipalKey::Role { guild, role } => {
                if let Some(record) = self
                    .guilds
                    .write()
                    .await
                    .get_mut(&guild)
                    .and_then(|stored| stored.roles.get_mut(&role))
                {
                    refresh_name(&mut record.name, name);
                }
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        key: PrincipalKey,
        observed_name: &str,
        edit: &PermissionEdit,
    ) -> Result<(Principal, PermissionState), StoreError> {
        Ok(match key {
            PrincipalKey::User(id) => {
                let mut users = self.users.write().await;
                let user = users
                    .entry(id)
                    .or_insert_with(|| UserRecord::new(id, observed_name));
                refresh_name(&mut user.name, observed_name);
                let previous = edit.apply(&mut user.permissions);
                (Principal::User(user.clone()), previous)
            }
            PrincipalKey::Channel { guild, channel } => {
                let mut channels = self.channels.write().await;
                let record = channels
                    .entry(channel)
                    .or_insert_with(|| ChannelRecord::new(channel, guild, observed_name));
                refresh_name(&mut record.name, observed_name);
                let previous = edit.apply(&mut record.permissions);
                (Principal::Channel(record.clone()), previous)
            }
            PrincipalKey::Guild(id) => {
                let mut guilds = self.guilds.write().await;
                let guild = guilds
                    .entry(id)
                    .or_insert_with(|| GuildRecord::new(id, observed_name));
                refresh_name(&mut guild.name, observed_name);
                let previous = edit.apply(&mut guild.permissions);
                (Principal::Guild(guild.clone()), previous)
            }
            PrincipalKey::Role { guild, role } => {
                let mut guilds = self.guilds.write().await;
                let record = guilds
                    .entry(guild)
                    .or_insert_with(|| GuildRecord::new(guild, ""))
                    .roles
                    .entry(role)
                    .or_insert_with(|| RoleRecord::new(role, guild, observed_name));
                refresh_name(&mut record.name, observed_name);
                let previous = edit.apply(&mut record.permissions);
                (Principal::Role(record.clone()), previous)
            }
        })
    }

    async fn all_principals(&self) -> Result<Vec<Principal>, StoreError> {
        let mut principals: Vec<Principal> = self
            .guilds
            .read()
            .await
            .values()
            .cloned()
            .map(Principal::Guild)
            .collect();
        principals.extend(
            self.channels
                .read()
                .await
                .values()
                .cloned()
                .map(Principal::Channel),
        );
        principals.extend(self.users.read().await.values().cloned().map(Principal::User));
        Ok(principals)
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryPrincipalStore;
    use crate::server::store::PrincipalStore;
    use std::sync::Arc;

    use warden_core::{
        GuildId, PermissionEdit, PermissionName, PermissionState, Principal, PrincipalKey,
        PrincipalKind, RoleId, UserId,
    };

    fn master() -> PermissionName {
        PermissionName::try_from("command.master").unwrap()
    }

    #[tokio::test]
    async fn get_or_create_materializes_once_and_refreshes_names() {
        let store = InMemoryPrincipalStore::new();
        let key = PrincipalKey::User(UserId::new(1));

        let mut created = store.get_or_create(key, "alice").await.unwrap();
        assert!(created.permissions().is_empty());
        created.permissions_mut().allow(&master());
        store.save(&created).await.unwrap();

        let again = store.get_or_create(key, "").await.unwrap();
        assert_eq!(again.name(), "alice");
        assert!(again.permissions().allowed().contains("command.master"));

        let renamed = store.get_or_create(key, "alice_renamed").await.unwrap();
        assert_eq!(renamed.name(), "alice_renamed");
        assert!(renamed.permissions().allowed().contains("command.master"));
        let stored = store.find_user(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.name, "alice_renamed");
    }

    #[tokio::test]
    async fn role_materialization_creates_guild_and_mirrors_role() {
        let store = InMemoryPrincipalStore::new();
        let key = PrincipalKey::Role {
            guild: GuildId::new(10),
            role: RoleId::new(5),
        };
        let role = store.get_or_create(key, "Helper").await.unwrap();
        assert_eq!(role.kind(), PrincipalKind::Role);

        let guild = store.find_guild(GuildId::new(10)).await.unwrap().unwrap();
        assert_eq!(guild.roles[&RoleId::new(5)].name, "Helper");
    }

    #[tokio::test]
    async fn saving_a_stale_guild_never_clobbers_role_permissions() {
        let store = InMemoryPrincipalStore::new();
        let guild_key = PrincipalKey::Guild(GuildId::new(10));
        let role_key = PrincipalKey::Role {
            guild: GuildId::new(10),
            role: RoleId::new(5),
        };
        store.get_or_create(role_key, "Helper").await.unwrap();
        let stale_guild = store.get_or_create(guild_key, "League").await.unwrap();

        let mut role = store.get_or_create(role_key, "").await.unwrap();
        role.permissions_mut().deny(&master());
        store.save(&role).await.unwrap();

        store.save(&stale_guild).await.unwrap();
        let Some(Principal::Role(role)) = store.find(role_key).await.unwrap() else {
            panic!("role should exist");
        };
        assert!(role.permissions.denied().contains("command.master"));
    }

    #[tokio::test]
    async fn renaming_leaves_permission_sets_alone() {
        let store = InMemoryPrincipalStore::new();
        let key = PrincipalKey::Guild(GuildId::new(10));
        let stale = store.get_or_create(key, "League").await.unwrap();
        assert!(stale.permissions().is_empty());

        store
            .update(key, "", &PermissionEdit::Allow(master()))
            .await
            .unwrap();
        // A check still holding the stale copy observes a new name.
        let refreshed = store.get_or_create(key, "League Finals").await.unwrap();
        assert_eq!(refreshed.name(), "League Finals");

        let guild = store.find_guild(GuildId::new(10)).await.unwrap().unwrap();
        assert_eq!(guild.name, "League Finals");
        assert!(guild.permissions.allowed().contains("command.master"));
    }

    #[tokio::test]
    async fn update_creates_missing_records_and_reports_previous_state() {
        let store = InMemoryPrincipalStore::new();
        let key = PrincipalKey::Role {
            guild: GuildId::new(10),
            role: RoleId::new(5),
        };
        let (role, previous) = store
            .update(key, "Helper", &PermissionEdit::Deny(master()))
            .await
            .unwrap();
        assert_eq!(previous, PermissionState::Unset);
        assert_eq!(role.describe(), "role Helper (5) in guild 10");

        let (_, previous) = store
            .update(key, "", &PermissionEdit::Reset(master()))
            .await
            .unwrap();
        assert_eq!(previous, PermissionState::Denied);
        assert!(store.find(key).await.unwrap().unwrap().permissions().is_empty());
    }

    #[tokio::test]
    async fn create_keeps_the_first_stored_record() {
        let store = InMemoryPrincipalStore::new();
        let key = PrincipalKey::User(UserId::new(1));
        store
            .update(key, "alice", &PermissionEdit::Allow(master()))
            .await
            .unwrap();

        let kept = store.create(&key.materialize("alice")).await.unwrap();
        assert!(kept.permissions().allowed().contains("command.master"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_of_one_record_all_land() {
        let store = Arc::new(InMemoryPrincipalStore::new());
        let key = PrincipalKey::User(UserId::new(1));
        let tasks: Vec<_> = (0..32)
            .map(|index| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let name = PermissionName::try_from(format!("game.p{index}")).unwrap();
                    store
                        .update(key, "alice", &PermissionEdit::Allow(name))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        let user = store.find_user(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(user.permissions.allowed().len(), 32);
    }
}
