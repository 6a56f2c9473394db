use async_trait::async_trait;
use warden_core::{
    ChannelId, ChannelRecord, GuildId, GuildRecord, PermissionEdit, PermissionState, Principal,
    PrincipalKey, UserId, UserRecord,
};

mod in_memory;
mod postgres;

pub use in_memory::InMemoryPrincipalStore;
pub use postgres::PostgresPrincipalStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed persistence for principal permission records.
///
/// Every call is a single-record read or write; callers rely on read-your-writes
/// per key and nothing more. Roles are stored inside their guild: `find_guild`
/// returns the guild with its mirrored roles, and saving a
/// [`Principal::Role`] writes only that role.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    async fn find_guild(&self, id: GuildId) -> Result<Option<GuildRecord>, StoreError>;

    async fn find_channel(&self, id: ChannelId) -> Result<Option<ChannelRecord>, StoreError>;

    /// Upsert one record. Saving a guild updates its own name and sets and adds
    /// roles the store has not seen yet; it never overwrites an existing role.
    async fn save(&self, principal: &Principal) -> Result<(), StoreError>;

    /// Store `principal` unless a record with its key exists, and return
    /// whichever record is stored afterwards. Never overwrites.
    async fn create(&self, principal: &Principal) -> Result<Principal, StoreError>;

    /// Replace only the name of an existing record; its sets are untouched.
    async fn rename(&self, key: PrincipalKey, name: &str) -> Result<(), StoreError>;

    /// Apply `edit` to the record under `key` as one atomic read-modify-write,
    /// creating the record first if it is missing and refreshing a non-empty
    /// `observed_name`. Returns the record as written and the state the edited
    /// name held before. Concurrent edits of one record never lose each other.
    async fn update(
        &self,
        key: PrincipalKey,
        observed_name: &str,
        edit: &PermissionEdit,
    ) -> Result<(Principal, PermissionState), StoreError>;

    /// Every stored guild (with roles), channel and user.
    async fn all_principals(&self) -> Result<Vec<Principal>, StoreError>;

    async fn find(&self, key: PrincipalKey) -> Result<Option<Principal>, StoreError> {
        Ok(match key {
            PrincipalKey::User(id) => self.find_user(id).await?.map(Principal::User),
            PrincipalKey::Guild(id) => self.find_guild(id).await?.map(Principal::Guild),
            PrincipalKey::Channel { channel, .. } => {
                self.find_channel(channel).await?.map(Principal::Channel)
            }
            PrincipalKey::Role { guild, role } => self
                .find_guild(guild)
                .await?
                .and_then(|mut record| record.roles.remove(&role))
                .map(Principal::Role),
        })
    }

    /// Load a record, creating it with empty sets if it does not exist yet.
    ///
    /// A non-empty `observed_name` that differs from the stored one replaces it
    /// through [`PrincipalStore::rename`], so a read never writes sets back.
    /// Concurrent creations of the same key keep the first record stored.
    async fn get_or_create(
        &self,
        key: PrincipalKey,
        observed_name: &str,
    ) -> Result<Principal, StoreError> {
        if let Some(mut principal) = self.find(key).await? {
            if !observed_name.is_empty() && principal.name() != observed_name {
                self.rename(key, observed_name).await?;
                principal.set_name(observed_name);
            }
            return Ok(principal);
        }

        let principal = self.create(&key.materialize(observed_name)).await?;
        tracing::debug!(
            event = "permissions.principal.materialized",
            kind = %principal.kind(),
            principal_id = %principal.id_string(),
        );
        Ok(principal)
    }
}

/// Overwrite `slot` with a non-empty, different `observed` name.
pub(crate) fn refresh_name(slot: &mut String, observed: &str) -> bool {
    if observed.is_empty() || slot == observed {
        return false;
    }
    observed.clone_into(slot);
    true
}
