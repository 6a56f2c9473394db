use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tokio::sync::OnceCell;
use warden_core::{
    ChannelId, ChannelRecord, GuildId, GuildRecord, PermissionEdit, PermissionName,
    PermissionOverwrite, PermissionSet, PermissionState, Principal, PrincipalKey, PrincipalKind,
    RoleId, RoleRecord, UserId, UserRecord,
};

use super::{PrincipalStore, StoreError};

const CREATE_PRINCIPALS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS permission_principals (
                    kind TEXT NOT NULL,
                    principal_id TEXT NOT NULL,
                    guild_id TEXT NULL,
                    name TEXT NOT NULL DEFAULT '',
                    allowed TEXT[] NOT NULL DEFAULT '{}',
                    denied TEXT[] NOT NULL DEFAULT '{}',
                    updated_at_unix BIGINT NOT NULL,
                    PRIMARY KEY (kind, principal_id)
                )";
const CREATE_PRINCIPALS_GUILD_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_permission_principals_guild
                    ON permission_principals(guild_id, kind)";
const UPSERT_PRINCIPAL_SQL: &str = "INSERT INTO permission_principals
                    (kind, principal_id, guild_id, name, allowed, denied, updated_at_unix)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (kind, principal_id)
                 DO UPDATE SET guild_id = EXCLUDED.guild_id,
                               name = EXCLUDED.name,
                               allowed = EXCLUDED.allowed,
                               denied = EXCLUDED.denied,
                               updated_at_unix = EXCLUDED.updated_at_unix";
const INSERT_PRINCIPAL_IF_ABSENT_SQL: &str = "INSERT INTO permission_principals
                    (kind, principal_id, guild_id, name, allowed, denied, updated_at_unix)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (kind, principal_id) DO NOTHING";
const RENAME_PRINCIPAL_SQL: &str = "UPDATE permission_principals
                 SET name = $3, updated_at_unix = $4
                 WHERE kind = $1 AND principal_id = $2";
const SELECT_COLUMNS: &str = "kind, principal_id, guild_id, name, allowed, denied";

/// Principal records in a single Postgres table, one row per principal.
#[derive(Clone)]
pub struct PostgresPrincipalStore {
    pool: PgPool,
    schema_init: Arc<OnceCell<()>>,
}

impl PostgresPrincipalStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_init: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        const SCHEMA_INIT_LOCK_ID: i64 = 0x5741_5244_454e_5045;
        self.schema_init
            .get_or_try_init(|| async {
                let mut tx = self.pool.begin().await?;
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(SCHEMA_INIT_LOCK_ID)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(CREATE_PRINCIPALS_TABLE_SQL)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(CREATE_PRINCIPALS_GUILD_INDEX_SQL)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok::<(), sqlx::Error>(())
            })
            .await?;
        Ok(())
    }

    async fn fetch_row(
        &self,
        kind: PrincipalKind,
        principal_id: String,
    ) -> Result<Option<PgRow>, StoreError> {
        self.ensure_schema().await?;
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM permission_principals
             WHERE kind = $1 AND principal_id = $2"
        ))
        .bind(kind.as_str())
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn fetch_roles(&self, guild: GuildId) -> Result<BTreeMap<RoleId, RoleRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM permission_principals
             WHERE kind = $1 AND guild_id = $2"
        ))
        .bind(PrincipalKind::Role.as_str())
        .bind(guild.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut roles = BTreeMap::new();
        for row in rows {
            if let Principal::Role(role) = decode_row(&row)? {
                roles.insert(role.id, role);
            }
        }
        Ok(roles)
    }
}

#[async_trait]
impl PrincipalStore for PostgresPrincipalStore {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let Some(row) = self.fetch_row(PrincipalKind::User, id.to_string()).await? else {
            return Ok(None);
        };
        match decode_row(&row)? {
            Principal::User(user) => Ok(Some(user)),
            other => Err(unexpected_kind(PrincipalKind::User, &other)),
        }
    }

    async fn find_guild(&self, id: GuildId) -> Result<Option<GuildRecord>, StoreError> {
        let Some(row) = self.fetch_row(PrincipalKind::Guild, id.to_string()).await? else {
            return Ok(None);
        };
        let mut guild = match decode_row(&row)? {
            Principal::Guild(guild) => guild,
            other => return Err(unexpected_kind(PrincipalKind::Guild, &other)),
        };
        guild.roles = self.fetch_roles(id).await?;
        Ok(Some(guild))
    }

    async fn find_channel(&self, id: ChannelId) -> Result<Option<ChannelRecord>, StoreError> {
        let Some(row) = self
            .fetch_row(PrincipalKind::Channel, id.to_string())
            .await?
        else {
            return Ok(None);
        };
        match decode_row(&row)? {
            Principal::Channel(channel) => Ok(Some(channel)),
            other => Err(unexpected_kind(PrincipalKind::Channel, &other)),
        }
    }

    async fn save(&self, principal: &Principal) -> Result<(), StoreError> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;
        match principal {
            Principal::Guild(guild) => {
                write_row(&mut tx, UPSERT_PRINCIPAL_SQL, principal).await?;
                for role in guild.roles.values() {
                    write_row(
                        &mut tx,
                        INSERT_PRINCIPAL_IF_ABSENT_SQL,
                        &Principal::Role(role.clone()),
                    )
                    .await?;
                }
            }
            Principal::Role(role) => {
                write_row(
                    &mut tx,
                    INSERT_PRINCIPAL_IF_ABSENT_SQL,
                    &Principal::Guild(GuildRecord::new(role.guild_id, "")),
                )
                .await?;
                write_row(&mut tx, UPSERT_PRINCIPAL_SQL, principal).await?;
            }
            Principal::User(_) | Principal::Channel(_) => {
                write_row(&mut tx, UPSERT_PRINCIPAL_SQL, principal).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create(&self, principal: &Principal) -> Result<Principal, StoreError> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;
        if let Principal::Role(role) = principal {
            write_row(
                &mut tx,
                INSERT_PRINCIPAL_IF_ABSENT_SQL,
                &Principal::Guild(GuildRecord::new(role.guild_id, "")),
            )
            .await?;
        }
        write_row(&mut tx, INSERT_PRINCIPAL_IF_ABSENT_SQL, principal).await?;
        if let Principal::Guild(guild) = principal {
            for role in guild.roles.values() {
                write_row(
                    &mut tx,
                    INSERT_PRINCIPAL_IF_ABSENT_SQL,
                    &Principal::Role(role.clone()),
                )
                .await?;
            }
        }
        tx.commit().await?;

        self.find(principal.key()).await?.ok_or_else(|| {
            StoreError::Corrupt(format!("{} missing right after insert", principal.describe()))
        })
    }

    async fn rename(&self, key: PrincipalKey, name: &str) -> Result<(), StoreError> {
        self.ensure_schema().await?;
        sqlx::query(RENAME_PRINCIPAL_SQL)
            .bind(key.kind().as_str())
            .bind(key.id_string())
            .bind(name)
            .bind(now_unix())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        key: PrincipalKey,
        observed_name: &str,
        edit: &PermissionEdit,
    ) -> Result<(Principal, PermissionState), StoreError> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;
        if let PrincipalKey::Role { guild, .. } = key {
            write_row(
                &mut tx,
                INSERT_PRINCIPAL_IF_ABSENT_SQL,
                &Principal::Guild(GuildRecord::new(guild, "")),
            )
            .await?;
        }
        write_row(
            &mut tx,
            INSERT_PRINCIPAL_IF_ABSENT_SQL,
            &key.materialize(observed_name),
        )
        .await?;

        // The row lock serializes concurrent edits of this principal until commit.
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM permission_principals
             WHERE kind = $1 AND principal_id = $2
             FOR UPDATE"
        ))
        .bind(key.kind().as_str())
        .bind(key.id_string())
        .fetch_one(&mut *tx)
        .await?;
        let mut principal = decode_row(&row)?;

        let renamed = !observed_name.is_empty() && principal.name() != observed_name;
        if renamed {
            principal.set_name(observed_name);
        }
        let previous = edit.apply(principal.permissions_mut());
        if renamed || previous != edit.target_state() {
            write_row(&mut tx, UPSERT_PRINCIPAL_SQL, &principal).await?;
        }
        tx.commit().await?;

        if let Principal::Guild(guild) = &mut principal {
            guild.roles = self.fetch_roles(guild.id).await?;
        }
        Ok((principal, previous))
    }

    async fn all_principals(&self) -> Result<Vec<Principal>, StoreError> {
        self.ensure_schema().await?;
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM permission_principals
             ORDER BY kind, principal_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut guilds: BTreeMap<GuildId, GuildRecord> = BTreeMap::new();
        let mut roles = Vec::new();
        let mut principals = Vec::new();
        for row in &rows {
            match decode_row(row)? {
                Principal::Guild(guild) => {
                    guilds.insert(guild.id, guild);
                }
                Principal::Role(role) => roles.push(role),
                other => principals.push(other),
            }
        }
        for role in roles {
            guilds
                .entry(role.guild_id)
                .or_insert_with(|| GuildRecord::new(role.guild_id, ""))
                .roles
                .insert(role.id, role);
        }
        principals.extend(guilds.into_values().map(Principal::Guild));
        Ok(principals)
    }
}

async fn write_row(
    tx: &mut Transaction<'_, Postgres>,
    sql: &str,
    principal: &Principal,
) -> Result<(), StoreError> {
    let guild_id = match principal {
        Principal::Role(role) => Some(role.guild_id.to_string()),
        Principal::Channel(channel) => Some(channel.guild_id.to_string()),
        Principal::User(_) | Principal::Guild(_) => None,
    };
    let permissions = principal.permissions();
    sqlx::query(sql)
        .bind(principal.kind().as_str())
        .bind(principal.id_string())
        .bind(guild_id)
        .bind(principal.name())
        .bind(names_of(permissions.allowed()))
        .bind(names_of(permissions.denied()))
        .bind(now_unix())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn now_unix() -> i64 {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0))
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn names_of(set: &PermissionSet) -> Vec<String> {
    set.iter().map(|name| name.as_str().to_owned()).collect()
}

fn decode_row(row: &PgRow) -> Result<Principal, StoreError> {
    let kind: String = row.try_get("kind")?;
    let principal_id: String = row.try_get("principal_id")?;
    let guild_id: Option<String> = row.try_get("guild_id")?;
    let name: String = row.try_get("name")?;
    let allowed: Vec<String> = row.try_get("allowed")?;
    let denied: Vec<String> = row.try_get("denied")?;

    let kind = PrincipalKind::try_from(kind.as_str())
        .map_err(|_| StoreError::Corrupt(format!("unknown principal kind {kind:?}")))?;
    let permissions = PermissionOverwrite::from_parts(
        parse_names(&principal_id, allowed),
        parse_names(&principal_id, denied),
    );
    let corrupt_id = || StoreError::Corrupt(format!("invalid {kind} id {principal_id:?}"));
    let parent_guild = || -> Result<GuildId, StoreError> {
        guild_id
            .as_deref()
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| StoreError::Corrupt(format!("{kind} {principal_id} has no guild")))
    };

    Ok(match kind {
        PrincipalKind::User => Principal::User(UserRecord {
            id: principal_id.parse().map_err(|_| corrupt_id())?,
            name,
            permissions,
        }),
        PrincipalKind::Guild => Principal::Guild(GuildRecord {
            id: principal_id.parse().map_err(|_| corrupt_id())?,
            name,
            permissions,
            roles: BTreeMap::new(),
        }),
        PrincipalKind::Channel => Principal::Channel(ChannelRecord {
            id: principal_id.parse().map_err(|_| corrupt_id())?,
            guild_id: parent_guild()?,
            name,
            permissions,
        }),
        PrincipalKind::Role => Principal::Role(RoleRecord {
            id: principal_id.parse().map_err(|_| corrupt_id())?,
            guild_id: parent_guild()?,
            name,
            permissions,
        }),
    })
}

/// Names that no longer validate are dropped rather than failing the whole read.
fn parse_names(principal_id: &str, raw: Vec<String>) -> PermissionSet {
    raw.into_iter()
        .filter_map(|value| match PermissionName::try_from(value) {
            Ok(name) => Some(name),
            Err(_) => {
                tracing::warn!(
                    event = "permissions.store.invalid_name_masked",
                    principal_id = %principal_id,
                );
                None
            }
        })
        .collect()
}

fn unexpected_kind(expected: PrincipalKind, found: &Principal) -> StoreError {
    StoreError::Corrupt(format!(
        "expected {expected} row, found {}",
        found.kind()
    ))
}
