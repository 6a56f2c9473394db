use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::anyhow;
use sqlx::postgres::PgPoolOptions;
use warden_core::{Permission, UserId};

use super::{
    directory::InMemoryDirectory,
    permissions::builtin_catalog,
    resolver::PermissionResolver,
    store::{InMemoryPrincipalStore, PostgresPrincipalStore, PrincipalStore},
};

pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 65_536;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;
pub(crate) const METRICS_TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub(crate) static METRICS_STATE: OnceLock<MetricsState> = OnceLock::new();

#[derive(Default)]
pub(crate) struct MetricsState {
    pub(crate) checks: Mutex<HashMap<(&'static str, &'static str), u64>>,
    pub(crate) failed_closed: Mutex<HashMap<&'static str, u64>>,
    pub(crate) cache_lookups: Mutex<HashMap<&'static str, u64>>,
    pub(crate) cache_evictions: Mutex<HashMap<&'static str, u64>>,
    pub(crate) mutations: Mutex<HashMap<&'static str, u64>>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    /// Appended to the built-in catalog.
    pub extra_permissions: Vec<Permission>,
    /// May run administrative commands without holding the admin permission.
    pub operator_user_ids: Vec<UserId>,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_JSON_BODY_LIMIT_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            extra_permissions: Vec::new(),
            operator_user_ids: Vec::new(),
            database_url: None,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<PermissionResolver>,
    pub directory: Arc<InMemoryDirectory>,
    pub operators: Arc<HashSet<UserId>>,
}

impl AppState {
    /// Build the resolver over the configured store. The Postgres pool connects
    /// lazily, so this never touches the network.
    ///
    /// # Errors
    /// Returns an error when the catalog or the database pool cannot be built.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let catalog = builtin_catalog(config.extra_permissions.iter().cloned())?;
        let store: Arc<dyn PrincipalStore> = if let Some(database_url) = &config.database_url {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect_lazy(database_url)
                .map_err(|e| anyhow!("postgres pool init failed: {e}"))?;
            Arc::new(PostgresPrincipalStore::new(pool))
        } else {
            Arc::new(InMemoryPrincipalStore::new())
        };
        let directory = Arc::new(InMemoryDirectory::new());

        Ok(Self::with_parts(
            PermissionResolver::new(
                Arc::new(catalog),
                store,
                directory.clone(),
                config.cache_ttl,
            ),
            directory,
            config.operator_user_ids.iter().copied(),
        ))
    }

    #[must_use]
    pub fn with_parts(
        resolver: PermissionResolver,
        directory: Arc<InMemoryDirectory>,
        operators: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            directory,
            operators: Arc::new(operators.into_iter().collect()),
        }
    }
}
