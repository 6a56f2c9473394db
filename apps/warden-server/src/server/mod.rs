pub(crate) mod cache;
pub(crate) mod core;
pub(crate) mod directory;
pub(crate) mod errors;
pub(crate) mod handlers;
pub(crate) mod listing;
pub(crate) mod metrics;
pub(crate) mod permissions;
pub(crate) mod resolver;
pub(crate) mod router;
pub(crate) mod store;
pub(crate) mod targets;
pub(crate) mod types;

pub use self::core::{
    AppConfig, AppState, DEFAULT_CACHE_TTL_SECS, DEFAULT_JSON_BODY_LIMIT_BYTES,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use directory::{
    ChannelInfo, Directory, DirectoryError, DirectoryEvent, GuildInfo, InMemoryDirectory,
    RoleInfo, UserInfo,
};
pub use errors::{init_tracing, PermissionError};
pub use permissions::{builtin_catalog, parse_extra_permissions, ADMIN_PERMISSION};
pub use resolver::{Invocation, PermissionResolver};
pub use router::{build_router, router_with_state};
pub use store::{InMemoryPrincipalStore, PostgresPrincipalStore, PrincipalStore, StoreError};
