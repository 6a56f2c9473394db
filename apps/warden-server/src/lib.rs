#![forbid(unsafe_code)]

mod server;

pub use server::{
    build_router, builtin_catalog, init_tracing, parse_extra_permissions, router_with_state,
    AppConfig, AppState, ChannelInfo, Directory, DirectoryError, DirectoryEvent, GuildInfo,
    InMemoryDirectory, InMemoryPrincipalStore, Invocation, PermissionError, PermissionResolver,
    PostgresPrincipalStore, PrincipalStore, RoleInfo, StoreError, UserInfo, ADMIN_PERMISSION,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_JSON_BODY_LIMIT_BYTES, DEFAULT_REQUEST_TIMEOUT_SECS,
};
