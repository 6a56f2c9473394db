#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use warden_core::UserId;
use warden_server::{build_router, init_tracing, parse_extra_permissions, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let defaults = AppConfig::default();
    let cache_ttl = std::env::var("WARDEN_CACHE_TTL_SECS").map_or_else(
        |_| Ok(defaults.cache_ttl),
        |value| {
            value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| anyhow::anyhow!("invalid WARDEN_CACHE_TTL_SECS value {value:?}: {e}"))
        },
    )?;
    let request_timeout = std::env::var("WARDEN_REQUEST_TIMEOUT_SECS").map_or_else(
        |_| Ok(defaults.request_timeout),
        |value| {
            value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| {
                    anyhow::anyhow!("invalid WARDEN_REQUEST_TIMEOUT_SECS value {value:?}: {e}")
                })
        },
    )?;
    let max_body_bytes = std::env::var("WARDEN_MAX_BODY_BYTES").map_or_else(
        |_| Ok(defaults.max_body_bytes),
        |value| {
            value.parse::<usize>().map_err(|e| {
                anyhow::anyhow!("invalid WARDEN_MAX_BODY_BYTES value {value:?}: {e}")
            })
        },
    )?;
    let operator_user_ids = std::env::var("WARDEN_OPERATOR_USER_IDS").map_or_else(
        |_| Ok(Vec::new()),
        |value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<UserId>().map_err(|e| {
                        anyhow::anyhow!("invalid WARDEN_OPERATOR_USER_IDS entry {id:?}: {e}")
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()
        },
    )?;
    let extra_permissions = std::env::var("WARDEN_EXTRA_PERMISSIONS")
        .map_or_else(|_| Ok(Vec::new()), |value| parse_extra_permissions(&value))?;

    let app_config = AppConfig {
        max_body_bytes,
        request_timeout,
        cache_ttl,
        extra_permissions,
        operator_user_ids,
        database_url: std::env::var("WARDEN_DATABASE_URL").ok(),
    };
    let store_kind = if app_config.database_url.is_some() {
        "postgres"
    } else {
        "in_memory"
    };
    let app = build_router(&app_config)?;
    let addr = std::env::var("WARDEN_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:3000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid WARDEN_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, store = store_kind, "warden-server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
