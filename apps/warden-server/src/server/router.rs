use anyhow::anyhow;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, StatusCode},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{
    core::{AppConfig, AppState},
    handlers::{admin_command, check_display, check_perform, directory_event},
    types::{health, metrics},
};

/// Build the HTTP router with a fresh [`AppState`] for `config`.
///
/// # Errors
/// Returns an error if the configuration is invalid or state cannot be built.
pub fn build_router(config: &AppConfig) -> anyhow::Result<Router> {
    validate_config(config)?;
    let app_state = AppState::new(config)?;
    router_with_state(config, app_state)
}

/// Build the HTTP router around caller-supplied state.
///
/// # Errors
/// Returns an error if the configuration is invalid.
pub fn router_with_state(config: &AppConfig, app_state: AppState) -> anyhow::Result<Router> {
    validate_config(config)?;
    let request_id_header = HeaderName::from_static("x-request-id");

    Ok(Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/checks/perform", post(check_perform))
        .route("/checks/display", post(check_display))
        .route("/admin/commands", post(admin_command))
        .route("/directory/events", post(directory_event))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
                .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                )),
        ))
}

fn validate_config(config: &AppConfig) -> anyhow::Result<()> {
    if config.max_body_bytes == 0 {
        return Err(anyhow!("max body bytes must be at least 1 byte"));
    }
    if config.request_timeout.is_zero() {
        return Err(anyhow!("request timeout must be greater than zero"));
    }
    Ok(())
}
