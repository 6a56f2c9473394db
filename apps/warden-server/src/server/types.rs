use axum::{
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use warden_core::{ChannelId, UserId};
use warden_protocol::AdminCommand;

use super::{core::METRICS_TEXT_CONTENT_TYPE, metrics::render_metrics, resolver::Invocation};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub(crate) async fn metrics() -> Response {
    (
        [(CONTENT_TYPE, METRICS_TEXT_CONTENT_TYPE)],
        render_metrics(),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: &'static str,
    pub(crate) detail: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PerformCheckRequest {
    pub(crate) permission: String,
    pub(crate) user_id: UserId,
    pub(crate) channel_id: ChannelId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DisplayCheckRequest {
    pub(crate) permission: String,
    pub(crate) channel_id: ChannelId,
}

#[derive(Debug, Serialize)]
pub(crate) struct CheckResponse {
    pub(crate) allowed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AdminCommandRequest {
    pub(crate) command: String,
    pub(crate) invocation: Invocation,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminCommandResponse {
    pub(crate) command: AdminCommand,
    pub(crate) reply: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AcceptedResponse {
    pub(crate) accepted: bool,
}
