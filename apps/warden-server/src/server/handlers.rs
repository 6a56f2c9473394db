use axum::{extract::State, Json};
use warden_protocol::parse_admin_command;

use super::{
    core::AppState,
    directory::DirectoryEvent,
    errors::PermissionError,
    permissions::ADMIN_PERMISSION,
    types::{
        AcceptedResponse, AdminCommandRequest, AdminCommandResponse, CheckResponse,
        DisplayCheckRequest, PerformCheckRequest,
    },
};

pub(crate) async fn check_perform(
    State(state): State<AppState>,
    Json(payload): Json<PerformCheckRequest>,
) -> Json<CheckResponse> {
    let allowed = state
        .resolver
        .can_perform(&payload.permission, payload.user_id, payload.channel_id)
        .await;
    Json(CheckResponse { allowed })
}

pub(crate) async fn check_display(
    State(state): State<AppState>,
    Json(payload): Json<DisplayCheckRequest>,
) -> Json<CheckResponse> {
    let allowed = state
        .resolver
        .can_display_result(&payload.permission, payload.channel_id)
        .await;
    Json(CheckResponse { allowed })
}

pub(crate) async fn admin_command(
    State(state): State<AppState>,
    Json(payload): Json<AdminCommandRequest>,
) -> Result<Json<AdminCommandResponse>, PermissionError> {
    let command = parse_admin_command(&payload.command)?;
    let invocation = payload.invocation;
    let authorized = state.operators.contains(&invocation.user)
        || state
            .resolver
            .can_perform(ADMIN_PERMISSION, invocation.user, invocation.channel)
            .await;
    if !authorized {
        tracing::warn!(
            event = "permissions.admin_command",
            outcome = "forbidden",
            user_id = %invocation.user,
            channel_id = %invocation.channel,
        );
        return Err(PermissionError::Forbidden {
            permission: String::from(ADMIN_PERMISSION),
        });
    }

    let reply = state.resolver.execute(&command, &invocation).await?;
    tracing::info!(
        event = "permissions.admin_command",
        outcome = "executed",
        user_id = %invocation.user,
        channel_id = %invocation.channel,
    );
    Ok(Json(AdminCommandResponse { command, reply }))
}

pub(crate) async fn directory_event(
    State(state): State<AppState>,
    Json(payload): Json<DirectoryEvent>,
) -> Result<Json<AcceptedResponse>, PermissionError> {
    state.directory.apply(payload)?;
    Ok(Json(AcceptedResponse { accepted: true }))
}
