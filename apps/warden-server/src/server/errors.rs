use axum::{http::StatusCode, response::IntoResponse, Json};
use warden_core::PrincipalKind;
use warden_protocol::ProtocolError;

use super::{directory::DirectoryError, store::StoreError, types::ErrorBody};

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("unknown permission `{0}`")]
    UnknownPermission(String),
    #[error("no {kind} matches `{key}`")]
    NotFound { kind: PrincipalKind, key: String },
    #[error("`{key}` matches several {kind}s: {}", list_candidates(.candidates))]
    Ambiguous {
        kind: PrincipalKind,
        key: String,
        /// `(name, id)` of every match.
        candidates: Vec<(String, String)>,
    },
    #[error("{0}")]
    InvalidTarget(String),
    #[error("missing permission `{permission}`")]
    Forbidden { permission: String },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("permission storage failed: {0}")]
    Storage(#[from] StoreError),
}

fn list_candidates(candidates: &[(String, String)]) -> String {
    candidates
        .iter()
        .map(|(name, id)| format!("{name} ({id})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PermissionError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Protocol(_) => (StatusCode::BAD_REQUEST, "invalid_command"),
            Self::InvalidTarget(_) => (StatusCode::BAD_REQUEST, "invalid_target"),
            Self::Directory(_) => (StatusCode::BAD_REQUEST, "invalid_directory_event"),
            Self::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            Self::UnknownPermission(_) => (StatusCode::NOT_FOUND, "unknown_permission"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Self::Ambiguous { .. } => (StatusCode::CONFLICT, "ambiguous_target"),
            Self::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
        }
    }
}

impl IntoResponse for PermissionError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = self.status_and_code();
        if let Self::Storage(ref source) = self {
            tracing::error!(event = "permissions.request.storage_failed", error = %source);
        }
        (
            status,
            Json(ErrorBody {
                error,
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use warden_core::PrincipalKind;
    use warden_protocol::ProtocolError;

    use super::PermissionError;
    use crate::server::store::StoreError;

    #[test]
    fn ambiguous_errors_list_every_candidate() {
        let error = PermissionError::Ambiguous {
            kind: PrincipalKind::Role,
            key: String::from("helper"),
            candidates: vec![
                (String::from("Helper"), String::from("5")),
                (String::from("helper"), String::from("6")),
            ],
        };
        assert_eq!(
            error.to_string(),
            "`helper` matches several roles: Helper (5), helper (6)"
        );
    }

    #[test]
    fn maps_errors_onto_http_statuses() {
        let cases = [
            (PermissionError::Protocol(ProtocolError::Empty), StatusCode::BAD_REQUEST),
            (
                PermissionError::InvalidTarget(String::from("dm")),
                StatusCode::BAD_REQUEST,
            ),
            (
                PermissionError::Forbidden {
                    permission: String::from("command.permissions"),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                PermissionError::NotFound {
                    kind: PrincipalKind::User,
                    key: String::from("bob"),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                PermissionError::Storage(StoreError::Unavailable(String::from("down"))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
