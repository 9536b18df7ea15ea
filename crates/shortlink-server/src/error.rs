//! HTTP mapping of domain errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shortlink_core::envelope::ApiResponse;
use shortlink_core::error::ShortlinkError;
use tracing::error;

/// Handler error rendered as an envelope whose `code` is the HTTP status.
#[derive(Debug)]
pub struct ApiError(pub ShortlinkError);

impl From<ShortlinkError> for ApiError {
    fn from(err: ShortlinkError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ShortlinkError::Validation { .. } => StatusCode::BAD_REQUEST,
            ShortlinkError::DuplicateKey { .. }
            | ShortlinkError::Conflict { .. }
            | ShortlinkError::SaveInProgress => StatusCode::CONFLICT,
            ShortlinkError::CyclicParent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ShortlinkError::NotFound { .. } => StatusCode::NOT_FOUND,
            ShortlinkError::Unauthorized | ShortlinkError::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            ShortlinkError::Network(_) => StatusCode::BAD_GATEWAY,
            ShortlinkError::Database(_) | ShortlinkError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self.0, "Request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ApiResponse::<()>::error(i32::from(status.as_u16()), message);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn statuses() {
        let cases = [
            (ShortlinkError::validation("x"), StatusCode::BAD_REQUEST),
            (
                ShortlinkError::DuplicateKey {
                    entity: "resource".into(),
                    key: "links".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ShortlinkError::CyclicParent {
                    role_id: Uuid::nil(),
                    parent_id: Uuid::nil(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ShortlinkError::not_found("role", 1), StatusCode::NOT_FOUND),
            (
                ShortlinkError::Database("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
