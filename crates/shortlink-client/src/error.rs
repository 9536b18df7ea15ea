//! Client error types.

use reqwest::StatusCode;
use shortlink_core::error::ShortlinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response carrying the envelope's message.
    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("no refresh token or tenant available")]
    MissingCredentials,

    /// The request was still rejected after a successful refresh.
    #[error("unauthorized")]
    Unauthorized,

    #[error("session expired")]
    SessionExpired,
}

impl From<ClientError> for ShortlinkError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http(e) => ShortlinkError::Network(e.to_string()),
            ClientError::Api { status, message } => match status {
                StatusCode::NOT_FOUND => ShortlinkError::NotFound {
                    entity: "record".into(),
                    id: message,
                },
                StatusCode::UNAUTHORIZED => ShortlinkError::Unauthorized,
                // Duplicate keys and cyclic parents arrive as 409 / 422 and
                // are shown inline like any other validation failure.
                StatusCode::BAD_REQUEST
                | StatusCode::CONFLICT
                | StatusCode::UNPROCESSABLE_ENTITY => ShortlinkError::Validation { message },
                _ => ShortlinkError::Internal(format!("{status}: {message}")),
            },
            ClientError::Decode(message) => ShortlinkError::Internal(message),
            ClientError::MissingCredentials | ClientError::SessionExpired => {
                ShortlinkError::SessionExpired
            }
            ClientError::Unauthorized => ShortlinkError::Unauthorized,
        }
    }
}
