use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// An ingestion-side failure recorded by the mock endpoint.
///
/// These are the errors a real ingestion service would reject a batch for.
/// They are kept in the listener state so the harness can tell "the plugin
/// sent something broken" apart from "the plugin lost lines".
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestError {
    #[error("request carried no token")]
    MissingToken,

    #[error("record {index} is not valid JSON: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("record {index} has no message field")]
    MissingMessage { index: usize },

    #[error("unexpected HTTP method {0}")]
    UnexpectedMethod(String),

    #[error("request body is not valid UTF-8 at byte {valid_up_to}")]
    InvalidEncoding { valid_up_to: usize },

    /// A well-formed batch refused with a forced client-error status.
    #[error("batch refused with status {status}")]
    Refused { status: u16 },
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MissingToken => StatusCode::UNAUTHORIZED,
            IngestError::MalformedRecord { .. }
            | IngestError::MissingMessage { .. }
            | IngestError::InvalidEncoding { .. } => StatusCode::BAD_REQUEST,
            IngestError::UnexpectedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            IngestError::Refused { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid status code: {0}")]
    InvalidStatus(u16),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Failures starting or stopping the listener itself.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Invalid bind address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener server task failed: {0}")]
    Server(String),
}
