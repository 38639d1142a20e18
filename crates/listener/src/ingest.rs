//! Ingest — the bulk endpoint the log driver ships to.
//!
//! Wire format follows the logz.io bulk API: `POST /?token=<token>` with a
//! body of newline-separated JSON objects, each carrying a `message` field.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::Method,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::IngestError;
use crate::state::{ListenerState, ReceivedRecord};

#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    pub token: Option<String>,
    #[serde(rename = "type")]
    pub log_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    message: Option<serde_json::Value>,
    hostname: Option<String>,
    #[serde(rename = "type")]
    log_type: Option<String>,
}

/// Parse one request body into records attributed to `token`.
///
/// Blank lines are skipped. A `message` that is not a JSON string (the driver's
/// json format) is stored as its compact JSON text.
pub fn parse_batch(
    token: &str,
    default_type: Option<&str>,
    body: &[u8],
) -> Result<Vec<ReceivedRecord>, IngestError> {
    let text = std::str::from_utf8(body).map_err(|e| IngestError::InvalidEncoding {
        valid_up_to: e.valid_up_to(),
    })?;
    let received_at = Utc::now();
    let mut records = Vec::new();

    for (index, raw) in text
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
    {
        let wire: WireRecord =
            serde_json::from_str(raw).map_err(|e| IngestError::MalformedRecord {
                index,
                reason: e.to_string(),
            })?;

        let message = match wire.message {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => return Err(IngestError::MissingMessage { index }),
        };

        records.push(ReceivedRecord {
            token: token.to_string(),
            message: message.trim_end_matches(['\n', '\r']).to_string(),
            hostname: wire.hostname,
            log_type: wire.log_type.or_else(|| default_type.map(str::to_string)),
            received_at,
        });
    }

    Ok(records)
}

/// Fallback handler: the driver may be configured with any path on the
/// listener's URL, so every path that is not an admin route lands here.
pub async fn ingest(
    State(state): State<ListenerState>,
    method: Method,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        let err = IngestError::UnexpectedMethod(method.to_string());
        state.record_error(err.clone());
        return err.into_response();
    }

    let token = match params.token.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            state.metrics.batch_rejected(body.len());
            state.record_error(IngestError::MissingToken);
            return IngestError::MissingToken.into_response();
        }
    };

    let records = match parse_batch(&token, params.log_type.as_deref(), &body) {
        Ok(records) => records,
        Err(err) => {
            state.metrics.batch_rejected(body.len());
            state.record_error(err.clone());
            return err.into_response();
        }
    };

    let status = state.response_status();
    if status.is_success() {
        state.metrics.batch_accepted(records.len(), body.len());
        state.ingest(records);
    } else {
        // A refused batch is not stored: the driver is expected to resend it.
        tracing::debug!(
            status = status.as_u16(),
            records = records.len(),
            "Refusing batch with forced status"
        );
        state.metrics.batch_rejected(body.len());
        // 5xx is retryable; a client error means the batch is gone for good
        if status.is_client_error() {
            state.record_error(IngestError::Refused {
                status: status.as_u16(),
            });
        }
    }

    status.into_response()
}
