//! # Error Handling
//!
//! Two error families live here:
//! - **AppError**: failures of the HTTP diagnostic surface, converted to JSON
//!   responses through actix's `ResponseError`
//! - **RelayError**: failures inside a session pair (decode problems,
//!   upstream transport and protocol failures)
//!
//! ## Relay Error Taxonomy:
//! - **Decode errors** (malformed JSON, bad base64, odd PCM length): the
//!   frame is dropped and the pair keeps streaming
//! - **Transport / protocol errors**: the pair is torn down, never retried
//! - **Configuration errors** (unsupported rate): rejected at startup

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

/// Errors returned by the HTTP handlers.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "missing Host header",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Server-side problems (serialization failures, etc.)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Client sent an unusable request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Errors raised while relaying audio for one session pair.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Event text was not valid JSON or did not match the event shape
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// Audio payload was not valid base64
    #[error("invalid base64 audio payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// 16-bit PCM payload with a byte count that is not a multiple of two
    #[error("PCM payload length {0} is not a whole number of 16-bit samples")]
    OddPcmLength(usize),

    /// Target rate is not one the transcoder supports
    #[error("unsupported target sample rate {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Opening the upstream session failed before the handshake completed
    #[error("failed to connect upstream: {0}")]
    UpstreamConnect(String),

    /// The upstream send queue has been shut down
    #[error("upstream connection is closed")]
    UpstreamClosed,

    /// The upstream send queue is full
    #[error("upstream send queue is full ({capacity} messages)")]
    UpstreamBackpressure { capacity: usize },

    /// Upstream reported an error event and the pair runs in strict mode
    #[error("upstream rejected the session: {0}")]
    UpstreamRejected(String),
}

impl RelayError {
    /// Whether this error ends the session pair.
    ///
    /// Decode errors only cost the offending frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RelayError::MalformedEvent(_) | RelayError::InvalidBase64(_) | RelayError::OddPcmLength(_)
        )
    }
}
