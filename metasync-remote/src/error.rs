//! Error types for metasync-remote.

use thiserror::Error;

/// Failures talking to the remote API. Never retried inside this crate.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport failure (DNS, TLS, connection reset, client timeout).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status with the raw response body.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The API rejected the session.
    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    /// SOAP fault or REST error payload.
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// The response was well-formed but not what the contract promises.
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
