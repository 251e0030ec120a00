//! Error types for the ChargeIO client.
//!
//! # Design
//! Failures come in two tiers. Transport, authentication and routing
//! failures (401, 404, and optionally 400) are returned as `Err`. Business
//! rule rejections such as a declined card are *not* errors: they come back
//! as a normally decoded record whose `errors()` map is non-empty.
//!
//! The API tier variants (`Unauthorized`, `ResourceNotFound`,
//! `InvalidRequest`) share `Error::is_api_error` so callers may catch them
//! broadly, or match a single variant to catch narrowly.

use thiserror::Error;

/// Advisory text attached to every `Unauthorized` error.
pub const UNAUTHORIZED_MESSAGE: &str =
    "You do not have permissions to access this resource. Please contact ChargeIO for more information";

/// Fallback text used when an error response carries no usable message.
pub const GENERIC_ERROR_MESSAGE: &str =
    "An error occurred. Please contact ChargeIO for more information";

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the gateway and by record accessors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The server returned 401. The body is never parsed for this case.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server returned 404. Carries the first message's `context`, or
    /// the generic fallback when the body has no messages.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The server rejected a malformed request. Only produced when the
    /// gateway is configured with `raise_on_bad_request`.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The gateway could not be constructed from the supplied settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// The HTTP exchange itself failed (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not valid JSON or not the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Request parameters could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A required attribute is absent from the record.
    #[error("attribute not set: {0}")]
    AttributeNotSet(String),

    /// The attribute is managed by the client and cannot be written.
    #[error("attribute is reserved: {0}")]
    ReservedAttribute(String),
}

impl Error {
    /// True for the errors raised from the HTTP status of an API response.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized(_) | Error::ResourceNotFound(_) | Error::InvalidRequest(_)
        )
    }

    /// The human readable payload of an API tier error.
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Error::Unauthorized(msg) | Error::ResourceNotFound(msg) | Error::InvalidRequest(msg) => {
                Some(msg)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
