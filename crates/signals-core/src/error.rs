//! ============================================================================
//! Error Types - Typed failure taxonomy for the client core
//! ============================================================================
//! The core never presents UI; it returns these upward and the presentation
//! layer decides what to show. `ApiError::SessionExpired` is the signal to
//! redirect to re-authentication.
//! ============================================================================

use thiserror::Error;

/// Failure from a token store backend (keychain access, corrupt entry).
#[derive(Debug, Error)]
#[error("token store error: {0}")]
pub struct StoreError(pub String);

/// Errors surfaced by the authenticated request client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure with no HTTP response. Never retried by the
    /// request client; the stream layer has its own reconnect handling.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The refresh protocol failed, or a replayed call was rejected again.
    /// Callers must treat this as terminal and re-authenticate.
    #[error("session expired")]
    SessionExpired,

    /// 4xx other than 401 — surfaced verbatim for user-facing messaging,
    /// never retried.
    #[error("request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    /// 5xx — surfaced to the caller, never retried.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from starting the signal stream. Transport failures after start
/// are logged and handled by the reconnect loop, never returned.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("access token must not be empty")]
    EmptyToken,

    #[error("invalid stream url: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::Validation {
            status: 422,
            message: "email already taken".to_string(),
        };
        assert_eq!(err.to_string(), "request rejected (422): email already taken");

        let err = ApiError::SessionExpired;
        assert_eq!(err.to_string(), "session expired");

        let err = StreamError::EmptyToken;
        assert_eq!(err.to_string(), "access token must not be empty");
    }

    #[test]
    fn test_store_error_converts() {
        let err: ApiError = StoreError("keychain locked".to_string()).into();
        assert!(err.to_string().contains("keychain locked"));
    }
}
