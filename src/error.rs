//! Error taxonomy shared by every adapter and the conversion pipeline.
//!
//! Input errors are raised before any network call and are never retried.
//! Upstream errors are classified by the resilient client and may be retried
//! according to the provider's policy. Authentication and persistence errors
//! are fatal for the operation that raised them.

use crate::provider::Platform;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{platform}: invalid playlist locator: {reason}")]
    InvalidLocator { platform: Platform, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{platform} api error (code: {code}, type: {kind}): {message}")]
    UpstreamApi {
        platform: Platform,
        code: String,
        kind: String,
        message: String,
    },

    #[error("{platform}: unexpected response (status {status}), raw dump:\n{dump}")]
    UnexpectedResponse {
        platform: Platform,
        status: u16,
        dump: String,
    },

    #[error("{platform}: upstream unavailable after {attempts} attempts: {source}")]
    UpstreamUnavailable {
        platform: Platform,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{platform} does not support {operation}")]
    Unsupported {
        platform: Platform,
        operation: &'static str,
    },

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Errors caused by the caller's input; map to 4xx at the HTTP boundary.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::InvalidLocator { .. } | Error::Unsupported { .. }
        )
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_) | Error::Decryption(_) | Error::InvalidState(_)
        )
    }

    /// Upstream failures the resilient client may retry when a policy asks for it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::UpstreamApi { .. } | Error::UnexpectedResponse { .. } | Error::Transport(_)
        )
    }

    pub(crate) fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Persistence(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_not_auth_errors() {
        let err = Error::InvalidLocator {
            platform: Platform::Deezer,
            reason: "bad".to_string(),
        };
        assert!(err.is_input_error());
        assert!(!err.is_auth_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unavailable_keeps_source() {
        let err = Error::UpstreamUnavailable {
            platform: Platform::Deezer,
            attempts: 3,
            source: Box::new(Error::UpstreamApi {
                platform: Platform::Deezer,
                code: "4".to_string(),
                kind: "Exception".to_string(),
                message: "Quota limit exceeded".to_string(),
            }),
        };
        let message = err.to_string();
        assert!(message.contains("3 attempts"));
        assert!(message.contains("Quota limit exceeded"));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_state_errors_are_auth_errors() {
        assert!(Error::InvalidState("expired".into()).is_auth_error());
        assert!(Error::Decryption("bad base64".into()).is_auth_error());
    }
}
