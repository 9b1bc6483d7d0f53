use std::path::PathBuf;

use thiserror::Error;

use crate::transport::RawExchange;

pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_INTERNAL: u16 = 500;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential file, or nothing in it that can produce a token.
    #[error("{message}")]
    MissingCredential { message: String },

    /// The token endpoint rejected the refresh, answered with an unusable
    /// body, or could not be reached.
    #[error("{message}")]
    RefreshFailed {
        status: u16,
        message: String,
        exchange: Option<RawExchange>,
    },

    /// A refreshed record could not be written back. Only ever handed to the
    /// persist observer; the caller still gets its token.
    #[error("failed to persist credentials to {}: {message}", .path.display())]
    PersistFailed { path: PathBuf, message: String },
}

impl AuthError {
    pub fn missing(message: impl Into<String>) -> Self {
        Self::MissingCredential {
            message: message.into(),
        }
    }

    pub fn refresh_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RefreshFailed {
            status,
            message: message.into(),
            exchange: None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::MissingCredential { .. } => STATUS_UNAUTHORIZED,
            Self::RefreshFailed { status, .. } => *status,
            Self::PersistFailed { .. } => STATUS_INTERNAL,
        }
    }

    pub fn exchange(&self) -> Option<&RawExchange> {
        match self {
            Self::RefreshFailed { exchange, .. } => exchange.as_ref(),
            _ => None,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_kind() {
        assert_eq!(AuthError::missing("gone").status(), 401);
        assert_eq!(AuthError::refresh_failed(400, "bad grant").status(), 400);
        let persist = AuthError::PersistFailed {
            path: PathBuf::from("/tmp/creds.json"),
            message: "read-only".to_string(),
        };
        assert_eq!(persist.status(), 500);
    }

    #[test]
    fn persist_failure_message_names_path() {
        let err = AuthError::PersistFailed {
            path: PathBuf::from("/tmp/creds.json"),
            message: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to persist credentials to /tmp/creds.json: disk full"
        );
    }

    #[test]
    fn exchange_only_present_on_refresh_failures() {
        let err = AuthError::RefreshFailed {
            status: 400,
            message: "rejected".to_string(),
            exchange: Some(RawExchange {
                request_raw: "POST https://example.test/token".to_string(),
                response_raw: "HTTP 400".to_string(),
            }),
        };
        assert!(err.exchange().is_some());
        assert!(AuthError::missing("gone").exchange().is_none());
    }
}
