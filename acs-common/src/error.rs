//! Typed errors for the remote execution core.
//!
//! Operational failures carry enough context (target key, path) for callers
//! to surface them directly; classification helpers sort raw transport
//! messages into auth vs. connectivity vs. timeout buckets.

use thiserror::Error;

/// Result alias used throughout the remote core.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Error taxonomy for pool, backend, and router operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Handshake failed before the session became ready. Never auto-retried.
    #[error("connect to {key} failed: {message}")]
    ConnectFailed { key: String, message: String },

    /// The target rejected the supplied credentials.
    #[error("authentication rejected for {key}: {message}")]
    AuthFailed { key: String, message: String },

    /// No pooled connection became available within the acquire budget.
    #[error("no connection for {key} within {waited_ms} ms")]
    PoolTimeout { key: String, waited_ms: u64 },

    /// Transfer or exec channel fault.
    #[error("{context}: {message}")]
    Io { context: String, message: String },

    /// A name or path failed allow-list validation before use.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// A stored record names a backend kind this build does not know.
    #[error("unsupported backend kind: {0:?}")]
    UnsupportedBackend(String),

    /// A race-based deadline fired before the operation completed.
    #[error("{context} timed out after {limit_ms} ms")]
    Timeout { context: String, limit_ms: u64 },
}

impl RemoteError {
    /// Build an [`RemoteError::Io`] with formatted context.
    pub fn io(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Io {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Build a [`RemoteError::Timeout`] for an operation bounded by `limit`.
    pub fn timeout(context: impl Into<String>, limit: std::time::Duration) -> Self {
        Self::Timeout {
            context: context.into(),
            limit_ms: limit.as_millis() as u64,
        }
    }

    /// True for deadline-shaped failures, including transport messages that
    /// merely read like one ("connection timed out" from the ssh binary).
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::PoolTimeout { .. } => true,
            Self::ConnectFailed { message, .. } | Self::Io { message, .. } => {
                looks_like_timeout(message)
            }
            _ => false,
        }
    }
}

/// True if a raw error message carries a timeout signature.
pub fn looks_like_timeout(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("timed out") || message.contains("timeout")
}

/// True if a handshake error message indicates a credential/auth problem
/// rather than a connectivity one.
///
/// Conservative by design: unknown messages classify as connectivity, which
/// is the bucket callers can usefully retry against by fixing the network.
pub fn is_auth_failure_text(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("permission denied")
        || message.contains("authentication failed")
        || message.contains("too many authentication failures")
        || message.contains("no supported authentication")
        || message.contains("host key verification failed")
}

/// Classify a raw handshake failure into [`RemoteError::AuthFailed`] or
/// [`RemoteError::ConnectFailed`] for the given pool key.
pub fn classify_connect_failure(key: &str, message: impl ToString) -> RemoteError {
    let message = message.to_string();
    if is_auth_failure_text(&message) {
        RemoteError::AuthFailed {
            key: key.to_string(),
            message,
        }
    } else {
        RemoteError::ConnectFailed {
            key: key.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_text_classification() {
        assert!(is_auth_failure_text("Permission denied (publickey)."));
        assert!(is_auth_failure_text("Host key verification failed."));
        assert!(!is_auth_failure_text(
            "ssh: connect to host 10.0.0.1 port 22: Connection refused"
        ));
        assert!(!is_auth_failure_text("Connection timed out"));
    }

    #[test]
    fn classify_splits_auth_from_connect() {
        let err = classify_connect_failure("root@a:22", "Permission denied (publickey).");
        assert!(matches!(err, RemoteError::AuthFailed { .. }));

        let err = classify_connect_failure("root@a:22", "No route to host");
        assert!(matches!(err, RemoteError::ConnectFailed { .. }));
    }

    #[test]
    fn timeout_detection_covers_messages() {
        assert!(
            RemoteError::timeout("probe", std::time::Duration::from_secs(5)).is_timeout()
        );
        assert!(
            RemoteError::PoolTimeout {
                key: "k".into(),
                waited_ms: 10
            }
            .is_timeout()
        );
        assert!(
            RemoteError::io("exec", "ssh: Connection timed out during banner exchange")
                .is_timeout()
        );
        assert!(!RemoteError::InvalidTarget("x".into()).is_timeout());
    }
}
