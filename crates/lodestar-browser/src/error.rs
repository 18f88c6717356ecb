use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("session creation failed: {0}")]
    SessionCreation(String),
}

/// Errors returned by [`SessionPool`](crate::pool::SessionPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// No session became free within the bounded wait, or creation failed.
    #[error("no browsing session available after {waited:?}")]
    Unavailable { waited: Duration },

    #[error("session pool is shut down")]
    ShutDown,
}

/// Errors returned by [`EgressRotator`](crate::egress::EgressRotator).
#[derive(Debug, Error)]
pub enum EgressError {
    /// Every identity is inactive or at its concurrent-session cap.
    #[error("no eligible egress identity")]
    Exhausted,

    #[error("unknown egress identity: {0}")]
    UnknownIdentity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrowserError::NavigationError("page not found".to_string());
        assert_eq!(err.to_string(), "navigation failed: page not found");
    }

    #[test]
    fn test_unavailable_mentions_wait() {
        let err = PoolError::Unavailable {
            waited: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_unknown_identity() {
        let err = EgressError::UnknownIdentity("res-9".to_string());
        assert!(err.to_string().contains("res-9"));
    }
}
