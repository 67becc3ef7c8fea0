//! Error types for the `rate_limit` crate.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Stable code returned to callers that were throttled.
pub const TOO_MANY_ATTEMPTS_CODE: &str = "too_many_attempts";
const INVALID_CONFIG_CODE: &str = "invalid_rate_limit_config";

/// Top-level error type for the rate limiter.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The limiter was constructed with settings it cannot honor.
    InvalidConfig(String),
    /// Admission denied. `retry_after` is the time left in the current window.
    TooManyAttempts { retry_after: Duration },
}

impl Error {
    pub fn too_many_attempts(retry_after: Duration) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::TooManyAttempts { retry_after },
        }
    }

    pub(crate) fn invalid_config(reason: &str) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::InvalidConfig(reason.to_string()),
        }
    }

    /// Machine-readable code that distinguishes throttling from other failures.
    pub fn code(&self) -> &'static str {
        match self.error_kind {
            ErrorKind::InvalidConfig(_) => INVALID_CONFIG_CODE,
            ErrorKind::TooManyAttempts { .. } => TOO_MANY_ATTEMPTS_CODE,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self.error_kind {
            ErrorKind::TooManyAttempts { retry_after } => Some(retry_after),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::InvalidConfig(reason) => {
                write!(f, "Invalid rate limit configuration: {reason}")
            }
            ErrorKind::TooManyAttempts { retry_after } => write!(
                f,
                "Too many attempts, try again in {}s",
                retry_after.as_secs()
            ),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_distinguish_throttling_from_config_errors() {
        let throttled = Error::too_many_attempts(Duration::from_secs(90));
        assert_eq!(throttled.code(), "too_many_attempts");
        assert_eq!(throttled.retry_after(), Some(Duration::from_secs(90)));

        let invalid = Error::invalid_config("max_attempts must be at least 1");
        assert_eq!(invalid.code(), "invalid_rate_limit_config");
        assert_eq!(invalid.retry_after(), None);
    }
}
