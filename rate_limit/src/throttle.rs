//! Guarding a fallible operation (e.g. credential validation) with a limiter.

use crate::error::Error;
use crate::limiter::RateLimiter;
use log::*;
use std::fmt;
use std::future::Future;

/// Outcome of a throttled operation that did not succeed.
#[derive(Debug)]
pub enum ThrottleError<E> {
    /// The key was already over its limit; the operation was not attempted.
    Limited(Error),
    /// The operation ran and failed; the attempt has been recorded.
    Rejected(E),
}

impl<E: fmt::Display> fmt::Display for ThrottleError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ThrottleError::Limited(err) => write!(f, "{err}"),
            ThrottleError::Rejected(err) => write!(f, "{err}"),
        }
    }
}

/// Ties a limiter to one key for the duration of a request.
pub struct Throttle<'a> {
    limiter: &'a RateLimiter,
    key: String,
}

impl<'a> Throttle<'a> {
    pub fn new(limiter: &'a RateLimiter, key: impl Into<String>) -> Self {
        Self {
            limiter,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn check(&self) -> Result<(), Error> {
        self.limiter.check(&self.key)
    }

    pub fn record_failure(&self) -> u32 {
        self.limiter.record_attempt(&self.key)
    }

    pub fn record_success(&self) {
        self.limiter.reset_attempts(&self.key)
    }

    /// Checks admission, runs `attempt`, then records a failed attempt on `Err`
    /// or clears the key's history on `Ok`.
    pub async fn run<T, E, F>(&self, attempt: F) -> Result<T, ThrottleError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.check().map_err(ThrottleError::Limited)?;

        match attempt.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                let attempts = self.record_failure();
                debug!("Failed attempt {attempts} for {}", self.key);
                Err(ThrottleError::Rejected(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_login_key;
    use crate::limiter::RateLimitConfig;
    use std::time::Duration;

    fn validate(password: &str) -> impl Future<Output = Result<&'static str, &'static str>> + '_ {
        async move {
            if password == "secret" {
                Ok("alice")
            } else {
                Err("invalid credentials")
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_lead_to_lockout() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(900)).unwrap());
        let throttle = Throttle::new(&limiter, build_login_key("1.2.3.4", "Alice"));

        for _ in 0..3 {
            assert!(matches!(
                throttle.run(validate("wrong")).await,
                Err(ThrottleError::Rejected("invalid credentials"))
            ));
        }

        // Even the correct password is not evaluated while locked out.
        match throttle.run(validate("secret")).await {
            Err(ThrottleError::Limited(err)) => assert_eq!(err.code(), "too_many_attempts"),
            other => panic!("expected lockout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_history() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(900)).unwrap());
        let throttle = Throttle::new(&limiter, "login:1.2.3.4:alice");

        throttle.run(validate("wrong")).await.unwrap_err();
        throttle.run(validate("wrong")).await.unwrap_err();
        assert_eq!(throttle.run(validate("secret")).await.unwrap(), "alice");
        assert_eq!(limiter.attempts(throttle.key()), None);
    }
}
