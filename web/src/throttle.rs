//! Login throttling for the host application's authentication controller.
//!
//! A controller checks the throttle before validating credentials, records a
//! failure when validation fails and resets the key on success:
//!
//! ```ignore
//! let outcome = throttle::guard_login(&app_state, &client_ip, &form.username, async {
//!     backend.authenticate(&form).await
//! })
//! .await?;
//! ```

use crate::error::{Error, Result};
use crate::extractors::ClientIp;
use crate::AppState;
use log::*;
use rate_limit::key::build_login_key;
use rate_limit::{Throttle, ThrottleError};
use std::future::Future;

/// Builds the throttle for one login attempt and checks admission.
///
/// Returns `Error::RateLimit` (a 429 once rendered) when the caller has used
/// up its attempts for the current window.
pub fn login_throttle<'a>(
    app_state: &'a AppState,
    client_ip: &ClientIp,
    username: &str,
) -> Result<Throttle<'a>> {
    let throttle = Throttle::new(
        &app_state.rate_limiter,
        build_login_key(client_ip.as_str(), username),
    );
    if let Err(e) = throttle.check() {
        warn!("Login blocked for {}: {e}", throttle.key());
        return Err(Error::from(e));
    }
    Ok(throttle)
}

/// Runs a credential check under the login throttle.
///
/// The outer result carries throttling; the inner one is the check's own
/// outcome, already counted against (or cleared from) the caller's key.
pub async fn guard_login<T, E, F>(
    app_state: &AppState,
    client_ip: &ClientIp,
    username: &str,
    attempt: F,
) -> Result<core::result::Result<T, E>>
where
    F: Future<Output = core::result::Result<T, E>>,
{
    let throttle = login_throttle(app_state, client_ip, username)?;
    match throttle.run(attempt).await {
        Ok(value) => Ok(Ok(value)),
        Err(ThrottleError::Rejected(e)) => Ok(Err(e)),
        Err(ThrottleError::Limited(e)) => Err(Error::from(e)),
    }
}
