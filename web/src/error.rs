use std::error::Error as StdError;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::*;
use rate_limit::ErrorKind as RateLimitErrorKind;
use serde_json::json;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    RateLimit(rate_limit::Error),
    Sse(sse::Error),
    /// The connection task ended before the stream could be opened.
    StreamUnavailable,
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::RateLimit(err) => write!(fmt, "{err}"),
            Error::Sse(err) => write!(fmt, "{err}"),
            Error::StreamUnavailable => write!(fmt, "Event stream unavailable"),
        }
    }
}

fn error_body(status: StatusCode, message: String, code: &str) -> Response {
    (status, Json(json!({ "error": message, "code": code }))).into_response()
}

/// Whole seconds a client should wait, rounded up so it never retries early.
fn retry_after_secs(retry_after: std::time::Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::RateLimit(err) => match &err.error_kind {
                RateLimitErrorKind::TooManyAttempts { retry_after } => {
                    let secs = retry_after_secs(*retry_after);
                    let mut response =
                        error_body(StatusCode::TOO_MANY_REQUESTS, err.to_string(), err.code());
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                    response
                }
                RateLimitErrorKind::InvalidConfig(_) => {
                    error!("Rate limiter misconfigured: {err}");
                    error_body(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL SERVER ERROR".to_string(),
                        "internal_error",
                    )
                }
            },
            Error::Sse(err) => {
                error!("Event stream error: {err}");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL SERVER ERROR".to_string(),
                    "internal_error",
                )
            }
            Error::StreamUnavailable => error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE UNAVAILABLE".to_string(),
                "stream_unavailable",
            ),
        }
    }
}

impl From<rate_limit::Error> for Error {
    fn from(err: rate_limit::Error) -> Self {
        Error::RateLimit(err)
    }
}

impl From<sse::Error> for Error {
    fn from(err: sse::Error) -> Self {
        Error::Sse(err)
    }
}
