use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use log::*;
use std::convert::Infallible;
use std::net::SocketAddr;

const FORWARDED_FOR: &str = "x-forwarded-for";
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

/// Best-effort address of the caller, used as the identity part of rate-limit keys.
///
/// Resolution order is the first `X-Forwarded-For` entry, then the peer address
/// recorded by `into_make_service_with_connect_info`, then `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn forwarded_for(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(FORWARDED_FOR)?.to_str().ok()?;
    header
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = forwarded_for(parts) {
            return Ok(ClientIp(ip));
        }

        match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Ok(ClientIp(addr.ip().to_string())),
            None => {
                trace!("No client address available for request to {}", parts.uri);
                Ok(ClientIp(UNKNOWN_CLIENT_IP.to_string()))
            }
        }
    }
}
