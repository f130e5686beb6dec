//! Proxy-aware request identity.
//!
//! The service runs behind reverse proxies it trusts unconditionally, so the
//! client address and the public scheme/host are taken from the forwarding
//! headers first and from the connection itself only as a fallback.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Rate-limit key for a request.
///
/// Order: leftmost valid entry of `X-Forwarded-For` (the originating client
/// when every proxy is trusted), then `X-Real-IP`, then the socket peer.
pub fn client_identity(headers: &HeaderMap, socket_addr: Option<&SocketAddr>) -> String {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(first_valid_ip)
    {
        return ip.to_string();
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip.to_string();
    }

    socket_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn first_valid_ip(header_value: &str) -> Option<IpAddr> {
    header_value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .find_map(|s| s.parse::<IpAddr>().ok())
}

/// Scheme and host the client used to reach the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicOrigin {
    pub scheme: String,
    pub host: String,
}

impl PublicOrigin {
    pub fn from_parts(parts: &Parts) -> Self {
        let headers = &parts.headers;

        let scheme = first_header_value(headers, "x-forwarded-proto")
            .map(|s| s.to_ascii_lowercase())
            .filter(|s| is_valid_scheme(s))
            .or_else(|| parts.uri.scheme_str().map(|s| s.to_ascii_lowercase()))
            .unwrap_or_else(|| "http".to_string());

        let host = first_header_value(headers, "x-forwarded-host")
            .filter(|h| is_valid_host(h))
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.trim().to_string())
                    .filter(|h| is_valid_host(h))
            })
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Self { scheme, host }
    }

    /// `{scheme}://{host}/{mount}/{filename}`
    pub fn url_for(&self, mount: &str, filename: &str) -> String {
        format!(
            "{}://{}/{}/{}",
            self.scheme,
            self.host,
            mount.trim_matches('/'),
            filename
        )
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PublicOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_valid_scheme(s: &str) -> bool {
    s == "http" || s == "https"
}

fn is_valid_host(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 255
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']' | '_'))
}
