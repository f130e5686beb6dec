use crate::api::error::AppError;
use crate::services::errors::AdmissionError;
use crate::services::rate_limiter::UploadRateLimiter;
use crate::utils::client::client_identity;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Upload quota gate.
///
/// Runs before the body is read, so a rejected request never touches
/// storage or the transcoder.
///
/// # Headers
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: requests left in the current window
/// - `Retry-After`: seconds until the window resets (429 only)
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<UploadRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let socket_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(request.headers(), socket_addr.as_ref());
    let limit = rate_limiter.limit();

    match rate_limiter.check(&client) {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            insert_quota_headers(&mut response, limit, remaining);
            response
        }
        Err(retry_after) => {
            tracing::warn!(
                client = %client,
                limit,
                retry_after_secs = retry_after.as_secs(),
                "Upload rate limit exceeded"
            );
            let mut response =
                AppError::from(AdmissionError::RateLimited { retry_after }).into_response();
            insert_quota_headers(&mut response, limit, 0);
            response
        }
    }
}

fn insert_quota_headers(response: &mut Response, limit: u32, remaining: u32) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
}
