use crate::security::rate_limit::client_key;
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const RETRY_AFTER: HeaderName = HeaderName::from_static("retry-after");

/// Per-client rate limiting for the API surface. Health probes bypass it.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path().starts_with("/health") {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = client_key(request.headers(), peer);
    let decision = state.rate_limiter.check(&key);

    let reset = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() + 60)
        .unwrap_or(0);

    if !decision.allowed {
        let mut response = ApiError::RateLimited(
            "Rate limit exceeded. Please try again later.".to_string(),
        )
        .into_response();
        apply_headers(&mut response, decision.limit, decision.remaining, reset);
        if let Some(retry) = decision.retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&retry.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, decision.limit, decision.remaining, reset);
    response
}

fn apply_headers(response: &mut Response, limit: usize, remaining: usize, reset: u64) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert(LIMIT_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert(REMAINING_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset.to_string()) {
        headers.insert(RESET_HEADER, value);
    }
}
