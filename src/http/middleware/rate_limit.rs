//! Per-identity rate limiting stage.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::pipeline::Pipeline;
use crate::security::identify;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";

pub async fn rate_limit_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !pipeline.config().rate_limit.enabled {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let client = identify(request.headers(), &peer);

    let limiter = &pipeline.rate_limiter;
    if !limiter.allow(&client) {
        tracing::warn!(client = %client, "Rate limit exceeded");
        pipeline.metrics.record_rate_limited();
        return ApiError::RateLimited {
            limit: limiter.limit(),
            retry_after_secs: limiter.retry_after_secs(),
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(X_RATELIMIT_LIMIT, HeaderValue::from(limiter.limit()));
    response
}
