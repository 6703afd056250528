//! GET response caching stage.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::cache::{resource_prefix, CacheKey, CachedResponse};
use crate::error::ApiError;
use crate::observability::CacheEvent;
use crate::pipeline::Pipeline;
use crate::security::csrf::requires_token;

pub const X_CACHE: &str = "x-cache";

pub async fn cache_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !pipeline.config().cache.enabled {
        return next.run(request).await;
    }

    let method = request.method().clone();
    if method != Method::GET {
        let path = request.uri().path().to_string();
        let response = next.run(request).await;

        if requires_token(&method) && response.status().is_success() {
            let prefix = resource_prefix(&path);
            let removed = pipeline.cache.invalidate_prefix(&prefix);
            if removed > 0 {
                tracing::debug!(prefix = %prefix, removed, "Invalidated cached responses");
                pipeline.metrics.record_cache(CacheEvent::Invalidate);
            }
        }
        return response;
    }

    let key = CacheKey::new(&method, request.uri());

    if let Some(hit) = pipeline.cache.lookup(&key) {
        pipeline.metrics.record_cache(CacheEvent::Hit);
        return cached(hit);
    }
    pipeline.metrics.record_cache(CacheEvent::Miss);

    let generation = pipeline.cache.generation(key.path());
    let response = next.run(request).await;
    if !response.status().is_success() || is_no_store(response.headers()) {
        return with_cache_status(response, "MISS");
    }

    let too_large = response
        .body()
        .size_hint()
        .upper()
        .map_or(true, |upper| upper > pipeline.cache.max_body_bytes() as u64);
    if too_large {
        return with_cache_status(response, "MISS");
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, pipeline.cache.max_body_bytes()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::Infrastructure(format!("failed to buffer response: {e}")).into_response();
        }
    };

    let mut stored_headers = parts.headers.clone();
    stored_headers.remove(header::SET_COOKIE);
    let stored = pipeline.cache.store(
        key,
        CachedResponse {
            status: parts.status,
            headers: stored_headers,
            body: bytes.clone(),
        },
        pipeline.cache.ttl(),
        generation,
    );
    if stored {
        pipeline.metrics.record_cache(CacheEvent::Store);
    } else {
        tracing::debug!("Collection invalidated during miss, response not cached");
    }

    with_cache_status(Response::from_parts(parts, Body::from(bytes)), "MISS")
}

fn cached(hit: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(hit.body));
    *response.status_mut() = hit.status;
    *response.headers_mut() = hit.headers;
    with_cache_status(response, "HIT")
}

fn with_cache_status(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status));
    response
}

fn is_no_store(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| {
            v.split(',')
                .any(|d| matches!(d.trim().to_ascii_lowercase().as_str(), "no-store" | "private"))
        })
}
