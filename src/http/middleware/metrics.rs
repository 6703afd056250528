use std::sync::Arc;
use std::time::Instant;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::pipeline::Pipeline;

/// Count every request, including health and metrics scrapes.
pub async fn track_requests(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;

    pipeline
        .metrics
        .record_request(&method, response.status().as_u16(), start);
    response
}
