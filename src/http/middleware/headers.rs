use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::pipeline::Pipeline;
use crate::security::headers;

pub async fn security_headers_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    headers::apply(response.headers_mut(), pipeline.config().is_production());
    response
}
