//! Session attachment and CSRF enforcement.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::pipeline::Pipeline;
use crate::security::csrf::{requires_token, CSRF_HEADER};
use crate::session::{SessionContext, SessionError};

/// Response extension set by handlers that wrote (or cleared) the
/// session cookie themselves.
#[derive(Debug, Clone, Copy)]
pub struct CookieHandled;

pub async fn session_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let (session, is_new) = match pipeline.sessions.get_or_create(request.headers()).await {
        Ok(resolved) => resolved,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if is_new {
        pipeline.metrics.record_session_created();
    } else {
        match pipeline.sessions.touch(&session.id).await {
            Ok(_) => {}
            // Swept between read and touch; the next request gets a new session.
            Err(SessionError::NotFound) => {}
            Err(e) => return ApiError::from(e).into_response(),
        }
    }

    if requires_token(request.method()) {
        let presented = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !pipeline.csrf.validate(&session.id, presented) {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                new_session = is_new,
                "CSRF validation failed"
            );
            pipeline.metrics.record_csrf_rejected();
            let mut response = ApiError::CsrfMismatch.into_response();
            pipeline.sessions.set_cookie(response.headers_mut(), &session);
            return response;
        }
    }

    request.extensions_mut().insert(SessionContext {
        session: session.clone(),
        is_new,
    });

    let mut response = next.run(request).await;

    if response.extensions().get::<CookieHandled>().is_none() {
        pipeline.sessions.set_cookie(response.headers_mut(), &session);
    }

    response
}
