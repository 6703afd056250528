//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up the outer middleware (request ID, tracing, metrics, panics, timeout)
//! - Hand API routes to the pipeline for the session-aware stages
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::handlers::{self, AppState};
use crate::http::middleware::metrics::track_requests;
use crate::http::request;
use crate::ideas::IdeaRepository;
use crate::pipeline::Pipeline;

/// Largest accepted request body.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// HTTP server for the intake API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(pipeline: Arc<Pipeline>, ideas: Arc<dyn IdeaRepository>) -> Self {
        let state = AppState { pipeline, ideas };
        let router = Self::build_router(state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let pipeline = state.pipeline.clone();

        let api = Router::new()
            .route("/api/v1/csrf-token", get(handlers::csrf_token))
            .route(
                "/api/v1/session",
                get(handlers::session_info).delete(handlers::logout),
            )
            .route("/api/v1/session/refresh", post(handlers::refresh_session))
            .route(
                "/api/v1/ideas",
                get(handlers::list_ideas).post(handlers::create_idea),
            )
            .route(
                "/api/v1/ideas/{id}",
                get(handlers::get_idea).delete(handlers::delete_idea),
            )
            .with_state(state.clone());

        // Probes stay outside sessions, rate limiting and caching.
        let ops = Router::new()
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .with_state(state);

        let app = Router::new().merge(ops).merge(pipeline.wrap(api));
        with_outer_layers(app, pipeline)
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

}

/// Request id, access log, request metrics, panic recovery, body limit and
/// the per-request deadline, outermost first.
#[allow(deprecated)]
fn with_outer_layers(app: Router, pipeline: Arc<Pipeline>) -> Router {
    let request_timeout = Duration::from_secs(pipeline.config().timeouts.request_secs);

    app.layer(
        ServiceBuilder::new()
            .layer(request::set_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(request::propagate_request_id_layer())
            .layer(from_fn_with_state(pipeline, track_requests))
            .layer(CatchPanicLayer::new())
            .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
            .layer(TimeoutLayer::new(request_timeout)),
    )
}
