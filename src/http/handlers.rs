//! Route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::http::middleware::session::CookieHandled;
use crate::ideas::{Idea, IdeaRepository, NewIdea};
use crate::pipeline::Pipeline;
use crate::security::csrf::CSRF_HEADER;
use crate::session::{Session, SessionContext};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub ideas: Arc<dyn IdeaRepository>,
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

pub async fn health(State(state): State<AppState>) -> Response {
    match sqlx::query("SELECT 1").execute(state.pipeline.pool()).await {
        Ok(_) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.pipeline.metrics.render(),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub token: String,
    pub expires_in: u64,
}

/// `GET /api/v1/csrf-token`: issue a token bound to the caller's session.
pub async fn csrf_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    let csrf = &state.pipeline.csrf;
    let token = csrf.issue(&ctx.session.id);

    let mut response = Json(CsrfTokenResponse {
        token: token.clone(),
        expires_in: csrf.ttl().as_secs(),
    })
    .into_response();
    if let Ok(value) = HeaderValue::from_str(&token) {
        response.headers_mut().insert(CSRF_HEADER, value);
    }
    no_store(response)
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub created_at: String,
    pub expires_at: String,
    pub last_seen: String,
    pub is_new: bool,
}

impl SessionInfo {
    fn new(session: &Session, is_new: bool) -> Self {
        Self {
            created_at: session.created_at.to_rfc3339(),
            expires_at: session.expires_at.to_rfc3339(),
            last_seen: session.last_seen.to_rfc3339(),
            is_new,
        }
    }
}

/// `GET /api/v1/session`
pub async fn session_info(Extension(ctx): Extension<SessionContext>) -> Response {
    no_store(Json(SessionInfo::new(&ctx.session, ctx.is_new)).into_response())
}

/// `POST /api/v1/session/refresh`: slide the absolute deadline.
pub async fn refresh_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Response, ApiError> {
    let sessions = &state.pipeline.sessions;
    let expires_at = sessions.refresh(&ctx.session.id).await?;
    let session = Session {
        expires_at,
        ..ctx.session
    };

    let mut response = no_store(Json(SessionInfo::new(&session, false)).into_response());
    sessions.set_cookie(response.headers_mut(), &session);
    response.extensions_mut().insert(CookieHandled);
    Ok(response)
}

/// `DELETE /api/v1/session`: logout.
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Response, ApiError> {
    let pipeline = &state.pipeline;
    pipeline.sessions.delete(&ctx.session.id).await?;
    pipeline.csrf.revoke(&ctx.session.id);

    let mut response = StatusCode::NO_CONTENT.into_response();
    pipeline.sessions.clear_cookie(response.headers_mut());
    response.extensions_mut().insert(CookieHandled);
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_ideas(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Idea>>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);
    Ok(Json(state.ideas.list(limit, offset).await?))
}

pub async fn create_idea(
    State(state): State<AppState>,
    Json(body): Json<NewIdea>,
) -> Result<(StatusCode, Json<Idea>), ApiError> {
    let content = body
        .validated()
        .map_err(|reason| ApiError::BadRequest(reason.to_string()))?;

    let idea = state.ideas.create(content).await?;
    tracing::info!(idea_id = idea.id, "Idea created");
    Ok((StatusCode::CREATED, Json(idea)))
}

pub async fn get_idea(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Idea>, ApiError> {
    state.ideas.get(id).await?.map(Json).ok_or(ApiError::NotFound)
}

pub async fn delete_idea(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.ideas.delete(id).await? {
        tracing::info!(idea_id = id, "Idea deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
