//! HTTP Endpoints
//!
//! The translator page, its form handler, a JSON API over sessions and
//! translations, and health/metrics endpoints.

use std::sync::Arc;

use axum::{
    extract::{Form, Json, Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nmt_core::{LanguagePair, TranslationRecord};

use crate::metrics::metrics_handler;
use crate::render::{
    render_load_failed, render_loading, render_translator, Notice, PageContext, TranslatorView,
    MODEL_READY_MESSAGE,
};
use crate::session::{LoadStatus, Session};
use crate::state::AppState;
use crate::translate::submit_translation;
use crate::ServerError;

/// Cookie carrying the browser's session id
pub const SESSION_COOKIE: &str = "nmt_session";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );

    Router::new()
        // Page
        .route("/", get(index))
        .route("/translate", post(translate_form))
        // JSON API
        .route("/api/pairs", get(list_pairs))
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/history", get(session_history))
        .route("/api/sessions/:id/translate", post(translate_json))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:8080
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to localhost:8080");
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:8080"))
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

// ============================================================================
// Session cookie
// ============================================================================

fn session_id_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn attach_session_cookie(mut response: Response, session_id: &str) -> Response {
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/",
        SESSION_COOKIE, session_id
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Could not encode session cookie"),
    }
    response
}

/// Resolve the browser's session, creating one when needed
fn browser_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Session>, bool), ServerError> {
    let cookie = session_id_from_cookie(headers);
    state.sessions.get_or_create(cookie.as_deref())
}

fn html_response(status: StatusCode, body: String, new_session: Option<&str>) -> Response {
    let response = (status, Html(body)).into_response();
    match new_session {
        Some(id) => attach_session_cookie(response, id),
        None => response,
    }
}

fn error_page(state: &AppState, err: &ServerError) -> Response {
    let ctx = PageContext::from_state(state);
    let view = TranslatorView {
        notices: vec![Notice::Error(err.to_string())],
        ..Default::default()
    };
    html_response(err.into(), render_translator(&ctx, &view), None)
}

// ============================================================================
// Page handlers
// ============================================================================

/// GET /
async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, created) = match browser_session(&state, &headers) {
        Ok(resolved) => resolved,
        Err(e) => return error_page(&state, &e),
    };
    let new_cookie = created.then_some(session.id.as_str());

    session.start_loading(state.loader.clone());

    let ctx = PageContext::from_state(&state);
    let body = match session.load_status() {
        LoadStatus::NotStarted => render_loading(&ctx, Default::default()),
        LoadStatus::Loading(progress) => render_loading(&ctx, progress),
        LoadStatus::Failed(message) => {
            return html_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                render_load_failed(&ctx, &message),
                new_cookie,
            );
        }
        LoadStatus::Ready => {
            let history = session.history();
            let mut view = TranslatorView {
                history: &history,
                ..Default::default()
            };
            if session.take_ready_notice() {
                view.notices.push(Notice::Success(MODEL_READY_MESSAGE.to_string()));
            }
            render_translator(&ctx, &view)
        }
    };

    html_response(StatusCode::OK, body, new_cookie)
}

/// Form body of POST /translate
#[derive(Debug, Deserialize)]
struct TranslateForm {
    #[serde(default)]
    pair: String,
    #[serde(default)]
    text: String,
}

/// POST /translate
async fn translate_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TranslateForm>,
) -> Response {
    let (session, created) = match browser_session(&state, &headers) {
        Ok(resolved) => resolved,
        Err(e) => return error_page(&state, &e),
    };
    let new_cookie = created.then_some(session.id.as_str());
    let ctx = PageContext::from_state(&state);

    let Some(pair) = LanguagePair::from_label(&form.pair) else {
        let err = ServerError::InvalidRequest(format!("unknown language pair '{}'", form.pair));
        let history = session.history();
        let view = TranslatorView {
            notices: vec![Notice::Error(err.to_string())],
            history: &history,
            ..Default::default()
        };
        return html_response(err.into(), render_translator(&ctx, &view), new_cookie);
    };

    let result = submit_translation(&state, &session, pair, &form.text).await;

    if let Err(ServerError::ModelLoad(message)) = &result {
        return html_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            render_load_failed(&ctx, message),
            new_cookie,
        );
    }

    let history = session.history();
    let mut view = TranslatorView {
        selected: pair,
        history: &history,
        ..Default::default()
    };
    if session.take_ready_notice() {
        view.notices.push(Notice::Success(MODEL_READY_MESSAGE.to_string()));
    }

    let status = match &result {
        Ok(record) => {
            view.latest = Some(record);
            StatusCode::OK
        }
        Err(ServerError::Validation(message)) => {
            view.notices.push(Notice::Warning(message.clone()));
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Err(e) => {
            view.notices.push(Notice::Error(e.to_string()));
            e.into()
        }
    };

    html_response(status, render_translator(&ctx, &view), new_cookie)
}

// ============================================================================
// JSON API
// ============================================================================

/// GET /api/pairs
async fn list_pairs() -> Json<serde_json::Value> {
    let pairs: Vec<_> = LanguagePair::all()
        .iter()
        .map(|pair| {
            serde_json::json!({
                "label": pair.label(),
                "slug": pair.slug(),
                "source": pair.source().code(),
                "target": pair.target().code(),
            })
        })
        .collect();
    Json(serde_json::json!({ "pairs": pairs }))
}

/// POST /api/sessions
async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    let session = state.sessions.create()?;
    session.start_loading(state.loader.clone());

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session_id": session.id,
            "model_status": session.load_status().as_str(),
        })),
    ))
}

fn lookup_session(state: &AppState, id: &str) -> Result<Arc<Session>, ServerError> {
    let session = state
        .sessions
        .get(id)
        .ok_or_else(|| ServerError::Session(format!("Session not found: {}", id)))?;
    session.touch();
    Ok(session)
}

/// GET /api/sessions/:id
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let session = lookup_session(&state, &id)?;

    let mut body = serde_json::json!({
        "session_id": session.id,
        "active": session.is_active(),
        "model_status": session.load_status().as_str(),
        "history_len": session.history_len(),
    });
    match session.load_status() {
        LoadStatus::Loading(progress) => {
            body["progress"] = serde_json::json!({
                "percent": progress.percent(),
                "stage": progress.message(),
            });
        }
        LoadStatus::Failed(message) => body["error"] = serde_json::json!(message),
        LoadStatus::NotStarted | LoadStatus::Ready => {}
    }

    Ok(Json(body))
}

/// DELETE /api/sessions/:id
async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.sessions.remove(&id);
    StatusCode::NO_CONTENT
}

/// GET /api/sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

/// GET /api/sessions/:id/history
async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let session = lookup_session(&state, &id)?;
    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "translations": session.history(),
    })))
}

/// JSON body of POST /api/sessions/:id/translate
#[derive(Debug, Deserialize)]
struct TranslateRequest {
    pair: LanguagePair,
    text: String,
}

/// POST /api/sessions/:id/translate
async fn translate_json(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<TranslationRecord>, ServerError> {
    let session = lookup_session(&state, &id)?;
    let record = submit_translation(&state, &session, request.pair, &request.text).await?;
    Ok(Json(record))
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let stylesheet_ok = !state.stylesheet.is_empty();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "stylesheet": {
                    "status": if stylesheet_ok { "ok" } else { "empty" },
                    "path": state.config.ui.stylesheet_path.display().to_string(),
                },
                "sessions": {
                    "status": "ok",
                    "count": state.sessions.count(),
                },
            }
        })),
    )
}

/// GET /ready
///
/// Models load lazily, so an unloaded model does not make the server unready.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let model_status = match &state.shared_loader {
        Some(shared) if shared.is_loaded() => "loaded",
        Some(_) => "not_loaded",
        None => "per_session",
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "checks": {
                "model": {
                    "status": model_status,
                    "model_id": state.loader.model_id(),
                },
                "sessions": {
                    "status": "ok",
                    "count": state.sessions.count(),
                },
            }
        })),
    )
}
