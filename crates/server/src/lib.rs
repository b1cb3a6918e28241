//! Translation Web Server
//!
//! Serves the translator page, a small JSON API and health/metrics endpoints.
//! Each browser session owns its lazily loaded model and its translation history.

pub mod http;
pub mod metrics;
pub mod render;
pub mod session;
pub mod state;
pub mod translate;

pub use http::create_router;
pub use metrics::{
    init_metrics, record_model_load, record_translation, record_validation_rejection,
    set_active_sessions,
};
pub use session::{LoadStatus, MeteredLoader, Session, SessionManager, SharedModelLoader};
pub use state::AppState;
pub use translate::{submit_translation, EMPTY_INPUT_MESSAGE};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Submitted input rejected before any model work
    #[error("{0}")]
    Validation(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to load translation model: {0}")]
    ModelLoad(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        (&err).into()
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Session(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ModelLoad(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Translation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
