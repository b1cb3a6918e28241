//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use nmt_config::Settings;
use nmt_core::ModelLoader;
use nmt_text_processing::translation::create_loader;

use crate::session::{MeteredLoader, SessionManager, SharedModelLoader};

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Settings loaded at startup
    pub config: Arc<Settings>,
    /// Session manager
    pub sessions: Arc<SessionManager>,
    /// Loader handed to sessions on first use
    pub loader: Arc<dyn ModelLoader>,
    /// Set when one model is shared by all sessions
    pub shared_loader: Option<Arc<SharedModelLoader>>,
    /// Stylesheet inlined into every page
    pub stylesheet: Arc<str>,
}

impl AppState {
    /// Create application state with the loader selected by settings
    pub fn new(config: Settings, stylesheet: impl Into<Arc<str>>) -> Self {
        let loader = create_loader(&config.model);
        Self::with_loader(config, stylesheet, loader)
    }

    /// Create application state around a specific loader
    pub fn with_loader(
        config: Settings,
        stylesheet: impl Into<Arc<str>>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::with_config(
            config.sessions.max_sessions,
            Duration::from_secs(config.sessions.timeout_seconds),
            Duration::from_secs(config.sessions.cleanup_interval_seconds),
        ));

        let loader: Arc<dyn ModelLoader> = Arc::new(MeteredLoader::new(loader));
        let (loader, shared_loader) = if config.model.share_across_sessions {
            let shared = Arc::new(SharedModelLoader::new(loader));
            (shared.clone() as Arc<dyn ModelLoader>, Some(shared))
        } else {
            (loader, None)
        };

        tracing::info!(
            model = loader.model_id(),
            shared = shared_loader.is_some(),
            "Initialized application state"
        );

        Self {
            config: Arc::new(config),
            sessions,
            loader,
            shared_loader,
            stylesheet: stylesheet.into(),
        }
    }
}
