//! Session Management
//!
//! A session is one browser's private store: the lazily loaded model and the
//! append-only translation history. Sessions expire after a period of
//! inactivity and are swept by a background task.
//!
//! Model loading is one-shot per session. Concurrent first callers await the
//! same in-flight load, and the outcome (handle or failure) is kept for the
//! session's lifetime. [`SharedModelLoader`] optionally memoizes the loaded
//! weights across sessions so each session does not hold its own copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, OnceCell};

use nmt_core::{LoadProgress, ModelHandle, ModelLoader, TranslationRecord};

use crate::ServerError;

/// Where a session's model is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    NotStarted,
    Loading(LoadProgress),
    Ready,
    Failed(String),
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Loading(_) => "loading",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

/// Session state
pub struct Session {
    /// Session ID
    pub id: String,
    /// Creation time
    pub created_at: Instant,
    /// Last activity
    pub last_activity: RwLock<Instant>,
    /// Is active
    pub active: RwLock<bool>,
    /// Loaded model, or the message of the failed load
    model: OnceCell<Result<ModelHandle, String>>,
    progress: Arc<watch::Sender<Option<LoadProgress>>>,
    /// Set when the model becomes ready, cleared when the notice is shown
    ready_notice: AtomicBool,
    history: RwLock<Vec<TranslationRecord>>,
}

impl Session {
    /// Create a new session
    pub fn new(id: impl Into<String>) -> Self {
        let (progress, _) = watch::channel(None);
        Self {
            id: id.into(),
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
            active: RwLock::new(true),
            model: OnceCell::new(),
            progress: Arc::new(progress),
            ready_notice: AtomicBool::new(false),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Return the session's model, loading it on first use
    ///
    /// The load runs on the blocking pool. Whatever it produced is returned to
    /// every later caller; a failed load is not retried.
    pub async fn get_or_load_model(
        &self,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<ModelHandle, ServerError> {
        let outcome = self.model.get_or_init(|| self.run_load(loader)).await;
        match outcome {
            Ok(handle) => Ok(handle.clone()),
            Err(message) => Err(ServerError::ModelLoad(message.clone())),
        }
    }

    /// Kick off the model load in the background
    ///
    /// Lets a page render progress while the load runs. Does nothing once a
    /// load has started or finished.
    pub fn start_loading(self: &Arc<Self>, loader: Arc<dyn ModelLoader>) {
        if self.model.initialized() || self.progress.borrow().is_some() {
            return;
        }
        // Mark as started so page refreshes don't spawn more tasks
        self.progress.send_replace(Some(LoadProgress::Starting));

        let session = Arc::clone(self);
        tokio::spawn(async move {
            // Outcome is cached in the session; errors surface on the next page view
            let _ = session.get_or_load_model(loader).await;
        });
    }

    async fn run_load(&self, loader: Arc<dyn ModelLoader>) -> Result<ModelHandle, String> {
        let start = Instant::now();
        let model_id = loader.model_id().to_string();
        tracing::info!(session_id = %self.id, model = %model_id, "Loading translation model");

        let progress = Arc::clone(&self.progress);
        let joined = tokio::task::spawn_blocking(move || {
            loader.load(&|stage| {
                progress.send_replace(Some(stage));
            })
        })
        .await;

        let outcome = match joined {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("model loading task failed: {}", e)),
        };

        match &outcome {
            Ok(_) => {
                self.ready_notice.store(true, Ordering::SeqCst);
                tracing::info!(
                    session_id = %self.id,
                    model = %model_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Translation model loaded"
                );
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.id,
                    model = %model_id,
                    error = %e,
                    "Model load failed"
                );
            }
        }

        outcome
    }

    pub fn load_status(&self) -> LoadStatus {
        match self.model.get() {
            Some(Ok(_)) => LoadStatus::Ready,
            Some(Err(message)) => LoadStatus::Failed(message.clone()),
            None => match *self.progress.borrow() {
                Some(stage) => LoadStatus::Loading(stage),
                None => LoadStatus::NotStarted,
            },
        }
    }

    /// Subscribe to load progress updates
    pub fn progress(&self) -> watch::Receiver<Option<LoadProgress>> {
        self.progress.subscribe()
    }

    /// True exactly once after the model became ready
    pub fn take_ready_notice(&self) -> bool {
        self.ready_notice.swap(false, Ordering::SeqCst)
    }

    /// Append a completed translation to the history
    pub fn append_record(&self, record: TranslationRecord) {
        self.history.write().push(record);
    }

    /// Snapshot of the history, oldest first
    pub fn history(&self) -> Vec<TranslationRecord> {
        self.history.read().clone()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Check if session is expired
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    /// Close session
    pub fn close(&self) {
        *self.active.write() = false;
    }

    /// Is session active
    pub fn is_active(&self) -> bool {
        *self.active.read()
    }
}

/// Process-wide memo over a model loader
///
/// The first successful load is kept and handed to every later caller.
/// Failures are not kept, so a later session may try again.
pub struct SharedModelLoader {
    inner: Arc<dyn ModelLoader>,
    loaded: Mutex<Option<ModelHandle>>,
}

impl SharedModelLoader {
    pub fn new(inner: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner,
            loaded: Mutex::new(None),
        }
    }

    /// Whether the weights are already in memory
    pub fn is_loaded(&self) -> bool {
        self.loaded
            .try_lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

impl ModelLoader for SharedModelLoader {
    fn load(&self, progress: &dyn Fn(LoadProgress)) -> nmt_core::Result<ModelHandle> {
        // Held across the load so concurrent sessions wait for one copy
        let mut loaded = self.loaded.lock();
        if let Some(handle) = loaded.as_ref() {
            tracing::debug!(model = self.inner.model_id(), "Reusing shared model");
            progress(LoadProgress::Ready);
            return Ok(handle.clone());
        }

        let handle = self.inner.load(progress)?;
        *loaded = Some(handle.clone());
        Ok(handle)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Records load count and duration for every load the wrapped loader runs
///
/// Sits beneath [`SharedModelLoader`] so reused weights are not counted.
pub struct MeteredLoader {
    inner: Arc<dyn ModelLoader>,
}

impl MeteredLoader {
    pub fn new(inner: Arc<dyn ModelLoader>) -> Self {
        Self { inner }
    }
}

impl ModelLoader for MeteredLoader {
    fn load(&self, progress: &dyn Fn(LoadProgress)) -> nmt_core::Result<ModelHandle> {
        let start = Instant::now();
        let outcome = self.inner.load(progress);
        crate::metrics::record_model_load(outcome.is_ok(), start.elapsed());
        outcome
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(max_sessions: usize) -> Self {
        Self::with_config(
            max_sessions,
            Duration::from_secs(3600), // 1 hour
            Duration::from_secs(300),  // 5 minutes
        )
    }

    /// Create a new session manager with custom timeout and cleanup interval
    pub fn with_config(
        max_sessions: usize,
        session_timeout: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            cleanup_interval,
        }
    }

    /// Start a background task that periodically removes expired sessions.
    ///
    /// Returns a shutdown sender that stops the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                "Session cleanup: removed {} expired sessions ({} remaining)",
                                removed,
                                manager.count()
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Create a new session
    pub fn create(&self) -> Result<Arc<Session>, ServerError> {
        let mut sessions = self.sessions.write();

        // Check capacity
        if sessions.len() >= self.max_sessions {
            // Try to clean expired sessions
            self.cleanup_expired_internal(&mut sessions);

            if sessions.len() >= self.max_sessions {
                return Err(ServerError::Session("Max sessions reached".to_string()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(&id));
        sessions.insert(id.clone(), session.clone());
        crate::metrics::set_active_sessions(sessions.len());

        tracing::info!(session_id = %id, "Created session");

        Ok(session)
    }

    /// Get a session by ID
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read();
        sessions.get(id).cloned()
    }

    /// Resolve a known, unexpired session or create a fresh one
    ///
    /// The flag is true when a new session was created.
    pub fn get_or_create(&self, id: Option<&str>) -> Result<(Arc<Session>, bool), ServerError> {
        if let Some(session) = id.and_then(|id| self.get(id)) {
            if session.is_active() && !session.is_expired(self.session_timeout) {
                session.touch();
                return Ok((session, false));
            }
            self.remove(&session.id);
        }
        self.create().map(|session| (session, true))
    }

    /// Remove a session
    pub fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.remove(id) {
            session.close();
            crate::metrics::set_active_sessions(sessions.len());
            tracing::info!("Removed session: {}", id);
        }
    }

    /// Get active session count
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Cleanup expired sessions, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions)
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                session.close();
                tracing::info!("Expired session: {}", id);
            }
        }
        if !expired.is_empty() {
            crate::metrics::set_active_sessions(sessions.len());
        }
        expired.len()
    }

    /// List all session IDs
    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmt_core::{Error, LanguagePair};
    use nmt_text_processing::translation::PassthroughLoader;
    use std::sync::atomic::AtomicUsize;

    /// Counts loads and sleeps a little so concurrent callers overlap
    struct CountingLoader {
        loads: AtomicUsize,
        fail: bool,
    }

    impl CountingLoader {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                fail,
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, progress: &dyn Fn(LoadProgress)) -> nmt_core::Result<ModelHandle> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            progress(LoadProgress::LoadingWeights);
            std::thread::sleep(Duration::from_millis(50));
            if self.fail {
                return Err(Error::model_load("weights not found"));
            }
            PassthroughLoader::new().load(progress)
        }

        fn model_id(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_session_creation() {
        let manager = SessionManager::new(10);
        let session = manager.create().unwrap();

        assert!(session.is_active());
        assert!(!session.is_expired(Duration::from_secs(60)));
        assert_eq!(session.load_status(), LoadStatus::NotStarted);
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn test_session_get() {
        let manager = SessionManager::new(10);
        let session = manager.create().unwrap();
        let id = session.id.clone();

        let retrieved = manager.get(&id);
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().id, id);
    }

    #[test]
    fn test_session_remove() {
        let manager = SessionManager::new(10);
        let session = manager.create().unwrap();
        let id = session.id.clone();

        manager.remove(&id);
        assert!(manager.get(&id).is_none());
        assert!(!session.is_active());
    }

    #[test]
    fn test_capacity_limit() {
        let manager = SessionManager::new(1);
        manager.create().unwrap();
        assert!(matches!(manager.create(), Err(ServerError::Session(_))));
    }

    #[test]
    fn test_get_or_create() {
        let manager = SessionManager::new(10);
        let (first, created) = manager.get_or_create(None).unwrap();
        assert!(created);

        let (again, created) = manager.get_or_create(Some(&first.id)).unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));

        let (_, created) = manager.get_or_create(Some("unknown")).unwrap();
        assert!(created);
        assert_eq!(manager.count(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let manager = SessionManager::with_config(
            10,
            Duration::from_millis(10),
            Duration::from_secs(300),
        );
        manager.create().unwrap();
        manager.create().unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(manager.cleanup_expired(), 2);
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_model_loaded_once() {
        let loader = CountingLoader::new(false);
        let session = Session::new("s1");

        let first = session.get_or_load_model(loader.clone()).await.unwrap();
        let second = session.get_or_load_model(loader.clone()).await.unwrap();

        assert_eq!(loader.loads(), 1);
        assert!(Arc::ptr_eq(&first.model, &second.model));
        assert_eq!(session.load_status(), LoadStatus::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_loads_once() {
        let loader = CountingLoader::new(false);
        let session = Arc::new(Session::new("s1"));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                let loader: Arc<dyn ModelLoader> = loader.clone();
                tokio::spawn(async move { session.get_or_load_model(loader).await.is_ok() })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_load_failure_is_cached() {
        let loader = CountingLoader::new(true);
        let session = Session::new("s1");

        let err = session.get_or_load_model(loader.clone()).await.unwrap_err();
        assert!(matches!(err, ServerError::ModelLoad(_)));
        assert!(session.get_or_load_model(loader.clone()).await.is_err());

        assert_eq!(loader.loads(), 1);
        assert!(matches!(session.load_status(), LoadStatus::Failed(_)));
        assert!(!session.take_ready_notice());
    }

    #[tokio::test]
    async fn test_ready_notice_shown_once() {
        let session = Session::new("s1");
        assert!(!session.take_ready_notice());

        session
            .get_or_load_model(Arc::new(PassthroughLoader::new()))
            .await
            .unwrap();
        assert!(session.take_ready_notice());
        assert!(!session.take_ready_notice());
    }

    #[tokio::test]
    async fn test_start_loading_reports_progress() {
        let loader = CountingLoader::new(false);
        let session = Arc::new(Session::new("s1"));
        let mut progress = session.progress();

        session.start_loading(loader.clone());
        assert!(matches!(session.load_status(), LoadStatus::Loading(_)));

        // Starting twice must not spawn a second load
        session.start_loading(loader.clone());

        session.get_or_load_model(loader.clone()).await.unwrap();
        assert_eq!(*progress.borrow_and_update(), Some(LoadProgress::Ready));
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_history_is_append_only_and_ordered() {
        let session = Session::new("s1");
        session.append_record(TranslationRecord::new("one", "एक", LanguagePair::EnglishToHindi));
        session.append_record(TranslationRecord::new("two", "দুই", LanguagePair::EnglishToBangla));

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].input(), "one");
        assert_eq!(history[1].pair(), LanguagePair::EnglishToBangla);
    }

    #[tokio::test]
    async fn test_shared_loader_memoizes_across_sessions() {
        let counting = CountingLoader::new(false);
        let shared: Arc<dyn ModelLoader> = Arc::new(SharedModelLoader::new(counting.clone()));

        let a = Session::new("a");
        let b = Session::new("b");
        a.get_or_load_model(shared.clone()).await.unwrap();
        b.get_or_load_model(shared.clone()).await.unwrap();

        assert_eq!(counting.loads(), 1);
        assert!(a.take_ready_notice());
        assert!(b.take_ready_notice());
    }

    #[tokio::test]
    async fn test_shared_loader_retries_after_failure() {
        let counting = CountingLoader::new(true);
        let shared = Arc::new(SharedModelLoader::new(counting.clone()));

        let a = Session::new("a");
        let b = Session::new("b");
        assert!(a.get_or_load_model(shared.clone()).await.is_err());
        assert!(b.get_or_load_model(shared.clone()).await.is_err());

        assert_eq!(counting.loads(), 2);
        assert!(!shared.is_loaded());
    }

    /// Counts `nmt_model_loads_total` increments on the current thread
    #[derive(Default)]
    struct LoadCountRecorder {
        loads: Arc<std::sync::atomic::AtomicU64>,
    }

    impl metrics::Recorder for LoadCountRecorder {
        fn describe_counter(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }
        fn describe_gauge(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }
        fn describe_histogram(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }

        fn register_counter(
            &self,
            key: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Counter {
            if key.name() == "nmt_model_loads_total" {
                metrics::Counter::from_arc(self.loads.clone())
            } else {
                metrics::Counter::noop()
            }
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }

        fn register_histogram(
            &self,
            _: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_shared_reuse_is_not_counted_as_a_load() {
        let recorder = LoadCountRecorder::default();
        let counting = CountingLoader::new(false);
        let shared = SharedModelLoader::new(Arc::new(MeteredLoader::new(counting.clone())));

        metrics::with_local_recorder(&recorder, || {
            for _ in 0..3 {
                shared.load(&|_| {}).unwrap();
            }
        });

        assert_eq!(counting.loads(), 1);
        assert_eq!(recorder.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metered_loader_counts_failures() {
        let recorder = LoadCountRecorder::default();
        let metered = MeteredLoader::new(CountingLoader::new(true));

        metrics::with_local_recorder(&recorder, || {
            assert!(metered.load(&|_| {}).is_err());
            assert!(metered.load(&|_| {}).is_err());
        });

        assert_eq!(recorder.loads.load(Ordering::SeqCst), 2);
        assert_eq!(metered.model_id(), "counting");
    }
}
