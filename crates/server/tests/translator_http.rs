//! Integration tests for the translator page and JSON API
//!
//! These drive the router in-process with a stub model so no weights are needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use nmt_config::Settings;
use nmt_core::{
    Language, LoadProgress, ModelHandle, ModelLoader, Result, Seq2SeqModel, TextTokenizer,
};
use nmt_server::{create_router, AppState, EMPTY_INPUT_MESSAGE};

const EN_TOKEN: u32 = 128022;
const HI_TOKEN: u32 = 128036;
const BN_TOKEN: u32 = 128028;
const EOS: u32 = 2;

/// Knows exactly one sentence: "Hello" -> "नमस्ते"
struct PhrasebookTokenizer;

impl TextTokenizer for PhrasebookTokenizer {
    fn encode(&self, text: &str, src_lang: Language) -> Result<Vec<u32>> {
        let word = if text.trim() == "Hello" { 100 } else { 101 };
        Ok(vec![self.lang_token_id(src_lang)?, word, EOS])
    }

    fn lang_token_id(&self, lang: Language) -> Result<u32> {
        Ok(match lang {
            Language::English => EN_TOKEN,
            Language::Hindi => HI_TOKEN,
            Language::Bengali => BN_TOKEN,
        })
    }

    fn decode(&self, ids: &[u32], _skip_special_tokens: bool) -> Result<String> {
        Ok(ids
            .iter()
            .filter_map(|id| match id {
                200 => Some("नमस्ते"),
                201 => Some("?"),
                _ => None,
            })
            .collect())
    }
}

/// Emits the forced language token, then the phrasebook word
struct PhrasebookModel;

impl Seq2SeqModel for PhrasebookModel {
    fn generate(
        &self,
        input_ids: &[u32],
        forced_bos_token_id: u32,
        max_length: usize,
    ) -> Result<Vec<u32>> {
        let word = if input_ids.contains(&100) { 200 } else { 201 };
        let mut out = vec![EOS, forced_bos_token_id, word, EOS];
        out.truncate(max_length);
        Ok(out)
    }

    fn name(&self) -> &str {
        "phrasebook"
    }
}

struct PhrasebookLoader {
    loads: AtomicUsize,
}

impl PhrasebookLoader {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            loads: AtomicUsize::new(0),
        })
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for PhrasebookLoader {
    fn load(&self, progress: &dyn Fn(LoadProgress)) -> Result<ModelHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        progress(LoadProgress::LoadingWeights);
        Ok(ModelHandle::new(
            Arc::new(PhrasebookModel),
            Arc::new(PhrasebookTokenizer),
        ))
    }

    fn model_id(&self) -> &str {
        "phrasebook"
    }
}

fn app_with(settings: Settings, loader: Arc<PhrasebookLoader>) -> Router {
    let state = AppState::with_loader(settings, "body { background: black; }", loader);
    create_router(state)
}

fn app(loader: Arc<PhrasebookLoader>) -> Router {
    app_with(Settings::default(), loader)
}

fn form_request(pair: &str, text: &str, cookie: Option<&str>) -> Request<Body> {
    let body = format!("pair={}&text={}", encode_form(pair), encode_form(text));
    let mut builder = Request::builder()
        .method("POST")
        .uri("/translate")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn encode_form(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("new session should set a cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// English to Hindi end to end through the form
#[tokio::test]
async fn test_form_translation_renders_output_and_history() {
    let loader = PhrasebookLoader::new();
    let app = app(loader.clone());

    let response = app
        .clone()
        .oneshot(form_request("en-hi", "Hello", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    assert!(cookie.starts_with("nmt_session="));

    let html = body_text(response).await;
    assert!(html.contains(r#"<div class="output-bar">नमस्ते</div>"#));
    assert!(html.contains("#1 English to Hindi"));
    assert!(html.contains("Model loaded successfully!"));
    assert!(html.contains(r#"<option value="en-hi" selected>"#));
    assert_eq!(loader.loads(), 1);
}

/// Whitespace-only input warns and never touches the model
#[tokio::test]
async fn test_blank_submission_is_rejected_before_loading() {
    let loader = PhrasebookLoader::new();
    let app = app(loader.clone());

    let response = app
        .oneshot(form_request("en-bn", "   \n  ", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let html = body_text(response).await;
    assert!(html.contains(EMPTY_INPUT_MESSAGE));
    assert!(!html.contains("Translation History"));
    assert_eq!(loader.loads(), 0);
}

#[tokio::test]
async fn test_unknown_pair_is_bad_request() {
    let app = app(PhrasebookLoader::new());

    let response = app
        .oneshot(form_request("English to Tamil", "Hello", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// History accumulates per session, oldest first
#[tokio::test]
async fn test_history_accumulates_in_submission_order() {
    let loader = PhrasebookLoader::new();
    let app = app(loader.clone());

    let first = app
        .clone()
        .oneshot(form_request("en-hi", "Hello", None))
        .await
        .unwrap();
    let cookie = session_cookie(&first);

    let second = app
        .clone()
        .oneshot(form_request("en-hi", "Good morning", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert!(second.headers().get(header::SET_COOKIE).is_none());

    let html = body_text(second).await;
    let one = html.find("#1 English to Hindi").unwrap();
    let two = html.find("#2 English to Hindi").unwrap();
    assert!(one < two);
    assert!(html.contains("Good morning"));
    // The ready notice is shown once per session
    assert!(!html.contains("Model loaded successfully!"));

    // A different browser starts with an empty history
    let other = app
        .oneshot(form_request("en-hi", "Hello", None))
        .await
        .unwrap();
    let html = body_text(other).await;
    assert!(html.contains("#1 English to Hindi"));
    assert!(!html.contains("#2 English to Hindi"));
}

/// With sharing on, many sessions load the model once
#[tokio::test]
async fn test_shared_model_loads_once() {
    let loader = PhrasebookLoader::new();
    let app = app(loader.clone());

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(form_request("en-hi", "Hello", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(loader.loads(), 1);
}

/// Without sharing, each session loads once and reuses its model
#[tokio::test]
async fn test_per_session_model_loads_once_per_session() {
    let mut settings = Settings::default();
    settings.model.share_across_sessions = false;
    let loader = PhrasebookLoader::new();
    let app = app_with(settings, loader.clone());

    let first = app
        .clone()
        .oneshot(form_request("en-hi", "Hello", None))
        .await
        .unwrap();
    let cookie = session_cookie(&first);
    for _ in 0..2 {
        app.clone()
            .oneshot(form_request("en-hi", "Hello", Some(&cookie)))
            .await
            .unwrap();
    }
    assert_eq!(loader.loads(), 1);

    app.oneshot(form_request("en-hi", "Hello", None))
        .await
        .unwrap();
    assert_eq!(loader.loads(), 2);
}

#[tokio::test]
async fn test_index_sets_cookie_and_starts_loading() {
    let loader = PhrasebookLoader::new();
    let app = app(loader.clone());

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).starts_with("nmt_session="));

    let html = body_text(response).await;
    assert!(html.contains("<style>body { background: black; }</style>"));
    assert!(html.contains("Loading Translation Model...") || html.contains("<form"));
}

#[tokio::test]
async fn test_json_session_flow() {
    let loader = PhrasebookLoader::new();
    let app = app(loader.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/sessions/{}/translate", session_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"pair":"English to Hindi","text":"Hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["input"], "Hello");
    assert_eq!(record["output"], "नमस्ते");
    assert_eq!(record["pair"], "English to Hindi");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/sessions/{}/translate", session_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"pair":"en-hi","text":"  "}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], EMPTY_INPUT_MESSAGE);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{}/history", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history["translations"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let info = body_json(response).await;
    assert_eq!(info["model_status"], "ready");
    assert_eq!(info["history_len"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/sessions/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{}/history", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pairs_listing() {
    let app = app(PhrasebookLoader::new());

    let response = app
        .oneshot(Request::builder().uri("/api/pairs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    let labels: Vec<&str> = json["pairs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["label"].as_str().unwrap())
        .collect();
    assert_eq!(
        labels,
        vec![
            "English to Bangla",
            "English to Hindi",
            "Bangla to English",
            "Hindi to English"
        ]
    );
}

#[tokio::test]
async fn test_health_and_readiness() {
    let loader = PhrasebookLoader::new();
    let app = app(loader.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["checks"]["model"]["status"], "not_loaded");
    assert_eq!(json["checks"]["model"]["model_id"], "phrasebook");

    app.clone()
        .oneshot(form_request("en-hi", "Hello", None))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await["checks"]["model"]["status"], "loaded");
}

/// Each response shows the translation its own request produced
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_submissions_show_their_own_output() {
    let app = app(PhrasebookLoader::new());

    let first = app
        .clone()
        .oneshot(form_request("en-hi", "Hello", None))
        .await
        .unwrap();
    let cookie = session_cookie(&first);

    for _ in 0..10 {
        let (hello, other) = tokio::join!(
            app.clone()
                .oneshot(form_request("en-hi", "Hello", Some(&cookie))),
            app.clone()
                .oneshot(form_request("en-hi", "Good night", Some(&cookie))),
        );

        let hello = body_text(hello.unwrap()).await;
        let other = body_text(other.unwrap()).await;
        assert!(hello.contains(r#"<div class="output-bar">नमस्ते</div>"#));
        assert!(other.contains(r#"<div class="output-bar">?</div>"#));
    }
}
