//! Page rendering
//!
//! The translator page is plain server-side HTML. User and model text always
//! goes through `escape_and_wrap`; every other dynamic value through
//! `escape_html`.

use std::fmt::Write;

use nmt_config::UiConfig;
use nmt_core::{LanguagePair, LoadProgress, TranslationRecord};
use nmt_text_processing::{escape_and_wrap, escape_html};

use crate::state::AppState;

pub const SUBTITLE: &str = "Translate between English, Hindi, and Bengali";
pub const MODEL_READY_MESSAGE: &str = "Model loaded successfully!";

/// Seconds between refreshes of the loading view
const LOADING_REFRESH_SECS: u32 = 2;

/// Static inputs shared by every page
pub struct PageContext<'a> {
    pub ui: &'a UiConfig,
    pub stylesheet: &'a str,
}

impl<'a> PageContext<'a> {
    pub fn from_state(state: &'a AppState) -> Self {
        Self {
            ui: &state.config.ui,
            stylesheet: &state.stylesheet,
        }
    }
}

/// Status message shown above the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Warning(String),
    Error(String),
}

impl Notice {
    fn class(&self) -> &'static str {
        match self {
            Self::Success(_) => "notice notice-success",
            Self::Warning(_) => "notice notice-warning",
            Self::Error(_) => "notice notice-error",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Success(m) | Self::Warning(m) | Self::Error(m) => m,
        }
    }
}

/// Everything the translator view needs
#[derive(Debug, Default)]
pub struct TranslatorView<'a> {
    pub selected: LanguagePair,
    pub notices: Vec<Notice>,
    /// Result of the submission being answered, if any
    pub latest: Option<&'a TranslationRecord>,
    pub history: &'a [TranslationRecord],
}

/// Loading view with a progress bar; refreshes itself until the model is ready
pub fn render_loading(ctx: &PageContext<'_>, progress: LoadProgress) -> String {
    let head = format!(
        r#"<meta http-equiv="refresh" content="{}">"#,
        LOADING_REFRESH_SECS
    );
    let body = format!(
        r#"<div class="loading">
<h4 style="color:white; font-weight:bold;">Loading Translation Model...</h4>
<progress class="progress-bar" value="{percent}" max="100">{percent}%</progress>
<p class="loading-stage">{stage}</p>
</div>"#,
        percent = progress.percent(),
        stage = escape_html(progress.message()),
    );
    layout(ctx, &head, &body)
}

/// Fatal view for a session whose model could not be loaded
pub fn render_load_failed(ctx: &PageContext<'_>, message: &str) -> String {
    let body = format!(
        r#"<div class="{}">Failed to load the translation model: {}</div>
<p>Start a new session to try again.</p>"#,
        Notice::Error(String::new()).class(),
        escape_html(message),
    );
    layout(ctx, "", &body)
}

/// Title, form, latest output and history
pub fn render_translator(ctx: &PageContext<'_>, view: &TranslatorView<'_>) -> String {
    let width = ctx.ui.wrap_width;
    let mut body = String::new();

    for notice in &view.notices {
        let _ = writeln!(
            body,
            r#"<div class="{}">{}</div>"#,
            notice.class(),
            escape_html(notice.message())
        );
    }

    let _ = writeln!(
        body,
        r#"<div class="typing-title">{}</div>
<h3>{}</h3>"#,
        escape_html(&ctx.ui.page_title),
        SUBTITLE
    );

    body.push_str(&render_form(view.selected));

    if let Some(record) = view.latest {
        body.push_str(&render_latest(record, width, unique_id()));
    }

    body.push_str(&render_history(view.history, width));

    layout(ctx, "", &body)
}

fn render_form(selected: LanguagePair) -> String {
    let options: String = LanguagePair::all()
        .iter()
        .map(|pair| {
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                pair.slug(),
                if *pair == selected { " selected" } else { "" },
                pair.label()
            )
        })
        .collect();

    format!(
        r#"<form method="post" action="/translate" class="translation-form">
<label for="pair">Select Translation Direction</label>
<select id="pair" name="pair">{}</select>
<label for="text">Enter Text to Translate</label>
<textarea id="text" name="text" rows="6"></textarea>
<button type="submit">Submit</button>
</form>
"#,
        options
    )
}

/// Output block for the translation just completed
///
/// The checkmark animation name carries a per-render id so browsers replay it.
fn render_latest(record: &TranslationRecord, width: usize, unique_id: i64) -> String {
    format!(
        r#"<style>
@keyframes hideCheckmark_{id} {{
    0% {{ opacity: 1; }}
    100% {{ opacity: 0; }}
}}
</style>
<div class="translation-completed">
    <div class="checkmark" style="animation: hideCheckmark_{id} 1.5s forwards;">✓</div>
    <div class="output-content">
        <div class="output-label">Output:</div>
        <div class="output-bar">{output}</div>
    </div>
</div>
"#,
        id = unique_id,
        output = escape_and_wrap(record.output(), width),
    )
}

/// "Translation History", oldest first, numbered from 1
pub fn render_history(history: &[TranslationRecord], width: usize) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut out = String::from("<h3>Translation History</h3>\n");
    for (idx, record) in history.iter().enumerate() {
        let _ = write!(
            out,
            r#"<div class="translated-text">
    <strong>#{} {}</strong><br>
    <em>Input:</em> {}<br>
    <em>Output:</em> {}
</div>
"#,
            idx + 1,
            record.pair_label(),
            escape_and_wrap(record.input(), width),
            escape_and_wrap(record.output(), width),
        );
    }
    out
}

fn layout(ctx: &PageContext<'_>, head_extra: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
{head_extra}
<style>{css}</style>
</head>
<body>
<main class="container">
{body}
</main>
<div class="footer">{footer}</div>
</body>
</html>
"#,
        title = escape_html(&ctx.ui.page_title),
        head_extra = head_extra,
        css = ctx.stylesheet,
        body = body,
        footer = escape_html(&ctx.ui.footer),
    )
}

fn unique_id() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
