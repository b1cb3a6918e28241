//! Translation submission
//!
//! Validates the input, makes sure the session's model is loaded, runs the
//! translation off the async runtime and appends the result to the history.

use std::sync::Arc;
use std::time::Instant;

use nmt_core::{LanguagePair, TranslationRecord};
use nmt_text_processing::translate;

use crate::metrics::{record_translation, record_validation_rejection};
use crate::session::Session;
use crate::state::AppState;
use crate::ServerError;

/// Warning shown for blank submissions
pub const EMPTY_INPUT_MESSAGE: &str = "Please enter text to translate.";

/// Translate `text` for `session` and record it in the session history
///
/// Blank input is rejected before the model is touched and leaves the history
/// unchanged, as does any failure further down.
pub async fn submit_translation(
    state: &AppState,
    session: &Arc<Session>,
    pair: LanguagePair,
    text: &str,
) -> Result<TranslationRecord, ServerError> {
    session.touch();

    if text.trim().is_empty() {
        record_validation_rejection();
        tracing::debug!(session_id = %session.id, "Rejected blank translation input");
        return Err(ServerError::Validation(EMPTY_INPUT_MESSAGE.to_string()));
    }

    let start = Instant::now();
    let handle = match session.get_or_load_model(state.loader.clone()).await {
        Ok(handle) => handle,
        Err(e) => {
            record_translation(pair, "model_unavailable", start.elapsed());
            return Err(e);
        }
    };

    let max_length = state.config.model.max_length;
    let input = text.to_string();
    let joined = tokio::task::spawn_blocking(move || {
        translate(&handle, &input, pair.source(), pair.target(), max_length)
    })
    .await;

    let output = match joined {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            record_translation(pair, "failure", start.elapsed());
            tracing::warn!(session_id = %session.id, pair = %pair, error = %e, "Translation failed");
            return Err(ServerError::Translation(e.to_string()));
        }
        Err(e) => {
            record_translation(pair, "failure", start.elapsed());
            return Err(ServerError::Internal(format!("translation task failed: {}", e)));
        }
    };

    let record = TranslationRecord::new(text, output, pair);
    session.append_record(record.clone());

    record_translation(pair, "success", start.elapsed());
    tracing::info!(
        session_id = %session.id,
        pair = %pair,
        input_chars = text.chars().count(),
        output_chars = record.output().chars().count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Translation completed"
    );

    Ok(record)
}
