//! Translation request handling
//!
//! [`translate`] drives a loaded [`ModelHandle`] through the fixed sequence:
//! encode with the source-language marker, look up the target language token,
//! generate with that token forced first, decode with special tokens removed.
//!
//! Backends:
//! - `m2m100`: facebook/m2m100_418M via Candle (feature `candle`, default)
//! - `passthrough`: byte-level echo, no weights

mod m2m100;
mod passthrough;

#[cfg(feature = "candle")]
pub use m2m100::{
    M2m100Config, M2m100Loader, M2m100Model, M2m100Tokenizer, M2m100Vocab, ModelSource,
};
pub use passthrough::{PassthroughLoader, PassthroughModel, PassthroughTokenizer};

use std::sync::Arc;

use nmt_config::{ModelProvider, ModelSettings};
use nmt_core::{Language, ModelHandle, ModelLoader, Result};

/// Generation length cap, decoder start token included
pub const DEFAULT_MAX_LENGTH: usize = 70;

/// Translate `text` from `src` to `tgt` with a loaded model
///
/// Blank input is not rejected here; callers validate before loading.
pub fn translate(
    handle: &ModelHandle,
    text: &str,
    src: Language,
    tgt: Language,
    max_length: usize,
) -> Result<String> {
    let span = tracing::debug_span!("translate", model = handle.model.name(), %src, %tgt);
    let _guard = span.enter();

    let input_ids = handle.tokenizer.encode(text, src)?;
    let forced_bos_token_id = handle.tokenizer.lang_token_id(tgt)?;
    let output_ids = handle
        .model
        .generate(&input_ids, forced_bos_token_id, max_length)?;
    let translation = handle.tokenizer.decode(&output_ids, true)?;

    tracing::debug!(
        input_tokens = input_ids.len(),
        output_tokens = output_ids.len(),
        "Translation generated"
    );

    Ok(translation)
}

/// Create the model loader selected by settings
pub fn create_loader(settings: &ModelSettings) -> Arc<dyn ModelLoader> {
    match settings.provider {
        ModelProvider::M2m100 => create_m2m100_loader(settings),
        ModelProvider::Passthrough => {
            tracing::info!("Using passthrough translation model");
            Arc::new(PassthroughLoader::new())
        }
    }
}

#[cfg(feature = "candle")]
fn create_m2m100_loader(settings: &ModelSettings) -> Arc<dyn ModelLoader> {
    let loader = M2m100Loader::from_settings(settings);
    tracing::info!(model = loader.model_id(), "Using Candle M2M100 model");
    Arc::new(loader)
}

#[cfg(not(feature = "candle"))]
fn create_m2m100_loader(_settings: &ModelSettings) -> Arc<dyn ModelLoader> {
    tracing::warn!("Candle feature not enabled - translation will pass through");
    Arc::new(PassthroughLoader::new())
}
