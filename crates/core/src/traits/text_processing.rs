//! Translation capability traits

use crate::{Language, LoadProgress, ModelHandle, Result};

/// Tokenizer for a multilingual sequence-to-sequence model
///
/// Implementations:
/// - `M2m100Tokenizer` - SentencePiece + fairseq vocabulary
/// - `PassthroughTokenizer` - byte-level, for development without weights
pub trait TextTokenizer: Send + Sync + 'static {
    /// Encode `text` as model input for the given source language
    ///
    /// The source-language marker and end-of-sequence token are part of the
    /// returned ids.
    fn encode(&self, text: &str, src_lang: Language) -> Result<Vec<u32>>;

    /// Id of the language token used to force the first decoder output
    fn lang_token_id(&self, lang: Language) -> Result<u32>;

    /// Turn generated ids back into text
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;
}

/// Encoder-decoder model able to generate a target sequence
pub trait Seq2SeqModel: Send + Sync + 'static {
    /// Generate output ids for `input_ids`
    ///
    /// # Arguments
    /// * `input_ids` - Encoded source sentence
    /// * `forced_bos_token_id` - Token forced as the first generated output
    /// * `max_length` - Upper bound on the returned sequence length, decoder
    ///   start token included
    fn generate(
        &self,
        input_ids: &[u32],
        forced_bos_token_id: u32,
        max_length: usize,
    ) -> Result<Vec<u32>>;

    /// Get model name for logging
    fn name(&self) -> &str;
}

/// Produces a [`ModelHandle`], usually by reading weights from disk or a hub
///
/// Loading is blocking and may take tens of seconds. `progress` is called as
/// the loader moves through its stages.
pub trait ModelLoader: Send + Sync + 'static {
    fn load(&self, progress: &dyn Fn(LoadProgress)) -> Result<ModelHandle>;

    /// Identifier of the model being loaded (hub id or local path)
    fn model_id(&self) -> &str;
}
