//! Passthrough backend
//!
//! Byte-level tokenizer plus an echo model. The whole translate pipeline runs
//! (encode, forced language token, length cap, decode) without any weights, so
//! the server can be exercised on machines without the pretrained model.

use std::sync::Arc;

use nmt_core::{
    Error, Language, LoadProgress, ModelHandle, ModelLoader, Result, Seq2SeqModel, TextTokenizer,
};

const BOS_TOKEN_ID: u32 = 0;
const PAD_TOKEN_ID: u32 = 1;
const EOS_TOKEN_ID: u32 = 2;
const UNK_TOKEN_ID: u32 = 3;
/// Byte `b` is token `b + BYTE_OFFSET`
const BYTE_OFFSET: u32 = 16;

fn lang_id(lang: Language) -> u32 {
    match lang {
        Language::English => 4,
        Language::Hindi => 5,
        Language::Bengali => 6,
    }
}

fn is_lang_id(id: u32) -> bool {
    Language::all().iter().any(|&l| lang_id(l) == id)
}

/// Byte-level tokenizer
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTokenizer;

impl TextTokenizer for PassthroughTokenizer {
    fn encode(&self, text: &str, src_lang: Language) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(text.len() + 2);
        ids.push(lang_id(src_lang));
        ids.extend(text.bytes().map(|b| b as u32 + BYTE_OFFSET));
        ids.push(EOS_TOKEN_ID);
        Ok(ids)
    }

    fn lang_token_id(&self, lang: Language) -> Result<u32> {
        Ok(lang_id(lang))
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let mut bytes = Vec::with_capacity(ids.len());
        for &id in ids {
            if id >= BYTE_OFFSET {
                let byte = u8::try_from(id - BYTE_OFFSET)
                    .map_err(|_| Error::Tokenization(format!("token id {} out of range", id)))?;
                bytes.push(byte);
            } else if !skip_special_tokens {
                let token = match id {
                    BOS_TOKEN_ID => "<s>",
                    PAD_TOKEN_ID => "<pad>",
                    EOS_TOKEN_ID => "</s>",
                    UNK_TOKEN_ID => "<unk>",
                    4 => "__en__",
                    5 => "__hi__",
                    6 => "__bn__",
                    _ => "<unk>",
                };
                bytes.extend_from_slice(token.as_bytes());
            }
        }
        // Truncation at max_length can split a multi-byte character
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }
}

/// Echoes the source tokens after the forced language token
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughModel;

impl Seq2SeqModel for PassthroughModel {
    fn generate(
        &self,
        input_ids: &[u32],
        forced_bos_token_id: u32,
        max_length: usize,
    ) -> Result<Vec<u32>> {
        if input_ids.is_empty() {
            return Err(Error::Generation("empty input sequence".to_string()));
        }

        let content = input_ids
            .iter()
            .copied()
            .filter(|&id| !is_lang_id(id) && id != EOS_TOKEN_ID);

        let mut output: Vec<u32> = [EOS_TOKEN_ID, forced_bos_token_id]
            .into_iter()
            .chain(content)
            .chain(std::iter::once(EOS_TOKEN_ID))
            .collect();
        output.truncate(max_length);
        Ok(output)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Loader for the passthrough backend; loading is instant
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughLoader;

impl PassthroughLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for PassthroughLoader {
    fn load(&self, progress: &dyn Fn(LoadProgress)) -> Result<ModelHandle> {
        progress(LoadProgress::Starting);
        progress(LoadProgress::LoadingTokenizer);
        progress(LoadProgress::LoadingWeights);
        progress(LoadProgress::Ready);
        tracing::debug!("Passthrough model ready");
        Ok(ModelHandle::new(
            Arc::new(PassthroughModel),
            Arc::new(PassthroughTokenizer),
        ))
    }

    fn model_id(&self) -> &str {
        "passthrough"
    }
}
