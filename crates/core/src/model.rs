//! Loaded model handles and load progress

use std::sync::Arc;

use crate::traits::{Seq2SeqModel, TextTokenizer};

/// A loaded model together with its tokenizer
///
/// Both halves are reference counted, so handing a handle to a request is a
/// pointer copy.
#[derive(Clone)]
pub struct ModelHandle {
    pub model: Arc<dyn Seq2SeqModel>,
    pub tokenizer: Arc<dyn TextTokenizer>,
}

impl ModelHandle {
    pub fn new(model: Arc<dyn Seq2SeqModel>, tokenizer: Arc<dyn TextTokenizer>) -> Self {
        Self { model, tokenizer }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.model.name())
            .finish()
    }
}

/// Stage reached by a [`crate::ModelLoader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadProgress {
    #[default]
    Starting,
    FetchingFiles,
    LoadingTokenizer,
    LoadingWeights,
    Ready,
}

impl LoadProgress {
    /// Rough completion for the progress bar
    pub fn percent(&self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::FetchingFiles => 10,
            Self::LoadingTokenizer => 40,
            Self::LoadingWeights => 55,
            Self::Ready => 100,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Starting => "Preparing model",
            Self::FetchingFiles => "Fetching model files",
            Self::LoadingTokenizer => "Loading tokenizer",
            Self::LoadingWeights => "Loading model weights",
            Self::Ready => "Model ready",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let stages = [
            LoadProgress::Starting,
            LoadProgress::FetchingFiles,
            LoadProgress::LoadingTokenizer,
            LoadProgress::LoadingWeights,
            LoadProgress::Ready,
        ];
        assert!(stages.windows(2).all(|w| w[0].percent() < w[1].percent()));
        assert_eq!(LoadProgress::Ready.percent(), 100);
    }
}
