//! Core traits for the translation app
//!
//! The pretrained model is reached only through these seams, so the server
//! can run against the native M2M100 backend, the passthrough backend, or a
//! test double without code changes.

mod text_processing;

pub use text_processing::{ModelLoader, Seq2SeqModel, TextTokenizer};
