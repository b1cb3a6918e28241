//! Core traits and types for the translation app
//!
//! This crate provides foundational types used across all other crates:
//! - Language and translation-direction definitions
//! - History records
//! - Capability traits for the pretrained model (tokenizer, generator, loader)
//! - Error types

pub mod error;
pub mod language;
pub mod model;
pub mod record;
pub mod traits;

pub use error::{Error, Result};
pub use language::{Language, LanguagePair};
pub use model::{LoadProgress, ModelHandle};
pub use record::TranslationRecord;
pub use traits::{ModelLoader, Seq2SeqModel, TextTokenizer};
