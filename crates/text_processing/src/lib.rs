//! Text processing for the translation app
//!
//! This crate provides:
//! - **Translation**: the request handler that drives a loaded model, plus the
//!   model backends (native M2M100 via Candle, byte-level passthrough)
//! - **Display**: HTML escaping and fixed-width wrapping of user and model text
//!
//! # Example
//!
//! ```ignore
//! use nmt_text_processing::translation::{create_loader, translate, DEFAULT_MAX_LENGTH};
//! use nmt_core::LanguagePair;
//!
//! let loader = create_loader(&settings.model);
//! let handle = loader.load(&|_| {})?;
//! let pair = LanguagePair::EnglishToHindi;
//! let output = translate(&handle, "Hello", pair.source(), pair.target(), DEFAULT_MAX_LENGTH)?;
//! ```

pub mod display;
pub mod translation;

pub use display::{escape_and_wrap, escape_html, wrap, DEFAULT_WRAP_WIDTH};
pub use translation::{create_loader, translate, DEFAULT_MAX_LENGTH};
