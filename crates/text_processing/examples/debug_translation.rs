//! Debug translation to see what's happening
//!
//! Usage: cargo run -p nmt-text-processing --example debug_translation [model_dir]
//!
//! Without an argument the model is fetched from the Hugging Face hub.

use std::path::PathBuf;

use nmt_config::ModelSettings;
use nmt_core::LanguagePair;
use nmt_text_processing::{create_loader, escape_and_wrap, translate, DEFAULT_MAX_LENGTH};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Debug Translation Test ===\n");

    let settings = ModelSettings {
        local_path: std::env::args().nth(1).map(PathBuf::from),
        ..Default::default()
    };

    println!("Loading model...");
    let loader = create_loader(&settings);
    let handle = loader.load(&|p| println!("  [{:>3}%] {}", p.percent(), p.message()))?;
    println!("✓ Model loaded!\n");

    let samples = [
        (LanguagePair::EnglishToHindi, "Hello"),
        (LanguagePair::EnglishToBangla, "How are you?"),
        (LanguagePair::HindiToEnglish, "नमस्ते"),
        (LanguagePair::BanglaToEnglish, "আমি ভাত খাই"),
    ];

    for (pair, text) in samples {
        println!("--- {} ---", pair);
        let result = translate(&handle, text, pair.source(), pair.target(), DEFAULT_MAX_LENGTH)?;
        println!("'{}' → '{}'", text, result);
        println!("  html: {}\n", escape_and_wrap(&result, 100));
    }

    Ok(())
}
