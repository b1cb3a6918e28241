//! Translation history records

use serde::{Deserialize, Serialize};

use crate::LanguagePair;

/// One successful submission: what was typed, what came back, and in which
/// direction. Records are never edited once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    input: String,
    output: String,
    pair: LanguagePair,
}

impl TranslationRecord {
    pub fn new(input: impl Into<String>, output: impl Into<String>, pair: LanguagePair) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            pair,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn pair(&self) -> LanguagePair {
        self.pair
    }

    pub fn pair_label(&self) -> &'static str {
        self.pair.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = TranslationRecord::new("Hello", "नमस्ते", LanguagePair::EnglishToHindi);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["input"], "Hello");
        assert_eq!(value["output"], "नमस्ते");
        assert_eq!(value["pair"], "English to Hindi");
        assert_eq!(record.pair_label(), "English to Hindi");
    }
}
