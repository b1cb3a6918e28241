//! Language definitions
//!
//! The translator works between English and two Indian languages, Hindi and
//! Bengali. Translation directions are fixed by [`LanguagePair`]; only the four
//! English-pivoted directions are offered.

use serde::{Deserialize, Serialize};

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Hindi,
    Bengali,
}

impl Language {
    /// Get ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Hindi => "hi",
            Self::Bengali => "bn",
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::Bengali => "Bengali",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "en" | "eng" | "english" => Some(Self::English),
            "hi" | "hin" | "hindi" => Some(Self::Hindi),
            "bn" | "ben" | "bengali" | "bangla" => Some(Self::Bengali),
            _ => None,
        }
    }

    /// Get all supported languages
    pub fn all() -> &'static [Language] {
        &[Self::English, Self::Hindi, Self::Bengali]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Translation direction offered in the selector
///
/// Serialized as its display label ("English to Hindi"), which is also what
/// history records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LanguagePair {
    #[default]
    #[serde(rename = "English to Bangla", alias = "en-bn")]
    EnglishToBangla,
    #[serde(rename = "English to Hindi", alias = "en-hi")]
    EnglishToHindi,
    #[serde(rename = "Bangla to English", alias = "bn-en")]
    BanglaToEnglish,
    #[serde(rename = "Hindi to English", alias = "hi-en")]
    HindiToEnglish,
}

impl LanguagePair {
    /// All pairs in selector order
    pub fn all() -> &'static [LanguagePair] {
        &[
            Self::EnglishToBangla,
            Self::EnglishToHindi,
            Self::BanglaToEnglish,
            Self::HindiToEnglish,
        ]
    }

    /// Label shown in the selector and stored on history records
    pub fn label(&self) -> &'static str {
        match self {
            Self::EnglishToBangla => "English to Bangla",
            Self::EnglishToHindi => "English to Hindi",
            Self::BanglaToEnglish => "Bangla to English",
            Self::HindiToEnglish => "Hindi to English",
        }
    }

    /// Short form used in URLs and form values (`en-hi`)
    pub fn slug(&self) -> &'static str {
        match self {
            Self::EnglishToBangla => "en-bn",
            Self::EnglishToHindi => "en-hi",
            Self::BanglaToEnglish => "bn-en",
            Self::HindiToEnglish => "hi-en",
        }
    }

    pub fn source(&self) -> Language {
        match self {
            Self::EnglishToBangla | Self::EnglishToHindi => Language::English,
            Self::BanglaToEnglish => Language::Bengali,
            Self::HindiToEnglish => Language::Hindi,
        }
    }

    pub fn target(&self) -> Language {
        match self {
            Self::EnglishToBangla => Language::Bengali,
            Self::EnglishToHindi => Language::Hindi,
            Self::BanglaToEnglish | Self::HindiToEnglish => Language::English,
        }
    }

    /// Parse a label or a slug
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::all()
            .iter()
            .copied()
            .find(|pair| pair.label().eq_ignore_ascii_case(s) || pair.slug().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
