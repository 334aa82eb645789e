//! Supported language codes.
//!
//! The service accepts FLORES-200 style codes (`<iso639-3>_<script>`). Only
//! the five below are wired through the translation models, so the set is
//! closed: anything else is rejected at parse time rather than at the API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "eng_Latn")]
    English,
    #[serde(rename = "kan_Knda")]
    Kannada,
    #[serde(rename = "hin_Deva")]
    Hindi,
    #[serde(rename = "tam_Taml")]
    Tamil,
    #[serde(rename = "tel_Telu")]
    Telugu,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::English,
        Language::Kannada,
        Language::Hindi,
        Language::Tamil,
        Language::Telugu,
    ];

    /// Wire code sent in form fields.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "eng_Latn",
            Language::Kannada => "kan_Knda",
            Language::Hindi => "hin_Deva",
            Language::Tamil => "tam_Taml",
            Language::Telugu => "tel_Telu",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Kannada => "Kannada",
            Language::Hindi => "Hindi",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Unknown language code or label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language '{0}' (expected one of eng_Latn, kan_Knda, hin_Deva, tam_Taml, tel_Telu)")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Accepts either the wire code or the English label, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Language::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(needle) || l.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}
