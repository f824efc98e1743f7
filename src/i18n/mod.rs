//! # Internationalization
//!
//! Keyed message lookup with a single fallback language.
//!
//! Translation files are JSON documents named after the language code
//! (`en.json`, `zh.json`, ...). Nested objects are flattened into dotted keys:
//!
//! ```json
//! { "errors": { "not_found": "%s was not found" } }
//! ```
//!
//! is looked up as `errors.not_found`.

mod translator;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub use translator::{format_template, Translator};

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
    Ja,
    Ko,
}

/// Language used when a key or a request carries no usable language
pub const DEFAULT_LANGUAGE: Language = Language::En;

impl Language {
    pub const ALL: [Language; 4] = [Language::En, Language::Zh, Language::Ja, Language::Ko];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
            Language::Ja => "ja",
            Language::Ko => "ko",
        }
    }

    /// Match a language tag by prefix (`zh-CN` → `Zh`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| tag.starts_with(lang.code()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported language: {s}"))
    }
}

/// First supported language of an `Accept-Language` value, if any.
///
/// Entries are taken in order; quality weights are ignored.
pub fn match_accept_language(header: &str) -> Option<Language> {
    header
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or_default())
        .find_map(Language::from_tag)
}

/// Parse an `Accept-Language` value, falling back to [`DEFAULT_LANGUAGE`].
pub fn parse_accept_language(header: &str) -> Language {
    match_accept_language(header).unwrap_or(DEFAULT_LANGUAGE)
}
