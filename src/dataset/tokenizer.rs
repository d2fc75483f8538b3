//! Document tokenization.
//!
//! Two modes are supported: lowercased alphabetic words for free-text notes,
//! and untouched whitespace-separated identifiers for notes that were already
//! converted to concept ids.

use serde::{Deserialize, Serialize};

/// How a document is split into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenMode {
    /// Lowercase, split on whitespace, keep purely alphabetic tokens.
    #[default]
    NormalizedWords,
    /// Split on whitespace only; no case folding, no filtering.
    RawIdentifiers,
}

/// Splits documents into tokens and rejects over-length documents.
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    mode: TokenMode,
    max_tokens: usize,
}

impl Tokenizer {
    pub fn new(mode: TokenMode, max_tokens: usize) -> Self {
        Tokenizer { mode, max_tokens }
    }

    pub fn mode(&self) -> TokenMode {
        self.mode
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Tokenize a document.
    ///
    /// Returns `None` when the document has more than `max_tokens` tokens
    /// after filtering. Numeric and mixed tokens are dropped in
    /// [`TokenMode::NormalizedWords`] mode.
    pub fn tokenize(&self, text: &str) -> Option<Vec<String>> {
        let tokens: Vec<String> = match self.mode {
            TokenMode::NormalizedWords => text
                .to_lowercase()
                .split_whitespace()
                .filter(|token| token.chars().all(is_letter))
                .map(str::to_string)
                .collect(),
            TokenMode::RawIdentifiers => text.split_whitespace().map(str::to_string).collect(),
        };

        if tokens.len() > self.max_tokens {
            return None;
        }
        Some(tokens)
    }
}

/// Letter test for [`TokenMode::NormalizedWords`].
///
/// Letter numbers such as `Ⅻ` are alphabetic in Unicode but not letters, so
/// they are excluded. Combining marks with the `Other_Alphabetic` property
/// (Indic vowel signs, for instance) are still accepted.
fn is_letter(c: char) -> bool {
    c.is_alphabetic() && !c.is_numeric()
}
