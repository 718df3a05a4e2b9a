//! Blocklist filter — screens generated text before it becomes a turn.
//!
//! The term list ships rot13-encoded so that neither the repository nor the
//! built binary contains the plain terms; the decode step is pure
//! initialization. All terms are folded into a single case-insensitive
//! alternation, so a match costs one pass over the text regardless of how
//! many terms are configured.
//!
//! Matching is deliberately substring-based rather than word-boundary-based:
//! it catches terms smuggled inside concatenations, at the price of false
//! positives on innocuous superstrings.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// The built-in encoded wordlist. Kept short and mild; deployments add
/// their own via `[safety] extra_wordlist`.
const BUILTIN_WORDLIST: &str = include_str!("../assets/blocklist-encoded.txt");

static BUILTIN: LazyLock<ContentFilter> = LazyLock::new(|| {
    ContentFilter::from_encoded_lines(BUILTIN_WORDLIST.lines()).unwrap_or_else(|e| {
        tracing::error!("Built-in blocklist failed to compile: {e}; filter is inert");
        ContentFilter::empty()
    })
});

/// Errors raised while building a filter.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Failed to read wordlist at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to compile blocklist pattern: {0}")]
    InvalidPattern(String),
}

/// Decode a rot13-obfuscated string. Letters rotate 13 places; everything
/// else passes through.
pub fn decode_rot13(encoded: &str) -> String {
    encoded
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a' + 13) % 26) + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A' + 13) % 26) + b'A') as char,
            other => other,
        })
        .collect()
}

/// A compiled content filter.
///
/// Immutable once built; the process-wide instance is compiled exactly once
/// at first use (see [`global`]).
#[derive(Debug, Clone)]
pub struct ContentFilter {
    pattern: Option<Regex>,
    term_count: usize,
}

impl ContentFilter {
    /// A filter that matches nothing.
    pub fn empty() -> Self {
        Self {
            pattern: None,
            term_count: 0,
        }
    }

    /// Build from plain (already decoded) terms.
    pub fn from_terms<I, S>(terms: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let escaped: Vec<String> = terms
            .into_iter()
            .map(|t| regex::escape(&t.as_ref().to_lowercase()))
            .filter(|t| !t.is_empty())
            .collect();

        if escaped.is_empty() {
            return Ok(Self::empty());
        }

        let pattern = format!("(?i){}", escaped.join("|"));
        let compiled =
            Regex::new(&pattern).map_err(|e| FilterError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            pattern: Some(compiled),
            term_count: escaped.len(),
        })
    }

    /// Build from rot13-encoded lines, skipping blanks.
    pub fn from_encoded_lines<'a, I>(lines: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let terms: Vec<String> = lines
            .into_iter()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(decode_rot13)
            .collect();
        Self::from_terms(terms)
    }

    /// Build the startup filter: built-in terms plus an optional
    /// supplemental encoded wordlist file.
    pub fn load(extra_wordlist: Option<&Path>) -> Result<Self, FilterError> {
        let mut encoded: Vec<&str> = BUILTIN_WORDLIST.lines().collect();

        let extra_content;
        if let Some(path) = extra_wordlist {
            extra_content =
                std::fs::read_to_string(path).map_err(|e| FilterError::ReadError {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            encoded.extend(extra_content.lines());
        }

        let filter = Self::from_encoded_lines(encoded)?;
        tracing::info!(terms = filter.term_count(), "Content filter compiled");
        Ok(filter)
    }

    /// Whether `text` contains any blocked term, case-insensitively, as a
    /// substring.
    pub fn matches(&self, text: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_match(text),
            None => false,
        }
    }

    /// How many terms are compiled into this filter.
    pub fn term_count(&self) -> usize {
        self.term_count
    }
}

/// The process-wide filter built from the embedded wordlist.
pub fn global() -> &'static ContentFilter {
    &BUILTIN
}
