//! Turn and exchange domain types.
//!
//! These are the core value objects that flow through the entire system:
//! a participant speaks → the buffer records a Turn → the formatter renders
//! the window → the engine continues it with a Turn of our own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a logical exchange (one chat, one buffer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Build the conventional `{namespace}_{name}` id, e.g. a guild id plus
    /// a channel name.
    pub fn scoped(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}_{name}"))
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single contribution to an exchange by one speaker.
///
/// Immutable once constructed: edits (the "gaslight" command) replace the
/// whole Turn at its logical index rather than mutating fields in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke
    pub speaker: String,

    /// The text content
    pub text: String,

    /// When the turn was created
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a turn stamped with the current time.
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a turn with an explicit timestamp.
    pub fn at(
        speaker: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            created_at,
        }
    }

    /// Whether this turn was spoken by `speaker` (exact match).
    pub fn is_by(&self, speaker: &str) -> bool {
        self.speaker == speaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_turn() {
        let turn = Turn::new("alice", "Hello, bot!");
        assert_eq!(turn.speaker, "alice");
        assert_eq!(turn.text, "Hello, bot!");
        assert!(turn.is_by("alice"));
        assert!(!turn.is_by("bob"));
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::new("alice", "Test turn");
        let json = serde_json::to_string(&turn).unwrap();
        let deserialized: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, turn);
    }

    #[test]
    fn scoped_exchange_id() {
        let id = ExchangeId::scoped("80351110224678912", "general");
        assert_eq!(id.to_string(), "80351110224678912_general");
    }
}
