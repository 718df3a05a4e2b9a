//! Prompt assembly for the completion engines.
//!
//! The formatter flattens the active window into the chat-log layout the
//! base models complete naturally, and owns the stop pattern that detects
//! when a completion has drifted into writing the next turn itself.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use palaver_core::Turn;
use regex::Regex;

/// Line shapes that mean the model has moved past its own message: another
/// turn tag, a heading, list or fenced block, markup, or a TeX-style
/// command on a fresh line.
const STOP_SHAPES: &str = r"\n\[|\n.*\[.+\]<.*>|\n-+|\n#+|\n```|\n\\[A-Za-z]+\{|\n<|\n.*\\";

static STOP_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile_pattern(STOP_SHAPES));

fn compile_pattern(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(compile_err) => {
            tracing::error!(error = %compile_err, "Stop shapes failed to compile, truncation disabled");
            match Regex::new(r"$^") {
                Ok(fallback) => fallback,
                Err(fallback_err) => panic!("hardcoded fallback regex must compile: {fallback_err}"),
            }
        }
    }
}

/// Renders prompts of the form
///
/// ```text
/// <preamble>
/// [12:00]<alice>hi
/// [12:01]<Palaver>
/// ```
///
/// where the trailing unclosed tag invites the model to speak as the bot.
#[derive(Debug, Clone)]
pub struct PromptFormatter {
    preamble: String,
    speaker: String,
}

impl PromptFormatter {
    pub fn new(preamble: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
            speaker: speaker.into(),
        }
    }

    /// The name the bot speaks under, as it appears in turn tags.
    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    /// Pattern marking the start of fabricated follow-on content in a
    /// completion. Matched against the suffix produced after the prompt,
    /// never against the prompt itself.
    pub fn stop_pattern(&self) -> &Regex {
        &STOP_PATTERN
    }

    /// Flattens `window` into a prompt ending in an open tag for the bot,
    /// timestamped `now`.
    pub fn render(&self, window: &[Turn], now: DateTime<Utc>) -> String {
        let mut prompt = String::with_capacity(self.preamble.len() + window.len() * 48);
        prompt.push_str(&self.preamble);
        prompt.push('\n');
        for turn in window {
            prompt.push_str(&format!(
                "[{}]<{}>{}\n",
                time_tag(turn.created_at),
                turn.speaker,
                turn.text
            ));
        }
        prompt.push_str(&format!("[{}]<{}>", time_tag(now), self.speaker));
        prompt
    }

    /// Plain `speaker: text` rendering of a log, for history commands and
    /// transcripts rather than prompting.
    pub fn render_transcript(&self, turns: &[Turn]) -> String {
        let mut out = String::new();
        for turn in turns {
            out.push_str(&format!("{}: {}\n", turn.speaker, turn.text));
        }
        out
    }
}

fn time_tag(ts: DateTime<Utc>) -> String {
    ts.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, min, 0).unwrap()
    }

    fn formatter() -> PromptFormatter {
        PromptFormatter::new("Palaver hangs out in chatrooms.", "Palaver")
    }

    #[test]
    fn render_tags_every_turn_and_leaves_an_open_invitation() {
        let window = vec![
            Turn::at("alice", "hi", at(12, 0)),
            Turn::at("Palaver", "hey", at(12, 1)),
        ];
        let prompt = formatter().render(&window, at(12, 5));
        assert_eq!(
            prompt,
            "Palaver hangs out in chatrooms.\n\
             [12:00]<alice>hi\n\
             [12:01]<Palaver>hey\n\
             [12:05]<Palaver>"
        );
    }

    #[test]
    fn render_with_empty_window_is_preamble_and_invitation() {
        let prompt = formatter().render(&[], at(9, 30));
        assert_eq!(prompt, "Palaver hangs out in chatrooms.\n[09:30]<Palaver>");
    }

    #[test]
    fn stop_pattern_catches_a_fabricated_next_turn() {
        let f = formatter();
        let suffix = "Hello there\n[12:00]<Other>gotcha";
        let m = f.stop_pattern().find(suffix).expect("turn tag should match");
        assert_eq!(&suffix[..m.start()], "Hello there");
    }

    #[test]
    fn stop_pattern_catches_structural_drift() {
        let f = formatter();
        let stop = f.stop_pattern();
        for suffix in [
            "sure\n- first\n- second",
            "look:\n# Heading",
            "here\n```rust",
            "done\n\\begin{itemize}",
            "yes\n<div>",
            "see\nfoo [09:12]<alice> said so",
            "odd\nuse \\textbf here",
        ] {
            assert!(stop.is_match(suffix), "expected a match in {suffix:?}");
        }
    }

    #[test]
    fn stop_pattern_leaves_ordinary_chat_alone() {
        let f = formatter();
        let stop = f.stop_pattern();
        for suffix in [
            "Hello there",
            "it was 5 - 3 in the end",
            "i [think] so",
            "two plain lines\nof ordinary text",
        ] {
            assert!(!stop.is_match(suffix), "unexpected match in {suffix:?}");
        }
    }

    #[test]
    fn transcript_rendering_is_plain_lines() {
        let turns = vec![
            Turn::at("alice", "one", at(8, 0)),
            Turn::at("Palaver", "two", at(8, 1)),
        ];
        assert_eq!(
            formatter().render_transcript(&turns),
            "alice: one\nPalaver: two\n"
        );
    }
}
