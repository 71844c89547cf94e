//! Structural quality gate.
//!
//! Accepts or rejects sanitized text on shape alone: enough words, and no
//! leaked instruction text. Says nothing about whether a tip is true.

use tip_core::{AcceptanceVerdict, RejectReason};

/// Minimum whitespace-delimited words for acceptance.
pub const WORDS_MIN: usize = 4;

/// Phrases that only appear when the model echoed its instructions.
/// Matched case-insensitively as substrings.
pub const LEAKED_INSTRUCTION_DENYLIST: &[&str] = &[
    "you are a concise",
    "you are a professional",
    "write exactly one",
    "keep it under",
    "do not mention",
    "respond with one",
    "answer:",
    "### system",
    "### user",
    "### assistant",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityGate {
    words_min: usize,
    denylist: Vec<String>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(WORDS_MIN)
    }
}

impl QualityGate {
    /// Gate with the default denylist.
    pub fn new(words_min: usize) -> Self {
        Self {
            words_min,
            denylist: LEAKED_INSTRUCTION_DENYLIST
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Add a denylisted phrase.
    #[must_use]
    pub fn with_denied_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.denylist.push(phrase.into().to_lowercase());
        self
    }

    /// Word count is checked before leakage.
    pub fn evaluate(&self, sanitized: &str) -> AcceptanceVerdict {
        if sanitized.split_whitespace().count() < self.words_min {
            return AcceptanceVerdict::Rejected(RejectReason::TooShort);
        }

        let lowered = sanitized.to_lowercase();
        if self
            .denylist
            .iter()
            .any(|phrase| lowered.contains(phrase.as_str()))
        {
            return AcceptanceVerdict::Rejected(RejectReason::LeakedInstruction);
        }

        AcceptanceVerdict::Accepted
    }
}

/// Evaluate with the default gate.
pub fn evaluate(sanitized: &str) -> AcceptanceVerdict {
    QualityGate::default().evaluate(sanitized)
}
