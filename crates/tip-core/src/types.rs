//! Per-request data passed between pipeline stages.
//!
//! Everything here is created fresh for one tip request and dropped once the
//! final tip string is produced.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the topic in every prompt template.
pub const TOPIC_PLACEHOLDER: &str = "{topic}";

/// One randomized prompt draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptSpec {
    /// Template containing exactly one [`TOPIC_PLACEHOLDER`]
    pub template: String,
    /// Topic substituted into the template
    pub topic: String,
    /// Anti-repetition disambiguator, carries no meaning
    pub nonce: u32,
}

impl PromptSpec {
    /// Render as `"Instruction {nonce}: <template with topic>"`.
    pub fn render(&self) -> String {
        format!(
            "Instruction {}: {}",
            self.nonce,
            self.template.replacen(TOPIC_PLACEHOLDER, &self.topic, 1)
        )
    }
}

/// Raw decoded model output.
///
/// For seq2seq models this is the full decoded sequence; for causal models
/// it is the continuation only, never including the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub raw_text: String,
}

impl GenerationResult {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
        }
    }
}

impl From<String> for GenerationResult {
    fn from(raw_text: String) -> Self {
        Self { raw_text }
    }
}

/// Why the quality gate rejected a sanitized tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Fewer words than the configured minimum
    TooShort,
    /// Contains a phrase from the meta-instruction denylist
    LeakedInstruction,
}

/// Quality gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl AcceptanceVerdict {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptanceVerdict::Accepted)
    }

    /// Rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            AcceptanceVerdict::Accepted => None,
            AcceptanceVerdict::Rejected(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for AcceptanceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptanceVerdict::Accepted => write!(f, "ACCEPTED"),
            AcceptanceVerdict::Rejected(RejectReason::TooShort) => {
                write!(f, "REJECTED(TOO_SHORT)")
            }
            AcceptanceVerdict::Rejected(RejectReason::LeakedInstruction) => {
                write!(f, "REJECTED(LEAKED_INSTRUCTION)")
            }
        }
    }
}

/// Default number of candidates drawn in multi-candidate mode.
pub const CANDIDATES_COUNT_DEFAULT: u32 = 3;

/// How many independent tips are generated per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationMode {
    /// One tip, with at most one quality retry
    Single,
    /// `count` independent tips, deduplicated, one selected deterministically
    MultiCandidate { count: u32 },
}

impl Default for GenerationMode {
    fn default() -> Self {
        GenerationMode::Single
    }
}

impl GenerationMode {
    /// Multi-candidate mode with the default candidate count.
    #[must_use]
    pub fn multi() -> Self {
        GenerationMode::MultiCandidate {
            count: CANDIDATES_COUNT_DEFAULT,
        }
    }

    /// Number of independent tips this mode draws.
    #[must_use]
    pub fn candidates_count(&self) -> u32 {
        match self {
            GenerationMode::Single => 1,
            GenerationMode::MultiCandidate { count } => *count,
        }
    }
}
