//! Decoding task of a model family.
//!
//! Determined once when a model is loaded, then passed explicitly through
//! the pipeline.

use serde::{Deserialize, Serialize};

/// Model families with an encoder-decoder architecture.
///
/// Matched against the lowercased segments of a model identifier.
pub const ENCODER_DECODER_FAMILIES: &[&str] = &[
    "t5",
    "mt5",
    "umt5",
    "longt5",
    "bart",
    "mbart",
    "pegasus",
    "bigbirdpegasus",
    "marian",
    "led",
    "prophetnet",
    "fsmt",
    "blenderbot",
    "switchtransformers",
];

/// How the model output sequence relates to the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Encoder-decoder: the output is an independent sequence, decoded whole.
    Seq2Seq,
    /// Decoder-only: the output continues the prompt; only the suffix after
    /// the prompt tokens is decoded.
    Causal,
}

impl Task {
    /// Classify from a model identifier such as `google/flan-t5-base`.
    ///
    /// Only the last path segment is inspected, split on non-alphanumerics.
    pub fn from_model_id(model_id: &str) -> Self {
        let name = model_id.rsplit('/').next().unwrap_or(model_id).to_lowercase();
        let is_seq2seq = name
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|segment| ENCODER_DECODER_FAMILIES.contains(&segment));
        if is_seq2seq {
            Task::Seq2Seq
        } else {
            Task::Causal
        }
    }

    /// Get the name of this task.
    pub fn name(&self) -> &'static str {
        match self {
            Task::Seq2Seq => "seq2seq",
            Task::Causal => "causal",
        }
    }
}
