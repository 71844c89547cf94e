//! # tip-core
//!
//! Core types for the tip generation pipeline.
//!
//! A tip is one short advisory sentence produced by a language model. The
//! pipeline that produces it is:
//!
//! ```text
//! prompt synthesis -> generation -> sanitization -> quality gate -> (selection)
//! ```
//!
//! This crate holds what every stage shares:
//!
//! | Module | Contents |
//! |--------|----------|
//! | `params` | [`SamplingParameters`] |
//! | `task` | [`Task`] (seq2seq vs causal decoding) |
//! | `types` | [`PromptSpec`], [`GenerationResult`], [`AcceptanceVerdict`], [`GenerationMode`] |
//! | `backend` | [`Tokenizer`], [`LanguageModel`], [`ModelLoader`], [`Generator`] |
//! | `error` | [`ModelLoadError`], [`GenerationError`], [`PromptError`], [`TipError`] |
//!
//! No I/O happens here.

pub mod backend;
pub mod error;
pub mod params;
pub mod task;
pub mod types;

pub use backend::{Generator, LanguageModel, LoadedModel, ModelLoader, Tokenizer};
pub use error::{GenerationError, ModelLoadError, PromptError, TipError};
pub use params::SamplingParameters;
pub use task::Task;
pub use types::{
    AcceptanceVerdict, GenerationMode, GenerationResult, PromptSpec, RejectReason,
    CANDIDATES_COUNT_DEFAULT, TOPIC_PLACEHOLDER,
};
