//! # tip-generator
//!
//! Produces one short, presentable tip sentence from a language model.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Prompt    │ ──> │  Generator  │ ──> │  Sanitizer  │
//! │ Synthesizer │     │   Adapter   │     │  (9 rules)  │
//! └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                │
//!                     ┌──────────────────────────┘
//!                     ▼
//!              ┌─────────────┐  (rejected, once)  ┌─────────────┐
//!              │   Quality   │ ─────────────────> │  Fallback   │
//!              │    Gate     │                    │   Prompt    │
//!              └──────┬──────┘                    └─────────────┘
//!                     │
//!                     ▼ (multi-candidate)
//!              ┌─────────────┐
//!              │  Candidate  │
//!              │  Selector   │
//!              └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Against a llama.cpp-style server
//! cargo run -p tip-generator --bin tip-generate -- --server http://127.0.0.1:8080
//!
//! # Offline, reproducible
//! cargo run -p tip-generator --bin tip-generate -- --simulate --seed 42 --multi 3
//! ```

pub mod client;
pub mod config;
pub mod generator;
pub mod pipeline;
pub mod prompt;
pub mod quality;
pub mod sanitize;
pub mod select;

pub use client::{RemoteLoader, RemoteModel};
pub use config::{ConfigError, TipConfig};
pub use generator::{generate_text, ModelGenerator, SharedModel};
pub use pipeline::{AttemptRecord, TipPipeline, TipReport};
pub use prompt::{PromptStyle, PromptSynthesizer, FALLBACK_PROMPT};
pub use quality::{QualityGate, LEAKED_INSTRUCTION_DENYLIST, WORDS_MIN};
pub use sanitize::{sanitize, Sanitizer, LABEL_LEN_MAX};
pub use select::select;

pub use tip_core::{
    AcceptanceVerdict, GenerationError, GenerationMode, Generator, ModelLoadError,
    SamplingParameters, Task, TipError,
};
