//! Pipeline configuration.
//!
//! Loaded from a JSON file, then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TIP_SERVER_URL` | `server_url` |
//! | `TIP_MODEL` | `model_id` |
//! | `TIP_SEED` | `seed` |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tip_core::{GenerationMode, SamplingParameters, Task};

use crate::prompt::PromptStyle;
use crate::quality::WORDS_MIN;
use crate::sanitize::LABEL_LEN_MAX;

pub const SERVER_URL_ENV_VAR: &str = "TIP_SERVER_URL";
pub const MODEL_ENV_VAR: &str = "TIP_MODEL";
pub const SEED_ENV_VAR: &str = tip_sim::SEED_ENV_VAR;

/// Upper bound on candidates per request.
pub const CANDIDATES_COUNT_MAX: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for one [`TipPipeline`](crate::TipPipeline) and its backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TipConfig {
    /// Base URL of the inference server
    pub server_url: String,
    /// Model identifier resolved by the loader
    pub model_id: String,
    /// Force the decoding task instead of inferring it from `model_id`
    pub task: Option<Task>,
    /// Per-request timeout for the remote backend
    pub request_timeout_ms: u64,
    /// Sampling parameters used for every generation call
    pub sampling: SamplingParameters,
    /// Single tip or multi-candidate selection
    pub mode: GenerationMode,
    /// Prompt framing
    pub prompt_style: PromptStyle,
    /// Longest `label:` prefix the sanitizer drops
    pub label_len_max: usize,
    /// Fewest words the quality gate accepts
    pub words_min: usize,
    /// Seed for prompt synthesis; random when unset
    pub seed: Option<u64>,
}

impl Default for TipConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            model_id: "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string(),
            task: None,
            request_timeout_ms: 30_000,
            sampling: SamplingParameters::default(),
            mode: GenerationMode::Single,
            prompt_style: PromptStyle::Plain,
            label_len_max: LABEL_LEN_MAX,
            words_min: WORDS_MIN,
            seed: None,
        }
    }
}

impl TipConfig {
    /// Fast single-tip config.
    pub fn quick() -> Self {
        Self {
            request_timeout_ms: 10_000,
            sampling: SamplingParameters::concise(),
            ..Default::default()
        }
    }

    /// Multi-candidate config for better tips at a higher cost.
    pub fn thorough() -> Self {
        Self {
            request_timeout_ms: 60_000,
            mode: GenerationMode::MultiCandidate { count: 5 },
            prompt_style: PromptStyle::Chat,
            ..Default::default()
        }
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(url) = lookup(SERVER_URL_ENV_VAR).filter(|v| !v.is_empty()) {
            self.server_url = url;
        }
        if let Some(model) = lookup(MODEL_ENV_VAR).filter(|v| !v.is_empty()) {
            self.model_id = model;
        }
        if let Some(seed) = lookup(SEED_ENV_VAR).filter(|v| !v.is_empty()) {
            let parsed = seed.trim().parse::<u64>().map_err(|_| ConfigError::Env {
                var: SEED_ENV_VAR,
                value: seed.clone(),
            })?;
            self.seed = Some(parsed);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("server_url is empty".to_string()));
        }
        if self.model_id.trim().is_empty() {
            return Err(ConfigError::Invalid("model_id is empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.seed == Some(0) {
            return Err(ConfigError::Invalid("seed must be non-zero".to_string()));
        }
        let count = self.mode.candidates_count();
        if count == 0 || count > CANDIDATES_COUNT_MAX {
            return Err(ConfigError::Invalid(format!(
                "candidate count must be in 1..={}, got {}",
                CANDIDATES_COUNT_MAX, count
            )));
        }
        self.sampling
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
