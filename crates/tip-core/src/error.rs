//! Error taxonomy.
//!
//! Every kind stays distinguishable up to the caller so a serving layer can
//! map it to its own response.

/// Model could not be loaded or resolved.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Model server unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Invalid model config: {0}")]
    InvalidConfig(String),
}

/// A single generation call failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] ModelLoadError),

    #[error("Invalid sampling parameters: {0}")]
    InvalidParameters(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

/// Prompt pools are unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt pool is empty: {0}")]
    EmptyPool(&'static str),

    #[error("Template must contain exactly one placeholder: {0:?}")]
    Placeholder(String),

    #[error("Template must end with the cue {cue:?}: {template:?}")]
    MissingCue { template: String, cue: &'static str },
}

/// Terminal failure of one tip request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TipError {
    #[error("Model load failed: {0}")]
    ModelLoad(ModelLoadError),

    #[error("Generation failed: {0}")]
    Generation(GenerationError),

    #[error("Sanitized tip was empty after the fallback attempt")]
    EmptyResult,

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),
}

impl From<ModelLoadError> for TipError {
    fn from(err: ModelLoadError) -> Self {
        TipError::ModelLoad(err)
    }
}

// A lazily loaded model surfaces load failures through the generator;
// unwrap them so the kind stays `ModelLoad`.
impl From<GenerationError> for TipError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::ModelUnavailable(load) => TipError::ModelLoad(load),
            other => TipError::Generation(other),
        }
    }
}

impl TipError {
    /// Stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TipError::ModelLoad(_) => "model_load",
            TipError::Generation(_) => "generation",
            TipError::EmptyResult => "empty_result",
            TipError::Prompt(_) => "prompt",
        }
    }
}
