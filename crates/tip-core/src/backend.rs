//! Traits at the model boundary.
//!
//! ```text
//! ModelLoader::load(model_id) -> LoadedModel { model, tokenizer, task }
//!                                     │
//!                                     ▼
//!              Generator::generate(prompt, params) -> raw text
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{GenerationError, ModelLoadError};
use crate::params::SamplingParameters;
use crate::task::Task;
use crate::types::GenerationResult;

/// Text <-> token id conversion.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError>;

    async fn decode(&self, ids: &[u32]) -> Result<String, GenerationError>;
}

/// A loaded language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run generation and return the full output sequence.
    ///
    /// For causal models the input ids are a prefix of the returned sequence.
    /// For seq2seq models the returned sequence is the decoder output only.
    async fn generate_ids(
        &self,
        input_ids: &[u32],
        params: &SamplingParameters,
    ) -> Result<Vec<u32>, GenerationError>;
}

/// Everything a load produces. Read-only once constructed.
#[derive(Clone)]
pub struct LoadedModel {
    pub model_id: String,
    pub task: Task,
    pub model: Arc<dyn LanguageModel>,
    pub tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model_id", &self.model_id)
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

/// Resolves a model identifier into a [`LoadedModel`].
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model_id: &str) -> Result<LoadedModel, ModelLoadError>;
}

/// Prompt in, raw text out.
///
/// Hides whether the model behind it is seq2seq or causal.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &SamplingParameters,
    ) -> Result<GenerationResult, GenerationError>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(
        &self,
        prompt: &str,
        params: &SamplingParameters,
    ) -> Result<GenerationResult, GenerationError> {
        (**self).generate(prompt, params).await
    }
}
