//! Generator adapter over a loaded model.
//!
//! Hides the seq2seq/causal split from the pipeline: seq2seq output is
//! decoded whole, causal output is decoded from the prompt-length offset so
//! the prompt never reaches the caller.
//!
//! The model itself sits behind a [`SharedModel`], a lazily initialised
//! handle: the first caller triggers the load, concurrent first callers wait
//! on that same load, and later callers get the cached handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tip_core::{
    GenerationError, GenerationResult, Generator, LoadedModel, ModelLoadError, ModelLoader,
    SamplingParameters, Task,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Encode, generate, decode.
pub async fn generate_text(
    loaded: &LoadedModel,
    prompt: &str,
    params: &SamplingParameters,
) -> Result<GenerationResult, GenerationError> {
    params.validate()?;

    let input_ids = loaded.tokenizer.encode(prompt).await?;
    let output_ids = loaded.model.generate_ids(&input_ids, params).await?;

    let raw_text = match loaded.task {
        Task::Seq2Seq => loaded.tokenizer.decode(&output_ids).await?,
        Task::Causal => {
            let continuation = output_ids.get(input_ids.len()..).unwrap_or(&[]);
            let text = loaded.tokenizer.decode(continuation).await?;
            strip_echoed_prompt(&text, prompt).to_string()
        }
    };

    debug!(
        task = loaded.task.name(),
        input_tokens = input_ids.len(),
        output_tokens = output_ids.len(),
        "generation finished"
    );
    Ok(GenerationResult::new(raw_text))
}

/// Remove the prompt if the continuation starts with it again.
///
/// Covers tokenizers whose encode/decode round trip is not length-preserving,
/// which shifts the decode offset.
pub fn strip_echoed_prompt<'a>(continuation: &'a str, prompt: &str) -> &'a str {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return continuation;
    }
    let mut text = continuation;
    while let Some(rest) = text.trim_start().strip_prefix(prompt) {
        text = rest;
    }
    text
}

/// Process-wide, lazily loaded model handle.
///
/// A failed load is not cached; the next call tries again.
pub struct SharedModel {
    model_id: String,
    loader: Arc<dyn ModelLoader>,
    cell: OnceCell<Arc<LoadedModel>>,
    load_attempts_count: AtomicU64,
}

impl SharedModel {
    pub fn new(model_id: impl Into<String>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model_id: model_id.into(),
            loader,
            cell: OnceCell::new(),
            load_attempts_count: AtomicU64::new(0),
        }
    }

    /// Wrap an already loaded model.
    pub fn ready(loaded: LoadedModel, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model_id: loaded.model_id.clone(),
            loader,
            cell: OnceCell::new_with(Some(Arc::new(loaded))),
            load_attempts_count: AtomicU64::new(0),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of loads actually started by this handle.
    pub fn load_attempts_count(&self) -> u64 {
        self.load_attempts_count.load(Ordering::SeqCst)
    }

    /// Get the model, loading it on first use.
    pub async fn get(&self) -> Result<Arc<LoadedModel>, ModelLoadError> {
        let loaded = self
            .cell
            .get_or_try_init(|| async {
                let attempt = self.load_attempts_count.fetch_add(1, Ordering::SeqCst) + 1;
                info!(model = %self.model_id, attempt, "loading model");
                match self.loader.load(&self.model_id).await {
                    Ok(loaded) => {
                        info!(model = %self.model_id, task = loaded.task.name(), "model loaded");
                        Ok(Arc::new(loaded))
                    }
                    Err(err) => {
                        debug!(model = %self.model_id, error = %err, "model load failed");
                        Err(err)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(loaded))
    }
}

/// [`Generator`] backed by a [`SharedModel`].
#[derive(Clone)]
pub struct ModelGenerator {
    shared: Arc<SharedModel>,
}

impl ModelGenerator {
    pub fn new(shared: Arc<SharedModel>) -> Self {
        Self { shared }
    }

    pub fn shared(&self) -> &Arc<SharedModel> {
        &self.shared
    }

    /// Load the model now instead of on the first request.
    pub async fn warm_up(&self) -> Result<Task, ModelLoadError> {
        Ok(self.shared.get().await?.task)
    }
}

#[async_trait]
impl Generator for ModelGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &SamplingParameters,
    ) -> Result<GenerationResult, GenerationError> {
        let loaded = self.shared.get().await?;
        generate_text(&loaded, prompt, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tip_core::{LanguageModel, Tokenizer};
    use tip_sim::{ByteTokenizer, SimulatedLoader, SimulatedModel};

    const PROMPT: &str = "Instruction 1234: Give one tip about leverage. Tip:";

    fn loaded(model: Arc<SimulatedModel>) -> LoadedModel {
        LoadedModel {
            model_id: "sim/tiny".to_string(),
            task: model.task(),
            model,
            tokenizer: Arc::new(ByteTokenizer),
        }
    }

    #[tokio::test]
    async fn test_causal_decodes_continuation_only() {
        let model = Arc::new(
            SimulatedModel::new(Task::Causal, 1).with_script([" Avoid leverage above 3x."]),
        );
        let result = generate_text(&loaded(model), PROMPT, &SamplingParameters::default())
            .await
            .unwrap();
        assert_eq!(result.raw_text, " Avoid leverage above 3x.");
        assert!(!result.raw_text.contains(PROMPT));
    }

    #[tokio::test]
    async fn test_seq2seq_decodes_whole_output() {
        let model = Arc::new(
            SimulatedModel::new(Task::Seq2Seq, 1).with_script(["Avoid leverage above 3x."]),
        );
        let result = generate_text(&loaded(model), PROMPT, &SamplingParameters::default())
            .await
            .unwrap();
        assert_eq!(result.raw_text, "Avoid leverage above 3x.");
    }

    /// Causal model that repeats the prompt at the start of its continuation.
    struct ShiftedEcho;

    #[async_trait]
    impl LanguageModel for ShiftedEcho {
        async fn generate_ids(
            &self,
            input_ids: &[u32],
            _params: &SamplingParameters,
        ) -> Result<Vec<u32>, GenerationError> {
            let mut out = input_ids.to_vec();
            out.extend(ByteTokenizer.encode(PROMPT).await?);
            out.extend(ByteTokenizer.encode(" Size small.").await?);
            Ok(out)
        }
    }

    #[tokio::test]
    async fn test_causal_never_returns_prompt_prefix() {
        let loaded = LoadedModel {
            model_id: "echo".to_string(),
            task: Task::Causal,
            model: Arc::new(ShiftedEcho),
            tokenizer: Arc::new(ByteTokenizer),
        };
        let result = generate_text(&loaded, PROMPT, &SamplingParameters::default())
            .await
            .unwrap();
        assert!(!result.raw_text.trim_start().starts_with(PROMPT));
        assert_eq!(result.raw_text, " Size small.");
    }

    #[tokio::test]
    async fn test_short_causal_output_is_empty() {
        struct Truncating;

        #[async_trait]
        impl LanguageModel for Truncating {
            async fn generate_ids(
                &self,
                input_ids: &[u32],
                _params: &SamplingParameters,
            ) -> Result<Vec<u32>, GenerationError> {
                Ok(input_ids[..input_ids.len() / 2].to_vec())
            }
        }

        let loaded = LoadedModel {
            model_id: "truncating".to_string(),
            task: Task::Causal,
            model: Arc::new(Truncating),
            tokenizer: Arc::new(ByteTokenizer),
        };
        let result = generate_text(&loaded, PROMPT, &SamplingParameters::default())
            .await
            .unwrap();
        assert_eq!(result.raw_text, "");
    }

    #[tokio::test]
    async fn test_invalid_params_fail_before_generation() {
        let model = Arc::new(SimulatedModel::new(Task::Causal, 1));
        let params = SamplingParameters {
            top_p: 2.0,
            ..Default::default()
        };
        let err = generate_text(&loaded(model.clone()), PROMPT, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidParameters(_)));
        assert_eq!(model.calls_count(), 0);
    }

    #[test]
    fn test_strip_echoed_prompt() {
        assert_eq!(strip_echoed_prompt("Tip: Tip: buy", "Tip:"), " buy");
        assert_eq!(strip_echoed_prompt(" hold", "Tip:"), " hold");
        assert_eq!(strip_echoed_prompt("hold", ""), "hold");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_callers_share_one_load() {
        let model = Arc::new(SimulatedModel::new(Task::Causal, 1));
        let loader = Arc::new(
            SimulatedLoader::new(model, "sim/tiny").with_load_delay(Duration::from_millis(50)),
        );
        let shared = Arc::new(SharedModel::new("sim/tiny", loader.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.get().await.map(|m| m.task) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), Task::Causal);
        }

        assert_eq!(loader.loads_count(), 1);
        assert_eq!(shared.load_attempts_count(), 1);
        assert!(shared.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let model = Arc::new(SimulatedModel::new(Task::Seq2Seq, 1));
        let loader = Arc::new(SimulatedLoader::new(model, "sim/t5").with_failures(1));
        let shared = SharedModel::new("sim/t5", loader.clone());

        assert!(matches!(
            shared.get().await,
            Err(ModelLoadError::Unreachable { .. })
        ));
        assert!(!shared.is_loaded());
        assert_eq!(shared.get().await.unwrap().task, Task::Seq2Seq);
        assert_eq!(loader.loads_count(), 2);

        // Cached from here on
        shared.get().await.unwrap();
        assert_eq!(loader.loads_count(), 2);
    }

    #[tokio::test]
    async fn test_generator_surfaces_load_error() {
        let model = Arc::new(SimulatedModel::new(Task::Causal, 1));
        let loader = Arc::new(SimulatedLoader::new(model, "sim/tiny"));
        let generator = ModelGenerator::new(Arc::new(SharedModel::new("sim/missing", loader)));

        let err = generator
            .generate(PROMPT, &SamplingParameters::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::ModelUnavailable(ModelLoadError::NotFound(_))
        ));
        assert!(generator.warm_up().await.is_err());
    }

    #[tokio::test]
    async fn test_ready_handle_skips_loader() {
        let model = Arc::new(SimulatedModel::new(Task::Causal, 1).with_script([" Hedge."]));
        let loader = Arc::new(SimulatedLoader::new(model.clone(), "sim/tiny"));
        let shared = SharedModel::ready(loaded(model), loader.clone());
        let generator = ModelGenerator::new(Arc::new(shared));

        let result = generator
            .generate(PROMPT, &SamplingParameters::default())
            .await
            .unwrap();
        assert_eq!(result.raw_text, " Hedge.");
        assert_eq!(loader.loads_count(), 0);
        assert_eq!(generator.warm_up().await.unwrap(), Task::Causal);
    }
}
