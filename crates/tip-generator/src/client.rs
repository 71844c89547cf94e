//! HTTP backend for a llama.cpp-style inference server.
//!
//! Endpoints used:
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/v1/models` | resolve the model identifier at load time |
//! | POST | `/tokenize` | text -> token ids |
//! | POST | `/detokenize` | token ids -> text |
//! | POST | `/completion` | generate from a token-id prompt |
//!
//! The server returns only newly generated tokens. [`RemoteModel`] rebuilds
//! the full output sequence expected by [`LanguageModel`]: for causal models
//! the prompt ids are prepended.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tip_core::{
    GenerationError, LanguageModel, LoadedModel, ModelLoadError, ModelLoader, SamplingParameters,
    Task, Tokenizer,
};
use tracing::{debug, info};

/// DRY penalty applied when an n-gram constraint is requested.
const DRY_MULTIPLIER: f32 = 0.8;

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
    add_special: bool,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    tokens: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct DetokenizeRequest<'a> {
    tokens: &'a [u32],
}

#[derive(Debug, Deserialize)]
struct DetokenizeResponse {
    content: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct CompletionRequest<'a> {
    prompt: &'a [u32],
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    dry_multiplier: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dry_allowed_length: Option<u32>,
    stream: bool,
    return_tokens: bool,
    cache_prompt: bool,
}

impl<'a> CompletionRequest<'a> {
    fn new(prompt: &'a [u32], params: &SamplingParameters) -> Self {
        // The server has no hard n-gram ban; DRY penalizes repeats longer
        // than the allowed length, which is the closest equivalent.
        let ngram = params.no_repeat_ngram_size;
        Self {
            prompt,
            n_predict: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repeat_penalty: params.repetition_penalty,
            dry_multiplier: (ngram > 0).then_some(DRY_MULTIPLIER),
            dry_allowed_length: (ngram > 0).then(|| ngram.saturating_sub(1)),
            stream: false,
            return_tokens: true,
            cache_prompt: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tokens: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Model and tokenizer served over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteModel {
    http: reqwest::Client,
    base_url: String,
    task: Task,
}

impl RemoteModel {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, task: Task) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url.into()),
            task,
        }
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, GenerationError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Backend(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!(
                "POST {} returned {}: {}",
                url, status, body
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| GenerationError::MalformedResponse(format!("{}: {}", path, e)))
    }

    async fn tokenize(&self, text: &str, add_special: bool) -> Result<Vec<u32>, GenerationError> {
        let response: TokenizeResponse = self
            .post_json(
                "/tokenize",
                &TokenizeRequest {
                    content: text,
                    add_special,
                },
            )
            .await?;
        Ok(response.tokens)
    }
}

#[async_trait]
impl Tokenizer for RemoteModel {
    async fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError> {
        self.tokenize(text, true).await
    }

    async fn decode(&self, ids: &[u32]) -> Result<String, GenerationError> {
        if ids.is_empty() {
            return Ok(String::new());
        }
        let response: DetokenizeResponse = self
            .post_json("/detokenize", &DetokenizeRequest { tokens: ids })
            .await?;
        Ok(response.content)
    }
}

#[async_trait]
impl LanguageModel for RemoteModel {
    async fn generate_ids(
        &self,
        input_ids: &[u32],
        params: &SamplingParameters,
    ) -> Result<Vec<u32>, GenerationError> {
        let request = CompletionRequest::new(input_ids, params);
        let response: CompletionResponse = self.post_json("/completion", &request).await?;

        let generated = if response.tokens.is_empty() && !response.content.is_empty() {
            // Older servers ignore `return_tokens`
            self.tokenize(&response.content, false).await?
        } else {
            response.tokens
        };
        debug!(generated_tokens = generated.len(), "completion received");

        Ok(assemble_output(self.task, input_ids, generated))
    }
}

/// Full output sequence from the prompt ids and the newly generated ids.
fn assemble_output(task: Task, input_ids: &[u32], generated: Vec<u32>) -> Vec<u32> {
    match task {
        Task::Seq2Seq => generated,
        Task::Causal => {
            let mut output = Vec::with_capacity(input_ids.len() + generated.len());
            output.extend_from_slice(input_ids);
            output.extend(generated);
            output
        }
    }
}

fn normalize_base_url(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Whether a served model id refers to the requested identifier.
///
/// Servers often report a local file path (`models/tinyllama-1.1b.Q4_K_M.gguf`)
/// rather than the hub identifier, so the file name is also compared against
/// the identifier's last segment, case-insensitively.
fn served_id_matches(served: &str, requested: &str) -> bool {
    if served == requested {
        return true;
    }
    let file_name = served.rsplit('/').next().unwrap_or(served).to_lowercase();
    let wanted = requested.rsplit('/').next().unwrap_or(requested).to_lowercase();
    !wanted.is_empty() && file_name.starts_with(&wanted)
}

/// Resolves identifiers against a running inference server.
#[derive(Debug, Clone)]
pub struct RemoteLoader {
    base_url: String,
    timeout: Duration,
    task: Option<Task>,
}

impl RemoteLoader {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            timeout,
            task: None,
        }
    }

    /// Force the task instead of inferring it from the identifier.
    #[must_use]
    pub fn with_task(mut self, task: Option<Task>) -> Self {
        self.task = task;
        self
    }

    fn unreachable(&self, url: &str, reason: impl ToString) -> ModelLoadError {
        ModelLoadError::Unreachable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ModelLoader for RemoteLoader {
    async fn load(&self, model_id: &str) -> Result<LoadedModel, ModelLoadError> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ModelLoadError::InvalidConfig(e.to_string()))?;

        let url = format!("{}/v1/models", self.base_url);
        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unreachable(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.unreachable(&url, format!("HTTP {}", status)));
        }
        let models: ModelList = response
            .json()
            .await
            .map_err(|e| ModelLoadError::InvalidConfig(format!("model list: {}", e)))?;

        if !models.data.iter().any(|m| served_id_matches(&m.id, model_id)) {
            return Err(ModelLoadError::NotFound(model_id.to_string()));
        }

        let task = self.task.unwrap_or_else(|| Task::from_model_id(model_id));
        info!(model = model_id, task = task.name(), server = %self.base_url, "resolved remote model");

        let remote = Arc::new(RemoteModel::new(http, self.base_url.clone(), task));
        Ok(LoadedModel {
            model_id: model_id.to_string(),
            task,
            model: remote.clone(),
            tokenizer: remote,
        })
    }
}
