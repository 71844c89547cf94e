//! Scripted in-memory model and tokenizer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tip_core::{
    GenerationError, LanguageModel, LoadedModel, ModelLoadError, ModelLoader, SamplingParameters,
    Task, Tokenizer,
};

use crate::fault::FaultInjector;
use crate::random::DeterministicRng;

/// Raw outputs the way a small chat model tends to produce them: greeting
/// filler, numbering, labels, echoed constraints, run-on continuations.
pub const CANNED_OUTPUTS: &[&str] = &[
    "Sure, here's one: Never risk more than 2% of your portfolio on a single trade. Also remember to review your positions weekly.",
    "1. Set a stop-loss before you enter any position. 2. Take profits in stages as price rises.",
    "Tip: Diversify across several large-cap coins instead of chasing thinly traded tokens.",
    "Okay! Always check order book depth before placing a large market order.",
    "Answer: Dollar-cost averaging smooths out the impact of short-term volatility on your entries.",
    "Certainly. Keep a trading journal so you can learn from every winning and losing trade.",
    "Well, move long-term holdings to a hardware wallet and keep only trading funds on exchanges.",
    "Write a tip under 25 words. Avoid leverage until you consistently profit on spot trades.",
    "You are a concise crypto trading assistant.",
    "Buy low.",
];

/// One token per UTF-8 byte.
///
/// Round-trips any text exactly, so prompt lengths in tokens are stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

#[async_trait]
impl Tokenizer for ByteTokenizer {
    async fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError> {
        Ok(text.bytes().map(u32::from).collect())
    }

    async fn decode(&self, ids: &[u32]) -> Result<String, GenerationError> {
        let bytes = ids
            .iter()
            .map(|&id| {
                u8::try_from(id).map_err(|_| {
                    GenerationError::Tokenizer(format!("token id {} out of byte range", id))
                })
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Simulated language model.
///
/// Each call pops the next scripted response; once the script is exhausted
/// it draws from the canned pool with its own seeded RNG. Output layout
/// follows the task: causal calls return `input ++ response`, seq2seq calls
/// return `response` alone. Responses are cut to `max_new_tokens` bytes on a
/// char boundary.
pub struct SimulatedModel {
    task: Task,
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    pool: Vec<String>,
    rng: Mutex<DeterministicRng>,
    faults: Mutex<FaultInjector>,
    prompts: Mutex<Vec<String>>,
    calls_count: AtomicU64,
}

impl SimulatedModel {
    /// Empty script, canned pool, no faults.
    pub fn new(task: Task, seed: u64) -> Self {
        Self {
            task,
            script: Mutex::new(VecDeque::new()),
            pool: CANNED_OUTPUTS.iter().map(|s| s.to_string()).collect(),
            rng: Mutex::new(DeterministicRng::new(seed)),
            faults: Mutex::new(FaultInjector::disabled()),
            prompts: Mutex::new(Vec::new()),
            calls_count: AtomicU64::new(0),
        }
    }

    /// Queue raw outputs, returned in order.
    #[must_use]
    pub fn with_script<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock_script()
            .extend(responses.into_iter().map(|r| Ok(r.into())));
        self
    }

    /// Queue a failure at the current end of the script.
    #[must_use]
    pub fn with_scripted_error(self, err: GenerationError) -> Self {
        self.lock_script().push_back(Err(err));
        self
    }

    /// Replace the pool used once the script runs out. An empty pool makes
    /// unscripted calls fail.
    #[must_use]
    pub fn with_pool<I, S>(mut self, pool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pool = pool.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_faults(self, faults: FaultInjector) -> Self {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner) = faults;
        self
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Number of `generate_ids` calls so far, failed ones included.
    pub fn calls_count(&self) -> u64 {
        self.calls_count.load(Ordering::SeqCst)
    }

    /// Prompts seen so far, decoded from the input ids.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, GenerationError>>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(&self) -> Result<String, GenerationError> {
        if let Some(scripted) = self.lock_script().pop_front() {
            return scripted;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.choose(&self.pool)
            .cloned()
            .ok_or_else(|| GenerationError::Backend("simulated script exhausted".to_string()))
    }
}

#[async_trait]
impl LanguageModel for SimulatedModel {
    async fn generate_ids(
        &self,
        input_ids: &[u32],
        params: &SamplingParameters,
    ) -> Result<Vec<u32>, GenerationError> {
        let call = self.calls_count.fetch_add(1, Ordering::SeqCst) + 1;
        let prompt = ByteTokenizer.decode(input_ids).await?;
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt);

        let (fail, delay) = {
            let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
            (faults.should_fail(), faults.maybe_delay())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            tracing::debug!(call, "injected generation fault");
            return Err(GenerationError::Backend(format!(
                "injected fault on call {}",
                call
            )));
        }

        let response = self.next_response()?;
        let response = truncate_bytes(&response, params.max_new_tokens as usize);

        let mut output = match self.task {
            Task::Causal => input_ids.to_vec(),
            Task::Seq2Seq => Vec::with_capacity(response.len()),
        };
        output.extend(response.bytes().map(u32::from));
        Ok(output)
    }
}

fn truncate_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Loader serving one [`SimulatedModel`] under a fixed set of identifiers.
pub struct SimulatedLoader {
    model: Arc<SimulatedModel>,
    known_ids: Vec<String>,
    load_delay: Duration,
    failures_remaining: AtomicU64,
    loads_count: AtomicU64,
}

impl SimulatedLoader {
    pub fn new(model: Arc<SimulatedModel>, known_id: impl Into<String>) -> Self {
        Self {
            model,
            known_ids: vec![known_id.into()],
            load_delay: Duration::ZERO,
            failures_remaining: AtomicU64::new(0),
            loads_count: AtomicU64::new(0),
        }
    }

    /// Make each load take this long.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Fail the first `count` loads with [`ModelLoadError::Unreachable`].
    #[must_use]
    pub fn with_failures(self, count: u64) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Number of load attempts so far.
    pub fn loads_count(&self) -> u64 {
        self.loads_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for SimulatedLoader {
    async fn load(&self, model_id: &str) -> Result<LoadedModel, ModelLoadError> {
        self.loads_count.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ModelLoadError::Unreachable {
                url: "sim://".to_string(),
                reason: "simulated load failure".to_string(),
            });
        }

        if !self.known_ids.iter().any(|id| id == model_id) {
            return Err(ModelLoadError::NotFound(model_id.to_string()));
        }

        Ok(LoadedModel {
            model_id: model_id.to_string(),
            task: self.model.task(),
            model: self.model.clone(),
            tokenizer: Arc::new(ByteTokenizer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultConfig;

    #[tokio::test]
    async fn test_byte_tokenizer_round_trip() {
        let text = "Keep 500 € in stablecoins.";
        let ids = ByteTokenizer.encode(text).await.unwrap();
        assert_eq!(ids.len(), text.len());
        assert_eq!(ByteTokenizer.decode(&ids).await.unwrap(), text);
        assert!(ByteTokenizer.decode(&[300]).await.is_err());
    }

    #[tokio::test]
    async fn test_causal_output_contains_prompt_prefix() {
        let model = SimulatedModel::new(Task::Causal, 1).with_script(["Buy the dip."]);
        let input = ByteTokenizer.encode("Tip:").await.unwrap();
        let output = model
            .generate_ids(&input, &SamplingParameters::default())
            .await
            .unwrap();
        assert_eq!(&output[..input.len()], input.as_slice());
        assert_eq!(
            ByteTokenizer.decode(&output[input.len()..]).await.unwrap(),
            "Buy the dip."
        );
        assert_eq!(model.prompts(), vec!["Tip:".to_string()]);
    }

    #[tokio::test]
    async fn test_seq2seq_output_is_response_only() {
        let model = SimulatedModel::new(Task::Seq2Seq, 1).with_script(["Hedge with stablecoins."]);
        let input = ByteTokenizer.encode("Tip:").await.unwrap();
        let output = model
            .generate_ids(&input, &SamplingParameters::default())
            .await
            .unwrap();
        assert_eq!(
            ByteTokenizer.decode(&output).await.unwrap(),
            "Hedge with stablecoins."
        );
    }

    #[tokio::test]
    async fn test_max_new_tokens_truncates() {
        let model = SimulatedModel::new(Task::Seq2Seq, 1).with_script(["abcdefghij"]);
        let params = SamplingParameters {
            max_new_tokens: 4,
            ..Default::default()
        };
        let output = model.generate_ids(&[], &params).await.unwrap();
        assert_eq!(output.len(), 4);
    }

    #[tokio::test]
    async fn test_script_then_pool_then_exhausted() {
        let model = SimulatedModel::new(Task::Seq2Seq, 1)
            .with_script(["first."])
            .with_pool(Vec::<String>::new());
        let params = SamplingParameters::default();
        assert!(model.generate_ids(&[], &params).await.is_ok());
        assert!(matches!(
            model.generate_ids(&[], &params).await,
            Err(GenerationError::Backend(_))
        ));
        assert_eq!(model.calls_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let faults = FaultInjector::new(DeterministicRng::new(1), FaultConfig::fail_on([1]));
        let model = SimulatedModel::new(Task::Causal, 1)
            .with_script(["ok."])
            .with_faults(faults);
        let params = SamplingParameters::default();
        assert!(model.generate_ids(&[], &params).await.is_err());
        assert!(model.generate_ids(&[], &params).await.is_ok());
    }

    #[tokio::test]
    async fn test_loader_resolves_known_id_only() {
        let model = Arc::new(SimulatedModel::new(Task::Causal, 1));
        let loader = SimulatedLoader::new(model, "sim/tiny").with_failures(1);

        assert!(matches!(
            loader.load("sim/tiny").await,
            Err(ModelLoadError::Unreachable { .. })
        ));
        let loaded = loader.load("sim/tiny").await.unwrap();
        assert_eq!(loaded.task, Task::Causal);
        assert!(matches!(
            loader.load("sim/other").await,
            Err(ModelLoadError::NotFound(_))
        ));
        assert_eq!(loader.loads_count(), 3);
    }
}
