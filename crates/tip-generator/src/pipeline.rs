//! Tip production: the outward operation of the crate.
//!
//! Single mode:
//!
//! ```text
//! synthesize ─> generate ─> sanitize ─> gate ─┬─ accepted ──> tip
//!                                             └─ rejected ──> FALLBACK_PROMPT ─> generate ─> sanitize ─> tip
//! ```
//!
//! The fallback attempt happens at most once and its sanitized text is
//! returned whatever the gate says about it. Multi-candidate mode runs the
//! single-mode procedure `count` times and selects one survivor.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tip_core::{
    AcceptanceVerdict, GenerationError, GenerationMode, Generator, SamplingParameters, TipError,
};
use tip_sim::DeterministicRng;
use tracing::{debug, info};

use crate::config::{ConfigError, TipConfig, CANDIDATES_COUNT_MAX};
use crate::prompt::{PromptSynthesizer, FALLBACK_PROMPT};
use crate::quality::QualityGate;
use crate::sanitize::Sanitizer;
use crate::select::select;

/// One generation call and what became of its output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Candidate index, starting at 1
    pub candidate: u32,
    /// 1 for the synthesized prompt, 2 for the fallback
    pub attempt: u32,
    pub prompt: String,
    pub raw_text: String,
    pub sanitized: String,
    pub verdict: AcceptanceVerdict,
    pub fallback: bool,
}

/// Result of one tip request, with its history.
#[derive(Debug, Clone, Serialize)]
pub struct TipReport {
    pub tip: String,
    pub mode: GenerationMode,
    pub attempts: Vec<AttemptRecord>,
    pub generation_calls: u32,
    /// Distinct non-empty candidates the tip was selected from
    pub candidates: Vec<String>,
    pub duration_ms: u64,
}

impl TipReport {
    /// Human-readable summary.
    pub fn format_summary(&self) -> String {
        let mode = match self.mode {
            GenerationMode::Single => "single".to_string(),
            GenerationMode::MultiCandidate { count } => format!("{} candidates", count),
        };
        let mut summary = format!(
            "Tip produced in {:.2}s ({}, {} generation calls)\n",
            Duration::from_millis(self.duration_ms).as_secs_f64(),
            mode,
            self.generation_calls,
        );

        for record in &self.attempts {
            let marker = if record.fallback { " (fallback)" } else { "" };
            summary.push_str(&format!(
                "  #{}.{}{} {}: {:?}\n",
                record.candidate, record.attempt, marker, record.verdict, record.sanitized
            ));
        }
        if self.candidates.len() > 1 {
            summary.push_str(&format!(
                "  Selected from {} distinct candidates\n",
                self.candidates.len()
            ));
        }

        summary.push_str(&format!("\nTip: {}\n", self.tip));
        summary
    }
}

/// Prompt synthesis, generation, sanitization, gating and selection.
///
/// Holds no per-request state beyond the random source, so one pipeline can
/// serve many requests.
pub struct TipPipeline {
    generator: Arc<dyn Generator>,
    synthesizer: PromptSynthesizer,
    sanitizer: Sanitizer,
    gate: QualityGate,
    rng: Mutex<DeterministicRng>,
}

impl TipPipeline {
    /// Pipeline with default pools and thresholds.
    pub fn new(generator: Arc<dyn Generator>, rng: DeterministicRng) -> Self {
        Self {
            generator,
            synthesizer: PromptSynthesizer::default(),
            sanitizer: Sanitizer::default(),
            gate: QualityGate::default(),
            rng: Mutex::new(rng),
        }
    }

    /// Pipeline configured from `config`. Without a configured seed, `TIP_SEED`
    /// is used, or a random seed that gets logged.
    pub fn from_config(
        config: &TipConfig,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(tip_sim::get_or_generate_seed);
        info!(seed, model = %config.model_id, "tip pipeline configured");

        Ok(Self::new(generator, DeterministicRng::new(seed))
            .with_synthesizer(PromptSynthesizer::default().with_style(config.prompt_style))
            .with_sanitizer(Sanitizer::new(config.label_len_max))
            .with_gate(QualityGate::new(config.words_min)))
    }

    #[must_use]
    pub fn with_synthesizer(mut self, synthesizer: PromptSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Replace the template and topic pools, keeping the prompt style.
    pub fn with_pools<T, U>(mut self, templates: T, topics: U) -> Result<Self, TipError>
    where
        T: IntoIterator,
        T::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        let style = self.synthesizer.style();
        self.synthesizer = PromptSynthesizer::new(templates, topics)?.with_style(style);
        Ok(self)
    }

    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    /// Produce one tip.
    pub async fn produce_tip(
        &self,
        params: &SamplingParameters,
        mode: GenerationMode,
    ) -> Result<String, TipError> {
        Ok(self.produce_report(params, mode).await?.tip)
    }

    /// Produce one tip along with its attempt history.
    pub async fn produce_report(
        &self,
        params: &SamplingParameters,
        mode: GenerationMode,
    ) -> Result<TipReport, TipError> {
        let count = mode.candidates_count();
        if count == 0 || count > CANDIDATES_COUNT_MAX {
            return Err(GenerationError::InvalidParameters(format!(
                "candidate count must be in 1..={}, got {}",
                CANDIDATES_COUNT_MAX, count
            ))
            .into());
        }

        let start = Instant::now();
        let mut attempts = Vec::new();

        let (tip, candidates) = match mode {
            GenerationMode::Single => {
                let tip = self.single_tip(1, params, &mut attempts).await?;
                if tip.is_empty() {
                    debug!("sanitized tip empty after fallback");
                    return Err(TipError::EmptyResult);
                }
                (tip.clone(), vec![tip])
            }
            GenerationMode::MultiCandidate { count } => {
                let mut pool = BTreeSet::new();
                for candidate in 1..=count {
                    let tip = self.single_tip(candidate, params, &mut attempts).await?;
                    if tip.is_empty() {
                        debug!(candidate, "dropping empty candidate");
                    } else {
                        pool.insert(tip);
                    }
                }

                let tip = select(pool.iter().cloned()).ok_or_else(|| {
                    debug!(count, "every candidate was empty");
                    TipError::EmptyResult
                })?;
                info!(distinct = pool.len(), count, "candidate selected");
                (tip, pool.into_iter().collect())
            }
        };

        let report = TipReport {
            tip,
            mode,
            generation_calls: attempts.len() as u32,
            attempts,
            candidates,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            generation_calls = report.generation_calls,
            duration_ms = report.duration_ms,
            "tip produced"
        );
        Ok(report)
    }

    /// The single-mode procedure. May return an empty string.
    async fn single_tip(
        &self,
        candidate: u32,
        params: &SamplingParameters,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<String, TipError> {
        let prompt = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let spec = self.synthesizer.draw(&mut *rng);
            debug!(candidate, nonce = spec.nonce, topic = %spec.topic, "prompt synthesized");
            self.synthesizer.frame(&spec.render())
        };

        let record = self.attempt(candidate, 1, prompt, params).await?;
        let verdict = record.verdict;
        let sanitized = record.sanitized.clone();
        attempts.push(record);

        if let AcceptanceVerdict::Rejected(reason) = verdict {
            info!(candidate, ?reason, "tip rejected, retrying with fallback prompt");
            let record = self
                .attempt(candidate, 2, FALLBACK_PROMPT.to_string(), params)
                .await?;
            let sanitized = record.sanitized.clone();
            attempts.push(record);
            return Ok(sanitized);
        }

        Ok(sanitized)
    }

    async fn attempt(
        &self,
        candidate: u32,
        attempt: u32,
        prompt: String,
        params: &SamplingParameters,
    ) -> Result<AttemptRecord, TipError> {
        let result = self.generator.generate(&prompt, params).await?;
        let sanitized = self.sanitizer.sanitize(&result.raw_text);
        let verdict = self.gate.evaluate(&sanitized);
        debug!(candidate, attempt, %verdict, sanitized = %sanitized, "attempt evaluated");

        Ok(AttemptRecord {
            candidate,
            attempt,
            prompt,
            raw_text: result.raw_text,
            sanitized,
            verdict,
            fallback: attempt > 1,
        })
    }
}
