//! Randomized prompt synthesis.
//!
//! Template and topic are drawn independently and uniformly from fixed
//! pools; a random nonce is prepended to defeat prompt caching and verbatim
//! repetition in the model. The random source is always passed in, so a
//! seeded RNG reproduces the exact prompt.

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tip_core::{PromptError, PromptSpec, TOPIC_PLACEHOLDER};

/// Cue every prompt ends with; the model continues from it.
pub const CUE: &str = "Tip:";

/// Nonce range embedded as `Instruction {nonce}: ...`.
pub const NONCE_RANGE: RangeInclusive<u32> = 1000..=9999;

/// Fixed, simplified prompt for the single quality retry.
pub const FALLBACK_PROMPT: &str = "Give one concise crypto trading tip in a single sentence. Tip:";

/// System line for [`PromptStyle::Chat`].
pub const CHAT_SYSTEM_PROMPT: &str =
    "You are a professional crypto trader. Respond with one concise sentence under 25 words.";

pub const DEFAULT_TEMPLATES: &[&str] = &[
    "You are a concise crypto trading assistant. Write exactly one actionable sentence about {topic}. Keep it under 25 words. Tip:",
    "Give one practical crypto trading tip about {topic} in a single sentence (<= 25 words). Do not mention specific token names. Tip:",
    "Share a single, specific piece of advice on {topic} for a retail crypto trader. Tip:",
    "In one short sentence, tell a beginner something useful about {topic}. Tip:",
    "Write exactly one sentence of trading advice focused on {topic}. Tip:",
];

pub const DEFAULT_TOPICS: &[&str] = &[
    "risk management",
    "position sizing",
    "stop-loss orders",
    "taking profits",
    "portfolio diversification",
    "dollar-cost averaging",
    "trading psychology",
    "exchange security",
    "leverage",
    "market volatility",
    "order book liquidity",
    "keeping a trading journal",
];

/// How the rendered instruction is framed for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// The instruction as is.
    #[default]
    Plain,
    /// `### System / ### User / ### Assistant` frame for chat-tuned models.
    Chat,
}

/// Builds prompts from template and topic pools.
#[derive(Debug, Clone)]
pub struct PromptSynthesizer {
    templates: Vec<String>,
    topics: Vec<String>,
    style: PromptStyle,
}

impl Default for PromptSynthesizer {
    fn default() -> Self {
        Self {
            templates: DEFAULT_TEMPLATES.iter().map(|t| t.to_string()).collect(),
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            style: PromptStyle::Plain,
        }
    }
}

impl PromptSynthesizer {
    /// Create from custom pools.
    ///
    /// Every template must contain exactly one `{topic}` placeholder and end
    /// with [`CUE`].
    pub fn new<T, U>(templates: T, topics: U) -> Result<Self, PromptError>
    where
        T: IntoIterator,
        T::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        let templates: Vec<String> = templates.into_iter().map(Into::into).collect();
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();

        if templates.is_empty() {
            return Err(PromptError::EmptyPool("templates"));
        }
        if topics.is_empty() {
            return Err(PromptError::EmptyPool("topics"));
        }
        for template in &templates {
            if template.matches(TOPIC_PLACEHOLDER).count() != 1 {
                return Err(PromptError::Placeholder(template.clone()));
            }
            if !template.trim_end().ends_with(CUE) {
                return Err(PromptError::MissingCue {
                    template: template.clone(),
                    cue: CUE,
                });
            }
        }

        Ok(Self {
            templates,
            topics,
            style: PromptStyle::Plain,
        })
    }

    #[must_use]
    pub fn with_style(mut self, style: PromptStyle) -> Self {
        self.style = style;
        self
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    /// Draw template, topic, then nonce, in that order.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> PromptSpec {
        debug_assert!(!self.templates.is_empty() && !self.topics.is_empty());

        let template = &self.templates[rng.gen_range(0..self.templates.len())];
        let topic = &self.topics[rng.gen_range(0..self.topics.len())];
        let nonce = rng.gen_range(NONCE_RANGE);

        PromptSpec {
            template: template.clone(),
            topic: topic.clone(),
            nonce,
        }
    }

    /// Draw a prompt and render it in the configured style.
    pub fn synthesize<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let spec = self.draw(rng);
        self.frame(&spec.render())
    }

    /// Apply the configured style to a rendered instruction.
    ///
    /// Both styles end with [`CUE`].
    pub fn frame(&self, instruction: &str) -> String {
        match self.style {
            PromptStyle::Plain => instruction.to_string(),
            PromptStyle::Chat => {
                let body = instruction.trim_end();
                let body = body.strip_suffix(CUE).unwrap_or(body).trim_end();
                format!(
                    "### System:\n{}\n### User:\n{}\n### Assistant:\n{}",
                    CHAT_SYSTEM_PROMPT, body, CUE
                )
            }
        }
    }
}
