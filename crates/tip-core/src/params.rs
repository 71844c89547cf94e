//! Sampling parameters for a single generation call.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Maximum value accepted for `max_new_tokens`.
pub const MAX_NEW_TOKENS_MAX: u32 = 4096;

/// Sampling parameters, immutable for the duration of one generation call.
///
/// `temperature > 0` means probabilistic sampling; `temperature == 0` is
/// greedy decoding. `top_p` applies nucleus truncation. `repetition_penalty`
/// and `no_repeat_ngram_size` discourage verbatim loops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParameters {
    /// Upper bound on generated tokens (generation may stop earlier at EOS)
    pub max_new_tokens: u32,
    /// Softmax temperature, `>= 0`
    pub temperature: f32,
    /// Nucleus probability mass, in `[0, 1]`
    pub top_p: f32,
    /// Repetition penalty, `>= 1`
    pub repetition_penalty: f32,
    /// Size of n-grams that may not repeat, `0` disables the constraint
    pub no_repeat_ngram_size: u32,
}

impl Default for SamplingParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 60,
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.2,
            no_repeat_ngram_size: 3,
        }
    }
}

impl SamplingParameters {
    /// Short, fairly conservative output.
    #[must_use]
    pub fn concise() -> Self {
        Self {
            max_new_tokens: 40,
            temperature: 0.6,
            repetition_penalty: 1.25,
            ..Default::default()
        }
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.max_new_tokens == 0 || self.max_new_tokens > MAX_NEW_TOKENS_MAX {
            return Err(GenerationError::InvalidParameters(format!(
                "max_new_tokens must be in 1..={}, got {}",
                MAX_NEW_TOKENS_MAX, self.max_new_tokens
            )));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(GenerationError::InvalidParameters(format!(
                "temperature must be finite and >= 0, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(GenerationError::InvalidParameters(format!(
                "top_p must be in [0, 1], got {}",
                self.top_p
            )));
        }
        if !self.repetition_penalty.is_finite() || self.repetition_penalty < 1.0 {
            return Err(GenerationError::InvalidParameters(format!(
                "repetition_penalty must be finite and >= 1, got {}",
                self.repetition_penalty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(SamplingParameters::default().validate().is_ok());
        assert!(SamplingParameters::concise().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let zero_tokens = SamplingParameters {
            max_new_tokens: 0,
            ..Default::default()
        };
        assert!(zero_tokens.validate().is_err());

        let negative_temp = SamplingParameters {
            temperature: -0.1,
            ..Default::default()
        };
        assert!(negative_temp.validate().is_err());

        let wide_top_p = SamplingParameters {
            top_p: 1.5,
            ..Default::default()
        };
        assert!(wide_top_p.validate().is_err());

        let low_penalty = SamplingParameters {
            repetition_penalty: 0.9,
            ..Default::default()
        };
        assert!(low_penalty.validate().is_err());
    }

    #[test]
    fn test_greedy_is_valid() {
        let greedy = SamplingParameters {
            temperature: 0.0,
            ..Default::default()
        };
        assert!(greedy.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params: SamplingParameters =
            serde_json::from_str(r#"{"temperature": 0.3}"#).unwrap();
        assert_eq!(params.temperature, 0.3);
        assert_eq!(params.max_new_tokens, 60);
    }
}
