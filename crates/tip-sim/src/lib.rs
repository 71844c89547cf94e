//! # tip-sim
//!
//! Deterministic simulation of the generation backend.
//!
//! Everything that is random in the pipeline draws from a seeded
//! [`DeterministicRng`], so a whole tip request is reproducible from one seed:
//!
//! ```rust
//! use tip_sim::DeterministicRng;
//!
//! let mut rng = DeterministicRng::new(12345);
//! let nonce = rng.gen_range(1000..=9999);
//! assert!((1000..=9999).contains(&nonce));
//! ```
//!
//! [`SimulatedModel`] stands in for a real language model: it replays a
//! script of raw outputs (or draws from a pool of canned ones), follows the
//! causal/seq2seq output layout, and can inject failures through a
//! [`FaultInjector`].
//!
//! ## Reproducibility
//!
//! ```bash
//! TIP_SEED=12345 tip-generate --simulate
//! ```

pub mod fault;
pub mod model;
pub mod random;

pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use model::{ByteTokenizer, SimulatedLoader, SimulatedModel, CANNED_OUTPUTS};
pub use random::DeterministicRng;

/// Environment variable holding a reproduction seed.
pub const SEED_ENV_VAR: &str = "TIP_SEED";

/// Get the seed from `TIP_SEED` or generate a random one.
///
/// Logs the seed for reproduction. An unparsable or zero value is ignored
/// with a warning.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var(SEED_ENV_VAR) {
        Ok(s) => match s.parse::<u64>().ok().filter(|&seed| seed != 0) {
            Some(seed) => {
                tracing::info!(seed, "{}={} (from environment)", SEED_ENV_VAR, seed);
                seed
            }
            None => {
                let seed = random_seed();
                tracing::warn!(
                    value = %s,
                    seed,
                    "{} is not a non-zero u64, using a random seed",
                    SEED_ENV_VAR
                );
                seed
            }
        },
        Err(_) => {
            let seed = random_seed();
            tracing::info!(seed, "{}={} (randomly generated)", SEED_ENV_VAR, seed);
            seed
        }
    }
}

/// Random non-zero seed.
#[must_use]
pub fn random_seed() -> u64 {
    rand::random::<u64>() | 1
}
