//! Reproducible backend faults.
//!
//! A [`FaultInjector`] sits in front of a simulated model and decides, per
//! generation call, whether the call fails and how long it stalls. Scheduled
//! failures hit exact call numbers; random ones draw from the injector's own
//! [`DeterministicRng`], so a seed replays the same failure pattern.

use std::time::Duration;

use crate::random::DeterministicRng;

/// What to inject. The default injects nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultConfig {
    /// Chance that any call fails, in `[0, 1]`
    pub failure_probability: f64,
    /// Call numbers (1-based) that always fail
    pub fail_on_calls: Vec<u64>,
    /// Chance that a call stalls, in `[0, 1]`
    pub delay_probability: f64,
    /// Longest stall
    pub delay_ms_max: u64,
}

impl FaultConfig {
    /// Nothing is injected.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Fail exactly these calls.
    #[must_use]
    pub fn fail_on(calls: impl IntoIterator<Item = u64>) -> Self {
        Self {
            fail_on_calls: calls.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Fail each call with probability `p`.
    #[must_use]
    pub fn flaky(p: f64) -> Self {
        Self {
            failure_probability: p,
            ..Self::default()
        }
    }

    /// Stall each call with probability `p`, for up to `max`.
    #[must_use]
    pub fn with_delays(mut self, p: f64, max: Duration) -> Self {
        self.delay_probability = p;
        self.delay_ms_max = max.as_millis() as u64;
        self
    }

    fn is_inert(&self) -> bool {
        self.failure_probability == 0.0
            && self.fail_on_calls.is_empty()
            && (self.delay_probability == 0.0 || self.delay_ms_max == 0)
    }
}

/// Per-call fault decisions.
#[derive(Debug)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!((0.0..=1.0).contains(&config.failure_probability));
        debug_assert!((0.0..=1.0).contains(&config.delay_probability));
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    /// Injector that only counts calls.
    pub fn disabled() -> Self {
        Self::new(DeterministicRng::new(1), FaultConfig::none())
    }

    /// Register one call; `true` if it must fail.
    pub fn should_fail(&mut self) -> bool {
        self.stats.calls_count += 1;
        if self.config.is_inert() {
            return false;
        }

        let call = self.stats.calls_count;
        let fail = self.config.fail_on_calls.contains(&call)
            || (self.config.failure_probability > 0.0
                && self.rng.gen_bool(self.config.failure_probability));
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Stall for the current call, if one is drawn.
    pub fn maybe_delay(&mut self) -> Option<Duration> {
        if self.config.delay_ms_max == 0 || self.config.delay_probability == 0.0 {
            return None;
        }
        if !self.rng.gen_bool(self.config.delay_probability) {
            return None;
        }
        self.stats.delays_count += 1;
        Some(Duration::from_millis(
            self.rng.gen_range(1..=self.config.delay_ms_max),
        ))
    }

    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}

/// Counters kept by a [`FaultInjector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub calls_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_only_counts() {
        let mut injector = FaultInjector::disabled();
        for _ in 0..500 {
            assert!(!injector.should_fail());
            assert_eq!(injector.maybe_delay(), None);
        }
        assert_eq!(
            injector.stats(),
            FaultStats {
                calls_count: 500,
                faults_count: 0,
                delays_count: 0
            }
        );
    }

    #[test]
    fn test_scheduled_failures() {
        let mut injector =
            FaultInjector::new(DeterministicRng::new(1), FaultConfig::fail_on([2, 4]));
        let outcomes: Vec<bool> = (0..5).map(|_| injector.should_fail()).collect();
        assert_eq!(outcomes, vec![false, true, false, true, false]);
        assert_eq!(injector.stats().faults_count, 2);
    }

    #[test]
    fn test_same_seed_same_failures() {
        let run = |seed| {
            let mut injector =
                FaultInjector::new(DeterministicRng::new(seed), FaultConfig::flaky(0.3));
            (0..200).map(|_| injector.should_fail()).collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_failure_rate() {
        let mut injector =
            FaultInjector::new(DeterministicRng::new(12345), FaultConfig::flaky(0.5));
        let failures = (0..10_000).filter(|_| injector.should_fail()).count();
        assert!((4_500..=5_500).contains(&failures), "{} failures", failures);
    }

    #[test]
    fn test_delays_bounded() {
        let config = FaultConfig::none().with_delays(1.0, Duration::from_millis(20));
        let mut injector = FaultInjector::new(DeterministicRng::new(3), config);

        for _ in 0..100 {
            let delay = injector.maybe_delay().unwrap();
            assert!(delay >= Duration::from_millis(1) && delay <= Duration::from_millis(20));
        }
        assert_eq!(injector.stats().delays_count, 100);
        // Delays alone never fail a call
        assert!(!injector.should_fail());
    }
}
