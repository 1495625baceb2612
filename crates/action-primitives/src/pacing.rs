//! Randomized pauses between interaction steps

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inclusive millisecond range a pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl PauseRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Uniform sample; bounds given in the wrong order are swapped.
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// When false both pause kinds are skipped.
    pub enabled: bool,
    pub short: PauseRange,
    pub long: PauseRange,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            enabled: true,
            short: PauseRange::new(1_000, 3_000),
            long: PauseRange::new(5_000, 10_000),
        }
    }
}

impl Pacing {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn short_delay(&self) -> Duration {
        if self.enabled {
            self.short.sample()
        } else {
            Duration::ZERO
        }
    }

    pub fn long_delay(&self) -> Duration {
        if self.enabled {
            self.long.sample()
        } else {
            Duration::ZERO
        }
    }
}
