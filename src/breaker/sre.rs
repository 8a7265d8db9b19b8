//! Google SRE client side throttling.
//!
//! The breaker keeps one rolling counter of outcomes, `1` for a success and
//! `0` for a failure. With `k = 1 / success_ratio`, once
//! `total >= max(min_requests, k * success)` every call is dropped with
//! probability `(total - k * success) / (total + 1)`. Backpressure grows
//! smoothly with the failure rate and recovers as soon as successes do.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use super::{CircuitBreaker, State};
use crate::Error;
use crate::error::NotAllowedSnafu;
use crate::internal_event::{
    BreakerRequestDropped, BreakerRequestDroppedHandle, BreakerStateChanged,
    BreakerStateChangedHandle,
};
use crate::window::{Metric, RollingCounter, RollingSettings};

/// Configuration of an [`SreBreaker`].
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `success_ratio` | 0.6 | Fraction of requests expected to succeed once throttling begins |
/// | `min_requests` | 100 | No throttling below this many requests per window |
/// | `window` | 3s | Time covered by the outcome statistics |
/// | `buckets` | 10 | Number of buckets the window is split into |
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use admission_control::breaker::SreSettings;
///
/// let settings = SreSettings::builder()
///     .success_ratio(0.8)
///     .window(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Builder, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SreSettings {
    /// Target success ratio, `0 < success_ratio <= 1`.
    ///
    /// Lower values tolerate more failures before requests get shed.
    #[builder(default = default_success_ratio())]
    pub(crate) success_ratio: f64,

    /// Request volume per window below which the breaker never throttles.
    #[builder(default = default_min_requests())]
    pub(crate) min_requests: i64,

    /// Time covered by the outcome statistics.
    #[builder(default = default_window())]
    #[serde(with = "humantime_serde")]
    pub(crate) window: Duration,

    /// Number of buckets the window is split into.
    #[builder(default = default_buckets())]
    pub(crate) buckets: usize,
}

const fn default_success_ratio() -> f64 {
    0.6
}

const fn default_min_requests() -> i64 {
    100
}

const fn default_window() -> Duration {
    Duration::from_secs(3)
}

const fn default_buckets() -> usize {
    10
}

impl Default for SreSettings {
    fn default() -> Self {
        Self {
            success_ratio: default_success_ratio(),
            min_requests: default_min_requests(),
            window: default_window(),
            buckets: default_buckets(),
        }
    }
}

impl SreSettings {
    pub const fn success_ratio(&self) -> f64 {
        self.success_ratio
    }

    pub const fn min_requests(&self) -> i64 {
        self.min_requests
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    pub const fn buckets(&self) -> usize {
        self.buckets
    }

    fn rolling(&self) -> RollingSettings {
        RollingSettings::split(self.window, self.buckets)
    }
}

/// Probabilistic circuit breaker driven by the recent success ratio.
#[derive(Debug)]
pub struct SreBreaker {
    stat: RollingCounter,
    k: f64,
    min_requests: i64,
    state: AtomicU8,

    state_changed: BreakerStateChangedHandle,
    dropped: BreakerRequestDroppedHandle,
}

impl SreBreaker {
    /// # Panics
    ///
    /// Panics if `success_ratio` is not in `(0, 1]`, if `window` is zero, or
    /// if `buckets` is zero or does not fit in a `u32`.
    pub fn new(settings: SreSettings) -> Self {
        assert!(
            settings.success_ratio > 0.0 && settings.success_ratio <= 1.0,
            "success ratio must be in (0, 1], got {}",
            settings.success_ratio
        );

        Self {
            stat: RollingCounter::new(settings.rolling()),
            k: 1.0 / settings.success_ratio,
            min_requests: settings.min_requests,
            state: AtomicU8::new(State::Closed as u8),

            state_changed: BreakerStateChanged.register(),
            dropped: BreakerRequestDropped.register(),
        }
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Successes and total outcomes inside the window.
    pub fn summary(&self) -> (i64, i64) {
        let mut success = 0.0;
        let mut total = 0;

        self.stat.reduce(|iter| {
            for bucket in iter {
                total += bucket.count();
                success += bucket.points().iter().sum::<f64>();
            }
            0.0
        });

        (success as i64, total)
    }

    fn transition(&self, from: State, to: State) {
        if self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.state_changed.emit(to);
        }
    }
}

impl Default for SreBreaker {
    fn default() -> Self {
        Self::new(SreSettings::default())
    }
}

impl CircuitBreaker for SreBreaker {
    fn allow(&self) -> Result<(), Error> {
        let (success, total) = self.summary();

        let Some(drop_ratio) = drop_probability(self.k, self.min_requests, success, total) else {
            self.transition(State::Open, State::Closed);
            return Ok(());
        };

        self.transition(State::Closed, State::Open);

        if rand::random::<f64>() < drop_ratio {
            self.dropped.emit(drop_ratio);
            return NotAllowedSnafu.fail();
        }

        Ok(())
    }

    fn mark_success(&self) {
        self.stat.add(1);
    }

    fn mark_failed(&self) {
        // a failure still counts towards the total
        self.stat.add(0);
    }
}

/// `None` while the breaker should stay closed, otherwise the probability of
/// dropping the next call.
fn drop_probability(k: f64, min_requests: i64, success: i64, total: i64) -> Option<f64> {
    let requests = k * success as f64;
    if total < min_requests || (total as f64) < requests {
        return None;
    }

    Some(((total as f64 - requests) / (total + 1) as f64).max(0.0))
}
