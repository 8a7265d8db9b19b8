//! CPU usage feed for the limiter.
//!
//! The limiter never reads CPU state on its own. It is handed a [`CpuGetter`],
//! a function returning usage on a `0..=1000` scale (1000 is every core busy).
//! [`CpuSampler`] produces one by polling a raw source on an interval and
//! smoothing it with an exponential moving average. Reading the OS or cgroup
//! counters is up to the caller's source.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::BoxError;
use crate::internal_event::CpuSampled;

/// Upper bound of the usage scale.
pub const MAX_USAGE: i64 = 1000;

/// Returns the current CPU usage in `0..=1000`.
pub type CpuGetter = Arc<dyn Fn() -> i64 + Send + Sync>;

/// A getter that always reports `usage`.
pub fn constant(usage: i64) -> CpuGetter {
    Arc::new(move || usage)
}

/// Configuration of a [`CpuSampler`].
#[derive(Clone, Copy, Debug, PartialEq, Builder, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CpuSamplerSettings {
    /// How often the raw source is polled.
    ///
    /// **Default**: 500ms
    #[builder(default = default_interval())]
    #[serde(with = "humantime_serde")]
    pub(crate) interval: Duration,

    /// Weight of the previous value, `current = prev * decay + sample * (1 - decay)`.
    ///
    /// **Default**: 0.95
    #[builder(default = default_decay())]
    pub(crate) decay: f64,
}

const fn default_interval() -> Duration {
    Duration::from_millis(500)
}

const fn default_decay() -> f64 {
    0.95
}

impl Default for CpuSamplerSettings {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            decay: default_decay(),
        }
    }
}

impl CpuSamplerSettings {
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub const fn decay(&self) -> f64 {
        self.decay
    }
}

/// Background task that keeps a smoothed CPU usage value.
///
/// One sampler per process is enough, every limiter can share its
/// [`getter`](CpuSampler::getter). The task is aborted when the sampler is
/// dropped; getters handed out earlier keep returning the last value.
#[derive(Debug)]
pub struct CpuSampler {
    usage: Arc<AtomicI64>,
    handle: JoinHandle<()>,
}

impl CpuSampler {
    /// Starts polling `source` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime, or if `decay` is not in
    /// `[0, 1]` or the interval is zero.
    pub fn spawn<F>(settings: CpuSamplerSettings, mut source: F) -> Self
    where
        F: FnMut() -> Result<i64, BoxError> + Send + 'static,
    {
        assert!(
            (0.0..=1.0).contains(&settings.decay),
            "decay must be in [0, 1], got {}",
            settings.decay
        );
        assert!(
            !settings.interval.is_zero(),
            "sample interval must be greater than zero"
        );

        let usage = Arc::new(AtomicI64::new(0));
        let shared = Arc::clone(&usage);
        let sampled = CpuSampled.register();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut failing = false;

            loop {
                ticker.tick().await;

                match source() {
                    Ok(sample) => {
                        if std::mem::take(&mut failing) {
                            info!(message = "CPU usage sampling recovered.");
                        }

                        let sample = sample.clamp(0, MAX_USAGE);
                        let prev = shared.load(Ordering::Relaxed);
                        let current = (prev as f64 * settings.decay
                            + sample as f64 * (1.0 - settings.decay))
                            as i64;

                        shared.store(current, Ordering::Relaxed);
                        sampled.emit(current);
                    }
                    // Only the first failure of a streak is logged, the last
                    // good value is kept until the source recovers.
                    Err(error) if !failing => {
                        failing = true;
                        warn!(message = "Failed to sample CPU usage.", %error);
                    }
                    Err(error) => {
                        trace!(message = "CPU usage source still failing.", %error);
                    }
                }
            }
        });

        Self { usage, handle }
    }

    /// Latest smoothed usage.
    pub fn usage(&self) -> i64 {
        self.usage.load(Ordering::Relaxed)
    }

    pub fn getter(&self) -> CpuGetter {
        let usage = Arc::clone(&self.usage);
        Arc::new(move || usage.load(Ordering::Relaxed))
    }
}

impl Drop for CpuSampler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
