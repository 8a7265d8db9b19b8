use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use super::{Iter, RollingWindow, reduce};

/// Shape of a rolling metric: `size` buckets of `bucket_duration` each.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use admission_control::window::{Metric, RollingCounter, RollingSettings};
///
/// let settings = RollingSettings::builder()
///     .size(10)
///     .bucket_duration(Duration::from_millis(300))
///     .build();
/// let counter = RollingCounter::new(settings);
/// counter.add(1);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Builder, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RollingSettings {
    /// Number of buckets in the ring.
    ///
    /// **Default**: 10
    #[builder(default = default_size())]
    pub(crate) size: usize,

    /// Time slice covered by one bucket.
    ///
    /// **Default**: 100ms
    #[builder(default = default_bucket_duration())]
    #[serde(with = "humantime_serde")]
    pub(crate) bucket_duration: Duration,
}

const fn default_size() -> usize {
    10
}

const fn default_bucket_duration() -> Duration {
    Duration::from_millis(100)
}

impl Default for RollingSettings {
    fn default() -> Self {
        Self {
            size: default_size(),
            bucket_duration: default_bucket_duration(),
        }
    }
}

impl RollingSettings {
    pub const fn size(&self) -> usize {
        self.size
    }

    pub const fn bucket_duration(&self) -> Duration {
        self.bucket_duration
    }

    /// Total time covered by the window.
    pub fn window(&self) -> Duration {
        self.bucket_duration * self.size as u32
    }

    /// Splits `window` into `buckets` buckets of equal duration.
    ///
    /// # Panics
    ///
    /// Panics if `buckets` is zero or does not fit in a `u32`.
    pub(crate) fn split(window: Duration, buckets: usize) -> Self {
        let count = u32::try_from(buckets).unwrap_or(0);
        assert!(
            count > 0,
            "buckets must be in 1..={}, got {buckets}",
            u32::MAX
        );

        Self {
            size: buckets,
            bucket_duration: window / count,
        }
    }
}

/// A sample sink that can be read back as a single value.
pub trait Metric {
    fn add(&self, value: i64);

    fn value(&self) -> i64;
}

/// Reductions over every live point of a metric.
pub trait Aggregation {
    fn min(&self) -> f64;

    fn max(&self) -> f64;

    fn avg(&self) -> f64;

    fn sum(&self) -> f64;
}

/// Monotonic counter over a rolling window.
///
/// Each bucket keeps one accumulated point; its count is the number of
/// writes, so `sum` and `count` reductions give successes and totals for
/// 0/1 event streams.
#[derive(Debug)]
pub struct RollingCounter {
    window: RollingWindow,
}

impl RollingCounter {
    pub fn new(settings: RollingSettings) -> Self {
        Self {
            window: RollingWindow::new(settings.size, settings.bucket_duration),
        }
    }

    pub fn reduce<F>(&self, f: F) -> f64
    where
        F: FnOnce(Iter<'_>) -> f64,
    {
        self.window.reduce(f)
    }

    pub fn timespan(&self) -> usize {
        self.window.timespan()
    }
}

impl Metric for RollingCounter {
    /// Negative values are ignored, use a [`RollingGauge`] for values that go
    /// down.
    fn add(&self, value: i64) {
        if value < 0 {
            debug!(message = "Ignoring negative value for rolling counter.", value);
            return;
        }

        self.window.add(value as f64);
    }

    fn value(&self) -> i64 {
        self.sum() as i64
    }
}

impl Aggregation for RollingCounter {
    fn min(&self) -> f64 {
        self.reduce(reduce::min)
    }

    fn max(&self) -> f64 {
        self.reduce(reduce::max)
    }

    fn avg(&self) -> f64 {
        self.reduce(reduce::avg)
    }

    fn sum(&self) -> f64 {
        self.reduce(reduce::sum)
    }
}

/// Gauge over a rolling window, every sample is kept as its own point.
#[derive(Debug)]
pub struct RollingGauge {
    window: RollingWindow,
}

impl RollingGauge {
    pub fn new(settings: RollingSettings) -> Self {
        Self {
            window: RollingWindow::new(settings.size, settings.bucket_duration),
        }
    }

    pub fn reduce<F>(&self, f: F) -> f64
    where
        F: FnOnce(Iter<'_>) -> f64,
    {
        self.window.reduce(f)
    }

    pub fn timespan(&self) -> usize {
        self.window.timespan()
    }
}

impl Metric for RollingGauge {
    fn add(&self, value: i64) {
        self.window.append(value as f64);
    }

    fn value(&self) -> i64 {
        self.sum() as i64
    }
}

impl Aggregation for RollingGauge {
    fn min(&self) -> f64 {
        self.reduce(reduce::min)
    }

    fn max(&self) -> f64 {
        self.reduce(reduce::max)
    }

    fn avg(&self) -> f64 {
        self.reduce(reduce::avg)
    }

    fn sum(&self) -> f64 {
        self.reduce(reduce::sum)
    }
}
