//! BBR style adaptive concurrency limiting.
//!
//! The limiter estimates how much concurrent work the process sustains from
//! Little's law: the largest completion count seen in one bucket times the
//! smallest mean latency seen in one bucket, scaled to a second. It only
//! enforces that estimate while CPU usage is at or above the threshold, and
//! for one second after it last started dropping, so an idle or healthy
//! process is never limited.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use bon::Builder;
use serde::Deserialize;

use super::{DoneInfo, Limiter, Stat};
use crate::cpu::CpuGetter;
use crate::error::LimitExceededSnafu;
use crate::internal_event::{
    LimiterDropStarted, LimiterDropStartedHandle, LimiterRequestDropped,
    LimiterRequestDroppedHandle,
};
use crate::window::{Metric, RollingCounter, RollingSettings};
use crate::{Error, instant_now};

/// After a drop started, requests keep being checked against `max_pass` for
/// this long even if CPU usage went back under the threshold.
const COOLDOWN: Duration = Duration::from_secs(1);

/// Configuration of a [`Bbr`] limiter.
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `window` | 10s | Time covered by the pass and latency statistics |
/// | `buckets` | 100 | Number of buckets the window is split into |
/// | `cpu_threshold` | 800 | Usage (`0..=1000`) at which limiting kicks in |
/// | `cpu_quota` | 0 | Container CPU quota in cores, `0` disables scaling |
///
/// # Example
///
/// ```rust
/// use admission_control::cpu;
/// use admission_control::limiter::{Bbr, BbrSettings};
///
/// let settings = BbrSettings::builder().cpu_threshold(900).build();
/// let limiter = Bbr::new(settings, cpu::constant(0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Builder, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BbrSettings {
    /// Time covered by the pass and latency statistics.
    #[builder(default = default_window())]
    #[serde(with = "humantime_serde")]
    pub(crate) window: Duration,

    /// Number of buckets the window is split into.
    ///
    /// The current bucket is still filling and never contributes to the
    /// estimates, so at least two buckets are needed for the limiter to learn
    /// anything.
    #[builder(default = default_buckets())]
    pub(crate) buckets: usize,

    /// CPU usage, on the `0..=1000` scale, at or above which the limiter
    /// starts enforcing its estimate.
    #[builder(default = default_cpu_threshold())]
    pub(crate) cpu_threshold: i64,

    /// CPU quota of the container in cores.
    ///
    /// When set, usage is rescaled as `usage * available_cpus / cpu_quota`
    /// before it is compared to the threshold.
    #[builder(default)]
    pub(crate) cpu_quota: f64,
}

const fn default_window() -> Duration {
    Duration::from_secs(10)
}

const fn default_buckets() -> usize {
    100
}

const fn default_cpu_threshold() -> i64 {
    800
}

impl Default for BbrSettings {
    fn default() -> Self {
        Self {
            window: default_window(),
            buckets: default_buckets(),
            cpu_threshold: default_cpu_threshold(),
            cpu_quota: 0.0,
        }
    }
}

impl BbrSettings {
    pub const fn window(&self) -> Duration {
        self.window
    }

    pub const fn buckets(&self) -> usize {
        self.buckets
    }

    pub const fn cpu_threshold(&self) -> i64 {
        self.cpu_threshold
    }

    pub const fn cpu_quota(&self) -> f64 {
        self.cpu_quota
    }

    fn rolling(&self) -> RollingSettings {
        RollingSettings::split(self.window, self.buckets)
    }
}

/// Little's law concurrency limiter gated on CPU usage.
///
/// Cloning is cheap, clones share all state.
#[derive(Clone)]
pub struct Bbr {
    shared: Arc<Shared>,
}

struct Shared {
    cpu: CpuGetter,
    cpu_scale: Option<f64>,
    cpu_threshold: i64,

    pass_stat: RollingCounter,
    rt_stat: RollingCounter,
    in_flight: AtomicI64,

    buckets: usize,
    bucket_duration: Duration,
    buckets_per_second: f64,

    epoch: Instant,
    // nanoseconds since `epoch`, zero while not dropping
    prev_drop: AtomicU64,
    max_pass_cache: ArcSwapOption<CounterCache>,
    min_rt_cache: ArcSwapOption<CounterCache>,

    dropped: LimiterRequestDroppedHandle,
    drop_started: LimiterDropStartedHandle,
}

struct CounterCache {
    value: i64,
    time: Instant,
}

impl Bbr {
    /// # Panics
    ///
    /// Panics if `window` is zero, `buckets` is zero or does not fit in a
    /// `u32`, or `cpu_quota` is negative.
    pub fn new(settings: BbrSettings, cpu: CpuGetter) -> Self {
        assert!(
            settings.cpu_quota >= 0.0,
            "cpu quota must not be negative, got {}",
            settings.cpu_quota
        );

        let rolling = settings.rolling();
        let cpu_scale = (settings.cpu_quota > 0.0).then(|| {
            let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
            cpus as f64 / settings.cpu_quota
        });

        Self {
            shared: Arc::new(Shared {
                cpu,
                cpu_scale,
                cpu_threshold: settings.cpu_threshold,

                pass_stat: RollingCounter::new(rolling),
                rt_stat: RollingCounter::new(rolling),
                in_flight: AtomicI64::new(0),

                buckets: settings.buckets,
                bucket_duration: rolling.bucket_duration,
                buckets_per_second: 1.0 / rolling.bucket_duration.as_secs_f64(),

                epoch: instant_now(),
                prev_drop: AtomicU64::new(0),
                max_pass_cache: ArcSwapOption::empty(),
                min_rt_cache: ArcSwapOption::empty(),

                dropped: LimiterRequestDropped.register(),
                drop_started: LimiterDropStarted.register(),
            }),
        }
    }

    pub fn stat(&self) -> Stat {
        self.shared.stat()
    }
}

impl Limiter for Bbr {
    type Done = Done;

    fn allow(&self) -> Result<Done, Error> {
        if self.shared.should_drop() {
            self.shared.dropped.emit(self.shared.stat());
            return LimitExceededSnafu.fail();
        }

        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);

        Ok(Done {
            shared: Arc::clone(&self.shared),
            start: instant_now(),
            finished: false,
        })
    }
}

impl std::fmt::Debug for Bbr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bbr")
            .field("cpu_threshold", &self.shared.cpu_threshold)
            .field("buckets", &self.shared.buckets)
            .field("bucket_duration", &self.shared.bucket_duration)
            .field("in_flight", &self.shared.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn cpu_usage(&self) -> i64 {
        let usage = (self.cpu)();
        match self.cpu_scale {
            Some(scale) => (usage as f64 * scale) as i64,
            None => usage,
        }
    }

    fn should_drop(&self) -> bool {
        let now = instant_now();

        if self.cpu_usage() < self.cpu_threshold {
            let prev_drop = self.prev_drop.load(Ordering::Acquire);
            if prev_drop == 0 {
                return false;
            }

            if self.stamp(now).saturating_sub(prev_drop) <= COOLDOWN.as_nanos() as u64 {
                // Recently dropped, don't let a burst back in at once.
                let in_flight = self.in_flight.load(Ordering::Acquire);
                return in_flight > 1 && in_flight > self.max_pass();
            }

            self.prev_drop.store(0, Ordering::Release);
            return false;
        }

        let in_flight = self.in_flight.load(Ordering::Acquire);
        let drop = in_flight > 1 && in_flight > self.max_in_flight();
        if drop
            && self
                .prev_drop
                .compare_exchange(0, self.stamp(now), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.drop_started.emit(self.stat());
        }

        drop
    }

    /// Largest completion count of a finished bucket, at least 1.
    fn max_pass(&self) -> i64 {
        if let Some(cache) = &*self.max_pass_cache.load() {
            if self.is_fresh(cache.time) {
                return cache.value;
            }
        }

        let value = self.pass_stat.reduce(|iter| {
            iter.take(self.buckets - 1)
                .map(|bucket| bucket.points().iter().sum::<f64>())
                .fold(1.0, f64::max)
        }) as i64;
        let value = value.max(1);

        self.max_pass_cache.store(Some(Arc::new(CounterCache {
            value,
            time: instant_now(),
        })));

        value
    }

    /// Smallest mean round trip time of a finished bucket in milliseconds,
    /// at least 1.
    fn min_rt(&self) -> i64 {
        if let Some(cache) = &*self.min_rt_cache.load() {
            if self.is_fresh(cache.time) {
                return cache.value;
            }
        }

        let value = self.rt_stat.reduce(|iter| {
            iter.take(self.buckets - 1)
                .filter(|bucket| !bucket.is_empty())
                .map(|bucket| bucket.points().iter().sum::<f64>() / bucket.count() as f64)
                .reduce(f64::min)
                .unwrap_or_default()
        });
        let value = (value.ceil() as i64).max(1);

        self.min_rt_cache.store(Some(Arc::new(CounterCache {
            value,
            time: instant_now(),
        })));

        value
    }

    fn max_in_flight(&self) -> i64 {
        let estimate =
            self.max_pass() as f64 * self.min_rt() as f64 * self.buckets_per_second / 1000.0;

        (estimate + 0.5).floor() as i64
    }

    fn stat(&self) -> Stat {
        Stat {
            cpu: self.cpu_usage(),
            in_flight: self.in_flight.load(Ordering::Acquire),
            max_in_flight: self.max_in_flight(),
            min_rt: self.min_rt(),
            max_pass: self.max_pass(),
        }
    }

    fn is_fresh(&self, time: Instant) -> bool {
        instant_now().saturating_duration_since(time) < self.bucket_duration
    }

    fn stamp(&self, now: Instant) -> u64 {
        let nanos = now.saturating_duration_since(self.epoch).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX).max(1)
    }
}

/// Handle of a request admitted by [`Bbr`].
///
/// Completing it records the round trip time and the completion. Dropping it
/// without calling [`finish`](Done::finish) completes it as well, so every
/// admitted request is accounted for exactly once.
#[must_use = "dropping the handle completes the request immediately"]
pub struct Done {
    shared: Arc<Shared>,
    start: Instant,
    finished: bool,
}

impl Done {
    pub fn finish(mut self, info: DoneInfo) {
        self.complete(&info);
    }

    fn complete(&mut self, _info: &DoneInfo) {
        if self.finished {
            return;
        }
        self.finished = true;

        let elapsed = instant_now().saturating_duration_since(self.start);
        let rt = elapsed.as_nanos().div_ceil(1_000_000);
        if rt > 0 {
            self.shared.rt_stat.add(i64::try_from(rt).unwrap_or(i64::MAX));
        }

        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.shared.pass_stat.add(1);
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        self.complete(&DoneInfo::default());
    }
}

impl std::fmt::Debug for Done {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done")
            .field("start", &self.start)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
