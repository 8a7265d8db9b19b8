use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::{Iter, Window};
use crate::instant_now;

/// A [`Window`] whose buckets follow the wall clock.
///
/// Rotation is lazy: nothing ticks in the background. Writers rotate past the
/// buckets that expired since the last write and clear exactly those. Readers
/// compute the same rotation without touching the buckets, so they only need
/// the shared lock and never block each other.
#[derive(Debug)]
pub struct RollingWindow {
    size: usize,
    bucket_duration: Duration,
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    window: Window,
    offset: usize,
    last_update: Instant,
}

impl RollingWindow {
    /// # Panics
    ///
    /// Panics if `size` or `bucket_duration` is zero.
    pub fn new(size: usize, bucket_duration: Duration) -> Self {
        assert!(
            !bucket_duration.is_zero(),
            "bucket duration must be greater than zero"
        );

        Self {
            size,
            bucket_duration,
            inner: RwLock::new(Inner {
                window: Window::new(size),
                offset: 0,
                last_update: instant_now(),
            }),
        }
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    pub const fn bucket_duration(&self) -> Duration {
        self.bucket_duration
    }

    /// Number of whole buckets elapsed since the last rotation.
    pub fn timespan(&self) -> usize {
        let inner = self.inner.read();
        self.span(inner.last_update, instant_now())
    }

    /// Records `value` as a new point of the current bucket.
    pub fn append(&self, value: f64) {
        self.write(|window, offset| window.append(offset, value));
    }

    /// Accumulates `value` into the current bucket.
    pub fn add(&self, value: f64) {
        self.write(|window, offset| window.add(offset, value));
    }

    /// Applies `f` to the buckets that are still inside the window, oldest
    /// first. A fully expired window yields `0.0` without calling `f`.
    pub fn reduce<F>(&self, f: F) -> f64
    where
        F: FnOnce(Iter<'_>) -> f64,
    {
        let inner = self.inner.read();
        let span = self.span(inner.last_update, instant_now());
        if span >= self.size {
            return 0.0;
        }

        let offset = (inner.offset + span + 1) % self.size;
        f(inner.window.iter(offset, self.size - span))
    }

    fn write<F>(&self, f: F)
    where
        F: FnOnce(&mut Window, usize),
    {
        let mut inner = self.inner.write();
        let span = self.span(inner.last_update, instant_now());

        if span > 0 {
            // Advance by whole buckets only, the remainder stays with the
            // current bucket.
            let nanos = self.bucket_duration.as_nanos().saturating_mul(span as u128);
            inner.last_update += Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));

            if span >= self.size {
                inner.window.reset_window();
                inner.offset = 0;
            } else {
                let start = (inner.offset + 1) % self.size;
                inner.window.reset_buckets(start, span);
                inner.offset = (inner.offset + span) % self.size;
            }
        }

        let Inner { window, offset, .. } = &mut *inner;
        f(window, *offset);
    }

    fn span(&self, last_update: Instant, now: Instant) -> usize {
        let elapsed = now.saturating_duration_since(last_update);
        let span = elapsed.as_nanos() / self.bucket_duration.as_nanos();

        usize::try_from(span).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time;

    use super::*;
    use crate::window::reduce;

    const BUCKET: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn rotates_one_bucket_per_duration() {
        let window = RollingWindow::new(3, BUCKET);

        window.append(1.0);
        time::advance(BUCKET).await;
        window.append(2.0);
        time::advance(BUCKET).await;
        window.append(3.0);

        assert_eq!(window.reduce(reduce::sum), 6.0);

        // oldest bucket falls out, nothing is written
        time::advance(BUCKET).await;
        assert_eq!(window.timespan(), 1);
        assert_eq!(window.reduce(reduce::sum), 5.0);

        time::advance(BUCKET).await;
        assert_eq!(window.reduce(reduce::sum), 3.0);

        time::advance(BUCKET).await;
        assert_eq!(window.reduce(reduce::sum), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn write_after_partial_expiry_resets_only_stale_buckets() {
        let window = RollingWindow::new(4, BUCKET);

        for v in 1..=4 {
            window.append(v as f64);
            time::advance(BUCKET).await;
        }
        // back in bucket 0's slot, 1.0 is stale
        assert_eq!(window.reduce(reduce::sum), 9.0);

        time::advance(BUCKET).await;
        // 1.0 and 2.0 are stale now
        window.append(10.0);

        assert_eq!(window.timespan(), 0);
        assert_eq!(window.reduce(reduce::sum), 17.0);
        assert_eq!(window.reduce(reduce::count), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn write_after_full_expiry_resets_everything() {
        let window = RollingWindow::new(3, BUCKET);

        window.append(1.0);
        window.append(2.0);
        time::advance(BUCKET * 10).await;

        assert_eq!(window.reduce(reduce::sum), 0.0);

        window.append(5.0);
        assert_eq!(window.reduce(reduce::sum), 5.0);
        assert_eq!(window.reduce(reduce::count), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_keeps_bucket_grid() {
        let window = RollingWindow::new(3, BUCKET);

        time::advance(Duration::from_millis(150)).await;
        window.append(1.0);

        // 150ms + 60ms crosses into the next bucket at 200ms
        time::advance(Duration::from_millis(60)).await;
        assert_eq!(window.timespan(), 1);

        window.append(1.0);
        assert_eq!(window.timespan(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reduce_does_not_mutate() {
        let window = RollingWindow::new(5, BUCKET);

        window.append(3.0);
        time::advance(BUCKET * 2).await;
        window.append(4.0);
        time::advance(BUCKET * 2).await;

        let first = window.reduce(reduce::sum);
        let second = window.reduce(reduce::sum);
        let third = window.reduce(reduce::sum);

        assert_eq!(first, 7.0);
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(window.timespan(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn counts_only_recent_writes() {
        const SIZE: usize = 10;

        let window = RollingWindow::new(SIZE, BUCKET);
        let mut writes: Vec<u64> = Vec::new();
        let mut elapsed = 0u64;
        let mut seed = 7u64;

        for _ in 0..500 {
            // cheap LCG so the schedule is irregular but reproducible
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let step = (seed >> 33) % 250;

            time::advance(Duration::from_millis(step)).await;
            elapsed += step;

            window.add(1.0);
            writes.push(elapsed / BUCKET.as_millis() as u64);

            let current = elapsed / BUCKET.as_millis() as u64;
            let expected = writes
                .iter()
                .filter(|&&bucket| bucket + SIZE as u64 > current)
                .count();

            assert_eq!(window.reduce(reduce::count), expected as f64);
            assert_eq!(window.reduce(reduce::sum), expected as f64);
        }
    }

    #[test]
    fn concurrent_writers() {
        let window = std::sync::Arc::new(RollingWindow::new(10, Duration::from_secs(1)));

        let handles = (0..8)
            .map(|_| {
                let window = window.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        window.add(1.0);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(window.reduce(reduce::count), 8000.0);
        assert_eq!(window.reduce(reduce::sum), 8000.0);
    }

    #[test]
    #[should_panic(expected = "bucket duration must be greater than zero")]
    fn zero_bucket_duration() {
        RollingWindow::new(3, Duration::ZERO);
    }
}
