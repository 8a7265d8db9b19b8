//! Time windowed statistics.
//!
//! A [`Window`] is a fixed ring of [`Bucket`]s. [`RollingWindow`] maps wall
//! clock time onto that ring, expiring buckets lazily on the next write, and
//! [`RollingCounter`]/[`RollingGauge`] are the typed facades used by the
//! breaker and the limiter.

mod metric;
pub mod reduce;
mod rolling;

pub use metric::{Aggregation, Metric, RollingCounter, RollingGauge, RollingSettings};
pub use rolling::RollingWindow;

/// All samples recorded inside one time slice.
///
/// `count` is tracked apart from `points.len()` so counters can accumulate in
/// place: a bucket written with [`Window::add`] holds a single point and a
/// count of every write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bucket {
    points: Vec<f64>,
    count: i64,
}

impl Bucket {
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub const fn count(&self) -> i64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn append(&mut self, value: f64) {
        self.points.push(value);
        self.count += 1;
    }

    fn add(&mut self, index: usize, value: f64) {
        self.points[index] += value;
        self.count += 1;
    }

    fn reset(&mut self) {
        // keeps the allocation, buckets are recycled for the life of the window
        self.points.clear();
        self.count = 0;
    }
}

/// Fixed size ring of buckets. The bucket after `i` is `(i + 1) % size`.
#[derive(Clone, Debug)]
pub struct Window {
    buckets: Vec<Bucket>,
}

impl Window {
    /// Creates a window of `size` empty buckets.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "window size must be greater than zero");

        Self {
            buckets: vec![Bucket::default(); size],
        }
    }

    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    pub fn reset_window(&mut self) {
        self.buckets.iter_mut().for_each(Bucket::reset);
    }

    pub fn reset_bucket(&mut self, offset: usize) {
        let size = self.size();
        self.buckets[offset % size].reset();
    }

    /// Resets `count` consecutive buckets starting at `offset`, wrapping
    /// around the ring.
    pub fn reset_buckets(&mut self, offset: usize, count: usize) {
        let size = self.size();
        for i in 0..count.min(size) {
            self.buckets[(offset + i) % size].reset();
        }
    }

    /// Pushes a new point into the bucket at `offset`.
    pub fn append(&mut self, offset: usize, value: f64) {
        self.buckets[offset].append(value);
    }

    /// Accumulates `value` into the first point of the bucket at `offset`,
    /// appending when the bucket is still empty.
    pub fn add(&mut self, offset: usize, value: f64) {
        let bucket = &mut self.buckets[offset];
        if bucket.count == 0 || bucket.points.is_empty() {
            bucket.append(value);
        } else {
            bucket.add(0, value);
        }
    }

    pub fn bucket(&self, offset: usize) -> &Bucket {
        &self.buckets[offset]
    }

    /// Returns a read-only cursor over `count` buckets starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is larger than the window or `offset` is out of range.
    pub fn iter(&self, offset: usize, count: usize) -> Iter<'_> {
        assert!(
            offset < self.size() && count <= self.size(),
            "iterator out of range: offset {offset}, count {count}, size {}",
            self.size()
        );

        Iter {
            window: self,
            offset,
            count,
            cur: 0,
        }
    }
}

/// Walks `count` buckets of a [`Window`] starting at some offset, oldest
/// first.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    window: &'a Window,
    offset: usize,
    count: usize,
    cur: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Bucket;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur >= self.count {
            return None;
        }

        let bucket = &self.window.buckets[(self.offset + self.cur) % self.window.size()];
        self.cur += 1;

        Some(bucket)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.cur;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}
