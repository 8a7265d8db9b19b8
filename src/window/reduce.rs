//! Reductions over the live buckets of a rolling window.
//!
//! Every function here is pure and returns `0.0` for an empty window.

use super::Iter;

/// Sum of every point in every bucket.
pub fn sum(iter: Iter<'_>) -> f64 {
    iter.flat_map(|bucket| bucket.points()).sum()
}

/// Mean over all points, `0.0` when there are none.
pub fn avg(iter: Iter<'_>) -> f64 {
    let (total, points) = iter
        .flat_map(|bucket| bucket.points())
        .fold((0.0, 0usize), |(total, points), p| (total + p, points + 1));

    if points == 0 {
        return 0.0;
    }

    total / points as f64
}

/// Smallest point. The first point seen seeds the result, so an empty window
/// reads as `0.0`.
pub fn min(iter: Iter<'_>) -> f64 {
    iter.flat_map(|bucket| bucket.points())
        .copied()
        .reduce(f64::min)
        .unwrap_or_default()
}

/// Largest point, seeded the same way as [`min`].
pub fn max(iter: Iter<'_>) -> f64 {
    iter.flat_map(|bucket| bucket.points())
        .copied()
        .reduce(f64::max)
        .unwrap_or_default()
}

/// Sum of the per bucket write counts. For counters this is larger than the
/// number of stored points.
pub fn count(iter: Iter<'_>) -> f64 {
    iter.map(|bucket| bucket.count() as f64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Window;

    fn window() -> Window {
        let mut window = Window::new(3);
        window.append(0, 1.0);
        window.append(0, 2.0);
        window.append(1, 3.0);
        window.append(2, 4.0);
        window.append(2, 5.0);
        window
    }

    #[test]
    fn aggregations() {
        let window = window();

        assert_eq!(sum(window.iter(0, 3)), 15.0);
        assert_eq!(avg(window.iter(0, 3)), 3.0);
        assert_eq!(min(window.iter(0, 3)), 1.0);
        assert_eq!(max(window.iter(0, 3)), 5.0);
        assert_eq!(count(window.iter(0, 3)), 5.0);
    }

    #[test]
    fn partial_iteration() {
        let window = window();

        assert_eq!(sum(window.iter(1, 2)), 12.0);
        assert_eq!(min(window.iter(1, 2)), 3.0);
        assert_eq!(max(window.iter(2, 2)), 5.0);
    }

    #[test]
    fn empty_window_is_zero() {
        let window = Window::new(3);

        assert_eq!(sum(window.iter(0, 3)), 0.0);
        assert_eq!(avg(window.iter(0, 3)), 0.0);
        assert_eq!(min(window.iter(0, 3)), 0.0);
        assert_eq!(max(window.iter(0, 3)), 0.0);
        assert_eq!(count(window.iter(0, 3)), 0.0);
    }

    #[test]
    fn negative_points() {
        let mut window = Window::new(2);
        window.append(0, -4.0);
        window.append(1, -1.0);

        assert_eq!(min(window.iter(0, 2)), -4.0);
        assert_eq!(max(window.iter(0, 2)), -1.0);
    }

    #[test]
    fn count_exceeds_points_when_accumulated() {
        let mut window = Window::new(2);
        window.add(0, 1.0);
        window.add(0, 1.0);
        window.add(0, 0.0);

        assert_eq!(sum(window.iter(0, 2)), 2.0);
        assert_eq!(count(window.iter(0, 2)), 3.0);
    }
}
