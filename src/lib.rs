//! Adaptive admission control.
//!
//! Two guards that turn downstream trouble into upstream rejections without
//! hand tuned thresholds, both built on a lazily rotated rolling window:
//!
//! - [`breaker::SreBreaker`]: Google SRE client side throttling. Drops calls
//!   with a probability that grows as the recent success ratio falls below
//!   the target.
//! - [`limiter::Bbr`]: caps in-flight requests at `max_pass * min_rt` once
//!   CPU usage crosses a threshold.
//!
//! Both decide synchronously on the caller's thread, take no lock besides
//! the rolling window's read-write lock, and can be stacked around the same
//! call.
//!
//! # Usage
//!
//! ```rust
//! use admission_control::breaker::{CircuitBreaker, SreBreaker};
//! use admission_control::cpu;
//! use admission_control::limiter::{Bbr, BbrSettings, DoneInfo, Limiter};
//!
//! let breaker = SreBreaker::default();
//! let limiter = Bbr::new(BbrSettings::default(), cpu::constant(200));
//!
//! if breaker.allow().is_ok() {
//!     if let Ok(done) = limiter.allow() {
//!         // ... do the work ...
//!         breaker.mark_success();
//!         done.finish(DoneInfo::default());
//!     }
//! }
//! ```
//!
//! # Metrics
//! Emits `metrics` counters and histograms on breaker state changes and on
//! every shed request, see the `internal_event` module.

pub mod breaker;
pub mod cpu;
mod error;
pub mod group;
mod internal_event;
pub mod limiter;
pub mod window;

#[cfg(test)]
mod test_util;

#[macro_use]
extern crate tracing;

pub use error::{BoxError, Error};

fn instant_now() -> std::time::Instant {
    tokio::time::Instant::now().into()
}
