//! Concurrency limiting.

mod bbr;

pub use bbr::{Bbr, BbrSettings, Done};

use crate::{BoxError, Error};

/// Admission control for inbound work.
///
/// A successful [`allow`](Limiter::allow) hands back a handle that tracks the
/// admitted request until it is completed.
pub trait Limiter: Send + Sync {
    type Done;

    /// Returns [`Error::LimitExceeded`] when the request should be shed.
    fn allow(&self) -> Result<Self::Done, Error>;
}

/// Outcome of an admitted request, reported when it completes.
#[derive(Debug, Default)]
pub struct DoneInfo {
    pub error: Option<BoxError>,
}

impl DoneInfo {
    pub fn error(error: impl Into<BoxError>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }
}

/// Point in time view of a limiter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// CPU usage as seen by the limiter, `0..=1000` before quota scaling.
    pub cpu: i64,
    pub in_flight: i64,
    pub max_in_flight: i64,
    /// Smallest per bucket mean round trip time, in milliseconds.
    pub min_rt: i64,
    /// Largest per bucket completion count.
    pub max_pass: i64,
}
