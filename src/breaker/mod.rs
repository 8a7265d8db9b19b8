//! Client side circuit breaking.

mod sre;

pub use sre::{SreBreaker, SreSettings};

use crate::Error;

/// Breaker state as last observed by [`CircuitBreaker::allow`].
///
/// The state only annotates the most recent decision. Whether a call gets
/// through is decided on every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Closed = 0,
    Open = 1,
}

impl State {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => State::Open,
            _ => State::Closed,
        }
    }
}

/// A guard that sheds calls to a failing dependency.
///
/// Callers check [`allow`](CircuitBreaker::allow) before doing the work and
/// report the outcome afterwards.
pub trait CircuitBreaker: Send + Sync {
    /// Returns [`Error::NotAllowed`] when the call should be rejected.
    fn allow(&self) -> Result<(), Error>;

    fn mark_success(&self);

    fn mark_failed(&self);
}
