use snafu::Snafu;

/// Boxed error carried through [`crate::limiter::DoneInfo`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Rejections produced by the admission guards.
///
/// Both variants are local, immediate decisions. Nothing in this crate retries
/// them; callers fail fast or queue elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The circuit breaker decided to shed this call.
    #[snafu(display("circuit breaker is open, request not allowed"))]
    NotAllowed,

    /// The concurrency limiter decided to shed this call.
    #[snafu(display("concurrency limit exceeded"))]
    LimitExceeded,
}

impl Error {
    pub const fn is_not_allowed(&self) -> bool {
        matches!(self, Error::NotAllowed)
    }

    pub const fn is_limit_exceeded(&self) -> bool {
        matches!(self, Error::LimitExceeded)
    }
}
