//! Error taxonomy shared by the client core.

use beacon_sdk::InvalidArgument;
use thiserror::Error;

/// Errors produced by the client core.
///
/// `Clone` so that every waiter on an
/// [`AsyncResult`](crate::utils::async_result::AsyncResult) observes the same
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeaconError {
    /// Chain read or write failed; transient.
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    /// Malformed hex, wrong-length bytes, non-positive virtual staker index.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),

    /// Cooperative termination.
    #[error("operation cancelled")]
    Cancelled,

    /// The chain accepted the call but rejected it logically.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// A startup precondition does not hold, e.g. the account is unstaked.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}
