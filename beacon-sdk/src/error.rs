use thiserror::Error;

/// Malformed input handed to one of the SDK constructors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidArgument {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("wrong length: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("virtual staker index must be positive")]
    NonPositiveVirtualStakerIndex,

    #[error("value does not fit into {0} bytes")]
    ValueTooLarge(usize),

    #[error("invalid number: {0}")]
    InvalidNumber(String),
}
