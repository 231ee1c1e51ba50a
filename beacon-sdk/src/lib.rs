//! Shared data types for the random beacon client.
//!
//! Everything here is plain data: lottery tickets and their on-chain
//! representation, staker addresses, and the chain configuration consumed by
//! the client core. No async runtime is required.

#![forbid(unsafe_code)]

pub mod bytes;
pub mod config;
pub mod error;
pub mod objects;

pub use error::InvalidArgument;
