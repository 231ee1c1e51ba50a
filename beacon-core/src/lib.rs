#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
#![forbid(unsafe_code)]

pub mod beacon;
pub mod chain;
pub mod error;
pub mod events;
pub mod node;
pub mod processors;
pub mod utils;

pub use error::BeaconError;
