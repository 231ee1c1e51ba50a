//! Configuration types consumed from the chain.

mod chain;

pub use chain::ChainConfig;
