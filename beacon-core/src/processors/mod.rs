//! Event processors.
//!
//! - `EventDispatcher`: receives chain events, gates them through the
//!   `Deduplicator` and hands accepted work to the `Node`

pub mod dispatcher;

pub use dispatcher::EventDispatcher;
