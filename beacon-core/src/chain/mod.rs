//! Capabilities the client core consumes from the chain.
//!
//! The core never talks to a chain transport directly. It sees the chain
//! through these narrow traits, split by concern:
//!
//! - [`ChainView`]: read-only state (current request, configuration, stakes)
//! - [`GroupInterface`]: ticket submission and group selection results
//! - [`EventSource`]: relay and group registration event subscriptions
//! - [`BlockCounter`]: block height and waiting for blocks
//!
//! [`RelayChain`] bundles all four. [`local::LocalChain`] is an in-memory
//! implementation used for development and tests.

pub mod local;

use crate::error::BeaconError;
use crate::events::{
    GroupRegistrationSender, GroupSelectionStartSender, GroupTicketSubmission,
    RelayEntryGeneratedSender, RelayEntryRequestedSender,
};
use crate::utils::async_result::AsyncResult;
use async_trait::async_trait;
use beacon_sdk::config::ChainConfig;
use beacon_sdk::objects::{ChainTicket, StakerAddress};
use num_bigint::BigUint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only view of relay chain state.
#[async_trait]
pub trait ChainView: Send + Sync {
    /// The previous entry of the relay request currently recorded on chain.
    ///
    /// Empty when no request is pending.
    async fn current_request_previous_entry(&self) -> Result<Vec<u8>, BeaconError>;

    async fn get_config(&self) -> Result<ChainConfig, BeaconError>;

    /// Amount currently staked by `staker`.
    async fn staked_amount(&self, staker: &StakerAddress) -> Result<BigUint, BeaconError>;
}

/// Group selection operations.
#[async_trait]
pub trait GroupInterface: Send + Sync {
    /// Submit one ticket. Transport failures surface through the returned
    /// result, never as a panic or a missing result.
    async fn submit_ticket(&self, ticket: ChainTicket) -> AsyncResult<GroupTicketSubmission>;

    /// Stakers owning the winning tickets of the current group selection.
    async fn get_selected_participants(&self) -> Result<Vec<StakerAddress>, BeaconError>;

    async fn on_group_selection_started(
        &self,
        sink: GroupSelectionStartSender,
    ) -> Result<Subscription, BeaconError>;
}

/// Relay event subscriptions.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn on_relay_entry_requested(
        &self,
        sink: RelayEntryRequestedSender,
    ) -> Result<Subscription, BeaconError>;

    async fn on_relay_entry_generated(
        &self,
        sink: RelayEntryGeneratedSender,
    ) -> Result<Subscription, BeaconError>;

    async fn on_group_registered(
        &self,
        sink: GroupRegistrationSender,
    ) -> Result<Subscription, BeaconError>;
}

#[async_trait]
pub trait BlockCounter: Send + Sync {
    async fn current_block(&self) -> Result<u64, BeaconError>;

    /// Wait until `blocks` more blocks have been mined and return the block
    /// number reached.
    async fn wait_for_blocks(&self, blocks: u64) -> Result<u64, BeaconError>;
}

/// Everything the beacon needs from a chain.
pub trait RelayChain: ChainView + GroupInterface + EventSource + BlockCounter {}

impl<T> RelayChain for T where T: ChainView + GroupInterface + EventSource + BlockCounter + ?Sized {}

/// Handle for an event subscription.
///
/// Delivery continues until [`unsubscribe`](Subscription::unsubscribe) is
/// called or the receiving end of the sink is dropped. Dropping the handle
/// itself does not stop delivery.
#[derive(Debug, Clone)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery. Calling it more than once is a no-op.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}
