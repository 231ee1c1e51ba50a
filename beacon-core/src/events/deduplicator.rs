//! Duplicate event suppression.
//!
//! The chain event subscription may emit the same event two or more times,
//! right after the first delivery or a long time later. The `Deduplicator`
//! sits in front of the event handlers and decides whether an event is new
//! work or a duplicate of something already being handled.
//!
//! Two event kinds are tracked, each in its own scope with its own lock:
//!
//! - group selection started
//! - relay entry requested
//!
//! The scopes share no state and never take each other's lock, so the two
//! event streams can be gated concurrently.

use crate::chain::ChainView;
use crate::error::BeaconError;
use beacon_sdk::bytes::normalize_hex;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Length of a relay entry in bytes.
const ENTRY_LENGTH: usize = 32;

/// Relay request the node is currently working on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    /// 0 means no request has been seen yet.
    pub current_request_start_block: u64,
    /// Lowercase hex, 64 characters once a request has been accepted.
    pub current_request_previous_entry: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GroupSelectionState {
    current_group_selection_start_block: u64,
}

/// Decides whether a chain event should be handled or ignored as a duplicate.
pub struct Deduplicator {
    chain: Arc<dyn ChainView>,
    min_group_selection_duration_blocks: u64,
    group_selection: Mutex<GroupSelectionState>,
    relay_entry: Mutex<RequestState>,
}

impl Deduplicator {
    pub fn new(chain: Arc<dyn ChainView>, min_group_selection_duration_blocks: u64) -> Self {
        Self {
            chain,
            min_group_selection_duration_blocks,
            group_selection: Mutex::new(GroupSelectionState::default()),
            relay_entry: Mutex::new(RequestState::default()),
        }
    }

    /// Called when a group selection started event arrives. Returns `true`
    /// if the node should run group selection, `false` if the event is a
    /// duplicate.
    ///
    /// A new group selection cannot start before the previous one has run
    /// for at least the minimum duration, so any start block inside that
    /// window is treated as a replay of the event already handled.
    pub async fn notify_group_selection_started(&self, new_start_block: u64) -> bool {
        let mut state = self.group_selection.lock().await;

        let current = state.current_group_selection_start_block;
        let min_current_end_block = current.saturating_add(self.min_group_selection_duration_blocks);

        if current == 0 || new_start_block > min_current_end_block {
            state.current_group_selection_start_block = new_start_block;
            debug!(
                start_block = new_start_block,
                previous_start_block = current,
                "Accepted group selection start"
            );
            return true;
        }

        info!(
            start_block = new_start_block,
            current_start_block = current,
            "Ignoring duplicate group selection start"
        );
        false
    }

    /// Called when a relay entry requested event arrives. Returns `Ok(true)`
    /// if the node should start relay entry generation and `Ok(false)` if the
    /// event is a duplicate.
    ///
    /// A timed-out request is retried with the same previous entry, so a
    /// later event carrying the current previous entry may be either a
    /// genuine retry or a late duplicate; the chain decides which. If that
    /// chain read fails the error is returned, the state is left untouched
    /// and the caller must not proceed.
    pub async fn notify_relay_entry_started(
        &self,
        new_start_block: u64,
        new_previous_entry_hex: &str,
    ) -> Result<bool, BeaconError> {
        let new_previous_entry = normalize_hex(new_previous_entry_hex, ENTRY_LENGTH)?;

        let mut state = self.relay_entry.lock().await;

        let accept = if state.current_request_start_block == 0 {
            true
        } else if new_start_block <= state.current_request_start_block {
            false
        } else if new_previous_entry != state.current_request_previous_entry {
            true
        } else {
            // Held across the chain read; the retry branch is rare.
            let on_chain = self.chain.current_request_previous_entry().await?;
            let on_chain = hex::encode(on_chain);
            debug!(
                start_block = new_start_block,
                previous_entry = %new_previous_entry,
                on_chain_previous_entry = %on_chain,
                "Consulted chain for relay request with unchanged previous entry"
            );
            on_chain == new_previous_entry
        };

        if !accept {
            info!(
                start_block = new_start_block,
                current_start_block = state.current_request_start_block,
                previous_entry = %new_previous_entry,
                "Ignoring duplicate relay entry request"
            );
            return Ok(false);
        }

        debug!(
            start_block = new_start_block,
            previous_entry = %new_previous_entry,
            "Accepted relay entry request"
        );
        state.current_request_start_block = new_start_block;
        state.current_request_previous_entry = new_previous_entry;
        Ok(true)
    }

    /// Snapshot of the relay entry scope.
    pub async fn request_state(&self) -> RequestState {
        self.relay_entry.lock().await.clone()
    }

    /// Start block of the last accepted group selection, 0 if none.
    pub async fn current_group_selection_start_block(&self) -> u64 {
        self.group_selection
            .lock()
            .await
            .current_group_selection_start_block
    }
}
