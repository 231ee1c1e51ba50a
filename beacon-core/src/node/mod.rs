//! The local beacon participant.
//!
//! A [`Node`] is one staker taking part in the beacon. It turns its stake into
//! virtual stakers, competes in group selection by submitting tickets (see
//! [`ticket_submission`]) and keeps the table of groups registered on chain.

pub mod ticket_submission;

pub use ticket_submission::{SubmissionReport, SubmissionState};

use crate::chain::{BlockCounter, GroupInterface};
use crate::error::BeaconError;
use crate::events::{RelayEntryRequested, submission_error_channel};
use beacon_sdk::config::ChainConfig;
use beacon_sdk::objects::{StakerAddress, generate_tickets};
use num_bigint::BigUint;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

/// A group the node knows to be registered on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredGroup {
    pub request_id: u64,
    pub group_public_key: Vec<u8>,
}

pub struct Node {
    staker: StakerAddress,
    stake: BigUint,
    chain_config: ChainConfig,
    groups: RwLock<Vec<RegisteredGroup>>,
    pending_relay_request: RwLock<Option<RelayEntryRequested>>,
}

impl Node {
    pub fn new(staker: StakerAddress, stake: BigUint, chain_config: ChainConfig) -> Self {
        Self {
            staker,
            stake,
            chain_config,
            groups: RwLock::new(Vec::new()),
            pending_relay_request: RwLock::new(None),
        }
    }

    pub fn staker(&self) -> &StakerAddress {
        &self.staker
    }

    pub fn stake(&self) -> &BigUint {
        &self.stake
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    /// Number of virtual stakers the stake is worth, `stake / min_stake`.
    pub fn virtual_stakers(&self) -> u64 {
        self.chain_config.virtual_stakers(&self.stake)
    }

    /// Record a relay request accepted by the deduplicator.
    pub async fn on_relay_entry_requested(&self, request: RelayEntryRequested) {
        info!(
            request_id = request.request_id,
            block = request.block_number,
            previous_entry = %request.previous_entry_hex(),
            "New relay entry requested"
        );
        *self.pending_relay_request.write().await = Some(request);
    }

    /// The relay request currently being worked on, if any.
    pub async fn pending_relay_request(&self) -> Option<RelayEntryRequested> {
        self.pending_relay_request.read().await.clone()
    }

    /// Remember a group registered on chain. Returns `false` when a group is
    /// already known for `request_id`.
    pub async fn register_group(&self, request_id: u64, group_public_key: Vec<u8>) -> bool {
        let mut groups = self.groups.write().await;
        if groups.iter().any(|group| group.request_id == request_id) {
            debug!(request_id, "Group already registered, ignoring");
            return false;
        }

        info!(
            request_id,
            group_public_key = %hex::encode(&group_public_key),
            "Registered group"
        );
        groups.push(RegisteredGroup {
            request_id,
            group_public_key,
        });
        true
    }

    pub async fn groups(&self) -> Vec<RegisteredGroup> {
        self.groups.read().await.clone()
    }

    /// Compete in the group selection seeded with `entry`.
    ///
    /// Tickets are submitted until the submission window of
    /// `ticket_submission_timeout_blocks` closes. Once it has, the selected
    /// participants are read back and the number of seats won is logged.
    /// Returns `true` if the node won at least one seat.
    pub async fn join_group_if_eligible<C>(
        &self,
        chain: &Arc<C>,
        request_id: u64,
        entry: &BigUint,
    ) -> Result<bool, BeaconError>
    where
        C: GroupInterface + BlockCounter + 'static,
    {
        let virtual_stakers = self.virtual_stakers();
        if virtual_stakers == 0 {
            info!(request_id, staker = %self.staker, "Stake is below the minimum, skipping group selection");
            return Ok(false);
        }

        let tickets = generate_tickets(
            &entry.to_bytes_be(),
            self.staker.as_bytes(),
            virtual_stakers,
        )?;
        info!(
            request_id,
            tickets = tickets.len(),
            "Joining group selection"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let submission_window = {
            let chain = Arc::clone(chain);
            let timeout_blocks = self.chain_config.ticket_submission_timeout_blocks;
            tokio::spawn(async move {
                if let Err(e) = chain.wait_for_blocks(timeout_blocks).await {
                    warn!(error = %e, "Could not wait for the ticket submission window");
                }
                let _ = cancel_tx.send(true);
            })
        };

        let (err_tx, mut err_rx) = submission_error_channel(tickets.len());
        let group_interface: Arc<dyn GroupInterface> = chain.clone();
        let report = self
            .submit_tickets(&tickets, group_interface, cancel_rx, err_tx)
            .await;

        if let Err(e) = submission_window.await {
            warn!(error = %e, "Submission window task failed");
        }
        while let Ok(e) = err_rx.try_recv() {
            warn!(request_id, error = %e, "Ticket submission failed");
        }

        let selected = chain.get_selected_participants().await?;
        let seats = selected.iter().filter(|member| **member == self.staker).count();
        if seats > 0 {
            info!(
                request_id,
                seats,
                dispatched = report.dispatched,
                "Selected as a group member"
            );
        } else {
            info!(
                request_id,
                dispatched = report.dispatched,
                "Not selected in group selection"
            );
        }
        Ok(seats > 0)
    }
}
