//! In-memory relay chain.
//!
//! `LocalChain` implements every chain capability without a transport. Blocks
//! advance through [`LocalChain::mine_blocks`] or a ticker task, and the
//! relay/group lifecycle is driven explicitly:
//!
//! 1. [`request_relay_entry`](LocalChain::request_relay_entry)
//! 2. [`submit_relay_entry`](LocalChain::submit_relay_entry), which starts
//!    group selection
//! 3. tickets arrive through [`GroupInterface::submit_ticket`]
//! 4. [`complete_group_selection`](LocalChain::complete_group_selection)
//!
//! Subscription delivery can be made unreliable on purpose with
//! [`replay_relay_entry_requested`](LocalChain::replay_relay_entry_requested),
//! and the chain can be taken offline with
//! [`set_available`](LocalChain::set_available).

use super::{BlockCounter, ChainView, EventSource, GroupInterface, Subscription};
use crate::error::BeaconError;
use crate::events::{
    GroupRegistration, GroupRegistrationSender, GroupSelectionStart, GroupSelectionStartSender,
    GroupTicketSubmission, RelayEntryGenerated, RelayEntryGeneratedSender, RelayEntryRequested,
    RelayEntryRequestedSender,
};
use crate::utils::async_result::AsyncResult;
use async_trait::async_trait;
use beacon_sdk::config::ChainConfig;
use beacon_sdk::objects::{ChainTicket, StakerAddress};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Seed of the very first relay request.
const GENESIS_SEED: &[u8] = b"random beacon genesis entry";

/// In-memory chain. Cloning yields another handle to the same chain.
#[derive(Clone)]
pub struct LocalChain {
    inner: Arc<LocalChainInner>,
}

struct LocalChainInner {
    config: ChainConfig,
    available: AtomicBool,
    block_tx: watch::Sender<u64>,
    state: Mutex<LocalChainState>,
    relay_entry_requested: Subscribers<RelayEntryRequested>,
    relay_entry_generated: Subscribers<RelayEntryGenerated>,
    group_selection_started: Subscribers<GroupSelectionStart>,
    group_registered: Subscribers<GroupRegistration>,
}

struct LocalChainState {
    stakes: HashMap<StakerAddress, BigUint>,
    last_entry: [u8; 32],
    current_request: Option<RelayEntryRequested>,
    next_request_id: u64,
    tickets: Vec<ChainTicket>,
    groups: Vec<GroupRegistration>,
}

impl LocalChain {
    pub fn new(config: ChainConfig) -> Self {
        let mut genesis = [0u8; 32];
        genesis.copy_from_slice(ring::digest::digest(&ring::digest::SHA256, GENESIS_SEED).as_ref());

        let (block_tx, _) = watch::channel(1u64);
        Self {
            inner: Arc::new(LocalChainInner {
                config,
                available: AtomicBool::new(true),
                block_tx,
                state: Mutex::new(LocalChainState {
                    stakes: HashMap::new(),
                    last_entry: genesis,
                    current_request: None,
                    next_request_id: 1,
                    tickets: Vec::new(),
                    groups: Vec::new(),
                }),
                relay_entry_requested: Subscribers::new(),
                relay_entry_generated: Subscribers::new(),
                group_selection_started: Subscribers::new(),
                group_registered: Subscribers::new(),
            }),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.inner.config
    }

    /// Take the chain on- or offline. While offline every read and ticket
    /// submission fails with [`BeaconError::ChainUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    fn ensure_available(&self) -> Result<(), BeaconError> {
        if self.inner.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BeaconError::ChainUnavailable(
                "local chain is offline".to_string(),
            ))
        }
    }

    pub fn block_number(&self) -> u64 {
        *self.inner.block_tx.borrow()
    }

    /// Advance the chain by `blocks` blocks.
    pub fn mine_blocks(&self, blocks: u64) {
        self.inner.block_tx.send_modify(|block| *block += blocks);
    }

    /// Spawn a task mining one block every `block_time` until shutdown.
    pub fn spawn_block_ticker(
        &self,
        block_time: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let chain = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(block_time);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Block ticker shutting down");
                            break;
                        }
                    }

                    _ = interval.tick() => {
                        chain.mine_blocks(1);
                    }
                }
            }
        })
    }

    /// Set the stake of `staker`, replacing any previous amount.
    pub async fn stake(&self, staker: StakerAddress, amount: BigUint) {
        let mut state = self.inner.state.lock().await;
        info!(%staker, %amount, "Staked on local chain");
        state.stakes.insert(staker, amount);
    }

    /// Open a new relay request over the last generated entry.
    pub async fn request_relay_entry(&self) -> RelayEntryRequested {
        let event = {
            let mut state = self.inner.state.lock().await;
            let event = RelayEntryRequested {
                request_id: state.next_request_id,
                previous_entry: state.last_entry,
                block_number: self.block_number(),
            };
            state.next_request_id += 1;
            state.current_request = Some(event.clone());
            event
        };
        debug!(request_id = event.request_id, block = event.block_number, "Relay entry requested");
        self.inner.relay_entry_requested.emit(event.clone()).await;
        event
    }

    /// Re-open the current request at the current block, as happens when a
    /// request times out and is retried with the same previous entry.
    pub async fn retry_relay_request(&self) -> Option<RelayEntryRequested> {
        let event = {
            let mut state = self.inner.state.lock().await;
            let request = state.current_request.as_mut()?;
            request.block_number = self.block_number();
            request.clone()
        };
        debug!(request_id = event.request_id, block = event.block_number, "Relay request retried");
        self.inner.relay_entry_requested.emit(event.clone()).await;
        Some(event)
    }

    /// Deliver the last relay request event again, unchanged.
    pub async fn replay_relay_entry_requested(&self) -> Option<RelayEntryRequested> {
        let event = self.inner.state.lock().await.current_request.clone()?;
        debug!(request_id = event.request_id, "Replaying relay request event");
        self.inner.relay_entry_requested.emit(event.clone()).await;
        Some(event)
    }

    /// Record the entry for `request_id` and start group selection with it.
    pub async fn submit_relay_entry(
        &self,
        request_id: u64,
        value: [u8; 32],
    ) -> Result<RelayEntryGenerated, BeaconError> {
        self.ensure_available()?;
        let block_number = self.block_number();
        {
            let mut state = self.inner.state.lock().await;
            match &state.current_request {
                Some(request) if request.request_id == request_id => {}
                _ => {
                    return Err(BeaconError::SubmissionRejected(format!(
                        "no pending relay request {request_id}"
                    )));
                }
            }
            state.current_request = None;
            state.last_entry = value;
            state.tickets.clear();
        }

        let generated = RelayEntryGenerated {
            request_id,
            value,
            block_number,
        };
        info!(request_id, block = block_number, "Relay entry generated, group selection started");
        self.inner.relay_entry_generated.emit(generated.clone()).await;
        self.inner
            .group_selection_started
            .emit(GroupSelectionStart {
                request_id,
                new_entry: BigUint::from_bytes_be(&value),
                block_number,
            })
            .await;
        Ok(generated)
    }

    /// Close the ticket pool, register the selected group and announce it.
    pub async fn complete_group_selection(
        &self,
        request_id: u64,
        group_public_key: Vec<u8>,
    ) -> Result<Vec<StakerAddress>, BeaconError> {
        self.ensure_available()?;
        let (members, registration) = {
            let mut state = self.inner.state.lock().await;
            let members = self.selected_participants(&state);
            state.tickets.clear();
            let registration = GroupRegistration {
                request_id,
                group_public_key,
                block_number: self.block_number(),
            };
            state.groups.push(registration.clone());
            (members, registration)
        };
        info!(request_id, members = members.len(), "Group registered");
        self.inner.group_registered.emit(registration).await;
        Ok(members)
    }

    pub async fn registered_groups(&self) -> Vec<GroupRegistration> {
        self.inner.state.lock().await.groups.clone()
    }

    /// Tickets submitted for the running group selection.
    pub async fn submitted_tickets(&self) -> Vec<ChainTicket> {
        self.inner.state.lock().await.tickets.clone()
    }

    fn selected_participants(&self, state: &LocalChainState) -> Vec<StakerAddress> {
        let mut tickets: Vec<&ChainTicket> = state.tickets.iter().collect();
        tickets.sort_by(|a, b| a.value.cmp(&b.value));
        tickets
            .into_iter()
            .take(self.inner.config.group_size)
            .filter_map(|ticket| staker_from_value(&ticket.proof.staker_value))
            .collect()
    }

    fn check_ticket(&self, state: &LocalChainState, ticket: &ChainTicket) -> Result<(), BeaconError> {
        if ticket.value >= self.inner.config.natural_threshold {
            return Err(BeaconError::SubmissionRejected(
                "ticket value is not below the natural threshold".to_string(),
            ));
        }
        if state.tickets.iter().any(|t| t.value == ticket.value) {
            return Err(BeaconError::SubmissionRejected(
                "ticket already submitted".to_string(),
            ));
        }
        let staker = staker_from_value(&ticket.proof.staker_value).ok_or_else(|| {
            BeaconError::SubmissionRejected("staker value is not an address".to_string())
        })?;
        let stake = state.stakes.get(&staker).cloned().unwrap_or_default();
        let virtual_stakers = self.inner.config.virtual_stakers(&stake);
        if ticket.proof.virtual_staker_index == BigUint::ZERO
            || ticket.proof.virtual_staker_index > BigUint::from(virtual_stakers)
        {
            return Err(BeaconError::SubmissionRejected(format!(
                "virtual staker index exceeds the {virtual_stakers} virtual stakers of {staker}"
            )));
        }
        Ok(())
    }
}

/// Recovers a staker address from the integer form used in ticket proofs.
fn staker_from_value(value: &BigUint) -> Option<StakerAddress> {
    let bytes = value.to_bytes_be();
    if bytes.len() > StakerAddress::LENGTH {
        return None;
    }
    let mut address = [0u8; StakerAddress::LENGTH];
    address[StakerAddress::LENGTH - bytes.len()..].copy_from_slice(&bytes);
    Some(StakerAddress::new(address))
}

#[async_trait]
impl ChainView for LocalChain {
    async fn current_request_previous_entry(&self) -> Result<Vec<u8>, BeaconError> {
        self.ensure_available()?;
        let state = self.inner.state.lock().await;
        Ok(state
            .current_request
            .as_ref()
            .map(|request| request.previous_entry.to_vec())
            .unwrap_or_default())
    }

    async fn get_config(&self) -> Result<ChainConfig, BeaconError> {
        self.ensure_available()?;
        Ok(self.inner.config.clone())
    }

    async fn staked_amount(&self, staker: &StakerAddress) -> Result<BigUint, BeaconError> {
        self.ensure_available()?;
        let state = self.inner.state.lock().await;
        Ok(state.stakes.get(staker).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl GroupInterface for LocalChain {
    async fn submit_ticket(&self, ticket: ChainTicket) -> AsyncResult<GroupTicketSubmission> {
        if let Err(e) = self.ensure_available() {
            return AsyncResult::failed(e);
        }
        let mut state = self.inner.state.lock().await;
        if let Err(e) = self.check_ticket(&state, &ticket) {
            debug!(error = %e, "Rejected ticket");
            return AsyncResult::failed(e);
        }
        let submission = GroupTicketSubmission {
            ticket_value: ticket.value.clone(),
            block_number: self.block_number(),
        };
        state.tickets.push(ticket);
        AsyncResult::fulfilled(submission)
    }

    async fn get_selected_participants(&self) -> Result<Vec<StakerAddress>, BeaconError> {
        self.ensure_available()?;
        let state = self.inner.state.lock().await;
        Ok(self.selected_participants(&state))
    }

    async fn on_group_selection_started(
        &self,
        sink: GroupSelectionStartSender,
    ) -> Result<Subscription, BeaconError> {
        Ok(self.inner.group_selection_started.subscribe(sink).await)
    }
}

#[async_trait]
impl EventSource for LocalChain {
    async fn on_relay_entry_requested(
        &self,
        sink: RelayEntryRequestedSender,
    ) -> Result<Subscription, BeaconError> {
        Ok(self.inner.relay_entry_requested.subscribe(sink).await)
    }

    async fn on_relay_entry_generated(
        &self,
        sink: RelayEntryGeneratedSender,
    ) -> Result<Subscription, BeaconError> {
        Ok(self.inner.relay_entry_generated.subscribe(sink).await)
    }

    async fn on_group_registered(
        &self,
        sink: GroupRegistrationSender,
    ) -> Result<Subscription, BeaconError> {
        Ok(self.inner.group_registered.subscribe(sink).await)
    }
}

#[async_trait]
impl BlockCounter for LocalChain {
    async fn current_block(&self) -> Result<u64, BeaconError> {
        Ok(self.block_number())
    }

    async fn wait_for_blocks(&self, blocks: u64) -> Result<u64, BeaconError> {
        let mut block_rx = self.inner.block_tx.subscribe();
        let target = *block_rx.borrow_and_update() + blocks;
        let reached = *block_rx
            .wait_for(|block| *block >= target)
            .await
            .map_err(|_| BeaconError::ChainUnavailable("block counter closed".to_string()))?;
        Ok(reached)
    }
}

/// Sinks registered for one event kind.
struct Subscribers<E> {
    sinks: Mutex<Vec<(Subscription, mpsc::Sender<E>)>>,
}

impl<E: Clone + Send> Subscribers<E> {
    fn new() -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
        }
    }

    async fn subscribe(&self, sink: mpsc::Sender<E>) -> Subscription {
        let subscription = Subscription::new();
        self.sinks.lock().await.push((subscription.clone(), sink));
        subscription
    }

    /// Deliver `event` to every live sink without blocking on slow ones.
    async fn emit(&self, event: E) {
        let mut sinks = self.sinks.lock().await;
        sinks.retain(|(subscription, sink)| subscription.is_active() && !sink.is_closed());
        for (_, sink) in sinks.iter() {
            match sink.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber is not keeping up, dropping event");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
}
