//! EventDispatcher processor.
//!
//! The dispatcher is responsible for:
//! - Subscribing to the relay and group selection event streams of the chain
//! - Gating every event through the `Deduplicator`
//! - Handing accepted events to the `Node`, one task per event, so a long
//!   ticket submission never stalls the other streams
//!
//! `RelayEntryGenerated` and `GroupSelectionStart` both seed group selection.
//! They share the group selection scope of the deduplicator, keyed by block,
//! so whichever arrives second for the same selection is dropped.

use crate::chain::{ChainView, RelayChain, Subscription};
use crate::error::BeaconError;
use crate::events::{
    Deduplicator, GroupRegistration, GroupRegistrationReceiver, GroupSelectionStart,
    GroupSelectionStartReceiver, RelayEntryGenerated, RelayEntryGeneratedReceiver,
    RelayEntryRequested, RelayEntryRequestedReceiver, group_registration_channel,
    group_selection_start_channel, relay_entry_generated_channel, relay_entry_requested_channel,
};
use crate::node::Node;
use kanau::processor::Processor;
use num_bigint::BigUint;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

pub struct EventDispatcher<C: RelayChain> {
    chain: Arc<C>,
    node: Arc<Node>,
    deduplicator: Arc<Deduplicator>,
}

impl<C: RelayChain + 'static> EventDispatcher<C> {
    pub fn new(chain: Arc<C>, node: Arc<Node>, deduplicator: Arc<Deduplicator>) -> Self {
        Self {
            chain,
            node,
            deduplicator,
        }
    }

    /// Build a dispatcher with a fresh deduplicator reading from `chain`.
    pub fn with_chain(chain: Arc<C>, node: Arc<Node>) -> Self {
        let view: Arc<dyn ChainView> = chain.clone();
        let deduplicator = Deduplicator::new(
            view,
            node.chain_config().min_group_selection_duration_blocks,
        );
        Self::new(chain, node, Arc::new(deduplicator))
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn deduplicator(&self) -> &Arc<Deduplicator> {
        &self.deduplicator
    }

    /// Subscribe to every event stream and spawn the dispatch loop.
    ///
    /// Subscriptions are in place when this returns, so no event emitted
    /// afterwards is missed. The loop runs until `shutdown_rx` turns `true`
    /// or the chain has closed every stream.
    pub async fn start(
        self: Arc<Self>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, BeaconError> {
        let (requested_tx, requested_rx) = relay_entry_requested_channel();
        let (generated_tx, generated_rx) = relay_entry_generated_channel();
        let (start_tx, start_rx) = group_selection_start_channel();
        let (registered_tx, registered_rx) = group_registration_channel();

        let subscriptions = vec![
            self.chain.on_relay_entry_requested(requested_tx).await?,
            self.chain.on_relay_entry_generated(generated_tx).await?,
            self.chain.on_group_selection_started(start_tx).await?,
            self.chain.on_group_registered(registered_tx).await?,
        ];
        info!(staker = %self.node.staker(), "Event dispatcher subscribed");

        Ok(tokio::spawn(self.run(
            shutdown_rx,
            subscriptions,
            EventStreams {
                requested_rx,
                generated_rx,
                start_rx,
                registered_rx,
            },
        )))
    }

    async fn run(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
        subscriptions: Vec<Subscription>,
        mut streams: EventStreams,
    ) {
        let mut handlers = JoinSet::new();
        let mut requested_open = true;
        let mut generated_open = true;
        let mut start_open = true;
        let mut registered_open = true;

        loop {
            tokio::select! {
                biased;

                // Shutdown has highest priority.
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("EventDispatcher received shutdown signal");
                        break;
                    }
                }

                event = streams.requested_rx.recv(), if requested_open => match event {
                    Some(event) => {
                        let this = self.clone();
                        handlers.spawn(async move {
                            if let Err(e) = this.process(event).await {
                                warn!(error = %e, "Failed to handle relay entry request");
                            }
                        });
                    }
                    None => {
                        debug!("Relay entry requested stream closed");
                        requested_open = false;
                    }
                },

                event = streams.generated_rx.recv(), if generated_open => match event {
                    Some(event) => {
                        let this = self.clone();
                        handlers.spawn(async move {
                            if let Err(e) = this.process(event).await {
                                warn!(error = %e, "Failed to handle generated relay entry");
                            }
                        });
                    }
                    None => {
                        debug!("Relay entry generated stream closed");
                        generated_open = false;
                    }
                },

                event = streams.start_rx.recv(), if start_open => match event {
                    Some(event) => {
                        let this = self.clone();
                        handlers.spawn(async move {
                            if let Err(e) = this.process(event).await {
                                warn!(error = %e, "Failed to handle group selection start");
                            }
                        });
                    }
                    None => {
                        debug!("Group selection start stream closed");
                        start_open = false;
                    }
                },

                event = streams.registered_rx.recv(), if registered_open => match event {
                    Some(event) => {
                        let this = self.clone();
                        handlers.spawn(async move {
                            if let Err(e) = this.process(event).await {
                                warn!(error = %e, "Failed to handle group registration");
                            }
                        });
                    }
                    None => {
                        debug!("Group registration stream closed");
                        registered_open = false;
                    }
                },

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Event handler task failed");
                    }
                }
            }

            if !(requested_open || generated_open || start_open || registered_open) {
                warn!("All event streams closed, stopping dispatcher");
                break;
            }
        }

        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
        if !handlers.is_empty() {
            debug!(outstanding = handlers.len(), "Aborting in-flight event handlers");
        }
        handlers.shutdown().await;
        info!("EventDispatcher stopped");
    }

    /// Shared path of both group selection seeds.
    async fn on_group_selection_seed(
        &self,
        request_id: u64,
        block_number: u64,
        entry: BigUint,
    ) -> Result<bool, BeaconError> {
        if !self
            .deduplicator
            .notify_group_selection_started(block_number)
            .await
        {
            return Ok(false);
        }
        self.node
            .join_group_if_eligible(&self.chain, request_id, &entry)
            .await?;
        Ok(true)
    }
}

struct EventStreams {
    requested_rx: RelayEntryRequestedReceiver,
    generated_rx: RelayEntryGeneratedReceiver,
    start_rx: GroupSelectionStartReceiver,
    registered_rx: GroupRegistrationReceiver,
}

// ---------------------------------------------------------------------------
// Processor trait implementations
// ---------------------------------------------------------------------------

/// `Ok(true)` when the request was new and is now pending on the node.
impl<C: RelayChain + 'static> Processor<RelayEntryRequested> for EventDispatcher<C> {
    type Output = bool;
    type Error = BeaconError;

    async fn process(&self, event: RelayEntryRequested) -> Result<bool, BeaconError> {
        let accepted = self
            .deduplicator
            .notify_relay_entry_started(event.block_number, &event.previous_entry_hex())
            .await?;
        if accepted {
            self.node.on_relay_entry_requested(event).await;
        }
        Ok(accepted)
    }
}

impl<C: RelayChain + 'static> Processor<RelayEntryGenerated> for EventDispatcher<C> {
    type Output = bool;
    type Error = BeaconError;

    async fn process(&self, event: RelayEntryGenerated) -> Result<bool, BeaconError> {
        debug!(request_id = event.request_id, block = event.block_number, "Relay entry generated");
        self.on_group_selection_seed(event.request_id, event.block_number, event.value_as_big_uint())
            .await
    }
}

impl<C: RelayChain + 'static> Processor<GroupSelectionStart> for EventDispatcher<C> {
    type Output = bool;
    type Error = BeaconError;

    async fn process(&self, event: GroupSelectionStart) -> Result<bool, BeaconError> {
        debug!(request_id = event.request_id, block = event.block_number, "Group selection started");
        self.on_group_selection_seed(event.request_id, event.block_number, event.new_entry)
            .await
    }
}

/// `Ok(false)` when the group was already known.
impl<C: RelayChain + 'static> Processor<GroupRegistration> for EventDispatcher<C> {
    type Output = bool;
    type Error = BeaconError;

    async fn process(&self, event: GroupRegistration) -> Result<bool, BeaconError> {
        Ok(self
            .node
            .register_group(event.request_id, event.group_public_key)
            .await)
    }
}
