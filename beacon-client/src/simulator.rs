//! Drives the local chain through relay rounds.
//!
//! Every interval the simulator plays the rest of the network: it opens a
//! relay request, produces the entry a couple of blocks later, lets a set of
//! competing stakers submit their tickets, and closes group selection once
//! the ticket submission window has passed.

use crate::config::SimulationSettings;
use beacon_core::BeaconError;
use beacon_core::chain::local::LocalChain;
use beacon_core::chain::{BlockCounter, ChainView, GroupInterface};
use beacon_sdk::objects::{StakerAddress, generate_tickets};
use num_bigint::BigUint;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Blocks between a relay request and its entry.
const ENTRY_DELAY_BLOCKS: u64 = 2;

/// Blocks past the submission timeout before group selection is closed.
/// Covers a node whose submission window opened late, since it reads the
/// selected participants only once its own window has passed.
const SELECTION_CLOSE_MARGIN_BLOCKS: u64 = 2;

pub struct Simulator {
    chain: LocalChain,
    settings: SimulationSettings,
    competitors: Vec<StakerAddress>,
}

impl Simulator {
    pub fn new(chain: LocalChain, settings: SimulationSettings) -> Self {
        Self {
            chain,
            settings,
            competitors: Vec::new(),
        }
    }

    /// Stake `settings.competitors` random accounts with one to five times
    /// the minimum stake each.
    pub async fn stake_competitors(&mut self) {
        let min_stake = self.chain.config().min_stake.clone();
        let stakes: Vec<(StakerAddress, BigUint)> = {
            let mut rng = rand::rng();
            (0..self.settings.competitors)
                .map(|_| {
                    let staker = StakerAddress::new(rng.random());
                    let multiple: u32 = rng.random_range(1..=5);
                    (staker, &min_stake * multiple)
                })
                .collect()
        };
        for (staker, stake) in stakes {
            self.chain.stake(staker, stake).await;
            self.competitors.push(staker);
        }
        info!(competitors = self.competitors.len(), "Competing stakers staked");
    }

    /// Run relay rounds every `relay_request_interval` until shutdown.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.relay_request_interval);
        // The first tick completes immediately; give the node time to subscribe.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Simulator received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    tokio::select! {
                        biased;

                        _ = shutdown_rx.wait_for(|shutdown| *shutdown) => {
                            info!("Simulator received shutdown signal mid-round");
                            break;
                        }

                        result = self.round() => {
                            if let Err(e) = result {
                                warn!(error = %e, "Relay round failed");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Play one relay round and return the members of the registered group.
    async fn round(&self) -> Result<Vec<StakerAddress>, BeaconError> {
        let request = self.chain.request_relay_entry().await;
        if self.settings.replay_events {
            self.chain.replay_relay_entry_requested().await;
        }
        info!(request_id = request.request_id, "Relay entry requested");

        self.chain.wait_for_blocks(ENTRY_DELAY_BLOCKS).await?;
        let entry = next_entry(&request.previous_entry, request.request_id);
        self.chain.submit_relay_entry(request.request_id, entry).await?;

        self.submit_competitor_tickets(&entry).await;

        let timeout_blocks = self.chain.config().ticket_submission_timeout_blocks;
        self.chain
            .wait_for_blocks(timeout_blocks + SELECTION_CLOSE_MARGIN_BLOCKS)
            .await?;

        let group_public_key: [u8; 32] = rand::random();
        let members = self
            .chain
            .complete_group_selection(request.request_id, group_public_key.to_vec())
            .await?;
        info!(
            request_id = request.request_id,
            members = members.len(),
            "Group selection completed"
        );
        Ok(members)
    }

    async fn submit_competitor_tickets(&self, entry: &[u8; 32]) {
        let beacon_output = BigUint::from_bytes_be(entry).to_bytes_be();
        let natural_threshold = &self.chain.config().natural_threshold;

        for staker in &self.competitors {
            let stake = match self.chain.staked_amount(staker).await {
                Ok(stake) => stake,
                Err(e) => {
                    warn!(%staker, error = %e, "Could not read competitor stake");
                    continue;
                }
            };
            let virtual_stakers = self.chain.config().virtual_stakers(&stake);
            let tickets = match generate_tickets(&beacon_output, staker.as_bytes(), virtual_stakers) {
                Ok(tickets) => tickets,
                Err(e) => {
                    warn!(%staker, error = %e, "Could not generate competitor tickets");
                    continue;
                }
            };
            for ticket in tickets.iter().filter(|t| t.is_below(natural_threshold)) {
                if let Err(e) = self
                    .chain
                    .submit_ticket(ticket.to_chain_ticket())
                    .await
                    .wait()
                    .await
                {
                    debug!(%staker, error = %e, "Competitor ticket rejected");
                }
            }
        }
    }
}

/// The entry produced for a request: `SHA-256(previous_entry ‖ be64(request_id))`.
fn next_entry(previous_entry: &[u8; 32], request_id: u64) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(40);
    preimage.extend_from_slice(previous_entry);
    preimage.extend_from_slice(&request_id.to_be_bytes());
    let digest = ring::digest::digest(&ring::digest::SHA256, &preimage);
    let mut entry = [0u8; 32];
    entry.copy_from_slice(digest.as_ref());
    entry
}
