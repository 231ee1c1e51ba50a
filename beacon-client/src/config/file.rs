//! TOML file configuration structures.
//!
//! These structs directly map to the `beacon-config.toml` file format.
//! Big numbers are kept as decimal strings and parsed during loading.

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub node: NodeConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// The local participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// 0x-prefixed 20-byte staker address.
    pub staker: String,
    /// Amount to stake, decimal.
    pub stake: String,
}

/// Relay chain parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    pub group_size: usize,
    pub honest_threshold: usize,
    /// Decimal.
    pub min_stake: String,
    /// Decimal. Used to derive the natural threshold when it is not set.
    pub token_supply: String,
    pub min_group_selection_duration_blocks: u64,
    pub ticket_submission_timeout_blocks: u64,
    /// Decimal. Derived from group size, stake and supply when absent.
    #[serde(default)]
    pub natural_threshold: Option<String>,
}

fn default_block_time_ms() -> u64 {
    1000
}

/// Local chain simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_relay_request_interval_secs")]
    pub relay_request_interval_secs: u64,
    /// Deliver every relay request event twice.
    #[serde(default)]
    pub replay_events: bool,
    /// Number of other stakers competing for group seats.
    #[serde(default = "default_competitors")]
    pub competitors: usize,
}

fn default_relay_request_interval_secs() -> u64 {
    30
}

fn default_competitors() -> usize {
    3
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            relay_request_interval_secs: default_relay_request_interval_secs(),
            replay_events: false,
            competitors: default_competitors(),
        }
    }
}
