//! Configuration module for beacon-client.
//!
//! Handles loading configuration from TOML files and CLI arguments, and
//! turns it into the chain and node settings the core works with.

pub mod file;

use crate::config::file::FileConfig;
use beacon_sdk::config::ChainConfig;
use beacon_sdk::objects::StakerAddress;
use num_bigint::BigUint;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// The local participant.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub staker: StakerAddress,
    pub stake: BigUint,
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub relay_request_interval: Duration,
    pub replay_events: bool,
    pub competitors: usize,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub node: NodeSettings,
    pub chain: ChainConfig,
    pub block_time: Duration,
    pub simulation: SimulationSettings,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    staker_override: Option<String>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, staker_override: Option<String>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            staker_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate and convert the configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.parse(&config_content)
    }

    fn parse(&self, config_content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(staker) = &self.staker_override {
            file_config.node.staker = staker.clone();
        }

        validate(&file_config)?;
        build_loaded_config(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let chain = &config.chain;
    if chain.group_size == 0 {
        return Err(ConfigError::ValidationError(
            "group_size must be at least 1".to_string(),
        ));
    }
    if chain.honest_threshold == 0 || chain.honest_threshold > chain.group_size {
        return Err(ConfigError::ValidationError(format!(
            "honest_threshold must be between 1 and group_size ({}), got {}",
            chain.group_size, chain.honest_threshold
        )));
    }
    if chain.ticket_submission_timeout_blocks > chain.min_group_selection_duration_blocks {
        return Err(ConfigError::ValidationError(format!(
            "ticket_submission_timeout_blocks ({}) exceeds min_group_selection_duration_blocks ({})",
            chain.ticket_submission_timeout_blocks, chain.min_group_selection_duration_blocks
        )));
    }
    if chain.block_time_ms == 0 {
        return Err(ConfigError::ValidationError(
            "block_time_ms must be positive".to_string(),
        ));
    }
    if config.simulation.relay_request_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "relay_request_interval_secs must be positive".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let staker: StakerAddress = file_config.node.staker.parse().map_err(|e| {
        ConfigError::ValidationError(format!("invalid staker address: {e}"))
    })?;
    let stake = parse_amount("stake", &file_config.node.stake)?;

    let chain = file_config.chain;
    let min_stake = parse_amount("min_stake", &chain.min_stake)?;
    if min_stake == BigUint::ZERO {
        return Err(ConfigError::ValidationError(
            "min_stake must be positive".to_string(),
        ));
    }
    let token_supply = parse_amount("token_supply", &chain.token_supply)?;

    let natural_threshold = match &chain.natural_threshold {
        Some(threshold) => parse_amount("natural_threshold", threshold)?,
        None => ChainConfig::derive_natural_threshold(chain.group_size, &min_stake, &token_supply)
            .ok_or_else(|| {
                ConfigError::ValidationError("token_supply must be positive".to_string())
            })?,
    };

    Ok(LoadedConfig {
        node: NodeSettings { staker, stake },
        chain: ChainConfig {
            group_size: chain.group_size,
            honest_threshold: chain.honest_threshold,
            natural_threshold,
            min_stake,
            min_group_selection_duration_blocks: chain.min_group_selection_duration_blocks,
            ticket_submission_timeout_blocks: chain.ticket_submission_timeout_blocks,
        },
        block_time: Duration::from_millis(chain.block_time_ms),
        simulation: SimulationSettings {
            relay_request_interval: Duration::from_secs(
                file_config.simulation.relay_request_interval_secs,
            ),
            replay_events: file_config.simulation.replay_events,
            competitors: file_config.simulation.competitors,
        },
    })
}

fn parse_amount(field: &str, value: &str) -> Result<BigUint, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{field} is not a decimal number: {value:?}"))
    })
}
