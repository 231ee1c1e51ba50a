//! Beacon startup.
//!
//! [`initialize`] checks that the account may take part, builds the node and
//! its event dispatcher, and runs until shutdown.

use crate::chain::{ChainView, RelayChain};
use crate::error::BeaconError;
use crate::node::Node;
use crate::processors::EventDispatcher;
use beacon_sdk::config::ChainConfig;
use beacon_sdk::objects::StakerAddress;
use num_bigint::BigUint;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Where the account stands with respect to the beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantState {
    /// Stake below the minimum; the account cannot take part.
    Unstaked,
    Staked { stake: BigUint, virtual_stakers: u64 },
}

/// Resolve the participant state of `staker` from its stake on chain,
/// measured against an already fetched `config`.
pub async fn check_participant_state<C>(
    chain: &C,
    staker: &StakerAddress,
    config: &ChainConfig,
) -> Result<ParticipantState, BeaconError>
where
    C: ChainView + ?Sized,
{
    let stake = chain.staked_amount(staker).await?;
    if stake < config.min_stake || stake == BigUint::ZERO {
        return Ok(ParticipantState::Unstaked);
    }
    let virtual_stakers = config.virtual_stakers(&stake);
    Ok(ParticipantState::Staked {
        stake,
        virtual_stakers,
    })
}

/// Start the beacon for `staker` and run until `shutdown_rx` turns `true`.
///
/// Fails with [`BeaconError::PreconditionFailed`] when the account is
/// unstaked, and with the chain error when the configuration or stake cannot
/// be read.
pub async fn initialize<C>(
    chain: Arc<C>,
    staker: StakerAddress,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), BeaconError>
where
    C: RelayChain + 'static,
{
    let chain_config = chain.get_config().await?;

    let stake = match check_participant_state(chain.as_ref(), &staker, &chain_config).await? {
        ParticipantState::Unstaked => {
            error!(%staker, "Account is unstaked, cannot join the beacon");
            return Err(BeaconError::PreconditionFailed(
                "account is unstaked".to_string(),
            ));
        }
        ParticipantState::Staked {
            stake,
            virtual_stakers,
        } => {
            info!(%staker, %stake, virtual_stakers, "Account is staked");
            stake
        }
    };

    let node = Arc::new(Node::new(staker, stake, chain_config));
    let dispatcher = Arc::new(EventDispatcher::with_chain(chain, node));
    let handle = dispatcher.start(shutdown_rx.clone()).await?;
    info!("Random beacon initialized");

    // The dispatcher exits on the same signal; wait for it either way.
    let _ = shutdown_rx.wait_for(|shutdown| *shutdown).await;
    if let Err(e) = handle.await {
        error!(error = %e, "Event dispatcher task failed");
    }
    info!("Random beacon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::local::LocalChain;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Reports a fixed stake; the configuration cannot be read.
    struct StakeOnlyView {
        stake: BigUint,
    }

    #[async_trait]
    impl ChainView for StakeOnlyView {
        async fn current_request_previous_entry(&self) -> Result<Vec<u8>, BeaconError> {
            Ok(Vec::new())
        }

        async fn get_config(&self) -> Result<ChainConfig, BeaconError> {
            Err(BeaconError::ChainUnavailable("config is not readable".to_string()))
        }

        async fn staked_amount(&self, _: &StakerAddress) -> Result<BigUint, BeaconError> {
            Ok(self.stake.clone())
        }
    }

    fn chain() -> Arc<LocalChain> {
        Arc::new(LocalChain::new(ChainConfig {
            group_size: 2,
            honest_threshold: 2,
            natural_threshold: BigUint::from(1u32) << 256u32,
            min_stake: BigUint::from(1_000u32),
            min_group_selection_duration_blocks: 5,
            ticket_submission_timeout_blocks: 2,
        }))
    }

    #[tokio::test]
    async fn test_participant_state() {
        let chain = chain();
        let staker = StakerAddress::new([1u8; 20]);
        assert_eq!(
            check_participant_state(chain.as_ref(), &staker, chain.config()).await.unwrap(),
            ParticipantState::Unstaked
        );

        chain.stake(staker, BigUint::from(999u32)).await;
        assert_eq!(
            check_participant_state(chain.as_ref(), &staker, chain.config()).await.unwrap(),
            ParticipantState::Unstaked
        );

        chain.stake(staker, BigUint::from(2_500u32)).await;
        assert_eq!(
            check_participant_state(chain.as_ref(), &staker, chain.config()).await.unwrap(),
            ParticipantState::Staked {
                stake: BigUint::from(2_500u32),
                virtual_stakers: 2
            }
        );
    }

    #[tokio::test]
    async fn test_participant_state_uses_the_given_config() {
        let view = StakeOnlyView {
            stake: BigUint::from(1_500u32),
        };
        let staker = StakerAddress::new([2u8; 20]);
        let mut config = chain().config().clone();
        assert_eq!(
            check_participant_state(&view, &staker, &config).await.unwrap(),
            ParticipantState::Staked {
                stake: BigUint::from(1_500u32),
                virtual_stakers: 1
            }
        );

        config.min_stake = BigUint::from(2_000u32);
        assert_eq!(
            check_participant_state(&view, &staker, &config).await.unwrap(),
            ParticipantState::Unstaked
        );
    }

    #[tokio::test]
    async fn test_initialize_rejects_unstaked_account() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let result = initialize(chain(), StakerAddress::new([1u8; 20]), shutdown_rx).await;
        assert_eq!(
            result,
            Err(BeaconError::PreconditionFailed(
                "account is unstaked".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_initialize_fails_when_chain_is_unavailable() {
        let chain = chain();
        chain.set_available(false);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let result = initialize(chain, StakerAddress::new([1u8; 20]), shutdown_rx).await;
        assert!(matches!(result, Err(BeaconError::ChainUnavailable(_))));
    }

    #[tokio::test]
    async fn test_initialize_runs_until_shutdown() {
        let chain = chain();
        let staker = StakerAddress::new([1u8; 20]);
        chain.stake(staker, BigUint::from(1_000u32)).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let beacon = tokio::spawn(initialize(chain.clone(), staker, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!beacon.is_finished());

        let request = chain.request_relay_entry().await;
        chain
            .complete_group_selection(request.request_id, vec![0x42; 8])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), beacon)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Ok(()));
    }
}
