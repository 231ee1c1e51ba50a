//! Relay chain configuration.

use num_bigint::BigUint;

/// Parameters of the random beacon as configured on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Number of members in a signing group.
    pub group_size: usize,
    /// Minimum number of honest members needed to produce a signature.
    pub honest_threshold: usize,
    /// Tickets with a value at or above this bound are rejected by the chain.
    pub natural_threshold: BigUint,
    /// Minimum stake backing one virtual staker.
    pub min_stake: BigUint,
    /// Shortest possible group selection, in blocks.
    pub min_group_selection_duration_blocks: u64,
    /// How long tickets are accepted after group selection starts, in blocks.
    pub ticket_submission_timeout_blocks: u64,
}

impl ChainConfig {
    /// Derives the natural threshold so that, with `token_supply` fully
    /// staked, the expected number of admitted tickets equals `group_size`:
    /// `group_size * 2^256 * min_stake / token_supply`.
    ///
    /// Returns `None` for a zero token supply.
    pub fn derive_natural_threshold(
        group_size: usize,
        min_stake: &BigUint,
        token_supply: &BigUint,
    ) -> Option<BigUint> {
        if *token_supply == BigUint::ZERO {
            return None;
        }
        let space = BigUint::from(1u32) << 256u32;
        Some(BigUint::from(group_size) * space * min_stake / token_supply)
    }

    /// Number of virtual stakers (and therefore tickets) a stake is worth.
    pub fn virtual_stakers(&self, stake: &BigUint) -> u64 {
        if self.min_stake == BigUint::ZERO {
            return 0;
        }
        let count = stake / &self.min_stake;
        count.try_into().unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_stake: u64) -> ChainConfig {
        ChainConfig {
            group_size: 5,
            honest_threshold: 3,
            natural_threshold: BigUint::from(1u32) << 256u32,
            min_stake: BigUint::from(min_stake),
            min_group_selection_duration_blocks: 10,
            ticket_submission_timeout_blocks: 6,
        }
    }

    #[test]
    fn test_virtual_stakers() {
        assert_eq!(config(1000).virtual_stakers(&BigUint::from(4500u32)), 4);
        assert_eq!(config(1000).virtual_stakers(&BigUint::from(999u32)), 0);
        assert_eq!(config(0).virtual_stakers(&BigUint::from(999u32)), 0);
    }

    #[test]
    fn test_derive_natural_threshold() {
        let min_stake = BigUint::from(1_000u32);
        let supply = BigUint::from(10_000u32);
        let threshold = ChainConfig::derive_natural_threshold(5, &min_stake, &supply).unwrap();
        // 5 * 2^256 / 10 = 2^255
        assert_eq!(threshold, BigUint::from(1u32) << 255u32);

        assert!(ChainConfig::derive_natural_threshold(5, &min_stake, &BigUint::ZERO).is_none());
    }
}
