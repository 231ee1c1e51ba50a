//! Group selection lottery tickets.
//!
//! A ticket's value is `SHA-256(beacon_output || staker_value || index)`,
//! where `index` is the virtual staker index encoded as a 32-byte big-endian
//! number. A ticket is admitted to group selection when its value, read as a
//! big-endian integer, is below the natural threshold.
//!
//! The chain works with big integers rather than fixed-width byte arrays, so
//! every ticket also has a [`ChainTicket`] form.

use crate::bytes::left_pad_to_32_bytes;
use crate::error::InvalidArgument;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::fmt;

/// 32-byte ticket value.
///
/// Ordering is lexicographic over the big-endian bytes, which is the same as
/// numeric ordering of the underlying integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TicketValue([u8; 32]);

impl TicketValue {
    pub const LENGTH: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Builds a value from a slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidArgument> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| InvalidArgument::WrongLength {
            expected: Self::LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Builds a value from a big integer, restoring the leading zero bytes
    /// that the integer form drops.
    pub fn from_big_uint(value: &BigUint) -> Result<Self, InvalidArgument> {
        Ok(Self(left_pad_to_32_bytes(&value.to_bytes_be())?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_big_uint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl fmt::Display for TicketValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Data needed to recompute a ticket's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub staker_value: Vec<u8>,
    pub virtual_staker_index: u64,
}

/// A group selection lottery ticket. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub value: TicketValue,
    pub proof: Proof,
}

/// On-chain representation of a [`Ticket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTicket {
    pub value: BigUint,
    pub proof: ChainTicketProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTicketProof {
    pub staker_value: BigUint,
    pub virtual_staker_index: BigUint,
}

impl Ticket {
    /// Computes a new ticket for one virtual staker.
    pub fn new(
        beacon_output: &[u8],
        staker_value: &[u8],
        virtual_staker_index: u64,
    ) -> Result<Self, InvalidArgument> {
        if virtual_staker_index == 0 {
            return Err(InvalidArgument::NonPositiveVirtualStakerIndex);
        }

        let mut index = [0u8; 32];
        index[24..].copy_from_slice(&virtual_staker_index.to_be_bytes());

        let mut preimage =
            Vec::with_capacity(beacon_output.len() + staker_value.len() + index.len());
        preimage.extend_from_slice(beacon_output);
        preimage.extend_from_slice(staker_value);
        preimage.extend_from_slice(&index);

        let digest = ring::digest::digest(&ring::digest::SHA256, &preimage);

        Ok(Self {
            value: TicketValue::from_slice(digest.as_ref())?,
            proof: Proof {
                staker_value: staker_value.to_vec(),
                virtual_staker_index,
            },
        })
    }

    /// Returns `true` if the ticket would be admitted under `natural_threshold`.
    pub fn is_below(&self, natural_threshold: &BigUint) -> bool {
        self.value.to_big_uint() < *natural_threshold
    }

    /// Converts the ticket into the form accepted by the chain.
    pub fn to_chain_ticket(&self) -> ChainTicket {
        ChainTicket {
            value: self.value.to_big_uint(),
            proof: ChainTicketProof {
                staker_value: BigUint::from_bytes_be(&self.proof.staker_value),
                virtual_staker_index: BigUint::from(self.proof.virtual_staker_index),
            },
        }
    }

    /// Restores a ticket from its chain form.
    ///
    /// The staker value comes back without leading zero bytes, exactly as the
    /// chain stores it.
    pub fn from_chain_ticket(ticket: &ChainTicket) -> Result<Self, InvalidArgument> {
        let virtual_staker_index = ticket
            .proof
            .virtual_staker_index
            .to_u64()
            .ok_or(InvalidArgument::ValueTooLarge(8))?;
        if virtual_staker_index == 0 {
            return Err(InvalidArgument::NonPositiveVirtualStakerIndex);
        }

        Ok(Self {
            value: TicketValue::from_big_uint(&ticket.value)?,
            proof: Proof {
                staker_value: ticket.proof.staker_value.to_bytes_be(),
                virtual_staker_index,
            },
        })
    }
}

/// Generates one ticket per virtual staker, indices `1..=virtual_stakers`,
/// sorted by ascending value.
pub fn generate_tickets(
    beacon_output: &[u8],
    staker_value: &[u8],
    virtual_stakers: u64,
) -> Result<Vec<Ticket>, InvalidArgument> {
    let mut tickets = (1..=virtual_stakers)
        .map(|index| Ticket::new(beacon_output, staker_value, index))
        .collect::<Result<Vec<_>, _>>()?;
    tickets.sort_by(|a, b| a.value.cmp(&b.value));
    Ok(tickets)
}
