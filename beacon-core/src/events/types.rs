//! Chain event definitions.
//!
//! Events are delivered by an unreliable subscription: the same event may
//! arrive more than once, right away or much later. They carry everything the
//! handlers need; the deduplicator decides whether to act on them.

use num_bigint::BigUint;

/// A new relay entry has been requested on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEntryRequested {
    pub request_id: u64,
    /// The entry the new one is signed over; identifies the request.
    pub previous_entry: [u8; 32],
    pub block_number: u64,
}

impl RelayEntryRequested {
    /// Previous entry as lowercase hex, the form the deduplicator compares.
    pub fn previous_entry_hex(&self) -> String {
        hex::encode(self.previous_entry)
    }
}

/// A relay entry has been produced; group selection starts with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEntryGenerated {
    pub request_id: u64,
    pub value: [u8; 32],
    pub block_number: u64,
}

impl RelayEntryGenerated {
    pub fn value_as_big_uint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.value)
    }
}

/// Group selection has started at `block_number`, seeded with `new_entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSelectionStart {
    pub request_id: u64,
    pub new_entry: BigUint,
    pub block_number: u64,
}

/// A new signing group has been registered on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRegistration {
    pub request_id: u64,
    pub group_public_key: Vec<u8>,
    pub block_number: u64,
}

/// Outcome of a successful ticket submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTicketSubmission {
    pub ticket_value: BigUint,
    pub block_number: u64,
}
