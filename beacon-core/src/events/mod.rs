//! Chain events and the gate that filters duplicate deliveries.
//!
//! # Event Flow
//!
//! 1. `RelayEntryRequested` -> relay entry scope of the `Deduplicator`
//! 2. `RelayEntryGenerated` / `GroupSelectionStart` -> group selection scope,
//!    then ticket submission on the `Node`
//! 3. `GroupRegistration` -> local group table of the `Node`

pub mod channels;
pub mod deduplicator;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, GroupRegistrationReceiver, GroupRegistrationSender,
    GroupSelectionStartReceiver, GroupSelectionStartSender, RelayEntryGeneratedReceiver,
    RelayEntryGeneratedSender, RelayEntryRequestedReceiver, RelayEntryRequestedSender,
    SubmissionErrorReceiver, SubmissionErrorSender, group_registration_channel,
    group_selection_start_channel, relay_entry_generated_channel, relay_entry_requested_channel,
    submission_error_channel,
};
pub use deduplicator::Deduplicator;
pub use types::{
    GroupRegistration, GroupSelectionStart, GroupTicketSubmission, RelayEntryGenerated,
    RelayEntryRequested,
};
