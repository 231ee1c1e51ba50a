//! Event channel factories and handles.
//!
//! Chain subscriptions deliver into these channels; the dispatcher owns the
//! receiving ends.

use super::types::{GroupRegistration, GroupSelectionStart, RelayEntryGenerated, RelayEntryRequested};
use crate::error::BeaconError;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for RelayEntryRequested events.
pub type RelayEntryRequestedSender = mpsc::Sender<RelayEntryRequested>;
/// Receiver handle for RelayEntryRequested events.
pub type RelayEntryRequestedReceiver = mpsc::Receiver<RelayEntryRequested>;

/// Sender handle for RelayEntryGenerated events.
pub type RelayEntryGeneratedSender = mpsc::Sender<RelayEntryGenerated>;
/// Receiver handle for RelayEntryGenerated events.
pub type RelayEntryGeneratedReceiver = mpsc::Receiver<RelayEntryGenerated>;

/// Sender handle for GroupSelectionStart events.
pub type GroupSelectionStartSender = mpsc::Sender<GroupSelectionStart>;
/// Receiver handle for GroupSelectionStart events.
pub type GroupSelectionStartReceiver = mpsc::Receiver<GroupSelectionStart>;

/// Sender handle for GroupRegistration events.
pub type GroupRegistrationSender = mpsc::Sender<GroupRegistration>;
/// Receiver handle for GroupRegistration events.
pub type GroupRegistrationReceiver = mpsc::Receiver<GroupRegistration>;

/// Sink for non-fatal per-ticket submission errors. Producers use
/// `try_send` and drop the error when the sink is full.
pub type SubmissionErrorSender = mpsc::Sender<BeaconError>;
/// Receiving end of the submission error sink.
pub type SubmissionErrorReceiver = mpsc::Receiver<BeaconError>;

/// Create a new RelayEntryRequested channel.
pub fn relay_entry_requested_channel() -> (RelayEntryRequestedSender, RelayEntryRequestedReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new RelayEntryGenerated channel.
pub fn relay_entry_generated_channel() -> (RelayEntryGeneratedSender, RelayEntryGeneratedReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new GroupSelectionStart channel.
pub fn group_selection_start_channel() -> (GroupSelectionStartSender, GroupSelectionStartReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new GroupRegistration channel.
pub fn group_registration_channel() -> (GroupRegistrationSender, GroupRegistrationReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a bounded submission error sink.
///
/// A capacity of zero is bumped to one, since tokio channels need room for
/// at least one message.
pub fn submission_error_channel(capacity: usize) -> (SubmissionErrorSender, SubmissionErrorReceiver) {
    mpsc::channel(capacity.max(1))
}
