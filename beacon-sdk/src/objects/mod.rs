//! Objects exchanged between the chain adapters and the client core.

pub mod staker;
pub mod ticket;

pub use staker::StakerAddress;
pub use ticket::{ChainTicket, ChainTicketProof, Proof, Ticket, TicketValue, generate_tickets};
