//! Aggregate reducers for the raffle platform.
//!
//! - Tickets: reservation, payment proof, approval, rejection, cancellation
//!   and expiry of raffle tickets

pub mod tickets;

pub use tickets::{TicketAction, TicketEnvironment, TicketReducer, TicketState};
