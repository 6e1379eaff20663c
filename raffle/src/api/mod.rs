//! HTTP API handlers.
//!
//! - `tickets`: ticket lifecycle and bulk operations
//! - `raffles`: organizations, raffles and Telegram link codes
//! - `numbering`: numbering preview
//! - `functions`: send-email, Telegram webhook and notification cleanup

pub mod error;
pub mod functions;
pub mod numbering;
pub mod raffles;
pub mod tickets;

pub use error::AppError;
