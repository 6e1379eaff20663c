//! Raffle Platform - backend for online raffles
//!
//! Organizers publish raffles with a numbered ticket pool. Buyers reserve
//! tickets, pay offline and upload a proof; organizers approve or reject the
//! payment, in bulk or by payment reference. Every transition fans out email
//! and Telegram notifications.
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum)            Telegram webhook          Background jobs
//!      │                        │                         │
//!      ▼                        ▼                         ▼
//! ┌──────────────┐      ┌────────────────┐      ┌──────────────────┐
//! │ TicketService│      │  Dispatcher    │      │ Expiry sweeper   │
//! │              │      │ (commands,     │      │ Notification     │
//! │              │      │  callbacks)    │      │ cleanup          │
//! └──────────────┘      └────────────────┘      └──────────────────┘
//!        │ load → reduce → save_transition → execute effects
//!        ▼
//! ┌──────────────┐      ┌────────────────┐
//! │TicketReducer │ ───▶ │ Notifier       │ ──▶ Resend / Bot API
//! │ (pure)       │      │ (email, tg)    │
//! └──────────────┘      └────────────────┘
//!        │
//!        ▼
//!  Storage (PostgreSQL or memory)
//! ```
//!
//! # Key Features
//!
//! ## 1. Ticket Lifecycle
//!
//! ```text
//! available ──reserve──▶ reserved ──approve──▶ sold
//!     ▲                     │
//!     └───reject/expire─────┘
//! available / reserved / sold ──cancel──▶ canceled
//! ```
//!
//! A batch is validated as a whole: if any ticket is unknown or in the wrong
//! status, nothing changes. Writes carry the status each ticket was loaded
//! with, so concurrent transitions on the same tickets conflict instead of
//! overwriting each other.
//!
//! ## 2. Grouped Notifications
//!
//! Bulk approvals and rejections send one email per buyer listing all of
//! that buyer's tickets, never one email per ticket.
//!
//! ## 3. Telegram Bot
//!
//! Organizers link a chat with `/vincular <code>` and get sales summaries and
//! alerts; buyers link through `/start buyer_<code>` deep links.
//!
//! # Usage
//!
//! See the [aggregates] module for the reducer and [`server::build_router`]
//! for the HTTP surface.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod api;
pub mod app;
pub mod config;
pub mod maintenance;
pub mod metrics;
pub mod notifications;
pub mod numbering;
pub mod server;
pub mod store;
pub mod telegram;
pub mod types;

pub use aggregates::{TicketAction, TicketEnvironment, TicketReducer, TicketState};
pub use app::{OrganizationService, ServiceError, TicketService};
pub use config::Config;
pub use numbering::NumberingConfig;
pub use types::*;
