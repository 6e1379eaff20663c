//! Application services - wire storage, reducers and notifications together.

mod services;

pub use services::{
    OrganizationService, ServiceError, TicketSelection, TicketService, TransitionOutcome,
    EXPIRY_BATCH_SIZE, LINK_CODE_LENGTH, LINK_CODE_TTL_MINUTES,
};
