//! Ticket lifecycle endpoints.
//!
//! - POST /api/raffles/:id/tickets/generate - Create the ticket pool
//! - POST /api/raffles/:id/tickets/reserve - Reserve tickets for a buyer
//! - POST /api/raffles/:id/tickets/approve - Bulk approve
//! - POST /api/raffles/:id/tickets/reject - Bulk reject
//! - POST /api/raffles/:id/tickets/cancel - Cancel
//! - GET /api/raffles/:id/tickets/counts - Counts per status
//! - POST /api/raffles/:id/references/:reference/approve - Approve a checkout
//! - POST /api/raffles/:id/references/:reference/proof - Attach a payment proof

use super::error::AppError;
use crate::app::{TicketSelection, TransitionOutcome};
use crate::server::state::AppState;
use crate::types::{BuyerInfo, RaffleId, StatusCounts, Ticket, TicketId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Tickets addressed by id or by number. Ids win when both are given.
#[derive(Debug, Default, Deserialize)]
pub struct TicketBatchRequest {
    /// Ticket ids
    #[serde(default)]
    pub ticket_ids: Option<Vec<TicketId>>,
    /// Ticket numbers
    #[serde(default)]
    pub ticket_numbers: Option<Vec<String>>,
}

impl TicketBatchRequest {
    fn selection(self) -> TicketSelection {
        match (self.ticket_ids, self.ticket_numbers) {
            (Some(ids), _) => TicketSelection::Ids(ids),
            (None, Some(numbers)) => TicketSelection::Numbers(numbers),
            (None, None) => TicketSelection::Ids(Vec::new()),
        }
    }
}

/// Request to reserve tickets.
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    /// Tickets to reserve
    #[serde(flatten)]
    pub tickets: TicketBatchRequest,
    /// Buyer name
    pub buyer_name: String,
    /// Buyer email
    pub buyer_email: String,
    /// Buyer phone
    #[serde(default)]
    pub buyer_phone: Option<String>,
    /// Reference the buyer quotes when paying
    #[serde(default)]
    pub payment_reference: String,
}

/// Request to attach a payment proof.
#[derive(Debug, Deserialize)]
pub struct ProofRequest {
    /// Uploaded proof location
    pub proof_url: String,
}

/// Tickets written by a transition.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    /// Number of tickets changed
    pub count: usize,
    /// Changed tickets in their new state
    pub tickets: Vec<Ticket>,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            count: outcome.tickets.len(),
            tickets: outcome.tickets,
        }
    }
}

/// Response after generating a pool.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Raffle
    pub raffle_id: RaffleId,
    /// Tickets created
    pub generated: u64,
}

/// Counts per status.
#[derive(Debug, Serialize)]
pub struct CountsResponse {
    /// Counts
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Sum of all counts
    pub total: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Generate the ticket pool from the raffle's numbering config.
///
/// # Errors
///
/// 404 for an unknown raffle, 409 if the pool already exists.
pub async fn generate_tickets(
    State(state): State<AppState>,
    Path(raffle_id): Path<RaffleId>,
) -> Result<(StatusCode, Json<GenerateResponse>), AppError> {
    let generated = state.tickets.generate_tickets(raffle_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            raffle_id,
            generated,
        }),
    ))
}

/// Reserve tickets for a buyer.
///
/// # Errors
///
/// 422 if any ticket is unknown or not available, or buyer data is invalid.
pub async fn reserve_tickets(
    State(state): State<AppState>,
    Path(raffle_id): Path<RaffleId>,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let buyer = BuyerInfo {
        name: request.buyer_name,
        email: request.buyer_email,
        phone: request.buyer_phone,
    };
    let outcome = state
        .tickets
        .reserve(
            raffle_id,
            request.tickets.selection(),
            buyer,
            request.payment_reference,
        )
        .await?;
    Ok(Json(outcome.into()))
}

/// Approve reserved tickets in one batch.
///
/// # Errors
///
/// 422 if any ticket is unknown or not reserved; 409 on a concurrent update.
pub async fn approve_tickets(
    State(state): State<AppState>,
    Path(raffle_id): Path<RaffleId>,
    Json(request): Json<TicketBatchRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state
        .tickets
        .bulk_approve(raffle_id, request.selection())
        .await?;
    Ok(Json(outcome.into()))
}

/// Reject reserved tickets in one batch.
///
/// # Errors
///
/// 422 if any ticket is unknown or not reserved; 409 on a concurrent update.
pub async fn reject_tickets(
    State(state): State<AppState>,
    Path(raffle_id): Path<RaffleId>,
    Json(request): Json<TicketBatchRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state
        .tickets
        .bulk_reject(raffle_id, request.selection())
        .await?;
    Ok(Json(outcome.into()))
}

/// Cancel tickets.
///
/// # Errors
///
/// 422 if any ticket is unknown or already canceled.
pub async fn cancel_tickets(
    State(state): State<AppState>,
    Path(raffle_id): Path<RaffleId>,
    Json(request): Json<TicketBatchRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state.tickets.cancel(raffle_id, request.selection()).await?;
    Ok(Json(outcome.into()))
}

/// Approve every reserved ticket of a checkout.
///
/// # Errors
///
/// 422 if nothing is reserved under the reference.
pub async fn approve_reference(
    State(state): State<AppState>,
    Path((raffle_id, reference)): Path<(RaffleId, String)>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state
        .tickets
        .approve_by_reference(raffle_id, &reference)
        .await?;
    Ok(Json(outcome.into()))
}

/// Attach a payment proof to a checkout.
///
/// # Errors
///
/// 422 if nothing is reserved under the reference or the URL is empty.
pub async fn submit_proof(
    State(state): State<AppState>,
    Path((raffle_id, reference)): Path<(RaffleId, String)>,
    Json(request): Json<ProofRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state
        .tickets
        .submit_payment_proof(raffle_id, &reference, request.proof_url)
        .await?;
    Ok(Json(outcome.into()))
}

/// Ticket counts per status.
///
/// # Errors
///
/// 404 for an unknown raffle.
pub async fn ticket_counts(
    State(state): State<AppState>,
    Path(raffle_id): Path<RaffleId>,
) -> Result<Json<CountsResponse>, AppError> {
    let counts = state.tickets.status_counts(raffle_id).await?;
    Ok(Json(CountsResponse {
        total: counts.total(),
        counts,
    }))
}
