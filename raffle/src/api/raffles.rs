//! Organization, raffle and Telegram link code endpoints.
//!
//! - POST /api/organizations - Register an organization
//! - POST /api/organizations/:id/telegram/link-code - Issue a `/vincular` code
//! - POST /api/telegram/buyer-link-code - Issue a `/start buyer_<code>` code
//! - POST /api/raffles - Create a raffle
//! - GET /api/raffles/:id - Raffle details

use super::error::AppError;
use crate::numbering::NumberingConfig;
use crate::server::state::AppState;
use crate::telegram::commands::BUYER_START_PREFIX;
use crate::types::{
    Organization, OrganizationId, Raffle, RaffleId, RaffleStatus, SubscriptionTier,
    DEFAULT_RESERVATION_MINUTES,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to register an organization.
#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    /// Display name
    pub name: String,
    /// Plan
    pub subscription_tier: SubscriptionTier,
}

/// Request to create a raffle.
#[derive(Debug, Deserialize)]
pub struct CreateRaffleRequest {
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Public title
    pub title: String,
    /// Price per ticket in cents
    pub ticket_price_cents: i64,
    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Scheduled draw
    #[serde(default)]
    pub draw_date: Option<DateTime<Utc>>,
    /// Publication status
    #[serde(default = "default_status")]
    pub status: RaffleStatus,
    /// Reservation hold in minutes
    #[serde(default = "default_reservation_minutes")]
    pub reservation_minutes: u32,
    /// Ticket numbering
    #[serde(default)]
    pub numbering: NumberingConfig,
}

fn default_currency() -> String {
    "MXN".to_string()
}

const fn default_status() -> RaffleStatus {
    RaffleStatus::Active
}

const fn default_reservation_minutes() -> u32 {
    DEFAULT_RESERVATION_MINUTES
}

/// Organization link code.
#[derive(Debug, Serialize)]
pub struct LinkCodeResponse {
    /// Code to send with `/vincular`
    pub link_code: String,
    /// Code expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request for a buyer link code.
#[derive(Debug, Deserialize)]
pub struct BuyerLinkCodeRequest {
    /// Buyer email
    pub email: String,
}

/// Buyer link code.
#[derive(Debug, Serialize)]
pub struct BuyerLinkCodeResponse {
    /// Code
    pub link_code: String,
    /// Payload for `https://t.me/<bot>?start=<payload>`
    pub start_payload: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register an organization.
///
/// # Errors
///
/// 422 for an empty name.
pub async fn create_organization(
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), AppError> {
    let organization = state
        .organizations
        .create_organization(Organization {
            id: OrganizationId::new(),
            name: request.name.trim().to_string(),
            subscription_tier: request.subscription_tier,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(organization)))
}

/// Issue a Telegram link code for an organization.
///
/// # Errors
///
/// 404 for an unknown organization.
pub async fn issue_link_code(
    State(state): State<AppState>,
    Path(organization_id): Path<OrganizationId>,
) -> Result<Json<LinkCodeResponse>, AppError> {
    let connection = state.organizations.issue_link_code(organization_id).await?;
    Ok(Json(LinkCodeResponse {
        link_code: connection.link_code.unwrap_or_default(),
        expires_at: connection.link_code_expires_at,
    }))
}

/// Issue a Telegram link code for a buyer email.
///
/// # Errors
///
/// 422 for an invalid email.
pub async fn issue_buyer_link_code(
    State(state): State<AppState>,
    Json(request): Json<BuyerLinkCodeRequest>,
) -> Result<Json<BuyerLinkCodeResponse>, AppError> {
    let link = state
        .organizations
        .issue_buyer_link_code(&request.email)
        .await?;
    let link_code = link.link_code.unwrap_or_default();
    Ok(Json(BuyerLinkCodeResponse {
        start_payload: format!("{BUYER_START_PREFIX}{link_code}"),
        link_code,
    }))
}

/// Create a raffle.
///
/// # Errors
///
/// 422 for an invalid numbering config or title, 404 for an unknown organization.
pub async fn create_raffle(
    State(state): State<AppState>,
    Json(request): Json<CreateRaffleRequest>,
) -> Result<(StatusCode, Json<Raffle>), AppError> {
    let raffle = state
        .tickets
        .create_raffle(Raffle {
            id: RaffleId::new(),
            organization_id: request.organization_id,
            title: request.title.trim().to_string(),
            ticket_price_cents: request.ticket_price_cents,
            currency: request.currency.trim().to_uppercase(),
            draw_date: request.draw_date,
            status: request.status,
            reservation_minutes: request.reservation_minutes,
            numbering: request.numbering,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(raffle)))
}

/// Raffle details.
///
/// # Errors
///
/// 404 for an unknown raffle.
pub async fn get_raffle(
    State(state): State<AppState>,
    Path(raffle_id): Path<RaffleId>,
) -> Result<Json<Raffle>, AppError> {
    state
        .storage
        .raffles
        .get_raffle(raffle_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Raffle not found: {raffle_id}")))
}
