//! Router configuration for the raffle platform.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::{health_check, metrics_handler, readiness_check};
use super::state::AppState;
use crate::api::{functions, numbering, raffles, tickets};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - Health, readiness and Prometheus metrics
/// - `/api`: organizations, raffles, ticket lifecycle, numbering preview
/// - `/functions`: send-email, Telegram webhook, notification cleanup
///
/// CORS is permissive: the dashboard calls the functions from the browser.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Organizations and Telegram linking
        .route("/organizations", post(raffles::create_organization))
        .route(
            "/organizations/:id/telegram/link-code",
            post(raffles::issue_link_code),
        )
        .route(
            "/telegram/buyer-link-code",
            post(raffles::issue_buyer_link_code),
        )
        // Raffles
        .route("/raffles", post(raffles::create_raffle))
        .route("/raffles/:id", get(raffles::get_raffle))
        // Ticket lifecycle
        .route("/raffles/:id/tickets/generate", post(tickets::generate_tickets))
        .route("/raffles/:id/tickets/reserve", post(tickets::reserve_tickets))
        .route("/raffles/:id/tickets/approve", post(tickets::approve_tickets))
        .route("/raffles/:id/tickets/reject", post(tickets::reject_tickets))
        .route("/raffles/:id/tickets/cancel", post(tickets::cancel_tickets))
        .route("/raffles/:id/tickets/counts", get(tickets::ticket_counts))
        .route(
            "/raffles/:id/references/:reference/approve",
            post(tickets::approve_reference),
        )
        .route(
            "/raffles/:id/references/:reference/proof",
            post(tickets::submit_proof),
        )
        // Numbering
        .route("/numbering/preview", post(numbering::preview));

    let function_routes = Router::new()
        .route("/send-email", post(functions::send_email))
        .route("/telegram-webhook", post(functions::telegram_webhook))
        .route("/cleanup-notifications", post(functions::cleanup));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .nest("/functions", function_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
