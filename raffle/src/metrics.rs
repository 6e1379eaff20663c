//! Business metrics for the raffle platform.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `raffle_ticket_transitions_total{transition}` - Tickets moved per transition
//! - `raffle_validation_failures_total{operation}` - Rejected commands
//! - `raffle_emails_total{template, outcome}` - Emails sent or failed
//! - `raffle_telegram_messages_total{audience, outcome}` - Bot messages sent or failed
//! - `raffle_telegram_updates_total{kind}` - Webhook updates by command
//! - `raffle_notifications_deleted_total` - Rows removed by the cleanup job
//!
//! ## Gauges
//! - `raffle_tickets_generated` - Size of the last generated pool
//!
//! `effects.executed` is recorded by the runtime.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install the Prometheus recorder
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus recorder and register metric descriptions.
///
/// Returns `Ok(None)` if a recorder is already installed (tests build many
/// routers in one process).
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if the recorder cannot be built.
pub fn install_recorder() -> Result<Option<PrometheusHandle>, MetricsError> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            register_business_metrics();
            Ok(Some(handle))
        },
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains("already") {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Ok(None)
            } else {
                Err(MetricsError::Install(err_msg))
            }
        },
    }
}

/// Register all business metric descriptions.
pub fn register_business_metrics() {
    describe_counter!(
        "raffle_ticket_transitions_total",
        "Tickets moved by a lifecycle transition (reserved, proof_submitted, approved, rejected, canceled, expired)"
    );
    describe_counter!(
        "raffle_validation_failures_total",
        "Ticket commands rejected by validation"
    );
    describe_counter!(
        "raffle_emails_total",
        "Transactional emails by template and outcome"
    );
    describe_counter!(
        "raffle_telegram_messages_total",
        "Telegram bot messages by audience and outcome"
    );
    describe_counter!(
        "raffle_telegram_updates_total",
        "Telegram webhook updates by command"
    );
    describe_counter!(
        "raffle_notifications_deleted_total",
        "Read notifications removed by the cleanup job"
    );
    describe_gauge!(
        "raffle_tickets_generated",
        "Number of tickets in the most recently generated pool"
    );

    tracing::info!("Business metrics registered");
}

const fn outcome(ok: bool) -> &'static str {
    if ok { "sent" } else { "failed" }
}

/// Record tickets moved by a transition.
pub fn record_transition(transition: &'static str, tickets: usize) {
    metrics::counter!("raffle_ticket_transitions_total", "transition" => transition)
        .increment(tickets as u64);
    tracing::debug!(transition, tickets, "Recorded ticket transition metric");
}

/// Record a rejected command.
pub fn record_validation_failure(operation: &'static str) {
    metrics::counter!("raffle_validation_failures_total", "operation" => operation).increment(1);
}

/// Record an email attempt.
pub fn record_email(template: &'static str, ok: bool) {
    metrics::counter!("raffle_emails_total", "template" => template, "outcome" => outcome(ok))
        .increment(1);
}

/// Record a Telegram send attempt.
pub fn record_telegram_message(audience: &'static str, ok: bool) {
    metrics::counter!(
        "raffle_telegram_messages_total",
        "audience" => audience,
        "outcome" => outcome(ok)
    )
    .increment(1);
}

/// Record an incoming webhook update.
pub fn record_telegram_update(kind: &'static str) {
    metrics::counter!("raffle_telegram_updates_total", "kind" => kind).increment(1);
}

/// Record notifications removed by cleanup.
pub fn record_notifications_deleted(count: u64) {
    metrics::counter!("raffle_notifications_deleted_total").increment(count);
}

/// Record a generated ticket pool.
#[allow(clippy::cast_precision_loss)]
pub fn record_tickets_generated(count: usize) {
    metrics::gauge!("raffle_tickets_generated").set(count as f64);
}
