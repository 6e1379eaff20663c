//! Function endpoints called by the dashboard, Telegram and cron.
//!
//! - POST /functions/send-email - Render a template and send it
//! - POST /functions/telegram-webhook - Bot API webhook
//! - POST /functions/cleanup-notifications - Delete old read notifications

use super::error::AppError;
use crate::maintenance::{cleanup_notifications, NOTIFICATION_RETENTION_DAYS};
use crate::notifications::EmailTemplate;
use crate::server::state::AppState;
use crate::telegram::types::Update;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header Telegram sets to the secret registered with `setWebhook`.
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Request to send a templated email.
#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    /// Template name, e.g. `tickets_approved`
    pub template: String,
    /// Recipient
    pub to: String,
    /// Template data
    #[serde(default)]
    pub data: Value,
}

/// Response after sending an email.
#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    /// Always true on success
    pub success: bool,
    /// Template used
    pub template: &'static str,
    /// Recipient
    pub to: String,
}

/// Acknowledgement returned to Telegram.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always true; Telegram retries on anything but 2xx
    pub ok: bool,
    /// Replies delivered
    pub replies: usize,
}

/// Response after a cleanup run.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    /// Always true on success
    pub success: bool,
    /// Rows removed
    pub deleted: u64,
    /// Retention window applied
    pub retention_days: i64,
}

/// Render a template and send it through the configured provider.
///
/// # Errors
///
/// 422 for an unknown template, missing data or an invalid recipient;
/// 502 if the provider rejects the message.
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<SendEmailRequest>,
) -> Result<Json<SendEmailResponse>, AppError> {
    let template: EmailTemplate = request.template.parse()?;
    let to = request.to.trim().to_string();
    if !to.contains('@') {
        return Err(AppError::validation("A valid recipient email is required"));
    }

    state.notifier.send_email(template, &to, &request.data).await?;

    Ok(Json(SendEmailResponse {
        success: true,
        template: template.name(),
        to,
    }))
}

/// Handle a Bot API update.
///
/// Delivery failures are logged and still acknowledged so Telegram does not
/// redeliver the update.
///
/// # Errors
///
/// 401 if a webhook secret is configured and the header does not match.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<Json<WebhookResponse>, AppError> {
    if let Some(secret) = &state.config.telegram.webhook_secret {
        let provided = headers
            .get(TELEGRAM_SECRET_HEADER)
            .map(HeaderValue::as_bytes);
        if !secret_matches(provided, secret) {
            tracing::warn!(update_id = update.update_id, "Telegram webhook secret mismatch");
            return Err(AppError::unauthorized("Invalid webhook secret"));
        }
    }

    let replies = match state.dispatcher.handle_update(&update).await {
        Ok(replies) => replies,
        Err(error) => {
            tracing::error!(update_id = update.update_id, %error, "Telegram update failed");
            0
        },
    };
    Ok(Json(WebhookResponse { ok: true, replies }))
}

/// Compare the webhook header against the configured secret in constant time.
fn secret_matches(provided: Option<&[u8]>, secret: &str) -> bool {
    provided.is_some_and(|p| constant_time_eq::constant_time_eq(p, secret.as_bytes()))
}

/// Delete read notifications older than the retention window.
///
/// # Errors
///
/// 500 if the delete fails.
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>, AppError> {
    let deleted =
        cleanup_notifications(state.storage.notifications.as_ref(), state.clock.as_ref()).await?;
    Ok(Json(CleanupResponse {
        success: true,
        deleted,
        retention_days: NOTIFICATION_RETENTION_DAYS,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_secret_must_match_exactly() {
        assert!(secret_matches(Some("s3cret".as_bytes()), "s3cret"));
        assert!(!secret_matches(Some("s3creT".as_bytes()), "s3cret"));
        assert!(!secret_matches(Some("s3cre".as_bytes()), "s3cret"));
        assert!(!secret_matches(Some("".as_bytes()), "s3cret"));
        assert!(!secret_matches(None, "s3cret"));
    }
}
