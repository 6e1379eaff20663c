//! Notification fan-out for ticket transitions.
//!
//! The ticket reducer describes notifications as effects; each effect calls
//! one method here. Email goes to buyers through the [`EmailSender`].
//! Telegram messages go to linked buyer chats and to the organizer's chat,
//! each gated by the recipient's preferences.

use super::email::{EmailError, EmailSender};
use super::templates::{self, EmailTemplate, TemplateError};
use crate::metrics;
use crate::store::{RepositoryError, TelegramRepository};
use crate::telegram::client::{TelegramApi, TelegramError};
use crate::telegram::types::OutgoingMessage;
use crate::types::OrganizationId;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Notification delivery errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// Template rendering failed
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Email provider failed
    #[error(transparent)]
    Email(#[from] EmailError),

    /// Telegram API failed
    #[error(transparent)]
    Telegram(#[from] TelegramError),

    /// Preference lookup failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Buyer-facing Telegram alert kinds, matched against buyer preferences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuyerAlert {
    /// Tickets reserved
    Reservation,
    /// Payment approved
    PaymentApproved,
    /// Payment rejected
    PaymentRejected,
}

/// Organizer-facing Telegram alert kinds, matched against organizer preferences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrganizerAlert {
    /// A buyer reserved tickets
    TicketReserved,
    /// A buyer uploaded a payment proof
    PaymentProof,
    /// A payment was approved
    PaymentApproved,
    /// A payment was rejected
    PaymentRejected,
    /// Reservations expired
    ReservationExpired,
}

/// Sends emails and Telegram messages.
#[derive(Clone)]
pub struct Notifier {
    email: Arc<dyn EmailSender>,
    telegram: Arc<dyn TelegramApi>,
    links: Arc<dyn TelegramRepository>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    /// Create a notifier
    #[must_use]
    pub fn new(
        email: Arc<dyn EmailSender>,
        telegram: Arc<dyn TelegramApi>,
        links: Arc<dyn TelegramRepository>,
    ) -> Self {
        Self {
            email,
            telegram,
            links,
        }
    }

    /// Render a template and send it.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] if rendering or delivery fails.
    pub async fn send_email(
        &self,
        template: EmailTemplate,
        to: &str,
        data: &Value,
    ) -> Result<(), NotificationError> {
        let message = templates::render(template, to, data)?;
        let result = self.email.send(&message).await;
        metrics::record_email(template.name(), result.is_ok());
        result?;
        debug!(template = template.name(), to, "Email sent");
        Ok(())
    }

    /// Message a buyer's linked chat if the buyer enabled this alert.
    ///
    /// Returns whether a message was sent.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] if the lookup or the send fails.
    pub async fn notify_buyer(
        &self,
        email: &str,
        alert: BuyerAlert,
        text: &str,
    ) -> Result<bool, NotificationError> {
        let Some(link) = self.links.buyer_link_by_email(email).await? else {
            return Ok(false);
        };
        let Some(chat_id) = link.chat_id else {
            return Ok(false);
        };
        let prefs = link.preferences;
        let enabled = match alert {
            BuyerAlert::Reservation => prefs.reservation,
            BuyerAlert::PaymentApproved => prefs.payment_approved,
            BuyerAlert::PaymentRejected => prefs.payment_rejected,
        };
        if !enabled {
            return Ok(false);
        }
        self.send_telegram(OutgoingMessage::text(chat_id, text), "buyer")
            .await?;
        Ok(true)
    }

    /// Message the organizer's linked chat if the organizer enabled this alert.
    ///
    /// Returns whether a message was sent.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] if the lookup or the send fails.
    pub async fn notify_organizer(
        &self,
        organization_id: OrganizationId,
        alert: OrganizerAlert,
        text: &str,
    ) -> Result<bool, NotificationError> {
        let Some(connection) = self.links.connection_for_organization(organization_id).await?
        else {
            return Ok(false);
        };
        let Some(chat_id) = connection.chat_id.filter(|_| connection.is_linked()) else {
            return Ok(false);
        };
        let prefs = connection.preferences;
        let enabled = match alert {
            OrganizerAlert::TicketReserved => prefs.ticket_reserved,
            OrganizerAlert::PaymentProof => prefs.payment_proof,
            OrganizerAlert::PaymentApproved => prefs.payment_approved,
            OrganizerAlert::PaymentRejected => prefs.payment_rejected,
            OrganizerAlert::ReservationExpired => prefs.reservation_expired,
        };
        if !enabled {
            return Ok(false);
        }
        self.send_telegram(OutgoingMessage::text(chat_id, text), "organizer")
            .await?;
        Ok(true)
    }

    async fn send_telegram(
        &self,
        message: OutgoingMessage,
        audience: &'static str,
    ) -> Result<(), NotificationError> {
        let result = self.telegram.send_message(&message).await;
        metrics::record_telegram_message(audience, result.is_ok());
        if let Err(error) = &result {
            warn!(chat_id = message.chat_id, audience, %error, "Telegram send failed");
        }
        result.map_err(NotificationError::from)
    }
}
