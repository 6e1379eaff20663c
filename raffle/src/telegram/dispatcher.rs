//! Webhook update routing.
//!
//! Every update is handled from scratch: the only state between messages is
//! the persisted connection and buyer link rows keyed by chat id.

use super::client::{TelegramApi, TelegramError};
use super::commands::{
    normalize_code, parse_callback, parse_command, CallbackAction, Command, BUYER_START_PREFIX,
    TOGGLE_BUYER_PREFIX, TOGGLE_ORG_PREFIX,
};
use super::types::{InlineKeyboardButton, InlineKeyboardMarkup, OutgoingMessage, Update};
use crate::aggregates::tickets::DATE_FORMAT;
use crate::metrics;
use crate::notifications::templates::escape_html;
use crate::store::{RepositoryError, Storage};
use crate::types::{format_amount, BuyerPreferences, OrganizerPreferences, TelegramConnection};
use raffle_core::environment::Clock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const WELCOME: &str = "👋 ¡Hola! Soy el bot de notificaciones de tus rifas.\n\n\
Si eres organizador, vincula este chat con <code>/vincular CÓDIGO</code> usando el código de tu panel.\n\
Escribe /ayuda para ver todos los comandos.";

const HELP: &str = "<b>Comandos disponibles</b>\n\
/vincular CÓDIGO - Vincular este chat con tu organización\n\
/config - Elegir qué notificaciones recibir\n\
/ventas - Resumen de ventas\n\
/sorteos - Sorteos activos\n\
/preferencias - Preferencias como comprador\n\
/desvincular - Desvincular este chat\n\
/ayuda - Mostrar esta ayuda";

const LINK_INSTRUCTIONS: &str = "🔗 Este chat no está vinculado a ninguna organización.\n\
Genera un código en tu panel (Configuración → Telegram) y envíalo con <code>/vincular CÓDIGO</code>.";

const BUYER_INSTRUCTIONS: &str = "🔗 Este chat no está vinculado a tus compras.\n\
Abre el enlace de Telegram de tu correo de reserva para recibir avisos de tus boletos.";

const UNKNOWN_COMMAND: &str = "No reconozco ese comando. Usa /ayuda para ver las opciones.";

/// Dispatcher errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Row lookup or write failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Reply could not be delivered
    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

/// Something to send back for an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// `sendMessage`
    Message(OutgoingMessage),
    /// `answerCallbackQuery`
    CallbackAnswer {
        /// Callback being answered
        callback_query_id: String,
        /// Toast text
        text: String,
    },
}

/// Result of a link attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Chat linked; carries the organization name or buyer email
    Linked(String),
    /// No code given
    MissingCode,
    /// No pending link with this code
    UnknownCode,
    /// Code past its expiry
    ExpiredCode,
    /// Organization plan does not include Telegram
    TierNotAllowed,
}

impl LinkOutcome {
    fn message(&self) -> String {
        match self {
            Self::Linked(name) => format!(
                "✅ Chat vinculado con <b>{}</b>. Usa /config para elegir tus notificaciones.",
                escape_html(name)
            ),
            Self::MissingCode => {
                "Envía el código de tu panel: <code>/vincular CÓDIGO</code>".to_string()
            },
            Self::UnknownCode => {
                "❌ Código inválido. Revisa el código en tu panel e inténtalo de nuevo.".to_string()
            },
            Self::ExpiredCode => {
                "⌛ El código expiró. Genera uno nuevo desde tu panel.".to_string()
            },
            Self::TierNotAllowed => {
                "🔒 Las notificaciones por Telegram están disponibles en los planes Premium y Enterprise."
                    .to_string()
            },
        }
    }
}

/// Routes webhook updates to command handlers.
#[derive(Clone)]
pub struct TelegramDispatcher {
    storage: Storage,
    clock: Arc<dyn Clock>,
    api: Arc<dyn TelegramApi>,
}

impl std::fmt::Debug for TelegramDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramDispatcher")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl TelegramDispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new(storage: Storage, clock: Arc<dyn Clock>, api: Arc<dyn TelegramApi>) -> Self {
        Self {
            storage,
            clock,
            api,
        }
    }

    /// Route an update and deliver the replies. Returns the number of replies sent.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if a lookup or a Bot API call fails.
    pub async fn handle_update(&self, update: &Update) -> Result<usize, DispatchError> {
        let replies = self.route(update).await?;
        for reply in &replies {
            match reply {
                Reply::Message(message) => self.api.send_message(message).await?,
                Reply::CallbackAnswer {
                    callback_query_id,
                    text,
                } => {
                    self.api
                        .answer_callback_query(callback_query_id, text)
                        .await?;
                },
            }
        }
        Ok(replies.len())
    }

    /// Decide the replies for an update without sending them.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Repository`] if a lookup or write fails.
    pub async fn route(&self, update: &Update) -> Result<Vec<Reply>, DispatchError> {
        if let Some(callback) = &update.callback_query {
            metrics::record_telegram_update("callback");
            let chat_id = callback
                .message
                .as_ref()
                .map_or(callback.from.id, |m| m.chat.id);
            let text = self
                .handle_callback(chat_id, callback.data.as_deref().unwrap_or_default())
                .await?;
            return Ok(vec![Reply::CallbackAnswer {
                callback_query_id: callback.id.clone(),
                text,
            }]);
        }

        let Some(message) = &update.message else {
            metrics::record_telegram_update("ignored");
            return Ok(Vec::new());
        };
        let Some(command) = message.text.as_deref().and_then(parse_command) else {
            metrics::record_telegram_update("text");
            return Ok(Vec::new());
        };

        metrics::record_telegram_update(command.name());
        let chat_id = message.chat.id;
        debug!(chat_id, command = command.name(), "Telegram command");

        let reply = self.handle_command(chat_id, command).await?;
        Ok(vec![Reply::Message(reply)])
    }

    async fn handle_command(
        &self,
        chat_id: i64,
        command: Command,
    ) -> Result<OutgoingMessage, DispatchError> {
        let text = match command {
            Command::Start(None) => WELCOME.to_string(),
            Command::Start(Some(payload)) => match payload.strip_prefix(BUYER_START_PREFIX) {
                Some(code) => self.link_buyer(chat_id, code).await?.message(),
                None => self
                    .link_organization(chat_id, Some(payload.as_str()))
                    .await?
                    .message(),
            },
            Command::Link(code) => self
                .link_organization(chat_id, code.as_deref())
                .await?
                .message(),
            Command::Help => HELP.to_string(),
            Command::Config => return self.config_menu(chat_id).await,
            Command::Preferences => return self.preferences_menu(chat_id).await,
            Command::Sales => self.sales_summary(chat_id).await?,
            Command::Raffles => self.raffle_list(chat_id).await?,
            Command::Unlink => {
                let removed = self.storage.telegram.unlink_chat(chat_id).await?;
                if removed == 0 {
                    "Este chat no estaba vinculado.".to_string()
                } else {
                    info!(chat_id, removed, "Telegram chat unlinked");
                    "👋 Chat desvinculado. Ya no recibirás notificaciones aquí.".to_string()
                }
            },
            Command::Unknown(_) => UNKNOWN_COMMAND.to_string(),
        };
        Ok(OutgoingMessage::text(chat_id, text))
    }

    /// Link a chat to the organization holding `code`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Repository`] if a lookup or write fails.
    pub async fn link_organization(
        &self,
        chat_id: i64,
        code: Option<&str>,
    ) -> Result<LinkOutcome, DispatchError> {
        let Some(code) = code.map(normalize_code).filter(|c| !c.is_empty()) else {
            return Ok(LinkOutcome::MissingCode);
        };
        let Some(mut connection) = self.storage.telegram.connection_by_code(&code).await? else {
            return Ok(LinkOutcome::UnknownCode);
        };

        let now = self.clock.now();
        if connection
            .link_code_expires_at
            .is_some_and(|expires_at| expires_at <= now)
        {
            return Ok(LinkOutcome::ExpiredCode);
        }

        let organization = self
            .storage
            .organizations
            .get_organization(connection.organization_id)
            .await?;
        let Some(organization) = organization.filter(|o| o.subscription_tier.allows_telegram())
        else {
            return Ok(LinkOutcome::TierNotAllowed);
        };

        connection.chat_id = Some(chat_id);
        connection.verified_at = Some(now);
        connection.link_code = None;
        connection.link_code_expires_at = None;
        self.storage.telegram.save_connection(&connection).await?;

        info!(
            chat_id,
            organization_id = %organization.id,
            "Telegram chat linked to organization"
        );
        Ok(LinkOutcome::Linked(organization.name))
    }

    /// Link a chat to the buyer link holding `code`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Repository`] if a lookup or write fails.
    pub async fn link_buyer(&self, chat_id: i64, code: &str) -> Result<LinkOutcome, DispatchError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(LinkOutcome::MissingCode);
        }
        let Some(mut link) = self.storage.telegram.buyer_link_by_code(&code).await? else {
            return Ok(LinkOutcome::UnknownCode);
        };

        link.chat_id = Some(chat_id);
        link.verified_at = Some(self.clock.now());
        link.link_code = None;
        self.storage.telegram.save_buyer_link(&link).await?;

        info!(chat_id, "Telegram chat linked to buyer");
        Ok(LinkOutcome::Linked(link.buyer_email))
    }

    async fn linked_connection(
        &self,
        chat_id: i64,
    ) -> Result<Option<TelegramConnection>, DispatchError> {
        Ok(self
            .storage
            .telegram
            .connection_by_chat(chat_id)
            .await?
            .filter(TelegramConnection::is_linked))
    }

    async fn config_menu(&self, chat_id: i64) -> Result<OutgoingMessage, DispatchError> {
        let Some(connection) = self.linked_connection(chat_id).await? else {
            return Ok(OutgoingMessage::text(chat_id, LINK_INSTRUCTIONS));
        };
        let prefs = connection.preferences;
        let keyboard = toggle_keyboard(
            TOGGLE_ORG_PREFIX,
            OrganizerPreferences::FIELDS
                .iter()
                .map(|(key, label)| (*key, *label, prefs.get(key).unwrap_or(false))),
        );
        Ok(OutgoingMessage::text(
            chat_id,
            "⚙️ <b>Notificaciones de la organización</b>\nToca una opción para activarla o desactivarla.",
        )
        .with_keyboard(keyboard))
    }

    async fn preferences_menu(&self, chat_id: i64) -> Result<OutgoingMessage, DispatchError> {
        let Some(link) = self.storage.telegram.buyer_link_by_chat(chat_id).await? else {
            return Ok(OutgoingMessage::text(chat_id, BUYER_INSTRUCTIONS));
        };
        let prefs = link.preferences;
        let keyboard = toggle_keyboard(
            TOGGLE_BUYER_PREFIX,
            BuyerPreferences::FIELDS
                .iter()
                .map(|(key, label)| (*key, *label, prefs.get(key).unwrap_or(false))),
        );
        Ok(OutgoingMessage::text(
            chat_id,
            "🎟️ <b>Tus notificaciones de compra</b>\nToca una opción para activarla o desactivarla.",
        )
        .with_keyboard(keyboard))
    }

    async fn sales_summary(&self, chat_id: i64) -> Result<String, DispatchError> {
        let Some(connection) = self.linked_connection(chat_id).await? else {
            return Ok(LINK_INSTRUCTIONS.to_string());
        };
        let raffles = self
            .storage
            .raffles
            .active_raffles(connection.organization_id)
            .await?;
        if raffles.is_empty() {
            return Ok("📊 No tienes sorteos activos.".to_string());
        }

        let mut sold = 0_u64;
        let mut reserved = 0_u64;
        let mut revenue: BTreeMap<String, i64> = BTreeMap::new();
        for raffle in &raffles {
            let counts = self.storage.tickets.status_counts(raffle.id).await?;
            sold += counts.sold;
            reserved += counts.reserved;
            let cents = raffle
                .ticket_price_cents
                .saturating_mul(i64::try_from(counts.sold).unwrap_or(i64::MAX));
            let entry = revenue.entry(raffle.currency.clone()).or_default();
            *entry = entry.saturating_add(cents);
        }

        let revenue = revenue
            .iter()
            .map(|(currency, cents)| format_amount(*cents, currency))
            .collect::<Vec<_>>()
            .join(" + ");
        Ok(format!(
            "📊 <b>Resumen de ventas</b>\nSorteos activos: {}\nBoletos vendidos: {sold}\nBoletos reservados: {reserved}\nIngresos: {revenue}",
            raffles.len()
        ))
    }

    async fn raffle_list(&self, chat_id: i64) -> Result<String, DispatchError> {
        let Some(connection) = self.linked_connection(chat_id).await? else {
            return Ok(LINK_INSTRUCTIONS.to_string());
        };
        let raffles = self
            .storage
            .raffles
            .active_raffles(connection.organization_id)
            .await?;
        if raffles.is_empty() {
            return Ok("🎟️ No tienes sorteos activos.".to_string());
        }

        let mut lines = vec!["🎟️ <b>Sorteos activos</b>".to_string()];
        for raffle in &raffles {
            let counts = self.storage.tickets.status_counts(raffle.id).await?;
            let draw = raffle.draw_date.map_or_else(
                || "sin fecha".to_string(),
                |d| d.format(DATE_FORMAT).to_string(),
            );
            lines.push(format!(
                "• <b>{}</b>: {}/{} vendidos · Sorteo: {draw}",
                escape_html(&raffle.title),
                counts.sold,
                raffle.numbering.total_tickets
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn handle_callback(&self, chat_id: i64, data: &str) -> Result<String, DispatchError> {
        match parse_callback(data) {
            CallbackAction::ToggleOrg(field) => {
                let Some(mut connection) = self.linked_connection(chat_id).await? else {
                    return Ok("Este chat no está vinculado.".to_string());
                };
                let Some(enabled) = connection.preferences.toggle(&field) else {
                    return Ok("Opción desconocida.".to_string());
                };
                self.storage.telegram.save_connection(&connection).await?;
                Ok(toggle_answer(label_for(&OrganizerPreferences::FIELDS, &field), enabled))
            },
            CallbackAction::ToggleBuyer(field) => {
                let Some(mut link) = self.storage.telegram.buyer_link_by_chat(chat_id).await?
                else {
                    return Ok("Este chat no está vinculado.".to_string());
                };
                let Some(enabled) = link.preferences.toggle(&field) else {
                    return Ok("Opción desconocida.".to_string());
                };
                self.storage.telegram.save_buyer_link(&link).await?;
                Ok(toggle_answer(label_for(&BuyerPreferences::FIELDS, &field), enabled))
            },
            CallbackAction::Unknown => Ok("Acción no disponible.".to_string()),
        }
    }
}

fn label_for<'a>(fields: &'a [(&'a str, &'a str)], key: &'a str) -> &'a str {
    fields
        .iter()
        .find(|(k, _)| *k == key)
        .map_or(key, |(_, label)| label)
}

fn toggle_answer(label: &str, enabled: bool) -> String {
    format!("{label}: {}", if enabled { "activado" } else { "desactivado" })
}

fn toggle_keyboard<'a>(
    prefix: &str,
    fields: impl Iterator<Item = (&'a str, &'a str, bool)>,
) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: fields
            .map(|(key, label, enabled)| {
                vec![InlineKeyboardButton {
                    text: format!("{} {label}", if enabled { "✅" } else { "❌" }),
                    callback_data: format!("{prefix}{key}"),
                }]
            })
            .collect(),
    }
}
