//! Application state for the raffle HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Storage (raffles, tickets, Telegram links, notifications)
//! - Ticket and organization services
//! - Telegram webhook dispatcher
//! - Notifier for the `send-email` function

use crate::app::{OrganizationService, TicketService};
use crate::config::Config;
use crate::notifications::{EmailSender, LoggingEmailSender, Notifier, ResendEmailSender};
use crate::store::Storage;
use crate::telegram::{BotApiClient, LoggingTelegramApi, TelegramApi, TelegramDispatcher};
use metrics_exporter_prometheus::PrometheusHandle;
use raffle_core::environment::{Clock, SystemClock};
use std::sync::Arc;

/// Outbound integrations, swappable in tests.
#[derive(Clone)]
pub struct Integrations {
    /// Email provider
    pub email: Arc<dyn EmailSender>,
    /// Telegram Bot API
    pub telegram: Arc<dyn TelegramApi>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl Integrations {
    /// Real providers when credentials are configured, logging stand-ins otherwise.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let email: Arc<dyn EmailSender> = match &config.email.resend_api_key {
            Some(key) => Arc::new(
                ResendEmailSender::new(key.clone(), config.email.from.clone())
                    .with_api_url(config.email.api_url.clone()),
            ),
            None => {
                tracing::warn!("RESEND_API_KEY not set, emails will only be logged");
                Arc::new(LoggingEmailSender)
            },
        };
        let telegram: Arc<dyn TelegramApi> = match &config.telegram.bot_token {
            Some(token) => Arc::new(
                BotApiClient::new(token.clone()).with_api_url(config.telegram.api_url.clone()),
            ),
            None => {
                tracing::warn!("TELEGRAM_BOT_TOKEN not set, bot replies will only be logged");
                Arc::new(LoggingTelegramApi)
            },
        };
        Self {
            email,
            telegram,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply, via `Arc`s) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Repositories
    pub storage: Storage,
    /// Ticket lifecycle
    pub tickets: TicketService,
    /// Organizations and link codes
    pub organizations: OrganizationService,
    /// Telegram webhook routing
    pub dispatcher: TelegramDispatcher,
    /// Email and Telegram fan-out
    pub notifier: Arc<Notifier>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Prometheus scrape handle, if this process installed the recorder
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire services over the given storage and integrations.
    #[must_use]
    pub fn new(config: Config, storage: Storage, integrations: Integrations) -> Self {
        let Integrations {
            email,
            telegram,
            clock,
        } = integrations;

        let notifier = Arc::new(Notifier::new(
            email,
            Arc::clone(&telegram),
            Arc::clone(&storage.telegram),
        ));
        let tickets = TicketService::new(storage.clone(), Arc::clone(&clock), Arc::clone(&notifier));
        let organizations = OrganizationService::new(storage.clone(), Arc::clone(&clock));
        let dispatcher = TelegramDispatcher::new(storage.clone(), Arc::clone(&clock), telegram);

        Self {
            config: Arc::new(config),
            storage,
            tickets,
            organizations,
            dispatcher,
            notifier,
            clock,
            metrics: None,
        }
    }

    /// Attach the Prometheus handle served at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}
