//! Telegram bot: Bot API client, webhook payloads and command dispatch.

pub mod client;
pub mod commands;
pub mod dispatcher;
pub mod types;

pub use client::{BotApiClient, LoggingTelegramApi, RecordingTelegramApi, TelegramApi, TelegramError};
pub use dispatcher::{DispatchError, LinkOutcome, Reply, TelegramDispatcher};
