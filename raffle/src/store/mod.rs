//! Persistence for raffles, tickets, Telegram links and notifications.
//!
//! Each concern is a repository trait so services can run against
//! `PostgreSQL` in production and the in-memory store in tests and local
//! development. [`Storage`] bundles one implementation of every trait.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::types::{
    Notification, Organization, OrganizationId, Raffle, RaffleId, StatusCounts,
    TelegramBuyerLink, TelegramConnection, Ticket, TicketId, TicketStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Row does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier used for the lookup
        id: String,
    },

    /// A status-guarded update lost against a concurrent writer
    #[error("Concurrent update: {0}")]
    Conflict(String),

    /// Unique constraint violated
    #[error("Already exists: {0}")]
    Duplicate(String),

    /// Database failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result alias for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// A ticket row to write back, guarded by the status and version it was
/// loaded with. `ticket.version` is the version the row gets once written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketChange {
    /// New row contents
    pub ticket: Ticket,
    /// Status the row must still have for the write to apply
    pub expected_status: TicketStatus,
    /// Version the row must still have for the write to apply
    pub expected_version: i64,
}

impl TicketChange {
    /// Whether `current` is the row this change was computed from.
    #[must_use]
    pub fn matches(&self, current: &Ticket) -> bool {
        current.status == self.expected_status && current.version == self.expected_version
    }
}

/// Ticket rows.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Insert a freshly generated pool.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Duplicate`] if a ticket number already exists in
    /// the raffle.
    async fn insert_tickets(&self, tickets: &[Ticket]) -> Result<u64>;

    /// Load tickets of a raffle by id. Unknown ids are omitted.
    async fn tickets_by_ids(&self, raffle_id: RaffleId, ids: &[TicketId]) -> Result<Vec<Ticket>>;

    /// Load tickets of a raffle by ticket number. Unknown numbers are omitted.
    async fn tickets_by_numbers(
        &self,
        raffle_id: RaffleId,
        numbers: &[String],
    ) -> Result<Vec<Ticket>>;

    /// Load every ticket of a raffle sharing a payment reference.
    async fn tickets_by_reference(&self, raffle_id: RaffleId, reference: &str)
    -> Result<Vec<Ticket>>;

    /// Reserved tickets whose `reserved_until` is before `now`, across raffles.
    async fn expired_reservations(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Ticket>>;

    /// Apply a batch of changes atomically.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Conflict`] if any row was written since it was
    /// loaded (status or version differ); nothing is written in that case.
    async fn save_transition(&self, changes: &[TicketChange]) -> Result<()>;

    /// Ticket counts per status for a raffle.
    async fn status_counts(&self, raffle_id: RaffleId) -> Result<StatusCounts>;
}

/// Raffle rows.
#[async_trait]
pub trait RaffleRepository: Send + Sync {
    /// Insert a raffle.
    async fn insert_raffle(&self, raffle: &Raffle) -> Result<()>;

    /// Load a raffle by id.
    async fn get_raffle(&self, id: RaffleId) -> Result<Option<Raffle>>;

    /// Active raffles of an organization, ordered by draw date.
    async fn active_raffles(&self, organization_id: OrganizationId) -> Result<Vec<Raffle>>;
}

/// Organization rows.
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Insert an organization.
    async fn insert_organization(&self, organization: &Organization) -> Result<()>;

    /// Load an organization by id.
    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>>;
}

/// Telegram connection and buyer link rows.
#[async_trait]
pub trait TelegramRepository: Send + Sync {
    /// Insert or replace the connection of an organization.
    ///
    /// A linked chat belongs to one organization at a time; saving it detaches
    /// the chat from any other connection in the same write.
    async fn save_connection(&self, connection: &TelegramConnection) -> Result<()>;

    /// Connection of an organization.
    async fn connection_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<TelegramConnection>>;

    /// Connection holding a pending link code.
    async fn connection_by_code(&self, code: &str) -> Result<Option<TelegramConnection>>;

    /// Connection linked to a chat.
    async fn connection_by_chat(&self, chat_id: i64) -> Result<Option<TelegramConnection>>;

    /// Insert or replace a buyer link.
    async fn save_buyer_link(&self, link: &TelegramBuyerLink) -> Result<()>;

    /// Buyer link holding a pending link code.
    async fn buyer_link_by_code(&self, code: &str) -> Result<Option<TelegramBuyerLink>>;

    /// Buyer link attached to a chat.
    async fn buyer_link_by_chat(&self, chat_id: i64) -> Result<Option<TelegramBuyerLink>>;

    /// Buyer link of an email address.
    async fn buyer_link_by_email(&self, email: &str) -> Result<Option<TelegramBuyerLink>>;

    /// Detach a chat from every organization connection and buyer link.
    /// Returns the number of links removed.
    async fn unlink_chat(&self, chat_id: i64) -> Result<u64>;
}

/// Dashboard notification rows.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a notification.
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    /// Delete read notifications created before `cutoff`; returns the count.
    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Number of stored notifications.
    async fn count_notifications(&self) -> Result<u64>;
}

/// One implementation of every repository.
#[derive(Clone)]
pub struct Storage {
    /// Tickets
    pub tickets: Arc<dyn TicketRepository>,
    /// Raffles
    pub raffles: Arc<dyn RaffleRepository>,
    /// Organizations
    pub organizations: Arc<dyn OrganizationRepository>,
    /// Telegram links
    pub telegram: Arc<dyn TelegramRepository>,
    /// Dashboard notifications
    pub notifications: Arc<dyn NotificationRepository>,
    pool: Option<PgPool>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Everything in process memory.
    #[must_use]
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Wrap an existing memory store (tests keep a handle to seed rows).
    #[must_use]
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tickets: store.clone(),
            raffles: store.clone(),
            organizations: store.clone(),
            telegram: store.clone(),
            notifications: store,
            pool: None,
        }
    }

    /// Everything in `PostgreSQL`.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PostgresStore::new(pool.clone()));
        Self {
            tickets: store.clone(),
            raffles: store.clone(),
            organizations: store.clone(),
            telegram: store.clone(),
            notifications: store,
            pool: Some(pool),
        }
    }

    /// Backend name for logs and health output.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        if self.pool.is_some() { "postgres" } else { "memory" }
    }

    /// Check the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] if the database does not answer.
    pub async fn ping(&self) -> Result<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1")
                .execute(pool)
                .await
                .map_err(|e| RepositoryError::Storage(format!("Database ping failed: {e}")))?;
        }
        Ok(())
    }
}
