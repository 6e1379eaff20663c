//! `PostgreSQL` repositories.
//!
//! Queries are built at runtime with `sqlx::query`/`query_as` so the crate
//! compiles without a live database. Schema lives in `migrations/`.

use super::{
    NotificationRepository, OrganizationRepository, RaffleRepository, RepositoryError, Result,
    TelegramRepository, TicketChange, TicketRepository,
};
use crate::numbering::NumberingConfig;
use crate::types::{
    BuyerPreferences, Notification, Organization, OrganizationId, OrganizerPreferences, Raffle,
    RaffleId, StatusCounts, TelegramBuyerLink, TelegramConnection, Ticket, TicketId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

fn storage(context: &str) -> impl FnOnce(sqlx::Error) -> RepositoryError + '_ {
    move |e| {
        let duplicate = e
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == UNIQUE_VIOLATION);
        if duplicate {
            RepositoryError::Duplicate(format!("{context}: {e}"))
        } else {
            RepositoryError::Storage(format!("{context}: {e}"))
        }
    }
}

/// Repositories backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store on an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(format!("Migration failed: {e}")))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

const TICKET_COLUMNS: &str = "id, raffle_id, ticket_number, status, buyer_name, buyer_email, \
     buyer_phone, reserved_at, reserved_until, approved_at, sold_at, canceled_at, \
     payment_reference, payment_proof_url, version";

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    raffle_id: Uuid,
    ticket_number: String,
    status: String,
    buyer_name: Option<String>,
    buyer_email: Option<String>,
    buyer_phone: Option<String>,
    reserved_at: Option<DateTime<Utc>>,
    reserved_until: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    sold_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    payment_reference: Option<String>,
    payment_proof_url: Option<String>,
    version: i64,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = RepositoryError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Self {
            id: TicketId::from_uuid(row.id),
            raffle_id: RaffleId::from_uuid(row.raffle_id),
            ticket_number: row.ticket_number,
            status: row.status.parse().map_err(RepositoryError::Storage)?,
            buyer_name: row.buyer_name,
            buyer_email: row.buyer_email,
            buyer_phone: row.buyer_phone,
            reserved_at: row.reserved_at,
            reserved_until: row.reserved_until,
            approved_at: row.approved_at,
            sold_at: row.sold_at,
            canceled_at: row.canceled_at,
            payment_reference: row.payment_reference,
            payment_proof_url: row.payment_proof_url,
            version: row.version,
        })
    }
}

fn tickets_from_rows(rows: Vec<TicketRow>) -> Result<Vec<Ticket>> {
    rows.into_iter().map(Ticket::try_from).collect()
}

const RAFFLE_COLUMNS: &str = "id, organization_id, title, ticket_price_cents, currency, draw_date, \
     status, reservation_minutes, numbering";

#[derive(sqlx::FromRow)]
struct RaffleRow {
    id: Uuid,
    organization_id: Uuid,
    title: String,
    ticket_price_cents: i64,
    currency: String,
    draw_date: Option<DateTime<Utc>>,
    status: String,
    reservation_minutes: i32,
    numbering: sqlx::types::Json<NumberingConfig>,
}

impl TryFrom<RaffleRow> for Raffle {
    type Error = RepositoryError;

    fn try_from(row: RaffleRow) -> Result<Self> {
        Ok(Self {
            id: RaffleId::from_uuid(row.id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            title: row.title,
            ticket_price_cents: row.ticket_price_cents,
            currency: row.currency,
            draw_date: row.draw_date,
            status: row.status.parse().map_err(RepositoryError::Storage)?,
            reservation_minutes: u32::try_from(row.reservation_minutes)
                .map_err(|e| RepositoryError::Storage(format!("reservation_minutes: {e}")))?,
            numbering: row.numbering.0,
        })
    }
}

const CONNECTION_COLUMNS: &str = "organization_id, link_code, link_code_expires_at, chat_id, \
     verified_at, notify_ticket_reserved, notify_payment_proof, notify_payment_approved, \
     notify_payment_rejected, notify_reservation_expired, notify_daily_summary";

#[derive(sqlx::FromRow)]
#[allow(clippy::struct_excessive_bools)]
struct ConnectionRow {
    organization_id: Uuid,
    link_code: Option<String>,
    link_code_expires_at: Option<DateTime<Utc>>,
    chat_id: Option<i64>,
    verified_at: Option<DateTime<Utc>>,
    notify_ticket_reserved: bool,
    notify_payment_proof: bool,
    notify_payment_approved: bool,
    notify_payment_rejected: bool,
    notify_reservation_expired: bool,
    notify_daily_summary: bool,
}

impl From<ConnectionRow> for TelegramConnection {
    fn from(row: ConnectionRow) -> Self {
        Self {
            organization_id: OrganizationId::from_uuid(row.organization_id),
            link_code: row.link_code,
            link_code_expires_at: row.link_code_expires_at,
            chat_id: row.chat_id,
            verified_at: row.verified_at,
            preferences: OrganizerPreferences {
                ticket_reserved: row.notify_ticket_reserved,
                payment_proof: row.notify_payment_proof,
                payment_approved: row.notify_payment_approved,
                payment_rejected: row.notify_payment_rejected,
                reservation_expired: row.notify_reservation_expired,
                daily_summary: row.notify_daily_summary,
            },
        }
    }
}

const BUYER_LINK_COLUMNS: &str = "buyer_email, link_code, chat_id, verified_at, \
     notify_reservation, notify_payment_approved, notify_payment_rejected, \
     notify_draw_reminder, notify_winner";

#[derive(sqlx::FromRow)]
#[allow(clippy::struct_excessive_bools)]
struct BuyerLinkRow {
    buyer_email: String,
    link_code: Option<String>,
    chat_id: Option<i64>,
    verified_at: Option<DateTime<Utc>>,
    notify_reservation: bool,
    notify_payment_approved: bool,
    notify_payment_rejected: bool,
    notify_draw_reminder: bool,
    notify_winner: bool,
}

impl From<BuyerLinkRow> for TelegramBuyerLink {
    fn from(row: BuyerLinkRow) -> Self {
        Self {
            buyer_email: row.buyer_email,
            link_code: row.link_code,
            chat_id: row.chat_id,
            verified_at: row.verified_at,
            preferences: BuyerPreferences {
                reservation: row.notify_reservation,
                payment_approved: row.notify_payment_approved,
                payment_rejected: row.notify_payment_rejected,
                draw_reminder: row.notify_draw_reminder,
                winner: row.notify_winner,
            },
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

#[async_trait]
impl TicketRepository for PostgresStore {
    async fn insert_tickets(&self, tickets: &[Ticket]) -> Result<u64> {
        let mut ids = Vec::with_capacity(tickets.len());
        let mut raffle_ids = Vec::with_capacity(tickets.len());
        let mut numbers = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            ids.push(*ticket.id.as_uuid());
            raffle_ids.push(*ticket.raffle_id.as_uuid());
            numbers.push(ticket.ticket_number.clone());
        }

        let result = sqlx::query(
            "INSERT INTO tickets (id, raffle_id, ticket_number, status)
             SELECT id, raffle_id, ticket_number, 'available'
             FROM UNNEST($1::uuid[], $2::uuid[], $3::text[]) AS t(id, raffle_id, ticket_number)",
        )
        .bind(&ids)
        .bind(&raffle_ids)
        .bind(&numbers)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to insert tickets"))?;

        Ok(result.rows_affected())
    }

    async fn tickets_by_ids(&self, raffle_id: RaffleId, ids: &[TicketId]) -> Result<Vec<Ticket>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE raffle_id = $1 AND id = ANY($2)"
        ))
        .bind(raffle_id.as_uuid())
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load tickets"))?;

        tickets_from_rows(rows)
    }

    async fn tickets_by_numbers(
        &self,
        raffle_id: RaffleId,
        numbers: &[String],
    ) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE raffle_id = $1 AND ticket_number = ANY($2)"
        ))
        .bind(raffle_id.as_uuid())
        .bind(numbers)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load tickets by number"))?;

        tickets_from_rows(rows)
    }

    async fn tickets_by_reference(
        &self,
        raffle_id: RaffleId,
        reference: &str,
    ) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE raffle_id = $1 AND payment_reference = $2
             ORDER BY ticket_number"
        ))
        .bind(raffle_id.as_uuid())
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load tickets by reference"))?;

        tickets_from_rows(rows)
    }

    async fn expired_reservations(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE status = 'reserved' AND reserved_until < $1
             ORDER BY reserved_until
             LIMIT $2"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load expired reservations"))?;

        tickets_from_rows(rows)
    }

    async fn save_transition(&self, changes: &[TicketChange]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        for change in changes {
            let t = &change.ticket;
            let result = sqlx::query(
                "UPDATE tickets SET
                    status = $3, buyer_name = $4, buyer_email = $5, buyer_phone = $6,
                    reserved_at = $7, reserved_until = $8, approved_at = $9, sold_at = $10,
                    canceled_at = $11, payment_reference = $12, payment_proof_url = $13,
                    version = $15, updated_at = NOW()
                 WHERE id = $1 AND status = $2 AND version = $14",
            )
            .bind(t.id.as_uuid())
            .bind(change.expected_status.as_str())
            .bind(t.status.as_str())
            .bind(&t.buyer_name)
            .bind(&t.buyer_email)
            .bind(&t.buyer_phone)
            .bind(t.reserved_at)
            .bind(t.reserved_until)
            .bind(t.approved_at)
            .bind(t.sold_at)
            .bind(t.canceled_at)
            .bind(&t.payment_reference)
            .bind(&t.payment_proof_url)
            .bind(change.expected_version)
            .bind(t.version)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to update ticket"))?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls it back.
                return Err(RepositoryError::Conflict(format!(
                    "ticket {} changed since it was loaded",
                    t.ticket_number
                )));
            }
        }

        tx.commit()
            .await
            .map_err(storage("Failed to commit ticket changes"))
    }

    async fn status_counts(&self, raffle_id: RaffleId) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tickets WHERE raffle_id = $1 GROUP BY status",
        )
        .bind(raffle_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to count tickets"))?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let status = status.parse().map_err(RepositoryError::Storage)?;
            #[allow(clippy::cast_sign_loss)]
            counts.add(status, count.max(0) as u64);
        }
        Ok(counts)
    }
}

// ============================================================================
// Raffles and organizations
// ============================================================================

#[async_trait]
impl RaffleRepository for PostgresStore {
    async fn insert_raffle(&self, raffle: &Raffle) -> Result<()> {
        sqlx::query(
            "INSERT INTO raffles (id, organization_id, title, ticket_price_cents, currency,
                                  draw_date, status, reservation_minutes, numbering)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(raffle.id.as_uuid())
        .bind(raffle.organization_id.as_uuid())
        .bind(&raffle.title)
        .bind(raffle.ticket_price_cents)
        .bind(&raffle.currency)
        .bind(raffle.draw_date)
        .bind(raffle.status.as_str())
        .bind(i32::try_from(raffle.reservation_minutes).unwrap_or(i32::MAX))
        .bind(sqlx::types::Json(&raffle.numbering))
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to insert raffle"))?;
        Ok(())
    }

    async fn get_raffle(&self, id: RaffleId) -> Result<Option<Raffle>> {
        let row: Option<RaffleRow> =
            sqlx::query_as(&format!("SELECT {RAFFLE_COLUMNS} FROM raffles WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load raffle"))?;

        row.map(Raffle::try_from).transpose()
    }

    async fn active_raffles(&self, organization_id: OrganizationId) -> Result<Vec<Raffle>> {
        let rows: Vec<RaffleRow> = sqlx::query_as(&format!(
            "SELECT {RAFFLE_COLUMNS} FROM raffles
             WHERE organization_id = $1 AND status = 'active'
             ORDER BY draw_date NULLS LAST, title"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load active raffles"))?;

        rows.into_iter().map(Raffle::try_from).collect()
    }
}

#[async_trait]
impl OrganizationRepository for PostgresStore {
    async fn insert_organization(&self, organization: &Organization) -> Result<()> {
        sqlx::query("INSERT INTO organizations (id, name, subscription_tier) VALUES ($1, $2, $3)")
            .bind(organization.id.as_uuid())
            .bind(&organization.name)
            .bind(organization.subscription_tier.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage("Failed to insert organization"))?;
        Ok(())
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        let row: Option<(Uuid, String, String)> =
            sqlx::query_as("SELECT id, name, subscription_tier FROM organizations WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load organization"))?;

        row.map(|(id, name, tier)| -> Result<Organization> {
            Ok(Organization {
                id: OrganizationId::from_uuid(id),
                name,
                subscription_tier: tier.parse().map_err(RepositoryError::Storage)?,
            })
        })
        .transpose()
    }
}

// ============================================================================
// Telegram
// ============================================================================

#[async_trait]
impl TelegramRepository for PostgresStore {
    async fn save_connection(&self, connection: &TelegramConnection) -> Result<()> {
        let prefs = &connection.preferences;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        if let Some(chat_id) = connection.chat_id {
            sqlx::query(
                "UPDATE telegram_connections SET chat_id = NULL, verified_at = NULL
                 WHERE chat_id = $1 AND organization_id <> $2",
            )
            .bind(chat_id)
            .bind(connection.organization_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to detach chat from other organizations"))?;
        }

        sqlx::query(
            "INSERT INTO telegram_connections (organization_id, link_code, link_code_expires_at,
                 chat_id, verified_at, notify_ticket_reserved, notify_payment_proof,
                 notify_payment_approved, notify_payment_rejected, notify_reservation_expired,
                 notify_daily_summary)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (organization_id) DO UPDATE SET
                 link_code = EXCLUDED.link_code,
                 link_code_expires_at = EXCLUDED.link_code_expires_at,
                 chat_id = EXCLUDED.chat_id,
                 verified_at = EXCLUDED.verified_at,
                 notify_ticket_reserved = EXCLUDED.notify_ticket_reserved,
                 notify_payment_proof = EXCLUDED.notify_payment_proof,
                 notify_payment_approved = EXCLUDED.notify_payment_approved,
                 notify_payment_rejected = EXCLUDED.notify_payment_rejected,
                 notify_reservation_expired = EXCLUDED.notify_reservation_expired,
                 notify_daily_summary = EXCLUDED.notify_daily_summary",
        )
        .bind(connection.organization_id.as_uuid())
        .bind(&connection.link_code)
        .bind(connection.link_code_expires_at)
        .bind(connection.chat_id)
        .bind(connection.verified_at)
        .bind(prefs.ticket_reserved)
        .bind(prefs.payment_proof)
        .bind(prefs.payment_approved)
        .bind(prefs.payment_rejected)
        .bind(prefs.reservation_expired)
        .bind(prefs.daily_summary)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to save Telegram connection"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit Telegram connection"))?;
        Ok(())
    }

    async fn connection_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<TelegramConnection>> {
        let row: Option<ConnectionRow> = sqlx::query_as(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM telegram_connections WHERE organization_id = $1"
        ))
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load Telegram connection"))?;
        Ok(row.map(Into::into))
    }

    async fn connection_by_code(&self, code: &str) -> Result<Option<TelegramConnection>> {
        let row: Option<ConnectionRow> = sqlx::query_as(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM telegram_connections WHERE link_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load Telegram connection by code"))?;
        Ok(row.map(Into::into))
    }

    async fn connection_by_chat(&self, chat_id: i64) -> Result<Option<TelegramConnection>> {
        let row: Option<ConnectionRow> = sqlx::query_as(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM telegram_connections WHERE chat_id = $1 LIMIT 1"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load Telegram connection by chat"))?;
        Ok(row.map(Into::into))
    }

    async fn save_buyer_link(&self, link: &TelegramBuyerLink) -> Result<()> {
        let prefs = &link.preferences;
        sqlx::query(
            "INSERT INTO telegram_buyer_links (buyer_email, link_code, chat_id, verified_at,
                 notify_reservation, notify_payment_approved, notify_payment_rejected,
                 notify_draw_reminder, notify_winner)
             VALUES (LOWER($1), $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (buyer_email) DO UPDATE SET
                 link_code = EXCLUDED.link_code,
                 chat_id = EXCLUDED.chat_id,
                 verified_at = EXCLUDED.verified_at,
                 notify_reservation = EXCLUDED.notify_reservation,
                 notify_payment_approved = EXCLUDED.notify_payment_approved,
                 notify_payment_rejected = EXCLUDED.notify_payment_rejected,
                 notify_draw_reminder = EXCLUDED.notify_draw_reminder,
                 notify_winner = EXCLUDED.notify_winner",
        )
        .bind(&link.buyer_email)
        .bind(&link.link_code)
        .bind(link.chat_id)
        .bind(link.verified_at)
        .bind(prefs.reservation)
        .bind(prefs.payment_approved)
        .bind(prefs.payment_rejected)
        .bind(prefs.draw_reminder)
        .bind(prefs.winner)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to save Telegram buyer link"))?;
        Ok(())
    }

    async fn buyer_link_by_code(&self, code: &str) -> Result<Option<TelegramBuyerLink>> {
        let row: Option<BuyerLinkRow> = sqlx::query_as(&format!(
            "SELECT {BUYER_LINK_COLUMNS} FROM telegram_buyer_links WHERE link_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load buyer link by code"))?;
        Ok(row.map(Into::into))
    }

    async fn buyer_link_by_chat(&self, chat_id: i64) -> Result<Option<TelegramBuyerLink>> {
        let row: Option<BuyerLinkRow> = sqlx::query_as(&format!(
            "SELECT {BUYER_LINK_COLUMNS} FROM telegram_buyer_links WHERE chat_id = $1 LIMIT 1"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load buyer link by chat"))?;
        Ok(row.map(Into::into))
    }

    async fn buyer_link_by_email(&self, email: &str) -> Result<Option<TelegramBuyerLink>> {
        let row: Option<BuyerLinkRow> = sqlx::query_as(&format!(
            "SELECT {BUYER_LINK_COLUMNS} FROM telegram_buyer_links WHERE buyer_email = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load buyer link by email"))?;
        Ok(row.map(Into::into))
    }

    async fn unlink_chat(&self, chat_id: i64) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let organizations = sqlx::query(
            "UPDATE telegram_connections SET chat_id = NULL, verified_at = NULL WHERE chat_id = $1",
        )
        .bind(chat_id)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to unlink organization chat"))?
        .rows_affected();

        let buyers = sqlx::query(
            "UPDATE telegram_buyer_links SET chat_id = NULL, verified_at = NULL WHERE chat_id = $1",
        )
        .bind(chat_id)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to unlink buyer chat"))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(storage("Failed to commit unlink"))?;
        Ok(organizations + buyers)
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[async_trait]
impl NotificationRepository for PostgresStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, organization_id, title, message, read, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(notification.id.as_uuid())
        .bind(notification.user_id)
        .bind(notification.organization_id.map(|id| *id.as_uuid()))
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to insert notification"))?;
        Ok(())
    }

    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE read = TRUE AND created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage("Failed to delete notifications"))?;
        Ok(result.rows_affected())
    }

    async fn count_notifications(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications")
            .fetch_one(&self.pool)
            .await
            .map_err(storage("Failed to count notifications"))?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count.max(0) as u64)
    }
}
