//! In-memory repositories for tests and local development.

use super::{
    NotificationRepository, OrganizationRepository, RaffleRepository, RepositoryError, Result,
    TelegramRepository, TicketChange, TicketRepository,
};
use crate::types::{
    Notification, Organization, OrganizationId, Raffle, RaffleId, RaffleStatus, StatusCounts,
    TelegramBuyerLink, TelegramConnection, Ticket, TicketId, TicketStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    organizations: HashMap<OrganizationId, Organization>,
    raffles: HashMap<RaffleId, Raffle>,
    tickets: HashMap<TicketId, Ticket>,
    connections: HashMap<OrganizationId, TelegramConnection>,
    buyer_links: HashMap<String, TelegramBuyerLink>,
    notifications: Vec<Notification>,
}

/// All tables behind one lock, so multi-row writes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ticket of a raffle, ordered by ticket number.
    pub async fn raffle_tickets(&self, raffle_id: RaffleId) -> Vec<Ticket> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.raffle_id == raffle_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));
        tickets
    }

    /// Every stored notification.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.tables.read().await.notifications.clone()
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn insert_tickets(&self, tickets: &[Ticket]) -> Result<u64> {
        let mut tables = self.tables.write().await;

        let existing: HashSet<(RaffleId, &str)> = tables
            .tickets
            .values()
            .map(|t| (t.raffle_id, t.ticket_number.as_str()))
            .collect();
        let mut incoming = HashSet::with_capacity(tickets.len());
        for ticket in tickets {
            let key = (ticket.raffle_id, ticket.ticket_number.as_str());
            if existing.contains(&key) || !incoming.insert(key) {
                return Err(RepositoryError::Duplicate(format!(
                    "ticket {} in raffle {}",
                    ticket.ticket_number, ticket.raffle_id
                )));
            }
        }
        drop(existing);

        for ticket in tickets {
            tables.tickets.insert(ticket.id, ticket.clone());
        }
        Ok(tickets.len() as u64)
    }

    async fn tickets_by_ids(&self, raffle_id: RaffleId, ids: &[TicketId]) -> Result<Vec<Ticket>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.tickets.get(id))
            .filter(|t| t.raffle_id == raffle_id)
            .cloned()
            .collect())
    }

    async fn tickets_by_numbers(
        &self,
        raffle_id: RaffleId,
        numbers: &[String],
    ) -> Result<Vec<Ticket>> {
        let wanted: HashSet<&str> = numbers.iter().map(String::as_str).collect();
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .values()
            .filter(|t| t.raffle_id == raffle_id && wanted.contains(t.ticket_number.as_str()))
            .cloned()
            .collect())
    }

    async fn tickets_by_reference(
        &self,
        raffle_id: RaffleId,
        reference: &str,
    ) -> Result<Vec<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .values()
            .filter(|t| {
                t.raffle_id == raffle_id && t.payment_reference.as_deref() == Some(reference)
            })
            .cloned()
            .collect())
    }

    async fn expired_reservations(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Ticket>> {
        let tables = self.tables.read().await;
        let mut expired: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| {
                t.status == TicketStatus::Reserved && t.reserved_until.is_some_and(|u| u < now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|t| t.reserved_until);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn save_transition(&self, changes: &[TicketChange]) -> Result<()> {
        let mut tables = self.tables.write().await;

        for change in changes {
            let current = tables.tickets.get(&change.ticket.id);
            if !current.is_some_and(|t| change.matches(t)) {
                return Err(RepositoryError::Conflict(format!(
                    "ticket {} changed since it was loaded",
                    change.ticket.ticket_number
                )));
            }
        }

        for change in changes {
            tables.tickets.insert(change.ticket.id, change.ticket.clone());
        }
        Ok(())
    }

    async fn status_counts(&self, raffle_id: RaffleId) -> Result<StatusCounts> {
        let tables = self.tables.read().await;
        let mut counts = StatusCounts::default();
        for ticket in tables.tickets.values().filter(|t| t.raffle_id == raffle_id) {
            counts.add(ticket.status, 1);
        }
        Ok(counts)
    }
}

#[async_trait]
impl RaffleRepository for MemoryStore {
    async fn insert_raffle(&self, raffle: &Raffle) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.raffles.contains_key(&raffle.id) {
            return Err(RepositoryError::Duplicate(format!("raffle {}", raffle.id)));
        }
        tables.raffles.insert(raffle.id, raffle.clone());
        Ok(())
    }

    async fn get_raffle(&self, id: RaffleId) -> Result<Option<Raffle>> {
        Ok(self.tables.read().await.raffles.get(&id).cloned())
    }

    async fn active_raffles(&self, organization_id: OrganizationId) -> Result<Vec<Raffle>> {
        let tables = self.tables.read().await;
        let mut raffles: Vec<Raffle> = tables
            .raffles
            .values()
            .filter(|r| r.organization_id == organization_id && r.status == RaffleStatus::Active)
            .cloned()
            .collect();
        raffles.sort_by(|a, b| a.draw_date.cmp(&b.draw_date).then_with(|| a.title.cmp(&b.title)));
        Ok(raffles)
    }
}

#[async_trait]
impl OrganizationRepository for MemoryStore {
    async fn insert_organization(&self, organization: &Organization) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.organizations.contains_key(&organization.id) {
            return Err(RepositoryError::Duplicate(format!(
                "organization {}",
                organization.id
            )));
        }
        tables
            .organizations
            .insert(organization.id, organization.clone());
        Ok(())
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        Ok(self.tables.read().await.organizations.get(&id).cloned())
    }
}

#[async_trait]
impl TelegramRepository for MemoryStore {
    async fn save_connection(&self, connection: &TelegramConnection) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(chat_id) = connection.chat_id {
            for other in tables.connections.values_mut() {
                if other.organization_id != connection.organization_id
                    && other.chat_id == Some(chat_id)
                {
                    other.chat_id = None;
                    other.verified_at = None;
                }
            }
        }
        tables
            .connections
            .insert(connection.organization_id, connection.clone());
        Ok(())
    }

    async fn connection_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<TelegramConnection>> {
        Ok(self
            .tables
            .read()
            .await
            .connections
            .get(&organization_id)
            .cloned())
    }

    async fn connection_by_code(&self, code: &str) -> Result<Option<TelegramConnection>> {
        Ok(self
            .tables
            .read()
            .await
            .connections
            .values()
            .find(|c| c.link_code.as_deref() == Some(code))
            .cloned())
    }

    async fn connection_by_chat(&self, chat_id: i64) -> Result<Option<TelegramConnection>> {
        Ok(self
            .tables
            .read()
            .await
            .connections
            .values()
            .find(|c| c.chat_id == Some(chat_id))
            .cloned())
    }

    async fn save_buyer_link(&self, link: &TelegramBuyerLink) -> Result<()> {
        self.tables
            .write()
            .await
            .buyer_links
            .insert(link.buyer_email.to_lowercase(), link.clone());
        Ok(())
    }

    async fn buyer_link_by_code(&self, code: &str) -> Result<Option<TelegramBuyerLink>> {
        Ok(self
            .tables
            .read()
            .await
            .buyer_links
            .values()
            .find(|l| l.link_code.as_deref() == Some(code))
            .cloned())
    }

    async fn buyer_link_by_chat(&self, chat_id: i64) -> Result<Option<TelegramBuyerLink>> {
        Ok(self
            .tables
            .read()
            .await
            .buyer_links
            .values()
            .find(|l| l.chat_id == Some(chat_id))
            .cloned())
    }

    async fn buyer_link_by_email(&self, email: &str) -> Result<Option<TelegramBuyerLink>> {
        Ok(self
            .tables
            .read()
            .await
            .buyer_links
            .get(&email.to_lowercase())
            .cloned())
    }

    async fn unlink_chat(&self, chat_id: i64) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut removed = 0;
        for connection in tables.connections.values_mut() {
            if connection.chat_id == Some(chat_id) {
                connection.chat_id = None;
                connection.verified_at = None;
                removed += 1;
            }
        }
        for link in tables.buyer_links.values_mut() {
            if link.chat_id == Some(chat_id) {
                link.chat_id = None;
                link.verified_at = None;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.tables
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.notifications.len();
        tables
            .notifications
            .retain(|n| !(n.read && n.created_at < cutoff));
        Ok((before - tables.notifications.len()) as u64)
    }

    async fn count_notifications(&self) -> Result<u64> {
        Ok(self.tables.read().await.notifications.len() as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reserved(raffle_id: RaffleId, number: &str, until: DateTime<Utc>) -> Ticket {
        let mut ticket = Ticket::available(raffle_id, number);
        ticket.status = TicketStatus::Reserved;
        ticket.reserved_until = Some(until);
        ticket
    }

    #[tokio::test]
    async fn duplicate_numbers_are_rejected() {
        let store = MemoryStore::new();
        let raffle_id = RaffleId::new();
        store
            .insert_tickets(&[Ticket::available(raffle_id, "1")])
            .await
            .unwrap();
        let err = store
            .insert_tickets(&[Ticket::available(raffle_id, "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate(_)));
    }

    #[tokio::test]
    async fn save_transition_is_all_or_nothing() {
        let store = MemoryStore::new();
        let raffle_id = RaffleId::new();
        let a = Ticket::available(raffle_id, "1");
        let b = Ticket::available(raffle_id, "2");
        store.insert_tickets(&[a.clone(), b.clone()]).await.unwrap();

        let mut sold_a = a.clone();
        sold_a.status = TicketStatus::Sold;
        let mut sold_b = b.clone();
        sold_b.status = TicketStatus::Sold;

        let err = store
            .save_transition(&[
                TicketChange {
                    ticket: sold_a,
                    expected_status: TicketStatus::Available,
                    expected_version: 0,
                },
                TicketChange {
                    ticket: sold_b,
                    expected_status: TicketStatus::Reserved,
                    expected_version: 0,
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let counts = store.status_counts(raffle_id).await.unwrap();
        assert_eq!(counts.available, 2);
    }

    #[tokio::test]
    async fn stale_version_conflicts_even_when_status_matches() {
        let store = MemoryStore::new();
        let raffle_id = RaffleId::new();
        let ticket = Ticket::available(raffle_id, "7");
        store.insert_tickets(&[ticket.clone()]).await.unwrap();

        // Reserve, release back to available: status is the same, version is not.
        let mut reserved = ticket.clone();
        reserved.status = TicketStatus::Reserved;
        reserved.version = 1;
        let mut released = reserved.clone();
        released.status = TicketStatus::Available;
        released.version = 2;
        for (next, status, version) in [
            (reserved, TicketStatus::Available, 0),
            (released, TicketStatus::Reserved, 1),
        ] {
            store
                .save_transition(&[TicketChange {
                    ticket: next,
                    expected_status: status,
                    expected_version: version,
                }])
                .await
                .unwrap();
        }

        let mut stale = ticket.clone();
        stale.status = TicketStatus::Reserved;
        stale.buyer_email = Some("late@example.com".to_string());
        stale.version = 1;
        let err = store
            .save_transition(&[TicketChange {
                ticket: stale,
                expected_status: TicketStatus::Available,
                expected_version: 0,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let stored = store.tickets_by_ids(raffle_id, &[ticket.id]).await.unwrap();
        assert_eq!(stored[0].status, TicketStatus::Available);
        assert_eq!(stored[0].version, 2);
        assert!(stored[0].buyer_email.is_none());
    }

    #[tokio::test]
    async fn expired_reservations_only_returns_past_deadlines() {
        let store = MemoryStore::new();
        let raffle_id = RaffleId::new();
        let now = Utc::now();
        store
            .insert_tickets(&[
                reserved(raffle_id, "1", now - Duration::minutes(1)),
                reserved(raffle_id, "2", now + Duration::minutes(1)),
                Ticket::available(raffle_id, "3"),
            ])
            .await
            .unwrap();

        let expired = store.expired_reservations(now, 100).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].ticket_number, "1");
    }

    #[tokio::test]
    async fn linking_a_chat_detaches_it_from_other_organizations() {
        let store = MemoryStore::new();
        let first = OrganizationId::new();
        let second = OrganizationId::new();
        for organization_id in [first, second] {
            let mut connection = TelegramConnection::pending(organization_id, "CODE", Utc::now());
            connection.chat_id = Some(42);
            connection.verified_at = Some(Utc::now());
            store.save_connection(&connection).await.unwrap();
        }

        let linked = store.connection_by_chat(42).await.unwrap().unwrap();
        assert_eq!(linked.organization_id, second);
        let previous = store.connection_for_organization(first).await.unwrap().unwrap();
        assert!(previous.chat_id.is_none());
        assert!(previous.verified_at.is_none());
    }

    #[tokio::test]
    async fn unlink_chat_detaches_all_links() {
        let store = MemoryStore::new();
        let mut connection =
            TelegramConnection::pending(OrganizationId::new(), "CODE", Utc::now());
        connection.chat_id = Some(42);
        connection.verified_at = Some(Utc::now());
        store.save_connection(&connection).await.unwrap();
        store
            .save_buyer_link(&TelegramBuyerLink {
                buyer_email: "ana@example.com".into(),
                link_code: None,
                chat_id: Some(42),
                verified_at: Some(Utc::now()),
                preferences: crate::types::BuyerPreferences::default(),
            })
            .await
            .unwrap();

        assert_eq!(store.unlink_chat(42).await.unwrap(), 2);
        assert!(store.connection_by_chat(42).await.unwrap().is_none());
        assert!(store.buyer_link_by_chat(42).await.unwrap().is_none());
    }
}
