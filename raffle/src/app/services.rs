//! Application services - command handlers that persist state and run effects.
//!
//! Every ticket operation follows the same order:
//! 1. Load the raffle and the affected ticket rows
//! 2. Execute the reducer with the command
//! 3. Persist changed rows with status-guarded updates
//! 4. Hand notification effects to the executor (fire-and-forget)

use crate::aggregates::{TicketAction, TicketEnvironment, TicketReducer, TicketState};
use crate::metrics;
use crate::notifications::{normalize_email, Notifier};
use crate::numbering::NumberingError;
use crate::store::{RepositoryError, Storage};
use crate::types::{
    BuyerInfo, BuyerPreferences, Organization, OrganizationId, Raffle, RaffleId, StatusCounts,
    TelegramBuyerLink, TelegramConnection, Ticket, TicketId,
};
use chrono::Duration;
use raffle_core::environment::Clock;
use raffle_core::reducer::Reducer;
use raffle_runtime::{EffectExecutor, EffectHandle, RuntimeError};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Maximum reservations released per sweep.
pub const EXPIRY_BATCH_SIZE: u32 = 500;

/// Lifetime of a Telegram link code.
pub const LINK_CODE_TTL_MINUTES: i64 = 15;

/// Length of generated link codes.
pub const LINK_CODE_LENGTH: usize = 8;

/// Errors that can occur in application services
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Command rejected by validation
    #[error("{0}")]
    Validation(String),

    /// Raffle, organization or ticket does not exist
    #[error("{0}")]
    NotFound(String),

    /// Another request changed the rows first
    #[error("{0}")]
    Conflict(String),

    /// Storage failure
    #[error(transparent)]
    Repository(RepositoryError),

    /// Invalid numbering configuration
    #[error(transparent)]
    Numbering(#[from] NumberingError),

    /// Effect executor unavailable
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { .. } => Self::NotFound(error.to_string()),
            RepositoryError::Conflict(_) | RepositoryError::Duplicate(_) => {
                Self::Conflict(error.to_string())
            },
            RepositoryError::Storage(_) => Self::Repository(error),
        }
    }
}

/// Tickets to operate on, by id or by formatted number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketSelection {
    /// Ticket ids
    Ids(Vec<TicketId>),
    /// Ticket numbers as shown to buyers
    Numbers(Vec<String>),
}

/// Result of a ticket transition.
#[derive(Debug)]
pub struct TransitionOutcome {
    /// Rows written, in their new state
    pub tickets: Vec<Ticket>,
    /// Handle to the notification effects (tests wait on it)
    pub notifications: EffectHandle,
}

/// Ticket lifecycle service.
#[derive(Clone)]
pub struct TicketService {
    storage: Storage,
    reducer: TicketReducer,
    env: TicketEnvironment,
    executor: EffectExecutor<TicketAction>,
}

impl std::fmt::Debug for TicketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketService")
            .field("storage", &self.storage)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl TicketService {
    /// Create a service. Failed notifications come back through the
    /// executor and are logged.
    #[must_use]
    pub fn new(storage: Storage, clock: Arc<dyn Clock>, notifier: Arc<Notifier>) -> Self {
        let executor = EffectExecutor::new(|action: TicketAction| {
            if let TicketAction::NotificationFailed {
                channel,
                recipient,
                error,
            } = action
            {
                tracing::warn!(%channel, %recipient, %error, "Notification failed; status change kept");
            }
        });
        Self {
            storage,
            reducer: TicketReducer::new(),
            env: TicketEnvironment::new(clock, notifier),
            executor,
        }
    }

    /// Executor running notification effects (drained on shutdown).
    #[must_use]
    pub const fn executor(&self) -> &EffectExecutor<TicketAction> {
        &self.executor
    }

    /// Create a raffle after validating its numbering.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Numbering`] for an invalid configuration,
    /// [`ServiceError::NotFound`] for an unknown organization.
    #[tracing::instrument(skip(self, raffle), fields(raffle_id = %raffle.id))]
    pub async fn create_raffle(&self, raffle: Raffle) -> Result<Raffle, ServiceError> {
        raffle.numbering.validate()?;
        if raffle.title.trim().is_empty() {
            return Err(ServiceError::Validation("Raffle title is required".to_string()));
        }
        if raffle.ticket_price_cents < 0 {
            return Err(ServiceError::Validation(
                "Ticket price cannot be negative".to_string(),
            ));
        }
        if self
            .storage
            .organizations
            .get_organization(raffle.organization_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "Organization not found: {}",
                raffle.organization_id
            )));
        }
        self.storage.raffles.insert_raffle(&raffle).await?;
        tracing::info!(title = %raffle.title, "Raffle created");
        Ok(raffle)
    }

    /// Generate the full ticket pool of a raffle from its numbering config.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Conflict`] if the pool (or part of it) already exists.
    #[tracing::instrument(skip(self))]
    pub async fn generate_tickets(&self, raffle_id: RaffleId) -> Result<u64, ServiceError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let numbers = raffle.numbering.generate_all()?;
        let tickets: Vec<Ticket> = numbers
            .into_iter()
            .map(|number| Ticket::available(raffle.id, number))
            .collect();
        let inserted = self.storage.tickets.insert_tickets(&tickets).await?;
        metrics::record_tickets_generated(tickets.len());
        tracing::info!(inserted, "Ticket pool generated");
        Ok(inserted)
    }

    /// Reserve available tickets for a buyer.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] if any ticket is unknown or not available.
    #[tracing::instrument(skip(self, selection, buyer), fields(buyer_email = %buyer.email))]
    pub async fn reserve(
        &self,
        raffle_id: RaffleId,
        selection: TicketSelection,
        buyer: BuyerInfo,
        payment_reference: String,
    ) -> Result<TransitionOutcome, ServiceError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self.load_selection(raffle_id, &selection).await?;
        let ticket_ids = selected_ids(&selection, &tickets);
        self.run(
            raffle,
            tickets,
            TicketAction::ReserveTickets {
                ticket_ids,
                buyer,
                payment_reference,
            },
        )
        .await
    }

    /// Attach a payment proof to every reserved ticket of a reference.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] if no ticket is reserved under the reference.
    #[tracing::instrument(skip(self, proof_url))]
    pub async fn submit_payment_proof(
        &self,
        raffle_id: RaffleId,
        payment_reference: &str,
        proof_url: String,
    ) -> Result<TransitionOutcome, ServiceError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self
            .storage
            .tickets
            .tickets_by_reference(raffle_id, payment_reference)
            .await?;
        self.run(
            raffle,
            tickets,
            TicketAction::SubmitPaymentProof {
                payment_reference: payment_reference.to_string(),
                proof_url,
            },
        )
        .await
    }

    /// Approve a set of reserved tickets in one batch.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] if any ticket is unknown or not reserved.
    #[tracing::instrument(skip(self, selection))]
    pub async fn bulk_approve(
        &self,
        raffle_id: RaffleId,
        selection: TicketSelection,
    ) -> Result<TransitionOutcome, ServiceError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self.load_selection(raffle_id, &selection).await?;
        let ticket_ids = selected_ids(&selection, &tickets);
        self.run(raffle, tickets, TicketAction::ApproveTickets { ticket_ids })
            .await
    }

    /// Approve a single ticket.
    ///
    /// # Errors
    ///
    /// See [`Self::bulk_approve`].
    pub async fn approve(
        &self,
        raffle_id: RaffleId,
        ticket_id: TicketId,
    ) -> Result<TransitionOutcome, ServiceError> {
        self.bulk_approve(raffle_id, TicketSelection::Ids(vec![ticket_id]))
            .await
    }

    /// Approve every reserved ticket sharing a payment reference.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] if no ticket is reserved under the reference.
    #[tracing::instrument(skip(self))]
    pub async fn approve_by_reference(
        &self,
        raffle_id: RaffleId,
        payment_reference: &str,
    ) -> Result<TransitionOutcome, ServiceError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self
            .storage
            .tickets
            .tickets_by_reference(raffle_id, payment_reference)
            .await?;
        self.run(
            raffle,
            tickets,
            TicketAction::ApproveByReference {
                payment_reference: payment_reference.to_string(),
            },
        )
        .await
    }

    /// Reject a set of reserved tickets in one batch.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] if any ticket is unknown or not reserved.
    #[tracing::instrument(skip(self, selection))]
    pub async fn bulk_reject(
        &self,
        raffle_id: RaffleId,
        selection: TicketSelection,
    ) -> Result<TransitionOutcome, ServiceError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self.load_selection(raffle_id, &selection).await?;
        let ticket_ids = selected_ids(&selection, &tickets);
        self.run(raffle, tickets, TicketAction::RejectTickets { ticket_ids })
            .await
    }

    /// Reject a single ticket.
    ///
    /// # Errors
    ///
    /// See [`Self::bulk_reject`].
    pub async fn reject(
        &self,
        raffle_id: RaffleId,
        ticket_id: TicketId,
    ) -> Result<TransitionOutcome, ServiceError> {
        self.bulk_reject(raffle_id, TicketSelection::Ids(vec![ticket_id]))
            .await
    }

    /// Cancel tickets in any non-canceled status.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] if any ticket is unknown or already canceled.
    #[tracing::instrument(skip(self, selection))]
    pub async fn cancel(
        &self,
        raffle_id: RaffleId,
        selection: TicketSelection,
    ) -> Result<TransitionOutcome, ServiceError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let tickets = self.load_selection(raffle_id, &selection).await?;
        let ticket_ids = selected_ids(&selection, &tickets);
        self.run(raffle, tickets, TicketAction::CancelTickets { ticket_ids })
            .await
    }

    /// Release reservations past their deadline, across raffles.
    ///
    /// A raffle whose rows changed concurrently is skipped until the next
    /// sweep. Returns the number of tickets released.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Repository`] if the expired rows cannot be loaded.
    #[tracing::instrument(skip(self))]
    pub async fn expire_reservations(&self) -> Result<usize, ServiceError> {
        let now = self.env.clock.now();
        let expired = self
            .storage
            .tickets
            .expired_reservations(now, EXPIRY_BATCH_SIZE)
            .await?;

        let mut by_raffle: BTreeMap<RaffleId, Vec<Ticket>> = BTreeMap::new();
        for ticket in expired {
            by_raffle.entry(ticket.raffle_id).or_default().push(ticket);
        }

        let mut released = 0;
        for (raffle_id, tickets) in by_raffle {
            let raffle = match self.load_raffle(raffle_id).await {
                Ok(raffle) => raffle,
                Err(error) => {
                    tracing::warn!(%raffle_id, %error, "Skipping expired reservations");
                    continue;
                },
            };
            match self.run(raffle, tickets, TicketAction::ExpireReservations).await {
                Ok(outcome) => released += outcome.tickets.len(),
                Err(ServiceError::Conflict(error)) => {
                    tracing::info!(%raffle_id, %error, "Expiry lost a race, retrying next sweep");
                },
                Err(error) => return Err(error),
            }
        }

        if released > 0 {
            tracing::info!(released, "Expired reservations released");
        }
        Ok(released)
    }

    /// Ticket counts per status for a raffle.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] for an unknown raffle.
    pub async fn status_counts(&self, raffle_id: RaffleId) -> Result<StatusCounts, ServiceError> {
        self.load_raffle(raffle_id).await?;
        Ok(self.storage.tickets.status_counts(raffle_id).await?)
    }

    async fn load_raffle(&self, raffle_id: RaffleId) -> Result<Raffle, ServiceError> {
        self.storage
            .raffles
            .get_raffle(raffle_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Raffle not found: {raffle_id}")))
    }

    async fn load_selection(
        &self,
        raffle_id: RaffleId,
        selection: &TicketSelection,
    ) -> Result<Vec<Ticket>, ServiceError> {
        match selection {
            TicketSelection::Ids(ids) => Ok(self.storage.tickets.tickets_by_ids(raffle_id, ids).await?),
            TicketSelection::Numbers(numbers) => {
                let numbers: Vec<String> = numbers.iter().map(|n| n.trim().to_string()).collect();
                let tickets = self
                    .storage
                    .tickets
                    .tickets_by_numbers(raffle_id, &numbers)
                    .await?;
                let found: HashSet<&str> = tickets.iter().map(|t| t.ticket_number.as_str()).collect();
                if let Some(missing) = numbers.iter().find(|n| !found.contains(n.as_str())) {
                    return Err(ServiceError::Validation(format!(
                        "Ticket number {missing} not found in raffle {raffle_id}"
                    )));
                }
                Ok(tickets)
            },
        }
    }

    /// Reduce, persist, then schedule effects.
    async fn run(
        &self,
        raffle: Raffle,
        tickets: Vec<Ticket>,
        action: TicketAction,
    ) -> Result<TransitionOutcome, ServiceError> {
        let operation = action.operation();
        let mut state = TicketState::new(raffle, tickets);
        let effects = self.reducer.reduce(&mut state, action, &self.env);

        if let Some(error) = state.last_error.take() {
            metrics::record_validation_failure(operation);
            tracing::debug!(operation, %error, "Ticket command rejected");
            return Err(ServiceError::Validation(error));
        }

        let changes = state.take_changes();
        if !changes.is_empty() {
            self.storage.tickets.save_transition(&changes).await?;
        }
        metrics::record_transition(operation, changes.len());
        tracing::info!(operation, tickets = changes.len(), "Ticket transition persisted");

        let notifications = self.executor.execute(effects)?;
        Ok(TransitionOutcome {
            tickets: changes.into_iter().map(|change| change.ticket).collect(),
            notifications,
        })
    }
}

/// Ids to hand to the reducer.
///
/// For id selections the requested ids are kept as-is so the reducer can
/// report unknown ones; number selections are resolved by the load.
fn selected_ids(selection: &TicketSelection, tickets: &[Ticket]) -> Vec<TicketId> {
    match selection {
        TicketSelection::Ids(ids) => ids.clone(),
        TicketSelection::Numbers(numbers) => {
            let by_number: BTreeMap<&str, TicketId> = tickets
                .iter()
                .map(|t| (t.ticket_number.as_str(), t.id))
                .collect();
            numbers
                .iter()
                .filter_map(|n| by_number.get(n.trim()).copied())
                .collect()
        },
    }
}

/// Organizations and Telegram link codes.
#[derive(Clone)]
pub struct OrganizationService {
    storage: Storage,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OrganizationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizationService")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl OrganizationService {
    /// Create a service
    #[must_use]
    pub fn new(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Register an organization.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for an empty name,
    /// [`ServiceError::Conflict`] if the id is taken.
    #[tracing::instrument(skip(self, organization), fields(organization_id = %organization.id))]
    pub async fn create_organization(
        &self,
        organization: Organization,
    ) -> Result<Organization, ServiceError> {
        if organization.name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Organization name is required".to_string(),
            ));
        }
        self.storage
            .organizations
            .insert_organization(&organization)
            .await?;
        Ok(organization)
    }

    /// Issue a fresh link code for `/vincular`.
    ///
    /// An existing link keeps its chat and preferences until the code is used.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] for an unknown organization.
    #[tracing::instrument(skip(self))]
    pub async fn issue_link_code(
        &self,
        organization_id: OrganizationId,
    ) -> Result<TelegramConnection, ServiceError> {
        if self
            .storage
            .organizations
            .get_organization(organization_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "Organization not found: {organization_id}"
            )));
        }

        let code = generate_link_code();
        let expires_at = self.clock.now() + Duration::minutes(LINK_CODE_TTL_MINUTES);
        let connection = match self
            .storage
            .telegram
            .connection_for_organization(organization_id)
            .await?
        {
            Some(mut existing) => {
                existing.link_code = Some(code);
                existing.link_code_expires_at = Some(expires_at);
                existing
            },
            None => TelegramConnection::pending(organization_id, code, expires_at),
        };
        self.storage.telegram.save_connection(&connection).await?;
        Ok(connection)
    }

    /// Issue a code for `/start buyer_<code>`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for an invalid email.
    #[tracing::instrument(skip(self))]
    pub async fn issue_buyer_link_code(
        &self,
        buyer_email: &str,
    ) -> Result<TelegramBuyerLink, ServiceError> {
        let email = normalize_email(buyer_email);
        if !email.contains('@') {
            return Err(ServiceError::Validation(
                "A valid buyer email is required".to_string(),
            ));
        }

        let code = generate_link_code();
        let link = match self.storage.telegram.buyer_link_by_email(&email).await? {
            Some(mut existing) => {
                existing.link_code = Some(code);
                existing
            },
            None => TelegramBuyerLink {
                buyer_email: email,
                link_code: Some(code),
                chat_id: None,
                verified_at: None,
                preferences: BuyerPreferences::default(),
            },
        };
        self.storage.telegram.save_buyer_link(&link).await?;
        Ok(link)
    }
}

/// Random uppercase alphanumeric code.
fn generate_link_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LINK_CODE_LENGTH)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn link_codes_are_uppercase_alphanumeric() {
        let code = generate_link_code();
        assert_eq!(code.len(), LINK_CODE_LENGTH);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn number_selection_resolves_ids() {
        let raffle_id = RaffleId::new();
        let tickets = vec![
            Ticket::available(raffle_id, "001"),
            Ticket::available(raffle_id, "002"),
        ];
        let ids = selected_ids(
            &TicketSelection::Numbers(vec![" 002".into(), "001".into()]),
            &tickets,
        );
        assert_eq!(ids, vec![tickets[1].id, tickets[0].id]);
    }

    #[test]
    fn repository_errors_map_to_service_errors() {
        assert!(matches!(
            ServiceError::from(RepositoryError::Conflict("x".into())),
            ServiceError::Conflict(_)
        ));
        assert!(matches!(
            ServiceError::from(RepositoryError::Storage("x".into())),
            ServiceError::Repository(_)
        ));
    }
}
