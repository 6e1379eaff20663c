//! Ticket lifecycle integration tests.
//!
//! Drives `TicketService` over in-memory storage with recording email and
//! Telegram senders: reservation, bulk approval with per-buyer grouping,
//! rejection, cancellation, approval by reference and the expiry sweep.

#![allow(clippy::expect_used)] // Integration tests can use expect for setup
#![allow(clippy::unwrap_used)]

use chrono::Duration as ChronoDuration;
use raffle::app::{OrganizationService, ServiceError, TicketSelection, TicketService};
use raffle::notifications::{Notifier, RecordingEmailSender};
use raffle::store::{MemoryStore, RaffleRepository, RepositoryError, Storage, TicketRepository};
use raffle::telegram::RecordingTelegramApi;
use raffle::{
    BuyerInfo, TicketAction, TicketEnvironment, TicketReducer, TicketState, NumberingConfig, Organization, OrganizationId, Raffle, RaffleId, RaffleStatus,
    SubscriptionTier, TicketStatus,
};
use raffle_core::reducer::Reducer;
use raffle_testing::{test_clock, FixedClock};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    memory: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    email: Arc<RecordingEmailSender>,
    service: TicketService,
    raffle_id: RaffleId,
}

impl Harness {
    async fn new(total_tickets: u32) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let storage = Storage::from_memory(Arc::clone(&memory));
        let clock = Arc::new(test_clock());
        let email = Arc::new(RecordingEmailSender::new());
        let telegram = Arc::new(RecordingTelegramApi::new());
        let notifier = Arc::new(Notifier::new(
            email.clone(),
            telegram,
            Arc::clone(&storage.telegram),
        ));
        let service = TicketService::new(storage.clone(), clock.clone(), notifier);
        let organizations = OrganizationService::new(storage, clock.clone());

        let organization = organizations
            .create_organization(Organization {
                id: OrganizationId::new(),
                name: "Rifas del Norte".into(),
                subscription_tier: SubscriptionTier::Premium,
            })
            .await
            .expect("organization should be created");

        let raffle = service
            .create_raffle(Raffle {
                id: RaffleId::new(),
                organization_id: organization.id,
                title: "Camioneta 2025".into(),
                ticket_price_cents: 15_000,
                currency: "MXN".into(),
                draw_date: None,
                status: RaffleStatus::Active,
                reservation_minutes: 15,
                numbering: NumberingConfig {
                    pad_width: 3,
                    ..NumberingConfig::sequential(total_tickets)
                },
            })
            .await
            .expect("raffle should be created");
        service
            .generate_tickets(raffle.id)
            .await
            .expect("pool should be generated");

        Self {
            memory,
            clock,
            email,
            service,
            raffle_id: raffle.id,
        }
    }

    async fn reserve(&self, numbers: &[&str], email: &str, reference: &str) {
        let mut outcome = self
            .service
            .reserve(
                self.raffle_id,
                numbers_of(numbers),
                buyer(email),
                reference.to_string(),
            )
            .await
            .expect("reservation should succeed");
        wait(&mut outcome.notifications).await;
    }

    fn subjects_containing(&self, needle: &str) -> Vec<String> {
        self.email
            .sent()
            .into_iter()
            .filter(|m| m.subject.contains(needle))
            .map(|m| m.to)
            .collect()
    }

    async fn status_of(&self, number: &str) -> TicketStatus {
        self.memory
            .raffle_tickets(self.raffle_id)
            .await
            .into_iter()
            .find(|t| t.ticket_number == number)
            .map(|t| t.status)
            .expect("ticket should exist")
    }
}

fn numbers_of(numbers: &[&str]) -> TicketSelection {
    TicketSelection::Numbers(numbers.iter().map(|n| (*n).to_string()).collect())
}

fn buyer(email: &str) -> BuyerInfo {
    BuyerInfo {
        name: "Ana López".into(),
        email: email.into(),
        phone: Some("+52 555 000 0000".into()),
    }
}

async fn wait(handle: &mut raffle_runtime::EffectHandle) {
    handle
        .wait_with_timeout(Duration::from_secs(5))
        .await
        .expect("notifications should finish");
}

#[tokio::test]
async fn reservation_holds_tickets_and_confirms_by_email() {
    let harness = Harness::new(10).await;
    harness.reserve(&["001", "002"], "ana@example.com", "REF-1").await;

    assert_eq!(harness.status_of("001").await, TicketStatus::Reserved);
    assert_eq!(harness.status_of("002").await, TicketStatus::Reserved);
    assert_eq!(harness.email.sent().len(), 1);
    assert_eq!(harness.email.sent()[0].to, "ana@example.com");

    let counts = harness.service.status_counts(harness.raffle_id).await.unwrap();
    assert_eq!(counts.reserved, 2);
    assert_eq!(counts.available, 8);
}

#[tokio::test]
async fn bulk_approval_sends_one_email_per_buyer() {
    let harness = Harness::new(10).await;
    harness.reserve(&["001", "002"], "ana@example.com", "REF-1").await;
    harness.reserve(&["003"], "ANA@example.com", "REF-2").await;
    harness.reserve(&["004", "005"], "luis@example.com", "REF-3").await;

    let mut outcome = harness
        .service
        .bulk_approve(harness.raffle_id, numbers_of(&["001", "002", "003", "004", "005"]))
        .await
        .unwrap();
    wait(&mut outcome.notifications).await;

    assert_eq!(outcome.tickets.len(), 5);
    assert!(outcome.tickets.iter().all(|t| t.status == TicketStatus::Sold));
    assert!(outcome.tickets.iter().all(|t| t.reserved_until.is_none()));

    let approved = harness.subjects_containing("confirmados");
    assert_eq!(approved.len(), 2, "one approval email per buyer, got {approved:?}");
}

#[tokio::test]
async fn batch_with_one_invalid_ticket_changes_nothing() {
    let harness = Harness::new(10).await;
    harness.reserve(&["001"], "ana@example.com", "REF-1").await;

    let result = harness
        .service
        .bulk_approve(harness.raffle_id, numbers_of(&["001", "002"]))
        .await;

    assert!(matches!(result, Err(ServiceError::Validation(_))));
    assert_eq!(harness.status_of("001").await, TicketStatus::Reserved);
    assert_eq!(harness.status_of("002").await, TicketStatus::Available);
}

#[tokio::test]
async fn unknown_ticket_number_is_a_validation_error() {
    let harness = Harness::new(5).await;
    let result = harness
        .service
        .reserve(
            harness.raffle_id,
            numbers_of(&["999"]),
            buyer("ana@example.com"),
            "REF-1".into(),
        )
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn rejection_releases_tickets_and_clears_buyer() {
    let harness = Harness::new(10).await;
    harness.reserve(&["001", "002"], "ana@example.com", "REF-1").await;

    let mut outcome = harness
        .service
        .bulk_reject(harness.raffle_id, numbers_of(&["001", "002"]))
        .await
        .unwrap();
    wait(&mut outcome.notifications).await;

    for ticket in &outcome.tickets {
        assert_eq!(ticket.status, TicketStatus::Available);
        assert!(ticket.buyer_email.is_none());
        assert!(ticket.payment_reference.is_none());
        assert!(ticket.reserved_until.is_none());
    }
    assert_eq!(harness.subjects_containing("no fue aprobado"), vec!["ana@example.com"]);

    // Released tickets can be reserved again.
    harness.reserve(&["001"], "luis@example.com", "REF-2").await;
    assert_eq!(harness.status_of("001").await, TicketStatus::Reserved);
}

#[tokio::test]
async fn approve_by_reference_covers_the_whole_checkout() {
    let harness = Harness::new(10).await;
    harness.reserve(&["001", "002", "003"], "ana@example.com", "REF-9").await;
    harness.reserve(&["004"], "luis@example.com", "REF-10").await;

    let mut outcome = harness
        .service
        .approve_by_reference(harness.raffle_id, "REF-9")
        .await
        .unwrap();
    wait(&mut outcome.notifications).await;

    assert_eq!(outcome.tickets.len(), 3);
    assert_eq!(harness.status_of("004").await, TicketStatus::Reserved);
    assert_eq!(harness.subjects_containing("confirmados"), vec!["ana@example.com"]);

    let again = harness
        .service
        .approve_by_reference(harness.raffle_id, "REF-9")
        .await;
    assert!(matches!(again, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn payment_proof_is_attached_to_the_reference() {
    let harness = Harness::new(5).await;
    harness.reserve(&["001", "002"], "ana@example.com", "REF-1").await;

    let outcome = harness
        .service
        .submit_payment_proof(harness.raffle_id, "REF-1", "https://files.example.com/p.jpg".into())
        .await
        .unwrap();

    assert_eq!(outcome.tickets.len(), 2);
    assert!(outcome
        .tickets
        .iter()
        .all(|t| t.payment_proof_url.as_deref() == Some("https://files.example.com/p.jpg")));
    assert!(outcome.tickets.iter().all(|t| t.status == TicketStatus::Reserved));
}

#[tokio::test]
async fn cancel_withdraws_sold_tickets() {
    let harness = Harness::new(5).await;
    harness.reserve(&["001"], "ana@example.com", "REF-1").await;
    harness
        .service
        .bulk_approve(harness.raffle_id, numbers_of(&["001"]))
        .await
        .unwrap();

    let outcome = harness
        .service
        .cancel(harness.raffle_id, numbers_of(&["001", "002"]))
        .await
        .unwrap();
    assert!(outcome.tickets.iter().all(|t| t.status == TicketStatus::Canceled));

    let twice = harness
        .service
        .cancel(harness.raffle_id, numbers_of(&["001"]))
        .await;
    assert!(matches!(twice, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn sweep_releases_only_lapsed_reservations() {
    let harness = Harness::new(10).await;
    harness.reserve(&["001", "002"], "ana@example.com", "REF-1").await;

    assert_eq!(harness.service.expire_reservations().await.unwrap(), 0);

    harness.clock.advance(ChronoDuration::minutes(10));
    harness.reserve(&["003"], "luis@example.com", "REF-2").await;

    harness.clock.advance(ChronoDuration::minutes(6));
    assert_eq!(harness.service.expire_reservations().await.unwrap(), 2);

    assert_eq!(harness.status_of("001").await, TicketStatus::Available);
    assert_eq!(harness.status_of("002").await, TicketStatus::Available);
    assert_eq!(harness.status_of("003").await, TicketStatus::Reserved);
}

#[tokio::test]
async fn duplicate_pool_generation_conflicts() {
    let harness = Harness::new(5).await;
    let result = harness.service.generate_tickets(harness.raffle_id).await;
    assert!(matches!(result, Err(ServiceError::Conflict(_))));
}

#[tokio::test]
async fn stale_approval_cannot_overwrite_a_newer_reservation() {
    let harness = Harness::new(10).await;
    harness.reserve(&["001"], "ana@example.com", "REF-1").await;

    // An approval loads ana's reservation, then stalls.
    let storage = Storage::from_memory(Arc::clone(&harness.memory));
    let raffle = storage
        .raffles
        .get_raffle(harness.raffle_id)
        .await
        .unwrap()
        .expect("raffle should exist");
    let snapshot = harness.memory.raffle_tickets(harness.raffle_id).await;
    let ticket_id = snapshot
        .iter()
        .find(|t| t.ticket_number == "001")
        .map(|t| t.id)
        .expect("ticket should exist");

    // Meanwhile ana's payment is rejected and zoe reserves the same number.
    let mut rejected = harness
        .service
        .bulk_reject(harness.raffle_id, numbers_of(&["001"]))
        .await
        .unwrap();
    wait(&mut rejected.notifications).await;
    harness.reserve(&["001"], "zoe@example.com", "REF-2").await;

    // The stalled approval resumes on its stale load.
    let env = TicketEnvironment::new(
        harness.clock.clone(),
        Arc::new(Notifier::new(
            Arc::new(RecordingEmailSender::new()),
            Arc::new(RecordingTelegramApi::new()),
            Arc::clone(&storage.telegram),
        )),
    );
    let mut state = TicketState::new(raffle, snapshot);
    let _ = TicketReducer::new().reduce(
        &mut state,
        TicketAction::ApproveTickets {
            ticket_ids: vec![ticket_id],
        },
        &env,
    );
    assert!(state.last_error.is_none());
    let err = storage
        .tickets
        .save_transition(&state.take_changes())
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    let ticket = harness
        .memory
        .raffle_tickets(harness.raffle_id)
        .await
        .into_iter()
        .find(|t| t.id == ticket_id)
        .expect("ticket should exist");
    assert_eq!(ticket.status, TicketStatus::Reserved);
    assert_eq!(ticket.buyer_email.as_deref(), Some("zoe@example.com"));
    assert_eq!(ticket.payment_reference.as_deref(), Some("REF-2"));
}

#[tokio::test]
async fn failed_email_keeps_the_status_change() {
    let memory = Arc::new(MemoryStore::new());
    let storage = Storage::from_memory(Arc::clone(&memory));
    let clock = Arc::new(test_clock());
    let notifier = Arc::new(Notifier::new(
        Arc::new(RecordingEmailSender::failing()),
        Arc::new(RecordingTelegramApi::new()),
        Arc::clone(&storage.telegram),
    ));
    let service = TicketService::new(storage.clone(), clock.clone(), notifier);
    let organization = OrganizationService::new(storage, clock)
        .create_organization(Organization {
            id: OrganizationId::new(),
            name: "Org".into(),
            subscription_tier: SubscriptionTier::Basic,
        })
        .await
        .unwrap();
    let raffle = service
        .create_raffle(Raffle {
            id: RaffleId::new(),
            organization_id: organization.id,
            title: "Rifa".into(),
            ticket_price_cents: 1_000,
            currency: "MXN".into(),
            draw_date: None,
            status: RaffleStatus::Active,
            reservation_minutes: 15,
            numbering: NumberingConfig::sequential(3),
        })
        .await
        .unwrap();
    service.generate_tickets(raffle.id).await.unwrap();

    let mut outcome = service
        .reserve(
            raffle.id,
            TicketSelection::Numbers(vec!["1".into()]),
            buyer("ana@example.com"),
            "REF-1".into(),
        )
        .await
        .unwrap();
    wait(&mut outcome.notifications).await;

    let tickets = memory.raffle_tickets(raffle.id).await;
    let ticket = tickets.iter().find(|t| t.ticket_number == "1").unwrap();
    assert_eq!(ticket.status, TicketStatus::Reserved);
}
