//! Ticket lifecycle aggregate.
//!
//! One [`TicketState`] holds a raffle and the subset of its tickets an
//! operation touches. The reducer validates a command against that state,
//! applies the resulting event, and returns notification effects. The
//! service persists the changed rows before the effects run.
//!
//! ## State Machine
//!
//! ```text
//! available ──reserve──▶ reserved ──approve──▶ sold
//!     ▲                     │
//!     └──reject / expire────┘
//!
//! available | reserved | sold ──cancel──▶ canceled
//! ```
//!
//! Batches are all-or-nothing: if any ticket is unknown or in the wrong
//! status the whole command fails and state is unchanged.

use crate::notifications::templates::escape_html;
use crate::notifications::{group_by_buyer, BuyerAlert, BuyerGroup, EmailTemplate, Notifier, OrganizerAlert};
use crate::store::TicketChange;
use crate::types::{
    BuyerInfo, OrganizationId, Raffle, RaffleStatus, Ticket, TicketId, TicketStatus,
};
use chrono::{DateTime, Duration, Utc};
use raffle_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Display format for dates in emails and bot messages.
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M UTC";

// ============================================================================
// State
// ============================================================================

/// Tickets loaded for one operation on one raffle.
#[derive(Clone, Debug)]
pub struct TicketState {
    /// Raffle the tickets belong to
    pub raffle: Raffle,
    tickets: BTreeMap<TicketId, Ticket>,
    loaded: HashMap<TicketId, (TicketStatus, i64)>,
    dirty: BTreeSet<TicketId>,
    /// Last validation error (for testing/debugging)
    pub last_error: Option<String>,
}

impl TicketState {
    /// Create state from loaded rows.
    #[must_use]
    pub fn new(raffle: Raffle, tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let tickets: BTreeMap<TicketId, Ticket> =
            tickets.into_iter().map(|t| (t.id, t)).collect();
        let loaded = tickets.values().map(|t| (t.id, (t.status, t.version))).collect();
        Self {
            raffle,
            tickets,
            loaded,
            dirty: BTreeSet::new(),
            last_error: None,
        }
    }

    /// Look up a ticket
    #[must_use]
    pub fn get(&self, id: &TicketId) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    /// All loaded tickets, ordered by id
    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.values()
    }

    /// Number of loaded tickets with `status`
    #[must_use]
    pub fn count_by_status(&self, status: TicketStatus) -> usize {
        self.tickets.values().filter(|t| t.status == status).count()
    }

    /// Whether any ticket changed since load (or since the last take)
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain changed tickets as guarded writes.
    ///
    /// Each change expects the status and version the row had when it was
    /// loaded, and carries the next version.
    pub fn take_changes(&mut self) -> Vec<TicketChange> {
        let dirty = std::mem::take(&mut self.dirty);
        let mut changes = Vec::with_capacity(dirty.len());
        for id in dirty {
            let Some(ticket) = self.tickets.get_mut(&id) else {
                continue;
            };
            let (expected_status, expected_version) = self
                .loaded
                .get(&id)
                .copied()
                .unwrap_or((ticket.status, ticket.version));
            ticket.version = expected_version + 1;
            self.loaded.insert(id, (ticket.status, ticket.version));
            changes.push(TicketChange {
                ticket: ticket.clone(),
                expected_status,
                expected_version,
            });
        }
        changes
    }

    /// Reserved tickets sharing a payment reference, ordered by id.
    fn reserved_with_reference(&self, reference: &str) -> Vec<TicketId> {
        self.tickets
            .values()
            .filter(|t| {
                t.status == TicketStatus::Reserved && t.payment_reference.as_deref() == Some(reference)
            })
            .map(|t| t.id)
            .collect()
    }

    fn snapshot(&self, ids: &[TicketId]) -> Vec<Ticket> {
        ids.iter().filter_map(|id| self.tickets.get(id)).cloned().collect()
    }

    fn update_each(&mut self, ids: &[TicketId], mut f: impl FnMut(&mut Ticket)) {
        for id in ids {
            if let Some(ticket) = self.tickets.get_mut(id) {
                f(ticket);
                self.dirty.insert(*id);
            }
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Commands and events of the ticket lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketAction {
    // Commands
    /// Hold available tickets for a buyer
    ReserveTickets {
        /// Tickets to hold
        ticket_ids: Vec<TicketId>,
        /// Buyer contact
        buyer: BuyerInfo,
        /// Reference shared by the checkout
        payment_reference: String,
    },

    /// Attach a payment proof to every reserved ticket of a reference
    SubmitPaymentProof {
        /// Checkout reference
        payment_reference: String,
        /// Uploaded proof location
        proof_url: String,
    },

    /// Mark reserved tickets as sold
    ApproveTickets {
        /// Tickets to approve
        ticket_ids: Vec<TicketId>,
    },

    /// Approve every reserved ticket sharing a payment reference
    ApproveByReference {
        /// Checkout reference
        payment_reference: String,
    },

    /// Release reserved tickets and clear the buyer
    RejectTickets {
        /// Tickets to reject
        ticket_ids: Vec<TicketId>,
    },

    /// Withdraw tickets from sale
    CancelTickets {
        /// Tickets to cancel
        ticket_ids: Vec<TicketId>,
    },

    /// Release reservations whose deadline has passed
    ExpireReservations,

    // Events
    /// Tickets were reserved
    TicketsReserved {
        /// Reserved tickets
        ticket_ids: Vec<TicketId>,
        /// Buyer contact
        buyer: BuyerInfo,
        /// Checkout reference
        payment_reference: String,
        /// Start of the hold
        reserved_at: DateTime<Utc>,
        /// End of the hold
        reserved_until: DateTime<Utc>,
    },

    /// A payment proof was attached
    PaymentProofSubmitted {
        /// Tickets of the reference
        ticket_ids: Vec<TicketId>,
        /// Proof location
        proof_url: String,
    },

    /// Tickets were sold
    TicketsApproved {
        /// Approved tickets
        ticket_ids: Vec<TicketId>,
        /// Approval time
        approved_at: DateTime<Utc>,
    },

    /// Tickets were released after a rejected payment
    TicketsRejected {
        /// Released tickets
        ticket_ids: Vec<TicketId>,
        /// Rejection time
        rejected_at: DateTime<Utc>,
    },

    /// Tickets were withdrawn
    TicketsCanceled {
        /// Canceled tickets
        ticket_ids: Vec<TicketId>,
        /// Cancellation time
        canceled_at: DateTime<Utc>,
    },

    /// Expired reservations were released
    ReservationsExpired {
        /// Released tickets
        ticket_ids: Vec<TicketId>,
    },

    /// Command rejected
    ValidationFailed {
        /// Error message
        error: String,
    },

    /// A notification effect failed (status change is kept)
    NotificationFailed {
        /// `email` or `telegram`
        channel: String,
        /// Email address or chat description
        recipient: String,
        /// Error message
        error: String,
    },
}

impl TicketAction {
    /// Operation name for logs and metrics.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::ReserveTickets { .. } | Self::TicketsReserved { .. } => "reserve",
            Self::SubmitPaymentProof { .. } | Self::PaymentProofSubmitted { .. } => "payment_proof",
            Self::ApproveTickets { .. } | Self::TicketsApproved { .. } => "approve",
            Self::ApproveByReference { .. } => "approve_by_reference",
            Self::RejectTickets { .. } | Self::TicketsRejected { .. } => "reject",
            Self::CancelTickets { .. } | Self::TicketsCanceled { .. } => "cancel",
            Self::ExpireReservations | Self::ReservationsExpired { .. } => "expire",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::NotificationFailed { .. } => "notification_failed",
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the ticket reducer.
#[derive(Clone)]
pub struct TicketEnvironment {
    /// Clock for timestamps and expiry
    pub clock: Arc<dyn Clock>,
    /// Notification fan-out used by effects
    pub notifier: Arc<Notifier>,
}

impl TicketEnvironment {
    /// Creates a new `TicketEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<Notifier>) -> Self {
        Self { clock, notifier }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the ticket lifecycle.
#[derive(Clone, Debug, Default)]
pub struct TicketReducer;

impl TicketReducer {
    /// Creates a new `TicketReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Deduplicate ids and check every ticket is loaded and in an allowed status.
    fn validate_batch(
        state: &TicketState,
        ticket_ids: &[TicketId],
        allowed: &[TicketStatus],
    ) -> Result<Vec<TicketId>, String> {
        if ticket_ids.is_empty() {
            return Err("No tickets selected".to_string());
        }

        let mut seen = HashSet::with_capacity(ticket_ids.len());
        let mut ids = Vec::with_capacity(ticket_ids.len());
        for id in ticket_ids {
            if !seen.insert(*id) {
                continue;
            }
            let Some(ticket) = state.get(id) else {
                return Err(format!("Ticket {id} not found in raffle {}", state.raffle.id));
            };
            if !allowed.contains(&ticket.status) {
                return Err(format!(
                    "Ticket {} is {}, expected {}",
                    ticket.ticket_number,
                    ticket.status,
                    allowed
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(" or ")
                ));
            }
            ids.push(*id);
        }
        Ok(ids)
    }

    fn validate_buyer(buyer: &BuyerInfo, payment_reference: &str) -> Result<(), String> {
        if buyer.name.trim().is_empty() {
            return Err("Buyer name is required".to_string());
        }
        let email = buyer.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err("A valid buyer email is required".to_string());
        }
        if payment_reference.trim().is_empty() {
            return Err("Payment reference is required".to_string());
        }
        Ok(())
    }

    /// Applies an event to state
    fn apply_event(state: &mut TicketState, action: &TicketAction) {
        match action {
            TicketAction::TicketsReserved {
                ticket_ids,
                buyer,
                payment_reference,
                reserved_at,
                reserved_until,
            } => {
                state.update_each(ticket_ids, |ticket| {
                    ticket.status = TicketStatus::Reserved;
                    ticket.buyer_name = Some(buyer.name.trim().to_string());
                    ticket.buyer_email = Some(buyer.email.trim().to_string());
                    ticket.buyer_phone.clone_from(&buyer.phone);
                    ticket.payment_reference = Some(payment_reference.clone());
                    ticket.payment_proof_url = None;
                    ticket.reserved_at = Some(*reserved_at);
                    ticket.reserved_until = Some(*reserved_until);
                    ticket.approved_at = None;
                    ticket.sold_at = None;
                });
                state.last_error = None;
            },
            TicketAction::PaymentProofSubmitted {
                ticket_ids,
                proof_url,
            } => {
                state.update_each(ticket_ids, |ticket| {
                    ticket.payment_proof_url = Some(proof_url.clone());
                });
                state.last_error = None;
            },
            TicketAction::TicketsApproved {
                ticket_ids,
                approved_at,
            } => {
                state.update_each(ticket_ids, |ticket| {
                    ticket.status = TicketStatus::Sold;
                    ticket.approved_at = Some(*approved_at);
                    ticket.sold_at = Some(*approved_at);
                    ticket.reserved_until = None;
                });
                state.last_error = None;
            },
            TicketAction::TicketsRejected {
                ticket_ids,
                rejected_at,
            } => {
                state.update_each(ticket_ids, |ticket| {
                    ticket.clear_buyer();
                    ticket.status = TicketStatus::Available;
                    ticket.canceled_at = Some(*rejected_at);
                });
                state.last_error = None;
            },
            TicketAction::TicketsCanceled {
                ticket_ids,
                canceled_at,
            } => {
                state.update_each(ticket_ids, |ticket| {
                    ticket.clear_buyer();
                    ticket.status = TicketStatus::Canceled;
                    ticket.canceled_at = Some(*canceled_at);
                });
                state.last_error = None;
            },
            TicketAction::ReservationsExpired { ticket_ids } => {
                state.update_each(ticket_ids, |ticket| {
                    ticket.clear_buyer();
                    ticket.status = TicketStatus::Available;
                });
                state.last_error = None;
            },
            TicketAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands are not events; failed notifications don't change tickets
            TicketAction::ReserveTickets { .. }
            | TicketAction::SubmitPaymentProof { .. }
            | TicketAction::ApproveTickets { .. }
            | TicketAction::ApproveByReference { .. }
            | TicketAction::RejectTickets { .. }
            | TicketAction::CancelTickets { .. }
            | TicketAction::ExpireReservations
            | TicketAction::NotificationFailed { .. } => {},
        }
    }

    fn fail(state: &mut TicketState, error: String) -> SmallVec<[Effect<TicketAction>; 4]> {
        Self::apply_event(state, &TicketAction::ValidationFailed { error });
        SmallVec::new()
    }

    fn approve(
        state: &mut TicketState,
        ticket_ids: Vec<TicketId>,
        env: &TicketEnvironment,
    ) -> SmallVec<[Effect<TicketAction>; 4]> {
        Self::apply_event(
            state,
            &TicketAction::TicketsApproved {
                ticket_ids: ticket_ids.clone(),
                approved_at: env.clock.now(),
            },
        );

        let tickets = state.snapshot(&ticket_ids);
        let groups = group_by_buyer(&tickets);
        let raffle = &state.raffle;

        let mut effects: SmallVec<[Effect<TicketAction>; 4]> = groups
            .iter()
            .map(|group| {
                email_effect(
                    &env.notifier,
                    EmailTemplate::TicketsApproved,
                    group,
                    approved_data(raffle, group),
                )
            })
            .collect();
        effects.push(telegram_effect(
            &env.notifier,
            TelegramFanout {
                buyers: buyer_messages(&groups, |group| {
                    format!(
                        "✅ Tu pago para <b>{}</b> fue aprobado. Boletos: {}",
                        escape_html(&raffle.title),
                        escape_html(&group.ticket_numbers.join(", "))
                    )
                }),
                buyer_alert: BuyerAlert::PaymentApproved,
                organizer: Some((
                    raffle.organization_id,
                    OrganizerAlert::PaymentApproved,
                    format!(
                        "✅ Pago aprobado en <b>{}</b>: {} boleto(s) vendidos.",
                        escape_html(&raffle.title),
                        tickets.len()
                    ),
                )),
            },
        ));
        effects
    }
}

impl Reducer for TicketReducer {
    type State = TicketState;
    type Action = TicketAction;
    type Environment = TicketEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per lifecycle transition
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            TicketAction::ReserveTickets {
                ticket_ids,
                buyer,
                payment_reference,
            } => {
                if state.raffle.status != RaffleStatus::Active {
                    return Self::fail(
                        state,
                        format!("Raffle {} is not accepting reservations", state.raffle.title),
                    );
                }
                if let Err(error) = Self::validate_buyer(&buyer, &payment_reference) {
                    return Self::fail(state, error);
                }
                let ticket_ids =
                    match Self::validate_batch(state, &ticket_ids, &[TicketStatus::Available]) {
                        Ok(ids) => ids,
                        Err(error) => return Self::fail(state, error),
                    };

                let reserved_at = env.clock.now();
                let reserved_until =
                    reserved_at + Duration::minutes(i64::from(state.raffle.reservation_minutes));
                let event = TicketAction::TicketsReserved {
                    ticket_ids: ticket_ids.clone(),
                    buyer,
                    payment_reference: payment_reference.trim().to_string(),
                    reserved_at,
                    reserved_until,
                };
                Self::apply_event(state, &event);

                let tickets = state.snapshot(&ticket_ids);
                let groups = group_by_buyer(&tickets);
                let raffle = &state.raffle;

                let mut effects: SmallVec<[Effect<TicketAction>; 4]> = groups
                    .iter()
                    .map(|group| {
                        email_effect(
                            &env.notifier,
                            EmailTemplate::ReservationConfirmation,
                            group,
                            reservation_data(raffle, group, reserved_until),
                        )
                    })
                    .collect();
                effects.push(telegram_effect(
                    &env.notifier,
                    TelegramFanout {
                        buyers: buyer_messages(&groups, |group| {
                            format!(
                                "🎟️ Apartaste {} boleto(s) de <b>{}</b>: {}. Tu reserva vence el {}.",
                                group.ticket_numbers.len(),
                                escape_html(&raffle.title),
                                escape_html(&group.ticket_numbers.join(", ")),
                                reserved_until.format(DATE_FORMAT)
                            )
                        }),
                        buyer_alert: BuyerAlert::Reservation,
                        organizer: Some((
                            raffle.organization_id,
                            OrganizerAlert::TicketReserved,
                            reserved_alert(raffle, &tickets),
                        )),
                    },
                ));
                effects
            },

            TicketAction::SubmitPaymentProof {
                payment_reference,
                proof_url,
            } => {
                if proof_url.trim().is_empty() {
                    return Self::fail(state, "Payment proof URL is required".to_string());
                }
                let ticket_ids = state.reserved_with_reference(&payment_reference);
                if ticket_ids.is_empty() {
                    return Self::fail(
                        state,
                        format!("No reserved tickets for payment reference {payment_reference}"),
                    );
                }

                let event = TicketAction::PaymentProofSubmitted {
                    ticket_ids: ticket_ids.clone(),
                    proof_url: proof_url.trim().to_string(),
                };
                Self::apply_event(state, &event);

                let tickets = state.snapshot(&ticket_ids);
                let groups = group_by_buyer(&tickets);
                let raffle = &state.raffle;

                let mut effects: SmallVec<[Effect<TicketAction>; 4]> = groups
                    .iter()
                    .map(|group| {
                        email_effect(
                            &env.notifier,
                            EmailTemplate::PaymentProofReceived,
                            group,
                            proof_data(raffle, group, &payment_reference),
                        )
                    })
                    .collect();
                effects.push(telegram_effect(
                    &env.notifier,
                    TelegramFanout {
                        buyers: Vec::new(),
                        buyer_alert: BuyerAlert::Reservation,
                        organizer: Some((
                            raffle.organization_id,
                            OrganizerAlert::PaymentProof,
                            format!(
                                "🧾 Comprobante recibido en <b>{}</b>: referencia {}, {} boleto(s).",
                                escape_html(&raffle.title),
                                escape_html(&payment_reference),
                                tickets.len()
                            ),
                        )),
                    },
                ));
                effects
            },

            TicketAction::ApproveTickets { ticket_ids } => {
                match Self::validate_batch(state, &ticket_ids, &[TicketStatus::Reserved]) {
                    Ok(ids) => Self::approve(state, ids, env),
                    Err(error) => Self::fail(state, error),
                }
            },

            TicketAction::ApproveByReference { payment_reference } => {
                let ticket_ids = state.reserved_with_reference(&payment_reference);
                if ticket_ids.is_empty() {
                    return Self::fail(
                        state,
                        format!("No reserved tickets for payment reference {payment_reference}"),
                    );
                }
                Self::approve(state, ticket_ids, env)
            },

            TicketAction::RejectTickets { ticket_ids } => {
                let ticket_ids =
                    match Self::validate_batch(state, &ticket_ids, &[TicketStatus::Reserved]) {
                        Ok(ids) => ids,
                        Err(error) => return Self::fail(state, error),
                    };

                // Buyer fields are cleared by the event; capture them first.
                let tickets = state.snapshot(&ticket_ids);
                let groups = group_by_buyer(&tickets);

                Self::apply_event(
                    state,
                    &TicketAction::TicketsRejected {
                        ticket_ids,
                        rejected_at: env.clock.now(),
                    },
                );

                let raffle = &state.raffle;
                let mut effects: SmallVec<[Effect<TicketAction>; 4]> = groups
                    .iter()
                    .map(|group| {
                        email_effect(
                            &env.notifier,
                            EmailTemplate::TicketsRejected,
                            group,
                            rejected_data(raffle, group),
                        )
                    })
                    .collect();
                effects.push(telegram_effect(
                    &env.notifier,
                    TelegramFanout {
                        buyers: buyer_messages(&groups, |group| {
                            format!(
                                "❌ Tu pago para <b>{}</b> no fue aprobado. Boletos liberados: {}",
                                escape_html(&raffle.title),
                                escape_html(&group.ticket_numbers.join(", "))
                            )
                        }),
                        buyer_alert: BuyerAlert::PaymentRejected,
                        organizer: Some((
                            raffle.organization_id,
                            OrganizerAlert::PaymentRejected,
                            format!(
                                "❌ Pago rechazado en <b>{}</b>: {} boleto(s) liberados.",
                                escape_html(&raffle.title),
                                tickets.len()
                            ),
                        )),
                    },
                ));
                effects
            },

            TicketAction::CancelTickets { ticket_ids } => {
                let allowed = [
                    TicketStatus::Available,
                    TicketStatus::Reserved,
                    TicketStatus::Sold,
                ];
                match Self::validate_batch(state, &ticket_ids, &allowed) {
                    Ok(ticket_ids) => {
                        Self::apply_event(
                            state,
                            &TicketAction::TicketsCanceled {
                                ticket_ids,
                                canceled_at: env.clock.now(),
                            },
                        );
                        SmallVec::new()
                    },
                    Err(error) => Self::fail(state, error),
                }
            },

            TicketAction::ExpireReservations => {
                let now = env.clock.now();
                let ticket_ids: Vec<TicketId> = state
                    .tickets()
                    .filter(|t| {
                        t.status == TicketStatus::Reserved
                            && t.reserved_until.is_some_and(|until| until < now)
                    })
                    .map(|t| t.id)
                    .collect();
                if ticket_ids.is_empty() {
                    return SmallVec::new();
                }

                let count = ticket_ids.len();
                Self::apply_event(state, &TicketAction::ReservationsExpired { ticket_ids });

                let raffle = &state.raffle;
                smallvec![telegram_effect(
                    &env.notifier,
                    TelegramFanout {
                        buyers: Vec::new(),
                        buyer_alert: BuyerAlert::Reservation,
                        organizer: Some((
                            raffle.organization_id,
                            OrganizerAlert::ReservationExpired,
                            format!(
                                "⏰ {count} reserva(s) expiraron en <b>{}</b> y los boletos volvieron a estar disponibles.",
                                escape_html(&raffle.title)
                            ),
                        )),
                    },
                )]
            },

            // ========== Events ==========
            TicketAction::NotificationFailed {
                ref channel,
                ref recipient,
                ref error,
            } => {
                tracing::warn!(%channel, %recipient, %error, "Notification failed");
                SmallVec::new()
            },

            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}

// ============================================================================
// Notification effects
// ============================================================================

fn email_effect(
    notifier: &Arc<Notifier>,
    template: EmailTemplate,
    group: &BuyerGroup,
    data: Value,
) -> Effect<TicketAction> {
    let notifier = Arc::clone(notifier);
    let to = group.email.clone();
    Effect::Future(Box::pin(async move {
        let result = notifier.send_email(template, &to, &data).await;
        result.err().map(|error| TicketAction::NotificationFailed {
            channel: "email".to_string(),
            recipient: to,
            error: error.to_string(),
        })
    }))
}

/// Telegram messages for one transition.
struct TelegramFanout {
    /// `(buyer email, text)`
    buyers: Vec<(String, String)>,
    buyer_alert: BuyerAlert,
    organizer: Option<(OrganizationId, OrganizerAlert, String)>,
}

fn buyer_messages(
    groups: &[BuyerGroup],
    text: impl Fn(&BuyerGroup) -> String,
) -> Vec<(String, String)> {
    groups.iter().map(|g| (g.email.clone(), text(g))).collect()
}

/// One effect sends every Telegram message of a transition; the first
/// failure is reported back, the rest are still attempted.
fn telegram_effect(notifier: &Arc<Notifier>, fanout: TelegramFanout) -> Effect<TicketAction> {
    let notifier = Arc::clone(notifier);
    Effect::Future(Box::pin(async move {
        let mut failure = None;
        for (email, text) in &fanout.buyers {
            if let Err(error) = notifier.notify_buyer(email, fanout.buyer_alert, text).await {
                failure.get_or_insert_with(|| TicketAction::NotificationFailed {
                    channel: "telegram".to_string(),
                    recipient: email.clone(),
                    error: error.to_string(),
                });
            }
        }
        if let Some((organization_id, alert, text)) = &fanout.organizer {
            if let Err(error) = notifier.notify_organizer(*organization_id, *alert, text).await {
                failure.get_or_insert_with(|| TicketAction::NotificationFailed {
                    channel: "telegram".to_string(),
                    recipient: format!("organization {organization_id}"),
                    error: error.to_string(),
                });
            }
        }
        failure
    }))
}

fn buyer_name(group: &BuyerGroup) -> String {
    group.name.clone().unwrap_or_else(|| group.email.clone())
}

fn total_amount(raffle: &Raffle, tickets: usize) -> String {
    let count = i64::try_from(tickets).unwrap_or(i64::MAX);
    raffle.format_amount(raffle.ticket_price_cents.saturating_mul(count))
}

fn approved_data(raffle: &Raffle, group: &BuyerGroup) -> Value {
    json!({
        "buyer_name": buyer_name(group),
        "raffle_title": raffle.title,
        "ticket_numbers": group.ticket_numbers,
        "draw_date": raffle.draw_date.map(|d| d.format(DATE_FORMAT).to_string()),
    })
}

fn rejected_data(raffle: &Raffle, group: &BuyerGroup) -> Value {
    json!({
        "buyer_name": buyer_name(group),
        "raffle_title": raffle.title,
        "ticket_numbers": group.ticket_numbers,
    })
}

fn reservation_data(raffle: &Raffle, group: &BuyerGroup, reserved_until: DateTime<Utc>) -> Value {
    json!({
        "buyer_name": buyer_name(group),
        "raffle_title": raffle.title,
        "ticket_numbers": group.ticket_numbers,
        "payment_reference": group.payment_reference,
        "reserved_until": reserved_until.format(DATE_FORMAT).to_string(),
        "amount": total_amount(raffle, group.ticket_numbers.len()),
    })
}

fn proof_data(raffle: &Raffle, group: &BuyerGroup, payment_reference: &str) -> Value {
    json!({
        "buyer_name": buyer_name(group),
        "raffle_title": raffle.title,
        "payment_reference": payment_reference,
    })
}

fn reserved_alert(raffle: &Raffle, tickets: &[Ticket]) -> String {
    let buyer = tickets
        .first()
        .and_then(|t| t.buyer_name.as_deref())
        .unwrap_or("un comprador");
    let reference = tickets
        .first()
        .and_then(|t| t.payment_reference.as_deref())
        .unwrap_or("-");
    let numbers: Vec<&str> = tickets.iter().map(|t| t.ticket_number.as_str()).collect();
    format!(
        "🎟️ Nueva reserva en <b>{}</b>: {} boleto(s) ({}) por {}. Referencia: {}. Total: {}",
        escape_html(&raffle.title),
        tickets.len(),
        escape_html(&numbers.join(", ")),
        escape_html(buyer),
        escape_html(reference),
        total_amount(raffle, tickets.len())
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notifications::RecordingEmailSender;
    use crate::numbering::NumberingConfig;
    use crate::store::MemoryStore;
    use crate::telegram::client::RecordingTelegramApi;
    use crate::types::RaffleId;
    use raffle_testing::{assertions, test_clock, ReducerTest};

    fn raffle() -> Raffle {
        Raffle {
            id: RaffleId::new(),
            organization_id: OrganizationId::new(),
            title: "Gran Rifa".to_string(),
            ticket_price_cents: 10_000,
            currency: "MXN".to_string(),
            draw_date: None,
            status: RaffleStatus::Active,
            reservation_minutes: 15,
            numbering: NumberingConfig::sequential(10),
        }
    }

    fn env() -> TicketEnvironment {
        let notifier = Notifier::new(
            Arc::new(RecordingEmailSender::new()),
            Arc::new(RecordingTelegramApi::new()),
            Arc::new(MemoryStore::new()),
        );
        TicketEnvironment::new(Arc::new(test_clock()), Arc::new(notifier))
    }

    fn available(raffle: &Raffle, number: &str) -> Ticket {
        Ticket::available(raffle.id, number)
    }

    fn reserved(raffle: &Raffle, number: &str, email: &str, reference: &str) -> Ticket {
        let now = test_clock().now();
        let mut ticket = available(raffle, number);
        ticket.status = TicketStatus::Reserved;
        ticket.buyer_name = Some("Buyer".to_string());
        ticket.buyer_email = Some(email.to_string());
        ticket.buyer_phone = Some("555".to_string());
        ticket.payment_reference = Some(reference.to_string());
        ticket.payment_proof_url = Some("https://proofs/1.jpg".to_string());
        ticket.reserved_at = Some(now);
        ticket.reserved_until = Some(now + Duration::minutes(15));
        ticket
    }

    fn buyer() -> BuyerInfo {
        BuyerInfo {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            phone: None,
        }
    }

    #[test]
    fn reserve_sets_buyer_and_deadline() {
        let raffle = raffle();
        let a = available(&raffle, "001");
        let b = available(&raffle, "002");
        let ids = vec![a.id, b.id];
        let a_id = a.id;

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [a, b]))
            .when_action(TicketAction::ReserveTickets {
                ticket_ids: ids,
                buyer: buyer(),
                payment_reference: "REF-1".to_string(),
            })
            .then_state(move |state| {
                assert_eq!(state.count_by_status(TicketStatus::Reserved), 2);
                let ticket = state.get(&a_id).unwrap();
                assert_eq!(ticket.buyer_email.as_deref(), Some("ana@example.com"));
                assert_eq!(ticket.payment_reference.as_deref(), Some("REF-1"));
                let now = test_clock().now();
                assert_eq!(ticket.reserved_at, Some(now));
                assert_eq!(ticket.reserved_until, Some(now + Duration::minutes(15)));
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| {
                // One confirmation email for the single buyer, one Telegram fan-out
                assertions::assert_effects_count(effects, 2);
            })
            .run();
    }

    #[test]
    fn reserve_fails_whole_batch_if_one_ticket_taken() {
        let raffle = raffle();
        let free = available(&raffle, "001");
        let taken = reserved(&raffle, "002", "zoe@example.com", "REF-0");
        let ids = vec![free.id, taken.id];
        let free_id = free.id;

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [free, taken]))
            .when_action(TicketAction::ReserveTickets {
                ticket_ids: ids,
                buyer: buyer(),
                payment_reference: "REF-1".to_string(),
            })
            .then_state(move |state| {
                assert_eq!(state.get(&free_id).unwrap().status, TicketStatus::Available);
                assert!(state.last_error.as_deref().unwrap().contains("002"));
                assert!(!state.has_changes());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn reserve_requires_active_raffle_and_email() {
        let mut draft = raffle();
        draft.status = RaffleStatus::Draft;
        let ticket = available(&draft, "001");
        let ids = vec![ticket.id];

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(draft, [ticket]))
            .when_action(TicketAction::ReserveTickets {
                ticket_ids: ids,
                buyer: buyer(),
                payment_reference: "REF".to_string(),
            })
            .then_state(|state| {
                assert!(state.last_error.as_deref().unwrap().contains("not accepting"));
            })
            .run();

        let raffle = raffle();
        let ticket = available(&raffle, "001");
        let ids = vec![ticket.id];
        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [ticket]))
            .when_action(TicketAction::ReserveTickets {
                ticket_ids: ids,
                buyer: BuyerInfo {
                    email: "not-an-email".to_string(),
                    ..buyer()
                },
                payment_reference: "REF".to_string(),
            })
            .then_state(|state| {
                assert_eq!(
                    state.last_error.as_deref(),
                    Some("A valid buyer email is required")
                );
            })
            .run();
    }

    #[test]
    fn approve_marks_sold_and_groups_emails_by_buyer() {
        let raffle = raffle();
        let tickets = [
            reserved(&raffle, "001", "ana@example.com", "A"),
            reserved(&raffle, "002", "ana@example.com", "A"),
            reserved(&raffle, "003", "zoe@example.com", "Z"),
        ];
        let ids: Vec<TicketId> = tickets.iter().map(|t| t.id).collect();
        let first = ids[0];

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, tickets))
            .when_action(TicketAction::ApproveTickets { ticket_ids: ids })
            .then_state(move |state| {
                assert_eq!(state.count_by_status(TicketStatus::Sold), 3);
                let ticket = state.get(&first).unwrap();
                assert_eq!(ticket.approved_at, Some(test_clock().now()));
                assert_eq!(ticket.sold_at, Some(test_clock().now()));
                assert!(ticket.reserved_until.is_none());
                assert_eq!(ticket.buyer_email.as_deref(), Some("ana@example.com"));
            })
            .then_effects(|effects| {
                // Two unique buyers -> two emails, plus one Telegram fan-out
                assertions::assert_effects_count(effects, 3);
            })
            .run();
    }

    #[test]
    fn approve_requires_reserved() {
        let raffle = raffle();
        let ticket = available(&raffle, "001");
        let ids = vec![ticket.id];

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [ticket]))
            .when_action(TicketAction::ApproveTickets { ticket_ids: ids })
            .then_state(|state| {
                assert_eq!(state.count_by_status(TicketStatus::Available), 1);
                assert!(state.last_error.as_deref().unwrap().contains("expected reserved"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn approve_by_reference_selects_reserved_tickets_only() {
        let raffle = raffle();
        let mut sold = reserved(&raffle, "003", "ana@example.com", "REF");
        sold.status = TicketStatus::Sold;
        sold.reserved_until = None;
        let tickets = [
            reserved(&raffle, "001", "ana@example.com", "REF"),
            reserved(&raffle, "002", "ana@example.com", "REF"),
            reserved(&raffle, "004", "zoe@example.com", "OTHER"),
            sold,
        ];

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, tickets))
            .when_action(TicketAction::ApproveByReference {
                payment_reference: "REF".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.count_by_status(TicketStatus::Sold), 3);
                assert_eq!(state.count_by_status(TicketStatus::Reserved), 1);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn approve_by_unknown_reference_fails() {
        let raffle = raffle();
        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, []))
            .when_action(TicketAction::ApproveByReference {
                payment_reference: "NOPE".to_string(),
            })
            .then_state(|state| {
                assert!(state.last_error.as_deref().unwrap().contains("NOPE"));
            })
            .run();
    }

    #[test]
    fn reject_clears_buyer_and_payment_fields() {
        let raffle = raffle();
        let ticket = reserved(&raffle, "001", "ana@example.com", "REF");
        let id = ticket.id;

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [ticket]))
            .when_action(TicketAction::RejectTickets {
                ticket_ids: vec![id],
            })
            .then_state(move |state| {
                let ticket = state.get(&id).unwrap();
                assert_eq!(ticket.status, TicketStatus::Available);
                assert!(ticket.buyer_name.is_none());
                assert!(ticket.buyer_email.is_none());
                assert!(ticket.buyer_phone.is_none());
                assert!(ticket.payment_reference.is_none());
                assert!(ticket.payment_proof_url.is_none());
                assert!(ticket.reserved_at.is_none());
                assert!(ticket.reserved_until.is_none());
                assert_eq!(ticket.canceled_at, Some(test_clock().now()));
            })
            .then_effects(|effects| {
                // Rejection email uses the buyer captured before clearing
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn cancel_allows_any_non_canceled_status() {
        let raffle = raffle();
        let mut sold = reserved(&raffle, "003", "ana@example.com", "REF");
        sold.status = TicketStatus::Sold;
        let tickets = [
            available(&raffle, "001"),
            reserved(&raffle, "002", "ana@example.com", "REF"),
            sold,
        ];
        let ids: Vec<TicketId> = tickets.iter().map(|t| t.id).collect();

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, tickets))
            .when_action(TicketAction::CancelTickets { ticket_ids: ids })
            .then_state(|state| {
                assert_eq!(state.count_by_status(TicketStatus::Canceled), 3);
                assert!(state.tickets().all(|t| t.buyer_email.is_none()));
                assert!(state.tickets().all(|t| t.reserved_until.is_none()));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn canceled_tickets_cannot_be_canceled_again() {
        let raffle = raffle();
        let mut ticket = available(&raffle, "001");
        ticket.status = TicketStatus::Canceled;
        let id = ticket.id;

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [ticket]))
            .when_action(TicketAction::CancelTickets {
                ticket_ids: vec![id],
            })
            .then_state(|state| assert!(state.last_error.is_some()))
            .run();
    }

    #[test]
    fn expire_releases_only_past_deadlines() {
        let raffle = raffle();
        let now = test_clock().now();
        let mut expired = reserved(&raffle, "001", "ana@example.com", "A");
        expired.reserved_until = Some(now - Duration::minutes(1));
        let fresh = reserved(&raffle, "002", "zoe@example.com", "Z");
        let expired_id = expired.id;
        let fresh_id = fresh.id;

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [expired, fresh]))
            .when_action(TicketAction::ExpireReservations)
            .then_state(move |state| {
                let expired = state.get(&expired_id).unwrap();
                assert_eq!(expired.status, TicketStatus::Available);
                assert!(expired.buyer_email.is_none());
                assert!(expired.canceled_at.is_none());
                assert_eq!(state.get(&fresh_id).unwrap().status, TicketStatus::Reserved);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn payment_proof_attaches_url_to_reference() {
        let raffle = raffle();
        let mut ticket = reserved(&raffle, "001", "ana@example.com", "REF");
        ticket.payment_proof_url = None;
        let id = ticket.id;

        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle, [ticket]))
            .when_action(TicketAction::SubmitPaymentProof {
                payment_reference: "REF".to_string(),
                proof_url: "https://proofs/abc.png".to_string(),
            })
            .then_state(move |state| {
                let ticket = state.get(&id).unwrap();
                assert_eq!(ticket.status, TicketStatus::Reserved);
                assert_eq!(
                    ticket.payment_proof_url.as_deref(),
                    Some("https://proofs/abc.png")
                );
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn empty_batch_is_rejected() {
        ReducerTest::new(TicketReducer::new())
            .with_env(env())
            .given_state(TicketState::new(raffle(), []))
            .when_action(TicketAction::RejectTickets { ticket_ids: vec![] })
            .then_state(|state| {
                assert_eq!(state.last_error.as_deref(), Some("No tickets selected"));
            })
            .run();
    }

    #[test]
    fn take_changes_guards_on_loaded_status_and_version() {
        let raffle = raffle();
        let ticket = reserved(&raffle, "001", "ana@example.com", "REF");
        let id = ticket.id;
        let mut state = TicketState::new(raffle, [ticket]);

        let _ = TicketReducer::new().reduce(
            &mut state,
            TicketAction::ApproveTickets {
                ticket_ids: vec![id, id],
            },
            &env(),
        );

        let changes = state.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].expected_status, TicketStatus::Reserved);
        assert_eq!(changes[0].expected_version, 0);
        assert_eq!(changes[0].ticket.status, TicketStatus::Sold);
        assert_eq!(changes[0].ticket.version, 1);
        assert!(state.take_changes().is_empty());
    }
}
