//! Group tickets by buyer for notification fan-out.

use crate::types::Ticket;
use std::collections::BTreeMap;

/// Tickets of one buyer within a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuyerGroup {
    /// Normalized (trimmed, lowercase) email
    pub email: String,
    /// Buyer name from the first ticket that carries one
    pub name: Option<String>,
    /// Payment reference from the first ticket that carries one
    pub payment_reference: Option<String>,
    /// Ticket numbers, shortest first, then lexicographic
    pub ticket_numbers: Vec<String>,
}

/// Normalize an email for grouping and lookups.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Group tickets by buyer email, sorted by email.
///
/// Tickets without an email are skipped.
#[must_use]
pub fn group_by_buyer(tickets: &[Ticket]) -> Vec<BuyerGroup> {
    let mut groups: BTreeMap<String, BuyerGroup> = BTreeMap::new();

    for ticket in tickets {
        let Some(email) = ticket.buyer_email.as_deref().map(normalize_email) else {
            continue;
        };
        if email.is_empty() {
            continue;
        }

        let group = groups.entry(email.clone()).or_insert_with(|| BuyerGroup {
            email,
            name: None,
            payment_reference: None,
            ticket_numbers: Vec::new(),
        });
        if group.name.is_none() {
            group.name.clone_from(&ticket.buyer_name);
        }
        if group.payment_reference.is_none() {
            group.payment_reference.clone_from(&ticket.payment_reference);
        }
        group.ticket_numbers.push(ticket.ticket_number.clone());
    }

    groups
        .into_values()
        .map(|mut group| {
            group
                .ticket_numbers
                .sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
            group
        })
        .collect()
}
