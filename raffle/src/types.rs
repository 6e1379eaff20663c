//! Domain types for the raffle platform.
//!
//! Identifiers, the ticket entity and its status enum, raffles,
//! organizations, Telegram link rows and dashboard notifications.

use crate::numbering::NumberingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create the identifier from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a ticket
    TicketId
);
uuid_id!(
    /// Unique identifier for a raffle
    RaffleId
);
uuid_id!(
    /// Unique identifier for an organization (the tenant boundary)
    OrganizationId
);
uuid_id!(
    /// Unique identifier for a dashboard notification
    NotificationId
);

// ============================================================================
// Tickets
// ============================================================================

/// Lifecycle status of a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Can be reserved by a buyer
    Available,
    /// Held for a buyer until `reserved_until`, pending payment approval
    Reserved,
    /// Payment approved
    Sold,
    /// Withdrawn from sale
    Canceled,
}

impl TicketStatus {
    /// Database/wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Sold => "sold",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "reserved" => Ok(Self::Reserved),
            "sold" => Ok(Self::Sold),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

/// Buyer contact details captured at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    /// Full name
    pub name: String,
    /// Email address (notifications are grouped by this value)
    pub email: String,
    /// Phone number
    pub phone: Option<String>,
}

/// A purchasable unit within a raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Owning raffle
    pub raffle_id: RaffleId,
    /// Formatted number, unique within the raffle
    pub ticket_number: String,
    /// Current status
    pub status: TicketStatus,
    /// Buyer name
    pub buyer_name: Option<String>,
    /// Buyer email
    pub buyer_email: Option<String>,
    /// Buyer phone
    pub buyer_phone: Option<String>,
    /// When the current reservation started
    pub reserved_at: Option<DateTime<Utc>>,
    /// Reservation deadline; only set while reserved
    pub reserved_until: Option<DateTime<Utc>>,
    /// When the payment was approved
    pub approved_at: Option<DateTime<Utc>>,
    /// When the ticket was sold
    pub sold_at: Option<DateTime<Utc>>,
    /// Last rejection or cancellation time
    pub canceled_at: Option<DateTime<Utc>>,
    /// Reference shared by all tickets of one checkout
    pub payment_reference: Option<String>,
    /// Uploaded proof of payment
    pub payment_proof_url: Option<String>,
    /// Row version, bumped on every write
    #[serde(default)]
    pub version: i64,
}

impl Ticket {
    /// Creates an available ticket with the given number
    #[must_use]
    pub fn available(raffle_id: RaffleId, ticket_number: impl Into<String>) -> Self {
        Self {
            id: TicketId::new(),
            raffle_id,
            ticket_number: ticket_number.into(),
            status: TicketStatus::Available,
            buyer_name: None,
            buyer_email: None,
            buyer_phone: None,
            reserved_at: None,
            reserved_until: None,
            approved_at: None,
            sold_at: None,
            canceled_at: None,
            payment_reference: None,
            payment_proof_url: None,
            version: 0,
        }
    }

    /// Clears buyer-identifying, payment and reservation fields.
    pub fn clear_buyer(&mut self) {
        self.buyer_name = None;
        self.buyer_email = None;
        self.buyer_phone = None;
        self.payment_reference = None;
        self.payment_proof_url = None;
        self.reserved_at = None;
        self.reserved_until = None;
    }
}

/// Ticket counts per status for one raffle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Available tickets
    pub available: u64,
    /// Reserved tickets
    pub reserved: u64,
    /// Sold tickets
    pub sold: u64,
    /// Canceled tickets
    pub canceled: u64,
}

impl StatusCounts {
    /// All tickets regardless of status
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.available + self.reserved + self.sold + self.canceled
    }

    /// Increment the counter for `status`
    pub fn add(&mut self, status: TicketStatus, count: u64) {
        match status {
            TicketStatus::Available => self.available += count,
            TicketStatus::Reserved => self.reserved += count,
            TicketStatus::Sold => self.sold += count,
            TicketStatus::Canceled => self.canceled += count,
        }
    }
}

// ============================================================================
// Raffles and organizations
// ============================================================================

/// Publication status of a raffle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaffleStatus {
    /// Being configured
    Draft,
    /// Selling tickets
    Active,
    /// Drawn
    Completed,
    /// Withdrawn
    Canceled,
}

impl RaffleStatus {
    /// Database/wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }
}

impl FromStr for RaffleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown raffle status: {other}")),
        }
    }
}

/// Default reservation hold, in minutes.
pub const DEFAULT_RESERVATION_MINUTES: u32 = 15;

/// An organizer's ticketed drawing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raffle {
    /// Raffle ID
    pub id: RaffleId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Public title
    pub title: String,
    /// Price per ticket in the smallest currency unit
    pub ticket_price_cents: i64,
    /// ISO currency code
    pub currency: String,
    /// Scheduled draw
    pub draw_date: Option<DateTime<Utc>>,
    /// Publication status
    pub status: RaffleStatus,
    /// How long a reservation holds tickets
    pub reservation_minutes: u32,
    /// Ticket numbering configuration (also defines the pool size)
    pub numbering: NumberingConfig,
}

impl Raffle {
    /// Formats an amount in this raffle's currency, e.g. `"150.00 MXN"`.
    #[must_use]
    pub fn format_amount(&self, cents: i64) -> String {
        format_amount(cents, &self.currency)
    }
}

/// Formats an amount in the smallest currency unit, e.g. `"150.00 MXN"`.
#[must_use]
pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

/// Subscription plan of an organization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Entry plan
    Basic,
    /// Mid plan
    Pro,
    /// Includes Telegram notifications
    Premium,
    /// Includes Telegram notifications
    Enterprise,
}

impl SubscriptionTier {
    /// Database/wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }

    /// Only premium and enterprise organizations may link a Telegram chat.
    #[must_use]
    pub const fn allows_telegram(self) -> bool {
        matches!(self, Self::Premium | Self::Enterprise)
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            "premium" => Ok(Self::Premium),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown subscription tier: {other}")),
        }
    }
}

/// Tenant owning raffles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization ID
    pub id: OrganizationId,
    /// Display name
    pub name: String,
    /// Current plan
    pub subscription_tier: SubscriptionTier,
}

// ============================================================================
// Telegram links
// ============================================================================

/// Notification toggles of an organizer's Telegram chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)] // one flag per toggle, persisted as columns
pub struct OrganizerPreferences {
    /// A buyer reserved tickets
    pub ticket_reserved: bool,
    /// A buyer uploaded a payment proof
    pub payment_proof: bool,
    /// A payment was approved
    pub payment_approved: bool,
    /// A payment was rejected
    pub payment_rejected: bool,
    /// Reservations expired without payment
    pub reservation_expired: bool,
    /// Daily sales digest
    pub daily_summary: bool,
}

impl Default for OrganizerPreferences {
    fn default() -> Self {
        Self {
            ticket_reserved: true,
            payment_proof: true,
            payment_approved: false,
            payment_rejected: false,
            reservation_expired: true,
            daily_summary: false,
        }
    }
}

impl OrganizerPreferences {
    /// Toggle keys as used in `toggle_org_<key>` callbacks, with labels.
    pub const FIELDS: [(&'static str, &'static str); 6] = [
        ("ticket_reserved", "Boletos reservados"),
        ("payment_proof", "Comprobantes de pago"),
        ("payment_approved", "Pagos aprobados"),
        ("payment_rejected", "Pagos rechazados"),
        ("reservation_expired", "Reservas expiradas"),
        ("daily_summary", "Resumen diario"),
    ];

    /// Current value of a toggle.
    #[must_use]
    pub const fn get(&self, key: &str) -> Option<bool> {
        match key.as_bytes() {
            b"ticket_reserved" => Some(self.ticket_reserved),
            b"payment_proof" => Some(self.payment_proof),
            b"payment_approved" => Some(self.payment_approved),
            b"payment_rejected" => Some(self.payment_rejected),
            b"reservation_expired" => Some(self.reservation_expired),
            b"daily_summary" => Some(self.daily_summary),
            _ => None,
        }
    }

    /// Flip a toggle and return its new value; `None` for unknown keys.
    pub fn toggle(&mut self, key: &str) -> Option<bool> {
        let flag = match key {
            "ticket_reserved" => &mut self.ticket_reserved,
            "payment_proof" => &mut self.payment_proof,
            "payment_approved" => &mut self.payment_approved,
            "payment_rejected" => &mut self.payment_rejected,
            "reservation_expired" => &mut self.reservation_expired,
            "daily_summary" => &mut self.daily_summary,
            _ => return None,
        };
        *flag = !*flag;
        Some(*flag)
    }
}

/// Notification toggles of a buyer's Telegram chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuyerPreferences {
    /// Reservation confirmations
    pub reservation: bool,
    /// Payment approved
    pub payment_approved: bool,
    /// Payment rejected
    pub payment_rejected: bool,
    /// Upcoming draw reminders
    pub draw_reminder: bool,
    /// Winner announcement
    pub winner: bool,
}

impl Default for BuyerPreferences {
    fn default() -> Self {
        Self {
            reservation: true,
            payment_approved: true,
            payment_rejected: true,
            draw_reminder: true,
            winner: true,
        }
    }
}

impl BuyerPreferences {
    /// Toggle keys as used in `toggle_buyer_<key>` callbacks, with labels.
    pub const FIELDS: [(&'static str, &'static str); 5] = [
        ("reservation", "Confirmación de reserva"),
        ("payment_approved", "Pago aprobado"),
        ("payment_rejected", "Pago rechazado"),
        ("draw_reminder", "Recordatorio del sorteo"),
        ("winner", "Resultados del sorteo"),
    ];

    /// Current value of a toggle.
    #[must_use]
    pub const fn get(&self, key: &str) -> Option<bool> {
        match key.as_bytes() {
            b"reservation" => Some(self.reservation),
            b"payment_approved" => Some(self.payment_approved),
            b"payment_rejected" => Some(self.payment_rejected),
            b"draw_reminder" => Some(self.draw_reminder),
            b"winner" => Some(self.winner),
            _ => None,
        }
    }

    /// Flip a toggle and return its new value; `None` for unknown keys.
    pub fn toggle(&mut self, key: &str) -> Option<bool> {
        let flag = match key {
            "reservation" => &mut self.reservation,
            "payment_approved" => &mut self.payment_approved,
            "payment_rejected" => &mut self.payment_rejected,
            "draw_reminder" => &mut self.draw_reminder,
            "winner" => &mut self.winner,
            _ => return None,
        };
        *flag = !*flag;
        Some(*flag)
    }
}

/// Link between an organization and a Telegram chat (`telegram_connections`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConnection {
    /// Organization owning the link
    pub organization_id: OrganizationId,
    /// One-time code shown in the dashboard, consumed by `/vincular`
    pub link_code: Option<String>,
    /// Code expiry
    pub link_code_expires_at: Option<DateTime<Utc>>,
    /// Linked chat
    pub chat_id: Option<i64>,
    /// When the chat was linked
    pub verified_at: Option<DateTime<Utc>>,
    /// Toggles
    pub preferences: OrganizerPreferences,
}

impl TelegramConnection {
    /// A pending connection waiting for `/vincular <code>`.
    #[must_use]
    pub fn pending(
        organization_id: OrganizationId,
        code: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            organization_id,
            link_code: Some(code.into()),
            link_code_expires_at: Some(expires_at),
            chat_id: None,
            verified_at: None,
            preferences: OrganizerPreferences::default(),
        }
    }

    /// Linked and verified
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.chat_id.is_some() && self.verified_at.is_some()
    }
}

/// Link between a buyer email and a Telegram chat (`telegram_buyer_links`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramBuyerLink {
    /// Buyer email the link belongs to
    pub buyer_email: String,
    /// One-time code consumed by `/start buyer_<code>`
    pub link_code: Option<String>,
    /// Linked chat
    pub chat_id: Option<i64>,
    /// When the chat was linked
    pub verified_at: Option<DateTime<Utc>>,
    /// Toggles
    pub preferences: BuyerPreferences,
}

// ============================================================================
// Dashboard notifications
// ============================================================================

/// In-app notification shown in the organizer dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID
    pub id: NotificationId,
    /// Recipient user
    pub user_id: Uuid,
    /// Organization context
    pub organization_id: Option<OrganizationId>,
    /// Title
    pub title: String,
    /// Body
    pub message: String,
    /// Whether the user has read it
    pub read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_status_round_trips_through_str() {
        for status in [
            TicketStatus::Available,
            TicketStatus::Reserved,
            TicketStatus::Sold,
            TicketStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert!("cancelled".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn only_premium_tiers_allow_telegram() {
        assert!(!SubscriptionTier::Basic.allows_telegram());
        assert!(!SubscriptionTier::Pro.allows_telegram());
        assert!(SubscriptionTier::Premium.allows_telegram());
        assert!(SubscriptionTier::Enterprise.allows_telegram());
    }

    #[test]
    fn clear_buyer_keeps_number_and_status() {
        let mut ticket = Ticket::available(RaffleId::new(), "007");
        ticket.buyer_name = Some("Ana".into());
        ticket.buyer_email = Some("ana@example.com".into());
        ticket.payment_reference = Some("REF".into());
        ticket.reserved_until = Some(Utc::now());
        ticket.clear_buyer();
        assert_eq!(ticket.ticket_number, "007");
        assert!(ticket.buyer_email.is_none());
        assert!(ticket.payment_reference.is_none());
        assert!(ticket.reserved_until.is_none());
    }

    #[test]
    fn preference_toggle_flips_value() {
        let mut prefs = OrganizerPreferences::default();
        assert_eq!(prefs.toggle("daily_summary"), Some(true));
        assert_eq!(prefs.get("daily_summary"), Some(true));
        assert_eq!(prefs.toggle("nope"), None);

        let mut buyer = BuyerPreferences::default();
        assert_eq!(buyer.toggle("winner"), Some(false));
    }

    #[test]
    fn amounts_format_with_two_decimals() {
        assert_eq!(format_amount(15_000, "MXN"), "150.00 MXN");
        assert_eq!(format_amount(5, "USD"), "0.05 USD");
    }
}
