//! Email and Telegram notifications.

pub mod email;
pub mod grouping;
pub mod notifier;
pub mod resend;
pub mod templates;

pub use email::{EmailError, EmailMessage, EmailSender, LoggingEmailSender, RecordingEmailSender};
pub use grouping::{group_by_buyer, normalize_email, BuyerGroup};
pub use notifier::{BuyerAlert, NotificationError, Notifier, OrganizerAlert};
pub use resend::ResendEmailSender;
pub use templates::{render, EmailTemplate, TemplateError};
