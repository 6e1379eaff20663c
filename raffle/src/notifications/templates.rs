//! Transactional email templates.
//!
//! Templates are addressed by name (the `send-email` function receives the
//! name and a JSON data object) and render to a subject and an HTML body.
//! Every value taken from `data` is HTML-escaped before interpolation.

use super::email::EmailMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

/// Available templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    /// Payment approved; lists the buyer's ticket numbers
    TicketsApproved,
    /// Payment rejected; tickets released
    TicketsRejected,
    /// Tickets held pending payment
    ReservationConfirmation,
    /// Organizer received the buyer's payment proof
    PaymentProofReceived,
    /// Invitation to join an organization's team
    TeamInvitation,
}

impl EmailTemplate {
    /// Every template.
    pub const ALL: [Self; 5] = [
        Self::TicketsApproved,
        Self::TicketsRejected,
        Self::ReservationConfirmation,
        Self::PaymentProofReceived,
        Self::TeamInvitation,
    ];

    /// Template name as used by callers
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TicketsApproved => "tickets_approved",
            Self::TicketsRejected => "tickets_rejected",
            Self::ReservationConfirmation => "reservation_confirmation",
            Self::PaymentProofReceived => "payment_proof_received",
            Self::TeamInvitation => "team_invitation",
        }
    }

    /// Keys that must be present in `data`.
    #[must_use]
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::TicketsApproved | Self::TicketsRejected => {
                &["buyer_name", "raffle_title", "ticket_numbers"]
            },
            Self::ReservationConfirmation => &[
                "buyer_name",
                "raffle_title",
                "ticket_numbers",
                "payment_reference",
                "reserved_until",
            ],
            Self::PaymentProofReceived => &["buyer_name", "raffle_title", "payment_reference"],
            Self::TeamInvitation => &["organization_name", "inviter_name", "invite_url", "role"],
        }
    }
}

impl FromStr for EmailTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| TemplateError::UnknownTemplate(s.to_string()))
    }
}

/// Rendering failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// No template with that name
    #[error("Unknown email template: {0}")]
    UnknownTemplate(String),

    /// `data` lacks a required key
    #[error("Template {template} requires field '{field}'")]
    MissingField {
        /// Template name
        template: &'static str,
        /// Missing key
        field: &'static str,
    },

    /// A key has the wrong JSON type
    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        /// Offending key
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },
}

/// Escape text for interpolation into HTML.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Typed view over the JSON `data` object.
struct Fields<'a> {
    template: EmailTemplate,
    data: &'a Value,
}

impl<'a> Fields<'a> {
    fn new(template: EmailTemplate, data: &'a Value) -> Result<Self, TemplateError> {
        if !data.is_object() {
            return Err(TemplateError::InvalidField {
                field: "data",
                expected: "an object",
            });
        }
        for &field in template.required_fields() {
            if data.get(field).is_none_or(Value::is_null) {
                return Err(TemplateError::MissingField {
                    template: template.name(),
                    field,
                });
            }
        }
        Ok(Self { template, data })
    }

    /// Raw text of a field (numbers are accepted and stringified).
    fn raw(&self, field: &'static str) -> Result<Option<String>, TemplateError> {
        match self.data.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(TemplateError::InvalidField {
                field,
                expected: "a string",
            }),
        }
    }

    fn text(&self, field: &'static str) -> Result<String, TemplateError> {
        self.raw(field)?
            .map(|s| escape_html(&s))
            .ok_or(TemplateError::MissingField {
                template: self.template.name(),
                field,
            })
    }

    fn optional(&self, field: &'static str) -> Result<Option<String>, TemplateError> {
        Ok(self.raw(field)?.map(|s| escape_html(&s)))
    }

    fn list(&self, field: &'static str) -> Result<Vec<String>, TemplateError> {
        let invalid = TemplateError::InvalidField {
            field,
            expected: "an array of strings",
        };
        let Some(Value::Array(items)) = self.data.get(field) else {
            return Err(invalid);
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(escape_html(s)),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(invalid.clone()),
            })
            .collect()
    }
}

fn layout(heading: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,sans-serif;color:#1f2937\">\
         <div style=\"max-width:600px;margin:0 auto;padding:24px\">\
         <h1 style=\"font-size:22px\">{heading}</h1>{body}\
         <p style=\"color:#6b7280;font-size:12px\">Este correo fue enviado automáticamente, \
         por favor no respondas.</p></div></body></html>"
    )
}

fn ticket_list(numbers: &[String]) -> String {
    let mut html = String::from("<ul>");
    for number in numbers {
        let _ = write!(html, "<li><strong>{number}</strong></li>");
    }
    html.push_str("</ul>");
    html
}

/// Subjects are plain text; keep them on one line.
fn subject_line(subject: &str) -> String {
    subject.replace(['\r', '\n'], " ")
}

/// Render a template for `to` with the given data.
///
/// # Errors
///
/// Returns [`TemplateError`] if a required field is missing or has the
/// wrong type.
pub fn render(
    template: EmailTemplate,
    to: &str,
    data: &Value,
) -> Result<EmailMessage, TemplateError> {
    let fields = Fields::new(template, data)?;

    let (subject, html) = match template {
        EmailTemplate::TicketsApproved => {
            let name = fields.text("buyer_name")?;
            let raffle = fields.text("raffle_title")?;
            let numbers = fields.list("ticket_numbers")?;
            let mut body = format!(
                "<p>Hola {name},</p><p>Tu pago para <strong>{raffle}</strong> fue aprobado. \
                 Estos son tus boletos:</p>{}",
                ticket_list(&numbers)
            );
            if let Some(draw_date) = fields.optional("draw_date")? {
                let _ = write!(body, "<p>El sorteo se realizará el {draw_date}.</p>");
            }
            (
                format!("¡Tus boletos para {} están confirmados!", raw_or(&fields, "raffle_title")),
                layout("¡Pago aprobado!", &body),
            )
        },
        EmailTemplate::TicketsRejected => {
            let name = fields.text("buyer_name")?;
            let raffle = fields.text("raffle_title")?;
            let numbers = fields.list("ticket_numbers")?;
            let mut body = format!(
                "<p>Hola {name},</p><p>No pudimos verificar tu pago para \
                 <strong>{raffle}</strong>. Los siguientes boletos fueron liberados:</p>{}",
                ticket_list(&numbers)
            );
            if let Some(reason) = fields.optional("reason")? {
                let _ = write!(body, "<p>Motivo: {reason}</p>");
            }
            body.push_str("<p>Si crees que es un error, contacta al organizador.</p>");
            (
                format!("Tu pago para {} no fue aprobado", raw_or(&fields, "raffle_title")),
                layout("Pago rechazado", &body),
            )
        },
        EmailTemplate::ReservationConfirmation => {
            let name = fields.text("buyer_name")?;
            let raffle = fields.text("raffle_title")?;
            let numbers = fields.list("ticket_numbers")?;
            let reference = fields.text("payment_reference")?;
            let until = fields.text("reserved_until")?;
            let mut body = format!(
                "<p>Hola {name},</p><p>Apartaste los siguientes boletos de \
                 <strong>{raffle}</strong>:</p>{}\
                 <p>Referencia de pago: <strong>{reference}</strong></p>\
                 <p>Tu reserva vence el {until}. Sube tu comprobante antes de esa hora.</p>",
                ticket_list(&numbers)
            );
            if let Some(amount) = fields.optional("amount")? {
                let _ = write!(body, "<p>Total a pagar: <strong>{amount}</strong></p>");
            }
            (
                format!("Reserva confirmada: {}", raw_or(&fields, "raffle_title")),
                layout("Boletos apartados", &body),
            )
        },
        EmailTemplate::PaymentProofReceived => {
            let name = fields.text("buyer_name")?;
            let raffle = fields.text("raffle_title")?;
            let reference = fields.text("payment_reference")?;
            let body = format!(
                "<p>Hola {name},</p><p>Recibimos tu comprobante de pago para \
                 <strong>{raffle}</strong> (referencia <strong>{reference}</strong>). \
                 El organizador lo revisará pronto.</p>"
            );
            (
                format!("Comprobante recibido: {}", raw_or(&fields, "raffle_title")),
                layout("Comprobante recibido", &body),
            )
        },
        EmailTemplate::TeamInvitation => {
            let organization = fields.text("organization_name")?;
            let inviter = fields.text("inviter_name")?;
            let url = fields.text("invite_url")?;
            let role = fields.text("role")?;
            let body = format!(
                "<p>{inviter} te invitó a unirte a <strong>{organization}</strong> \
                 con el rol <strong>{role}</strong>.</p>\
                 <p><a href=\"{url}\">Aceptar invitación</a></p>"
            );
            (
                format!("Invitación para unirte a {}", raw_or(&fields, "organization_name")),
                layout("Invitación al equipo", &body),
            )
        },
    };

    Ok(EmailMessage {
        to: to.to_string(),
        subject: subject_line(&subject),
        html,
    })
}

/// Unescaped field text for subjects, which are not HTML.
fn raw_or(fields: &Fields<'_>, field: &'static str) -> String {
    fields.raw(field).ok().flatten().unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_template_names() {
        for template in EmailTemplate::ALL {
            assert_eq!(template.name().parse::<EmailTemplate>(), Ok(template));
        }
        assert_eq!(
            "welcome".parse::<EmailTemplate>(),
            Err(TemplateError::UnknownTemplate("welcome".into()))
        );
    }

    #[test]
    fn approved_email_lists_ticket_numbers() {
        let message = render(
            EmailTemplate::TicketsApproved,
            "ana@example.com",
            &json!({
                "buyer_name": "Ana",
                "raffle_title": "Gran Rifa",
                "ticket_numbers": ["001", "002"]
            }),
        )
        .unwrap();

        assert_eq!(message.to, "ana@example.com");
        assert_eq!(message.subject, "¡Tus boletos para Gran Rifa están confirmados!");
        assert!(message.html.contains("<strong>001</strong>"));
        assert!(message.html.contains("<strong>002</strong>"));
    }

    #[test]
    fn user_values_are_escaped() {
        let message = render(
            EmailTemplate::TicketsRejected,
            "x@example.com",
            &json!({
                "buyer_name": "<script>alert(1)</script>",
                "raffle_title": "R&D",
                "ticket_numbers": ["<b>1</b>"],
                "reason": "\"bad\""
            }),
        )
        .unwrap();

        assert!(!message.html.contains("<script>"));
        assert!(message.html.contains("&lt;script&gt;"));
        assert!(message.html.contains("R&amp;D"));
        assert!(message.html.contains("&lt;b&gt;1&lt;/b&gt;"));
        assert!(message.html.contains("&quot;bad&quot;"));
        assert_eq!(message.subject, "Tu pago para R&D no fue aprobado");
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = render(
            EmailTemplate::TeamInvitation,
            "x@example.com",
            &json!({ "organization_name": "Org", "inviter_name": "Luis", "role": "admin" }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingField {
                template: "team_invitation",
                field: "invite_url"
            }
        );
    }

    #[test]
    fn ticket_numbers_must_be_an_array() {
        let err = render(
            EmailTemplate::TicketsApproved,
            "x@example.com",
            &json!({ "buyer_name": "A", "raffle_title": "R", "ticket_numbers": "001" }),
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidField { field: "ticket_numbers", .. }));
    }

    #[test]
    fn subject_is_single_line() {
        let message = render(
            EmailTemplate::PaymentProofReceived,
            "x@example.com",
            &json!({ "buyer_name": "A", "raffle_title": "Rifa\nNueva", "payment_reference": "R1" }),
        )
        .unwrap();
        assert_eq!(message.subject, "Comprobante recibido: Rifa Nueva");
    }
}
