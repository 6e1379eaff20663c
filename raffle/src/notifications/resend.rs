//! Resend HTTP API sender.

use super::email::{EmailError, EmailMessage, EmailSender};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

/// Default Resend API base URL.
pub const RESEND_API_URL: &str = "https://api.resend.com";

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Sends email through `POST /emails` on the Resend API.
#[derive(Clone)]
pub struct ResendEmailSender {
    client: Client,
    api_key: String,
    api_url: String,
    from: String,
}

impl std::fmt::Debug for ResendEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendEmailSender")
            .field("api_url", &self.api_url)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl ResendEmailSender {
    /// Create a sender with an explicit API key and sender address
    #[must_use]
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: RESEND_API_URL.to_string(),
            from,
        }
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let request = SendEmailRequest {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmailError::RequestFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(EmailError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(EmailError::Provider {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }
}
