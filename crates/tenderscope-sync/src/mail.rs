//! SendGrid mail delivery. Without an API key, messages are logged as a
//! preview instead of being sent.

use serde_json::json;
use thiserror::Error;
use tracing::info;

pub const SENDGRID_URL: &str = "https://api.sendgrid.com";
pub const DEFAULT_FROM: &str = "digest@tenderscope.local";
const SENDER_NAME: &str = "Tender Agent";
const PREVIEW_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail server returned {status}: {body}")]
    Server { status: u16, body: String },
}

impl From<MailError> for tenderscope_core::Error {
    fn from(e: MailError) -> Self {
        Self::Internal(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Previewed,
}

pub struct Mailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    base_url: String,
}

impl Mailer {
    pub fn new(api_key: Option<String>, from: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            from: from.unwrap_or_else(|| DEFAULT_FROM.to_string()),
            base_url: SENDGRID_URL.to_string(),
        }
    }

    /// Point at a different SendGrid-compatible host.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn is_live(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<Delivery, MailError> {
        let Some(key) = &self.api_key else {
            let preview: String = html.chars().take(PREVIEW_CHARS).collect();
            info!(to, subject, html = %preview, "mail preview (no SendGrid key)");
            return Ok(Delivery::Previewed);
        };

        let url = format!("{}/v3/mail/send", self.base_url);
        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from, "name": SENDER_NAME },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html }],
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Server {
                status: status.as_u16(),
                body,
            });
        }
        info!(to, subject, "mail sent");
        Ok(Delivery::Sent)
    }
}
