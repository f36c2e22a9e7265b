//! Outgoing email through an HTTP relay.
//!
//! Messages are posted as JSON (`{to, subject, html, from, headers}`) to a
//! configured endpoint; any non-2xx answer is a failure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Sender used when none is configured.
pub const DEFAULT_FROM: &str = "no-reply@example.com";

const UNSUBSCRIBE: &str = "<mailto:unsubscribe@example.com>";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Loose address check: something, `@`, something with a dot, no spaces.
pub fn validate_email_format(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Request body understood by the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub from: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("no email endpoint configured")]
    NotConfigured,

    #[error("email transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email relay answered HTTP {0}")]
    Rejected(u16),
}

/// Client for the email relay.
#[derive(Debug, Clone)]
pub struct Mailer {
    client: reqwest::Client,
    endpoint: Option<String>,
    from: String,
}

impl Mailer {
    pub fn new(endpoint: Option<String>, from: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            from: from.unwrap_or_else(|| DEFAULT_FROM.to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn message(&self, to: &str, subject: &str, html: &str) -> EmailMessage {
        let mut headers = BTreeMap::new();
        headers.insert("Reply-To".to_string(), self.from.clone());
        headers.insert("List-Unsubscribe".to_string(), UNSUBSCRIBE.to_string());

        EmailMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
            from: self.from.clone(),
            headers,
        }
    }

    /// Post one email to the relay.
    pub async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let endpoint = self.endpoint.as_deref().ok_or(MailError::NotConfigured)?;
        let message = self.message(to, subject, html);

        let response = self.client.post(endpoint).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected(status.as_u16()));
        }

        tracing::debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

/// Escape text for inclusion in an HTML body.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
