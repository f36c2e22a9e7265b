//! Waitlist sign-up handler.

use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use gitdoc_store::DocStore;
use serde::{Deserialize, Serialize};

use crate::mailer::{escape_html, validate_email_format, Mailer};
use crate::waitlist::{normalize_email, NewSubscriber, DEFAULT_SOURCE, WAITLIST};

/// Request body for POST /waitlist.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub email: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Response body for POST /waitlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
}

/// How a sign-up attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    InvalidEmail,
    AlreadySubscribed,
    Failed,
}

impl SubscribeOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            SubscribeOutcome::Subscribed => StatusCode::CREATED,
            SubscribeOutcome::InvalidEmail => StatusCode::BAD_REQUEST,
            SubscribeOutcome::AlreadySubscribed => StatusCode::CONFLICT,
            SubscribeOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            SubscribeOutcome::Subscribed => "Successfully subscribed to waitlist!",
            SubscribeOutcome::InvalidEmail => "Please enter a valid email address.",
            SubscribeOutcome::AlreadySubscribed => {
                "This email is already subscribed to our waitlist."
            }
            SubscribeOutcome::Failed => "An error occurred. Please try again later.",
        }
    }

    pub fn response(self) -> SubscribeResponse {
        SubscribeResponse {
            success: self == SubscribeOutcome::Subscribed,
            message: self.message().to_string(),
        }
    }
}

/// Add an address to the waitlist and notify the admin.
///
/// The notification is best effort: a failed send is logged and the
/// sign-up still succeeds.
pub async fn handle_subscribe(
    store: &DocStore,
    mailer: &Mailer,
    admin_email: Option<&str>,
    request: SubscribeRequest,
) -> SubscribeOutcome {
    let email = normalize_email(&request.email);
    if !validate_email_format(&email) {
        return SubscribeOutcome::InvalidEmail;
    }

    let needle = email.clone();
    let existing = store
        .query(WAITLIST, move |q| {
            q.filter(move |r| {
                r.get("email")
                    .and_then(|v| v.as_str())
                    .is_some_and(|e| normalize_email(e) == needle)
            })
            .count()
        })
        .await;

    match existing {
        Ok(0) => {}
        Ok(_) => return SubscribeOutcome::AlreadySubscribed,
        Err(e) => {
            tracing::error!(error = %e, "failed to read waitlist");
            return SubscribeOutcome::Failed;
        }
    }

    let subscriber = NewSubscriber {
        email,
        subscribed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ip_address: request.ip_address,
        user_agent: request.user_agent,
        source: DEFAULT_SOURCE.to_string(),
    };

    if let Err(e) = store.insert(WAITLIST, &subscriber).await {
        tracing::error!(error = %e, email = %subscriber.email, "failed to add subscriber");
        return SubscribeOutcome::Failed;
    }

    tracing::info!(email = %subscriber.email, "new waitlist subscriber");
    notify_admin(mailer, admin_email, &subscriber).await;

    SubscribeOutcome::Subscribed
}

async fn notify_admin(mailer: &Mailer, admin_email: Option<&str>, subscriber: &NewSubscriber) {
    let Some(admin) = admin_email else {
        return;
    };
    if !mailer.is_configured() {
        return;
    }

    let html = notification_html(subscriber);
    if let Err(e) = mailer
        .send_email(admin, "New Waitlist Subscription", &html)
        .await
    {
        tracing::warn!(error = %e, "failed to send subscription notification");
    }
}

fn notification_html(subscriber: &NewSubscriber) -> String {
    let optional = |v: &Option<String>| escape_html(v.as_deref().unwrap_or("unknown"));
    format!(
        "<h2>New Waitlist Subscription</h2>\
         <p><strong>Email:</strong> {}</p>\
         <p><strong>Subscribed at:</strong> {}</p>\
         <p><strong>User agent:</strong> {}</p>\
         <p><strong>IP address:</strong> {}</p>",
        escape_html(&subscriber.email),
        escape_html(&subscriber.subscribed_at),
        optional(&subscriber.user_agent),
        optional(&subscriber.ip_address),
    )
}
