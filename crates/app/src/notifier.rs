use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{info, warn};

use storefront_client::{MailKind, MailRelayClient, RelayMessage};
use storefront_core::{types::Contact, Stored};

/// Best-effort email notifications for contact submissions.
#[derive(Clone)]
pub struct Notifier {
    relay: Option<Arc<RelayTarget>>,
}

struct RelayTarget {
    client: MailRelayClient,
    admin_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Sent,
    Failed,
    Skipped,
}

impl Delivery {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Outcome of each notification sent for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    pub admin: Delivery,
    pub client: Delivery,
}

impl Notifier {
    pub fn new(client: MailRelayClient, admin_email: impl Into<String>) -> Self {
        Self {
            relay: Some(Arc::new(RelayTarget {
                client,
                admin_email: admin_email.into(),
            })),
        }
    }

    pub fn disabled() -> Self {
        Self { relay: None }
    }

    /// Sends the admin notification and the submitter confirmation concurrently.
    pub async fn contact_submitted(&self, contact: &Stored<Contact>, now: DateTime<Utc>) -> NotifyReport {
        let Some(relay) = &self.relay else {
            info!(stage = "mail", contact_id = %contact.id, "mail relay not configured; notifications skipped");
            return NotifyReport {
                admin: Delivery::Skipped,
                client: Delivery::Skipped,
            };
        };

        let admin_message = admin_notification(&relay.admin_email, contact);
        let client_message = client_confirmation(contact);
        let (admin, client) = tokio::join!(
            deliver(&relay.client, &admin_message, contact, now),
            deliver(&relay.client, &client_message, contact, now),
        );
        NotifyReport { admin, client }
    }
}

async fn deliver(
    client: &MailRelayClient,
    message: &RelayMessage,
    contact: &Stored<Contact>,
    now: DateTime<Utc>,
) -> Delivery {
    let delivery = match client.send(message, now).await {
        Ok(()) => {
            info!(stage = "mail", contact_id = %contact.id, kind = message.kind.as_str(), "notification sent");
            Delivery::Sent
        }
        Err(err) => {
            warn!(stage = "mail", contact_id = %contact.id, kind = message.kind.as_str(), error = %err, "notification failed");
            Delivery::Failed
        }
    };
    counter!(
        "mail_relay_total",
        "kind" => message.kind.as_str(),
        "result" => delivery.as_str()
    )
    .increment(1);
    delivery
}

fn admin_notification(admin_email: &str, contact: &Stored<Contact>) -> RelayMessage {
    let body = &contact.body;
    let phone = body.phone.as_deref().unwrap_or("-");
    RelayMessage {
        kind: MailKind::AdminNotification,
        to: admin_email.to_string(),
        subject: format!("New contact message: {}", body.subject),
        text: format!(
            "Name: {}\nEmail: {}\nPhone: {}\nSubject: {}\nReceived: {}\n\n{}\n",
            body.name,
            body.email,
            phone,
            body.subject,
            contact.created_at.to_rfc3339(),
            body.message
        ),
        reply_to: Some(body.email.clone()),
    }
}

fn client_confirmation(contact: &Stored<Contact>) -> RelayMessage {
    let body = &contact.body;
    RelayMessage {
        kind: MailKind::ClientConfirmation,
        to: body.email.clone(),
        subject: "We received your message".to_string(),
        text: format!(
            "Hi {},\n\nThank you for getting in touch. We received your message \"{}\" and will reply as soon as we can.\n",
            body.name, body.subject
        ),
        reply_to: None,
    }
}
