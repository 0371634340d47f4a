//! Fire-and-forget notifications.
//!
//! Services hand a [`Notification`] to [`dispatch`], which sends it on a
//! spawned task. Delivery failures are logged and never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    AssignmentReceived {
        assignment_id: Uuid,
        owner_id: Uuid,
        title: String,
        total_cost: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    PaymentProofReceived {
        transaction_id: Uuid,
        owner_id: Uuid,
        amount: Decimal,
        method: String,
    },
    #[serde(rename_all = "camelCase")]
    PaymentApproved {
        transaction_id: Uuid,
        owner_id: Uuid,
        new_balance: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    PaymentRejected {
        transaction_id: Uuid,
        owner_id: Uuid,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    AssignmentCompleted {
        assignment_id: Uuid,
        owner_id: Uuid,
        file_count: usize,
    },
}

impl Notification {
    /// Whether the event concerns money movement (billing inbox) rather than
    /// work (tutor inbox).
    pub fn is_billing(&self) -> bool {
        matches!(
            self,
            Self::PaymentProofReceived { .. }
                | Self::PaymentApproved { .. }
                | Self::PaymentRejected { .. }
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()>;
}

/// Send `event` in the background.
pub fn dispatch(notifier: &Arc<dyn Notifier>, event: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            warn!(error = %e, ?event, "Notification delivery failed");
        }
    });
}

/// Routing of events to the configured inboxes.
#[derive(Debug, Clone, Default)]
pub struct Inboxes {
    pub tutor: Option<String>,
    pub billing: Option<String>,
}

impl Inboxes {
    fn for_event(&self, event: &Notification) -> Option<&str> {
        if event.is_billing() {
            self.billing.as_deref()
        } else {
            self.tutor.as_deref()
        }
    }
}

/// Writes events to the log. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier {
    inboxes: Inboxes,
}

impl LogNotifier {
    pub fn new(inboxes: Inboxes) -> Self {
        Self { inboxes }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()> {
        info!(to = ?self.inboxes.for_event(event), ?event, "Notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    to: Option<&'a str>,
    #[serde(flatten)]
    event: &'a Notification,
}

/// POSTs each event as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    inboxes: Inboxes,
}

impl WebhookNotifier {
    pub fn new(url: String, inboxes: Inboxes) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url,
            inboxes,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()> {
        let payload = WebhookPayload {
            to: self.inboxes.for_event(event),
            event,
        };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Pick the notifier the configuration asks for.
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    let inboxes = Inboxes {
        tutor: config.tutor_notify_email.clone(),
        billing: config.billing_notify_email.clone(),
    };
    Ok(match &config.notify_webhook_url {
        Some(url) => {
            info!(%url, "Notifications go to webhook");
            Arc::new(WebhookNotifier::new(url.clone(), inboxes)?)
        }
        None => Arc::new(LogNotifier::new(inboxes)),
    })
}
