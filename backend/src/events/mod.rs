//! Best-effort login notifications
//!
//! Delivery is at-most-once. Notifications run on a detached task that is
//! not tied to the request that triggered them: the caller never waits for
//! delivery and never sees its failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::CollectionIntentContext;

/// Emitted after a successful SIWE login
#[derive(Debug, Clone, Serialize)]
pub struct LoginEvent {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub address: String,
    pub chain_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub collection_intent_context: Option<CollectionIntentContext>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("No subscribers")]
    NoSubscribers,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Delivery(e.to_string())
    }
}

#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn publish_logged_in(&self, event: &LoginEvent) -> Result<(), NotifyError>;
}

/// Hand a login event to `notifier` on a detached task.
///
/// The returned handle is only useful to tests; production callers drop it.
pub fn spawn_login_notification(
    notifier: Arc<dyn EventNotifier>,
    event: LoginEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.publish_logged_in(&event).await {
            Ok(()) => tracing::debug!(
                user_id = %event.user_id,
                session_id = %event.session_id,
                "Login event published"
            ),
            Err(e) => tracing::warn!(
                user_id = %event.user_id,
                session_id = %event.session_id,
                error = %e,
                "Login event dropped"
            ),
        }
    })
}

/// Discards every event
#[derive(Debug, Default, Clone)]
pub struct NoopNotifier;

#[async_trait]
impl EventNotifier for NoopNotifier {
    async fn publish_logged_in(&self, _event: &LoginEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// In-process fan-out to any number of subscribers
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<LoginEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventNotifier for BroadcastNotifier {
    async fn publish_logged_in(&self, event: &LoginEvent) -> Result<(), NotifyError> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers)
    }
}

/// POSTs login events as JSON to a webhook endpoint
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: String, secret: Option<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, url, secret })
    }
}

#[async_trait]
impl EventNotifier for WebhookNotifier {
    async fn publish_logged_in(&self, event: &LoginEvent) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(&serde_json::json!({
            "type": "user.logged_in",
            "data": event,
        }));
        if let Some(secret) = &self.secret {
            request = request.header("X-Webhook-Secret", secret);
        }

        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    #[async_trait]
    impl EventNotifier for FailingNotifier {
        async fn publish_logged_in(&self, _event: &LoginEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("bus down".to_string()))
        }
    }

    fn event() -> LoginEvent {
        LoginEvent {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            address: "0x1111111111111111111111111111111111111111".to_string(),
            chain_id: "eip155:1".to_string(),
            ip_address: None,
            user_agent: None,
            collection_intent_context: None,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let notifier = Arc::new(BroadcastNotifier::new(8));
        let mut rx = notifier.subscribe();
        let sent = event();

        spawn_login_notification(notifier, sent.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.session_id, sent.session_id);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_errors() {
        let notifier = BroadcastNotifier::new(8);
        let result = notifier.publish_logged_in(&event()).await;
        assert!(matches!(result, Err(NotifyError::NoSubscribers)));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_swallowed() {
        let handle = spawn_login_notification(Arc::new(FailingNotifier), event());
        // The detached task completes normally even though delivery failed
        assert!(handle.await.is_ok());
    }
}
