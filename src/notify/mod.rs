pub mod poller;
pub mod twilio;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use crate::models::health::HealthAlert;
use crate::store::SubscriberStore;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Twilio API error ({status}): {body}")]
    Api { status: StatusCode, body: String },
}

/// Outbound WhatsApp channel. The production implementation talks to Twilio;
/// tests substitute a recording stub.
#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    /// Sends `body` to `to` and returns the provider message SID.
    async fn send(&self, to: &str, body: &str) -> Result<String, NotifyError>;
}

/// True when the subscriber wants this message. An empty keyword list matches
/// everything; otherwise any keyword appearing in the message
/// (case-insensitive) is a match.
pub fn keywords_match(keywords: &[String], message: &str) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let message = message.to_lowercase();
    keywords.iter().any(|keyword| message.contains(&keyword.to_lowercase()))
}

/// Fans a health alert out to every matching subscriber.
pub struct AlertNotifier {
    store: SubscriberStore,
    sender: Option<Arc<dyn WhatsAppSender>>,
}

impl AlertNotifier {
    pub fn new(store: SubscriberStore, sender: Option<Arc<dyn WhatsAppSender>>) -> Self {
        Self { store, sender }
    }

    /// Sends the alert to each subscriber whose keywords match. A failed send
    /// is logged and the remaining subscribers still get theirs. Returns the
    /// number of successful sends.
    pub async fn notify_subscribers(&self, alert: &HealthAlert) -> usize {
        let message = alert.notification_body();
        let subscribers = match self.store.list().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!("Failed to list subscribers for alert {}: {}", alert.id, e);
                return 0;
            }
        };

        let mut notified = 0;
        for subscriber in subscribers {
            if !keywords_match(&subscriber.keywords, &message) {
                continue;
            }
            match &self.sender {
                Some(sender) => match sender.send(&subscriber.phone, &message).await {
                    Ok(sid) => {
                        info!("Notified {} (sid: {})", subscriber.phone, sid);
                        notified += 1;
                    }
                    Err(e) => {
                        warn!("Failed to notify {}: {}", subscriber.phone, e);
                    }
                },
                None => {
                    info!("Twilio not configured; skipping notification to {}", subscriber.phone);
                }
            }
        }
        notified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl WhatsAppSender for RecordingSender {
        async fn send(&self, to: &str, body: &str) -> Result<String, NotifyError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((to.to_string(), body.to_string()));
            Ok(format!("SM{}", sent.len()))
        }
    }

    struct FailingSender {
        fail_for: String,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WhatsAppSender for FailingSender {
        async fn send(&self, to: &str, _body: &str) -> Result<String, NotifyError> {
            self.attempts.lock().unwrap().push(to.to_string());
            if to == self.fail_for {
                return Err(NotifyError::Api {
                    status: StatusCode::BAD_REQUEST,
                    body: "invalid number".to_string(),
                });
            }
            Ok("SM_ok".to_string())
        }
    }

    fn alert(title: &str) -> HealthAlert {
        HealthAlert {
            id: "a1".to_string(),
            title: title.to_string(),
            date: Some("2025-10-17".to_string()),
            severity: Some("medium".to_string()),
            source: Some("MoHFW".to_string()),
        }
    }

    #[test]
    fn empty_keywords_match_everything() {
        assert!(keywords_match(&[], "Seasonal influenza advisory"));
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let keywords = vec!["dengue".to_string()];
        assert!(keywords_match(&keywords, "Dengue advisory for several districts"));
        assert!(keywords_match(&["ADVISORY".to_string()], "dengue advisory"));
        assert!(!keywords_match(&keywords, "Heat wave warning"));
    }

    #[tokio::test]
    async fn notifies_only_matching_subscribers() {
        let store = SubscriberStore::open_in_memory().unwrap();
        store.upsert("+911111111111", &["dengue".to_string()]).await.unwrap();
        store.upsert("+912222222222", &["malaria".to_string()]).await.unwrap();
        store.upsert("+913333333333", &[]).await.unwrap();

        let sender = RecordingSender::new();
        let notifier = AlertNotifier::new(store, Some(sender.clone()));

        let notified = notifier.notify_subscribers(&alert("Dengue advisory issued")).await;
        assert_eq!(notified, 2);

        let sent = sender.sent.lock().unwrap();
        let recipients: Vec<&str> = sent.iter().map(|(to, _)| to.as_str()).collect();
        assert!(recipients.contains(&"+911111111111"));
        assert!(recipients.contains(&"+913333333333"));
        assert!(!recipients.contains(&"+912222222222"));
        assert!(sent[0].1.contains("Dengue advisory issued - 2025-10-17"));
        assert!(sent[0].1.contains("Source: MoHFW"));
    }

    #[tokio::test]
    async fn send_failure_does_not_stop_fan_out() {
        let store = SubscriberStore::open_in_memory().unwrap();
        store.upsert("+911111111111", &[]).await.unwrap();
        store.upsert("+912222222222", &[]).await.unwrap();

        let sender = Arc::new(FailingSender {
            fail_for: "+912222222222".to_string(),
            attempts: Mutex::new(Vec::new()),
        });
        let notifier = AlertNotifier::new(store, Some(sender.clone()));

        let notified = notifier.notify_subscribers(&alert("Heat wave warning")).await;
        assert_eq!(notified, 1);
        assert_eq!(sender.attempts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_sender_skips_quietly() {
        let store = SubscriberStore::open_in_memory().unwrap();
        store.upsert("+911111111111", &[]).await.unwrap();

        let notifier = AlertNotifier::new(store, None);
        let notified = notifier.notify_subscribers(&alert("Heat wave warning")).await;
        assert_eq!(notified, 0);
    }
}
