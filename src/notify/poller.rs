use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use super::AlertNotifier;
use crate::models::health::HealthAlert;

/// Anything that can produce the current alert list for polling.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn latest_alerts(&self) -> Result<Vec<HealthAlert>, Box<dyn Error + Send + Sync>>;
}

/// Periodically fetches alerts and pushes unseen ones to subscribers.
///
/// An alert ID is recorded as seen before any send happens, so each alert is
/// delivered at most once per process lifetime even when a send fails.
pub struct AlertPoller {
    source: Arc<dyn AlertSource>,
    notifier: AlertNotifier,
    period: Duration,
    seen: HashSet<String>,
}

impl AlertPoller {
    pub fn new(source: Arc<dyn AlertSource>, notifier: AlertNotifier, period: Duration) -> Self {
        Self {
            source,
            notifier,
            period,
            seen: HashSet::new(),
        }
    }

    /// Runs forever. The first poll happens one full period after startup.
    pub async fn run(mut self) {
        info!("Alert poller started (every {}s)", self.period.as_secs());
        let mut ticker = tokio::time::interval(self.period);
        // interval() fires immediately on the first tick; consume it so the
        // initial poll waits a full period.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// A single poll cycle. Fetch failures are logged and skipped; the seen
    /// set is left untouched so the alerts are retried next cycle.
    pub async fn poll_once(&mut self) {
        let alerts = match self.source.latest_alerts().await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!("Alert poll failed: {}", e);
                return;
            }
        };

        for alert in alerts {
            if self.seen.insert(alert.id.clone()) {
                info!("New alert {}: {}", alert.id, alert.title);
                self.notifier.notify_subscribers(&alert).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotifyError, WhatsAppSender};
    use crate::store::SubscriberStore;
    use std::sync::Mutex;

    struct FixedSource {
        alerts: Vec<HealthAlert>,
    }

    #[async_trait]
    impl AlertSource for FixedSource {
        async fn latest_alerts(&self) -> Result<Vec<HealthAlert>, Box<dyn Error + Send + Sync>> {
            Ok(self.alerts.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl AlertSource for FailingSource {
        async fn latest_alerts(&self) -> Result<Vec<HealthAlert>, Box<dyn Error + Send + Sync>> {
            Err("upstream unreachable".into())
        }
    }

    struct CountingSender {
        sends: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl WhatsAppSender for CountingSender {
        async fn send(&self, to: &str, _body: &str) -> Result<String, NotifyError> {
            self.sends.lock().unwrap().push(to.to_string());
            if self.fail {
                return Err(NotifyError::Api {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "down".to_string(),
                });
            }
            Ok("SM_test".to_string())
        }
    }

    fn alert(id: &str, title: &str) -> HealthAlert {
        HealthAlert {
            id: id.to_string(),
            title: title.to_string(),
            date: Some("2025-10-17".to_string()),
            severity: None,
            source: Some("IDSP".to_string()),
        }
    }

    async fn store_with_subscriber() -> SubscriberStore {
        let store = SubscriberStore::open_in_memory().unwrap();
        store.upsert("+911111111111", &[]).await.unwrap();
        store
    }

    #[tokio::test]
    async fn repeated_polls_notify_once_per_alert() {
        let sender = Arc::new(CountingSender { sends: Mutex::new(Vec::new()), fail: false });
        let notifier = AlertNotifier::new(store_with_subscriber().await, Some(sender.clone()));
        let source = Arc::new(FixedSource { alerts: vec![alert("a1", "Dengue advisory")] });
        let mut poller = AlertPoller::new(source, notifier, Duration::from_secs(60));

        poller.poll_once().await;
        poller.poll_once().await;
        poller.poll_once().await;

        assert_eq!(sender.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_is_not_retried() {
        let sender = Arc::new(CountingSender { sends: Mutex::new(Vec::new()), fail: true });
        let notifier = AlertNotifier::new(store_with_subscriber().await, Some(sender.clone()));
        let source = Arc::new(FixedSource { alerts: vec![alert("a1", "Dengue advisory")] });
        let mut poller = AlertPoller::new(source, notifier, Duration::from_secs(60));

        poller.poll_once().await;
        poller.poll_once().await;

        // The alert was marked seen before the first (failed) send.
        assert_eq!(sender.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_alerts_are_picked_up_alongside_old_ones() {
        let sender = Arc::new(CountingSender { sends: Mutex::new(Vec::new()), fail: false });
        let notifier = AlertNotifier::new(store_with_subscriber().await, Some(sender.clone()));
        let source = Arc::new(FixedSource {
            alerts: vec![alert("a1", "Dengue advisory"), alert("a2", "Heat wave warning")],
        });
        let mut poller = AlertPoller::new(source, notifier, Duration::from_secs(60));

        poller.poll_once().await;
        assert_eq!(sender.sends.lock().unwrap().len(), 2);

        poller.poll_once().await;
        assert_eq!(sender.sends.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn source_failure_leaves_seen_set_unchanged() {
        let sender = Arc::new(CountingSender { sends: Mutex::new(Vec::new()), fail: false });
        let notifier = AlertNotifier::new(store_with_subscriber().await, Some(sender.clone()));
        let mut poller = AlertPoller::new(Arc::new(FailingSource), notifier, Duration::from_secs(60));

        poller.poll_once().await;
        assert!(poller.seen.is_empty());
        assert!(sender.sends.lock().unwrap().is_empty());
    }
}
