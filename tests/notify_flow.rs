use async_trait::async_trait;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arogya_server::models::health::HealthAlert;
use arogya_server::notify::poller::{AlertPoller, AlertSource};
use arogya_server::notify::{AlertNotifier, NotifyError, WhatsAppSender};
use arogya_server::store::SubscriberStore;

/// Returns one scripted batch per poll, then empty batches.
struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<HealthAlert>>>,
}

impl ScriptedSource {
    fn new(batches: Vec<Vec<HealthAlert>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches.into()),
        })
    }
}

#[async_trait]
impl AlertSource for ScriptedSource {
    async fn latest_alerts(&self) -> Result<Vec<HealthAlert>, Box<dyn Error + Send + Sync>> {
        let mut batches = self.batches.lock().unwrap();
        Ok(batches.pop_front().unwrap_or_default())
    }
}

struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(to, _)| to.clone()).collect()
    }
}

#[async_trait]
impl WhatsAppSender for RecordingSender {
    async fn send(&self, to: &str, body: &str) -> Result<String, NotifyError> {
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok("SM_test".to_string())
    }
}

fn alert(id: &str, title: &str) -> HealthAlert {
    HealthAlert {
        id: id.to_string(),
        title: title.to_string(),
        date: Some("2025-10-17".to_string()),
        severity: Some("moderate".to_string()),
        source: Some("MoHFW".to_string()),
    }
}

#[tokio::test]
async fn poll_cycles_filter_by_keyword_and_notify_once() {
    let store = SubscriberStore::open_in_memory().unwrap();
    store.upsert("+911000000001", &["dengue".to_string()]).await.unwrap();
    store.upsert("+911000000002", &["water".to_string()]).await.unwrap();
    store.upsert("+911000000003", &[]).await.unwrap();

    let dengue = alert("a1", "Dengue advisory issued");
    let flood = alert("a2", "Flood water contamination warning");

    let source = ScriptedSource::new(vec![
        vec![dengue.clone()],
        // Second cycle repeats the dengue alert alongside a new one.
        vec![dengue.clone(), flood.clone()],
        vec![dengue, flood],
    ]);
    let sender = RecordingSender::new();
    let notifier = AlertNotifier::new(store, Some(sender.clone()));
    let mut poller = AlertPoller::new(source, notifier, Duration::from_secs(60));

    poller.poll_once().await;
    let first_cycle = sender.recipients();
    assert_eq!(first_cycle.len(), 2);
    assert!(first_cycle.contains(&"+911000000001".to_string()));
    assert!(first_cycle.contains(&"+911000000003".to_string()));

    poller.poll_once().await;
    let recipients = sender.recipients();
    let second_cycle = &recipients[2..];
    assert_eq!(second_cycle.len(), 2);
    assert!(second_cycle.contains(&"+911000000002".to_string()));
    assert!(second_cycle.contains(&"+911000000003".to_string()));
    assert!(!second_cycle.contains(&"+911000000001".to_string()));

    // Third cycle brings nothing new.
    poller.poll_once().await;
    assert_eq!(sender.sent.lock().unwrap().len(), 4);

    let bodies = sender.sent.lock().unwrap();
    assert_eq!(bodies[0].1, "Dengue advisory issued - 2025-10-17\nSource: MoHFW");
}

#[tokio::test]
async fn resubscribing_updates_keywords_for_future_alerts() {
    let store = SubscriberStore::open_in_memory().unwrap();
    store.upsert("+911000000009", &["malaria".to_string()]).await.unwrap();

    let source = ScriptedSource::new(vec![
        vec![alert("d1", "Dengue advisory issued")],
        vec![alert("d2", "Dengue cases rising")],
    ]);
    let sender = RecordingSender::new();
    let notifier = AlertNotifier::new(store.clone(), Some(sender.clone()));
    let mut poller = AlertPoller::new(source, notifier, Duration::from_secs(60));

    poller.poll_once().await;
    assert!(sender.sent.lock().unwrap().is_empty());

    // Same phone, new keywords. The row is replaced, not duplicated.
    store.upsert("+911000000009", &["dengue".to_string()]).await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 1);

    poller.poll_once().await;
    assert_eq!(sender.recipients(), vec!["+911000000009".to_string()]);
}
