pub mod assistant;
pub mod cache;
pub mod cli;
pub mod health;
pub mod models;
pub mod notify;
pub mod server;
pub mod store;

use cache::MemoryCache;
use cli::Args;
use health::HealthDataService;
use log::info;
use notify::poller::{AlertPoller, AlertSource};
use notify::twilio::TwilioClient;
use notify::{AlertNotifier, WhatsAppSender};
use server::api::AppState;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use store::SubscriberStore;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("HTTP Port: {}", args.http_port);
    info!("WebSocket Address: {}", args.ws_addr);
    info!("Notify DB Path: {}", args.notify_db_path);
    info!("Alert Poll Interval: {}s", args.alert_poll_secs);
    info!("Twilio Configured: {}", args.twilio_account_sid.is_some()
        && args.twilio_auth_token.is_some()
        && args.twilio_whatsapp_from.is_some());
    info!("Vaccination Source: {}", args.vaccination_source.as_deref().unwrap_or("bundled sample"));
    info!("Alerts Source: {}", args.alerts_source.as_deref().unwrap_or("bundled sample"));
    info!("News Feed: {}", if args.newsapi_key.is_some() { "NewsAPI" } else { "disabled" });
    info!("Assistant Backend: {}", args.assistant_base_url.as_deref().unwrap_or("offline fallback"));
    info!("-------------------------");

    let cache = MemoryCache::new();
    let store = SubscriberStore::open(&args.notify_db_path)?;
    let twilio = TwilioClient::from_args(&args).map(Arc::new);
    if twilio.is_none() {
        info!("Twilio not configured; WhatsApp sending is disabled");
    }

    let health = Arc::new(HealthDataService::from_args(cache.clone(), &args));
    let assistant = assistant::new_client(&args);

    let notifier = AlertNotifier::new(
        store.clone(),
        twilio.clone().map(|t| t as Arc<dyn WhatsAppSender>),
    );
    let poller = AlertPoller::new(
        health.clone() as Arc<dyn AlertSource>,
        notifier,
        Duration::from_secs(args.alert_poll_secs),
    );
    tokio::spawn(poller.run());

    let state = AppState {
        health,
        store,
        twilio,
    };

    let addr = args.ws_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, assistant, args.clone());
    server.run().await?;

    Ok(())
}
