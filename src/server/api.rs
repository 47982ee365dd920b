use crate::cli::Args;
use crate::health::HealthDataService;
use crate::notify::twilio::TwilioClient;
use crate::notify::NotifyError;
use crate::store::SubscriberStore;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{delete, get, post},
    Router,
    extract::{Path, State},
    response::IntoResponse,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use log::{info, error};

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub to: Option<String>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub phone: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthDataService>,
    pub store: SubscriberStore,
    pub twilio: Option<Arc<TwilioClient>>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/whatsapp/send", post(send_whatsapp_handler))
        .route("/api/health/vaccination", get(vaccination_handler))
        .route("/api/health/alerts", get(alerts_handler))
        .route("/api/health/news", get(news_handler))
        .route("/api/health/india/latest", get(india_latest_handler))
        .route("/api/health/news/latest", get(news_latest_handler))
        .route("/api/notify/subscribe", post(subscribe_handler))
        .route("/api/notify/subscribers", get(list_subscribers_handler))
        .route("/api/notify/subscribers/{id}", delete(remove_subscriber_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    http_port: u16,
    state: AppState,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(state);

    if args.enable_tls && args.tls_cert_path.is_some() && args.tls_key_path.is_some() {
        let cert_path = args.tls_cert_path.as_ref().unwrap();
        let key_path = args.tls_key_path.as_ref().unwrap();

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS server started with TLS enabled");
    } else {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        error!("HTTP server error: {}", e);
                    }
                },
                Err(e) => {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                }
            }
        });

        info!("HTTP server started");
    }

    Ok(())
}

pub async fn send_whatsapp_handler(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let (to, message) = match (req.to, req.message) {
        (Some(to), Some(message)) if !to.is_empty() && !message.is_empty() => (to, message),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "to and message are required" })),
            )
                .into_response();
        }
    };

    let twilio = match &state.twilio {
        Some(twilio) => twilio,
        None => {
            return (
                StatusCode::NOT_IMPLEMENTED,
                Json(json!({ "error": "Twilio not configured on server" })),
            )
                .into_response();
        }
    };

    match twilio.send_whatsapp(&to, &message).await {
        Ok(sid) => Json(json!({ "success": true, "sid": sid })).into_response(),
        Err(NotifyError::Api { status, body }) => {
            error!("Twilio rejected send to {}: {} {}", to, status, body);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Twilio API error", "detail": body })),
            )
                .into_response()
        }
        Err(e) => {
            error!("WhatsApp send to {} failed: {}", to, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn vaccination_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.health.vaccination().await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => {
            error!("Vaccination fetch failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn alerts_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.health.alerts().await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => {
            error!("Alerts fetch failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn news_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.health.news().await {
        Ok(articles) => Json(articles).into_response(),
        Err(e) => {
            error!("News fetch failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn india_latest_handler() -> impl IntoResponse {
    Json(json!({
        "message": "Proxy not implemented. Configure VITE_HEALTH_API_URL or implement proxy."
    }))
}

pub async fn news_latest_handler() -> impl IntoResponse {
    Json(json!([]))
}

pub async fn subscribe_handler(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> impl IntoResponse {
    let phone = match req.phone {
        Some(phone) if !phone.is_empty() => phone,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "phone required" })),
            )
                .into_response();
        }
    };

    match state.store.upsert(&phone, &req.keywords).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => {
            error!("Subscribe failed for {}: {}", phone, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn list_subscribers_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list().await {
        Ok(subscribers) => Json(subscribers).into_response(),
        Err(e) => {
            error!("Subscriber listing failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn remove_subscriber_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.remove_by_id(id).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => {
            error!("Subscriber removal failed for {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
