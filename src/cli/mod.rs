use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Port for the REST API server.
    #[arg(long, env = "PORT", default_value = "3001")]
    pub http_port: u16,

    /// Host address and port for the WebSocket chat server to listen on.
    #[arg(long, env = "WS_ADDR", default_value = "127.0.0.1:5000")]
    pub ws_addr: String,

    // --- Notification Args ---
    /// Path of the SQLite database holding alert subscribers.
    #[arg(long, env = "NOTIFY_DB_PATH", default_value = "notify.sqlite")]
    pub notify_db_path: String,

    /// Interval in seconds between health alert polls.
    #[arg(long, env = "ALERT_POLL_SECS", default_value = "60")]
    pub alert_poll_secs: u64,

    // --- Twilio Args ---
    /// Twilio account SID. WhatsApp sending stays disabled unless all three Twilio values are set.
    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token.
    #[arg(long, env = "TWILIO_AUTH_TOKEN")]
    pub twilio_auth_token: Option<String>,

    /// WhatsApp-enabled sender number (e.g., whatsapp:+14155238886).
    #[arg(long, env = "TWILIO_WHATSAPP_FROM")]
    pub twilio_whatsapp_from: Option<String>,

    // --- Health Source Args ---
    /// Upstream URL for vaccination statistics. A bundled sample is served if not set.
    #[arg(long, env = "HEALTH_VACCINATION_SOURCE")]
    pub vaccination_source: Option<String>,

    /// Upstream URL for health alerts. A bundled sample is served if not set.
    #[arg(long, env = "HEALTH_ALERTS_SOURCE")]
    pub alerts_source: Option<String>,

    /// API key for the NewsAPI health news feed. The feed is empty if not set.
    #[arg(long, env = "NEWSAPI_KEY")]
    pub newsapi_key: Option<String>,

    // --- Assistant Args ---
    /// Base URL of an Ollama-compatible backend for chat replies (e.g., http://localhost:11434).
    /// A static fallback reply is used if not set.
    #[arg(long, env = "ASSISTANT_BASE_URL")]
    pub assistant_base_url: Option<String>,

    /// Model name requested from the assistant backend.
    #[arg(long, env = "ASSISTANT_MODEL", default_value = "llama3")]
    pub assistant_model: String,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
