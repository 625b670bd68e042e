//! EventHub server binary.
//!
//! Runtime knobs come from flags or their environment variables;
//! integration credentials are read from the environment only (see
//! `config.rs`).

use clap::Parser;

use eventhub_server::config::{IntegrationConfig, ServerConfig};
use eventhub_server::state::AppState;
use eventhub_server::{router, workers};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "eventhub-server", version, about = "EventHub API server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "PORT")]
    port: u16,

    /// SQLite database file
    #[arg(long, default_value = "eventhub.db", env = "DATABASE_PATH")]
    database_path: String,

    /// God-mode e-mail addresses (comma-separated)
    #[arg(long, default_value = "", env = "ADMIN_EMAILS")]
    admin_emails: String,

    /// Origin of the web app, used for redirects and mailed links
    #[arg(long, default_value = "http://localhost:3000", env = "PUBLIC_BASE_URL")]
    public_base_url: String,

    /// Hosts allowed for uploaded photos (comma-separated)
    #[arg(long, env = "ALLOWED_ASSET_HOSTS", value_delimiter = ',', default_values_t = default_asset_hosts())]
    allowed_asset_hosts: Vec<String>,

    /// Badge requests per user per window
    #[arg(long, default_value_t = 1, env = "BADGE_RATE_LIMIT")]
    badge_rate_limit: usize,

    /// Gift card requests per user per window
    #[arg(long, default_value_t = 3, env = "GIFT_RATE_LIMIT")]
    gift_rate_limit: usize,

    /// Rate limit window in seconds
    #[arg(long, default_value_t = 3600, env = "RATE_LIMIT_WINDOW_SECS")]
    rate_limit_window_secs: i64,

    /// Pending or generating records older than this are failed
    #[arg(long, default_value_t = eventhub_core::generation::DEFAULT_GENERATION_TIMEOUT_SECS, env = "GENERATION_TIMEOUT_SECS")]
    generation_timeout_secs: i64,

    /// Outbox redispatch interval in seconds
    #[arg(long, default_value_t = 30, env = "OUTBOX_INTERVAL_SECS")]
    outbox_interval_secs: u64,

    /// Generation expiry sweep interval in seconds
    #[arg(long, default_value_t = 60, env = "SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: u64,

    /// Orphan host reconciliation interval in seconds (weekly by default)
    #[arg(long, default_value_t = 7 * 24 * 3600, env = "RECONCILE_INTERVAL_SECS")]
    reconcile_interval_secs: u64,

    /// Orphan events examined per reconciliation pass
    #[arg(long, default_value_t = eventhub_core::hosts::DEFAULT_RECONCILE_LIMIT, env = "RECONCILE_BATCH")]
    reconcile_batch: usize,

    /// Accept x-user-* identity headers from an authenticating proxy when
    /// IDENTITY_API_URL is not set. Off by default: without either, every
    /// caller is anonymous.
    #[arg(long, env = "TRUST_PROXY_HEADERS")]
    trust_proxy_headers: bool,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn default_asset_hosts() -> Vec<String> {
    eventhub_core::generation::DEFAULT_ASSET_HOSTS
        .iter()
        .map(|h| h.to_string())
        .collect()
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            database_path: self.database_path,
            admin_emails: self.admin_emails,
            public_base_url: self.public_base_url,
            allowed_asset_hosts: self
                .allowed_asset_hosts
                .into_iter()
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            badge_rate_limit: self.badge_rate_limit,
            gift_rate_limit: self.gift_rate_limit,
            rate_limit_window_secs: self.rate_limit_window_secs,
            generation_timeout_secs: self.generation_timeout_secs,
            outbox_interval_secs: self.outbox_interval_secs,
            sweep_interval_secs: self.sweep_interval_secs,
            reconcile_interval_secs: self.reconcile_interval_secs,
            reconcile_batch: self.reconcile_batch,
            trust_proxy_headers: self.trust_proxy_headers,
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "eventhub_server=info,eventhub_core=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = args.into_config();
    let port = config.port;
    tracing::info!(
        database = config.database_path.as_str(),
        public_base_url = config.public_base_url.as_str(),
        asset_hosts = ?config.allowed_asset_hosts,
        "Configuration loaded"
    );

    let (state, luma_inbox) = match AppState::from_config(config, IntegrationConfig::from_env()) {
        Ok(wired) => wired,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize");
            std::process::exit(1);
        }
    };
    if state.perms.god_mode().is_empty() {
        tracing::warn!("ADMIN_EMAILS not set, nobody can moderate events");
    }

    let _workers = workers::spawn_all(&state, luma_inbox);
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("EventHub server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
