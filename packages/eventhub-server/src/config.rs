//! Server configuration.
//!
//! [`ServerConfig`] comes from the command line (with environment
//! fallbacks, see `main.rs`); third-party credentials are read straight from
//! the environment by [`IntegrationConfig::from_env`].

use std::env;

/// Runtime knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: String,
    /// Comma-separated god-mode e-mails
    pub admin_emails: String,
    /// Origin of the web app; redirects and mailed links point here
    pub public_base_url: String,
    pub allowed_asset_hosts: Vec<String>,
    pub badge_rate_limit: usize,
    pub gift_rate_limit: usize,
    pub rate_limit_window_secs: i64,
    pub generation_timeout_secs: i64,
    pub outbox_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub reconcile_batch: usize,
    /// Trust `x-user-*` headers when no identity API is configured
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: "eventhub.db".to_string(),
            admin_emails: String::new(),
            public_base_url: "http://localhost:3000".to_string(),
            allowed_asset_hosts: eventhub_core::generation::DEFAULT_ASSET_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            badge_rate_limit: 1,
            gift_rate_limit: 3,
            rate_limit_window_secs: 3600,
            generation_timeout_secs: eventhub_core::generation::DEFAULT_GENERATION_TIMEOUT_SECS,
            outbox_interval_secs: 30,
            sweep_interval_secs: 60,
            reconcile_interval_secs: 7 * 24 * 3600,
            reconcile_batch: eventhub_core::hosts::DEFAULT_RECONCILE_LIMIT,
            trust_proxy_headers: false,
        }
    }
}

impl ServerConfig {
    /// `PUBLIC_BASE_URL` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }
}

/// Credentials for the services EventHub talks to.
///
/// Every integration is optional; a missing one falls back to a local
/// stand-in (trusted headers, logged jobs, logged mail, 503 for fonts).
#[derive(Debug, Clone, Default)]
pub struct IntegrationConfig {
    /// Identity provider API base URL.
    pub identity_api_url: Option<String>,
    /// Identity provider secret key.
    pub identity_secret_key: Option<String>,

    /// Task system API base URL.
    pub trigger_api_url: Option<String>,
    /// Task system secret key.
    pub trigger_secret_key: Option<String>,
    /// Task id for badge generation.
    pub trigger_badge_task: String,
    /// Task id for gift card generation.
    pub trigger_gift_task: String,

    /// Mail API endpoint.
    pub mail_api_url: Option<String>,
    /// Mail API key.
    pub mail_api_key: Option<String>,
    /// Sender address.
    pub mail_from: String,

    /// Google Fonts developer key.
    pub google_fonts_api_key: Option<String>,

    /// Shared secret the generation worker sends in `x-callback-secret`.
    pub job_callback_secret: Option<String>,
}

impl IntegrationConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            identity_api_url: non_empty("IDENTITY_API_URL"),
            identity_secret_key: non_empty("IDENTITY_SECRET_KEY"),
            trigger_api_url: non_empty("TRIGGER_API_URL"),
            trigger_secret_key: non_empty("TRIGGER_SECRET_KEY"),
            trigger_badge_task: non_empty("TRIGGER_BADGE_TASK").unwrap_or_else(|| "generate-badge".to_string()),
            trigger_gift_task: non_empty("TRIGGER_GIFT_TASK").unwrap_or_else(|| "generate-gift-card".to_string()),
            mail_api_url: non_empty("MAIL_API_URL"),
            mail_api_key: non_empty("MAIL_API_KEY"),
            mail_from: non_empty("MAIL_FROM").unwrap_or_else(|| "EventHub <noreply@eventhub.local>".to_string()),
            google_fonts_api_key: non_empty("GOOGLE_FONTS_API_KEY"),
            job_callback_secret: non_empty("JOB_CALLBACK_SECRET"),
        }
    }

    pub fn fonts_base_url(&self) -> &'static str {
        "https://www.googleapis.com/webfonts/v1/webfonts"
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
