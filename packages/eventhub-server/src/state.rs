//! Shared server state.
//!
//! One [`AppState`] is built at startup and cloned into every handler. The
//! core services are cheap clones over the same [`Database`].

use std::sync::Arc;

use tokio::sync::mpsc;

use eventhub_core::claims::ClaimService;
use eventhub_core::community::{CommunityService, Permissions};
use eventhub_core::events::EventService;
use eventhub_core::generation::{AssetPolicy, GenerationService, JobQueue, LocalQueue};
use eventhub_core::hosts::HostResolver;
use eventhub_core::luma::{LumaAccounts, LumaSync, LumaWebhook};
use eventhub_core::mailer::{Links, LogMailer, Mailer};
use eventhub_core::storage::{Database, DatabaseConfig};
use eventhub_core::subscriptions::SubscriptionService;
use eventhub_core::GodMode;

use crate::auth::{Anonymous, IdentityProvider, RemoteSessions, TrustedHeaders};
use crate::config::{IntegrationConfig, ServerConfig};
use crate::mail::HttpMailer;
use crate::rate_limit::RateLimiter;
use crate::trigger::TriggerQueue;

/// Receiving end of the Luma webhook channel, drained by a worker.
pub type LumaInbox = mpsc::UnboundedReceiver<LumaWebhook>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub integrations: Arc<IntegrationConfig>,
    pub db: Database,
    pub perms: Permissions,

    pub communities: CommunityService,
    pub events: EventService,
    pub claims: ClaimService,
    pub generation: GenerationService,
    pub subscriptions: SubscriptionService,
    pub resolver: HostResolver,
    pub luma: LumaSync,
    pub luma_accounts: LumaAccounts,

    pub identity: Arc<dyn IdentityProvider>,
    pub badge_limiter: RateLimiter,
    pub gift_limiter: RateLimiter,

    /// Outbound HTTP (fonts proxy)
    pub http: reqwest::Client,

    /// Webhooks are acknowledged at once and imported by a worker.
    pub luma_tx: mpsc::UnboundedSender<LumaWebhook>,
}

impl AppState {
    /// Wire the services around explicit collaborators.
    pub fn new(
        config: ServerConfig,
        integrations: IntegrationConfig,
        db: Database,
        identity: Arc<dyn IdentityProvider>,
        queue: Arc<dyn JobQueue>,
        mailer: Arc<dyn Mailer>,
        http: reqwest::Client,
    ) -> (Self, LumaInbox) {
        let perms = Permissions::new(db.clone(), GodMode::from_list(&config.admin_emails));
        let links = Links::new(config.base_url());
        let resolver = HostResolver::new(db.clone());
        let assets = AssetPolicy::new(&config.allowed_asset_hosts);
        let (luma_tx, luma_rx) = mpsc::unbounded_channel();

        let state = Self {
            communities: CommunityService::new(db.clone(), perms.clone()),
            events: EventService::new(db.clone(), perms.clone()),
            claims: ClaimService::new(db.clone(), perms.clone(), mailer.clone(), links.clone()),
            generation: GenerationService::new(db.clone(), perms.clone(), queue, assets),
            subscriptions: SubscriptionService::new(db.clone(), mailer.clone(), links.clone()),
            luma: LumaSync::new(db.clone(), resolver.clone()),
            luma_accounts: LumaAccounts::new(db.clone(), mailer, links),
            resolver,
            badge_limiter: RateLimiter::new(config.badge_rate_limit, config.rate_limit_window_secs),
            gift_limiter: RateLimiter::new(config.gift_rate_limit, config.rate_limit_window_secs),
            config: Arc::new(config),
            integrations: Arc::new(integrations),
            identity,
            http,
            luma_tx,
            perms,
            db,
        };
        (state, luma_rx)
    }

    /// Open the database and pick each integration's implementation from
    /// the configuration.
    pub fn from_config(config: ServerConfig, integrations: IntegrationConfig) -> eventhub_core::Result<(Self, LumaInbox)> {
        let db = Database::open_with(&DatabaseConfig {
            path: Some(config.database_path.clone()),
        })?;
        let http = reqwest::Client::new();

        let identity: Arc<dyn IdentityProvider> = match &integrations.identity_api_url {
            Some(url) => {
                tracing::info!(url = %url, "Identity: remote session verification");
                Arc::new(RemoteSessions::new(
                    http.clone(),
                    url.clone(),
                    integrations.identity_secret_key.clone(),
                ))
            }
            None if config.trust_proxy_headers => {
                tracing::warn!("Identity: IDENTITY_API_URL not set, trusting x-user-* headers from the proxy");
                Arc::new(TrustedHeaders)
            }
            None => {
                tracing::error!(
                    "Identity: neither IDENTITY_API_URL nor TRUST_PROXY_HEADERS set, every caller is anonymous"
                );
                Arc::new(Anonymous)
            }
        };

        let queue: Arc<dyn JobQueue> = match &integrations.trigger_api_url {
            Some(url) => Arc::new(TriggerQueue::new(
                http.clone(),
                url.clone(),
                integrations.trigger_secret_key.clone(),
                integrations.trigger_badge_task.clone(),
                integrations.trigger_gift_task.clone(),
            )),
            None => {
                tracing::warn!("Generation: TRIGGER_API_URL not set, jobs are only logged");
                Arc::new(LocalQueue)
            }
        };

        let mailer: Arc<dyn Mailer> = match &integrations.mail_api_url {
            Some(url) => Arc::new(HttpMailer::new(
                http.clone(),
                url.clone(),
                integrations.mail_api_key.clone(),
                integrations.mail_from.clone(),
            )),
            None => {
                tracing::warn!("Mail: MAIL_API_URL not set, messages are only logged");
                Arc::new(LogMailer)
            }
        };

        if integrations.job_callback_secret.is_none() {
            tracing::warn!("JOB_CALLBACK_SECRET not set, worker callbacks will be refused");
        }

        Ok(Self::new(config, integrations, db, identity, queue, mailer, http))
    }

    /// Redirect target under `PUBLIC_BASE_URL`.
    pub fn page_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.config.base_url(), path_and_query)
    }
}
