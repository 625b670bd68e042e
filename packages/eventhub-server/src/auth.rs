//! # Identity
//!
//! Resolves the caller from request headers through an [`IdentityProvider`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  provider          reads                         used when              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  RemoteSessions    Authorization: Bearer <jwt>   IDENTITY_API_URL set   │
//! │                    or the __session cookie                              │
//! │  TrustedHeaders    x-user-id, x-user-email, ...  behind an auth proxy,  │
//! │                                                  and in tests           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every resolved user is written through to the `users` table so member
//! lists can show names and avatars.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
};
use dashmap::DashMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use eventhub_core::CurrentUser;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Verified sessions are reused for this long before asking the provider
/// again.
const SESSION_CACHE_TTL_SECS: i64 = 60;

const SESSION_COOKIE: &str = "__session";

/// Turns request headers into the current user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` for anonymous callers and invalid sessions.
    async fn resolve(&self, headers: &HeaderMap) -> ApiResult<Option<CurrentUser>>;
}

// ============================================================================
// TRUSTED HEADERS
// ============================================================================

/// Reads the identity an upstream proxy already verified.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustedHeaders;

impl TrustedHeaders {
    pub const USER_ID: &'static str = "x-user-id";
    pub const EMAIL: &'static str = "x-user-email";
    pub const EMAIL_VERIFIED: &'static str = "x-user-email-verified";
    pub const NAME: &'static str = "x-user-name";
    pub const AVATAR: &'static str = "x-user-avatar";
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl IdentityProvider for TrustedHeaders {
    async fn resolve(&self, headers: &HeaderMap) -> ApiResult<Option<CurrentUser>> {
        let id = match header_str(headers, Self::USER_ID) {
            Some(id) => id,
            None => return Ok(None),
        };
        Ok(Some(CurrentUser {
            id: id.to_string(),
            email: header_str(headers, Self::EMAIL).map(str::to_lowercase),
            email_verified: matches!(header_str(headers, Self::EMAIL_VERIFIED), Some("true") | Some("1")),
            display_name: header_str(headers, Self::NAME).map(String::from),
            avatar_url: header_str(headers, Self::AVATAR).map(String::from),
        }))
    }
}

/// Used when neither an identity API nor a trusted proxy is configured:
/// nobody is signed in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

#[async_trait]
impl IdentityProvider for Anonymous {
    async fn resolve(&self, _headers: &HeaderMap) -> ApiResult<Option<CurrentUser>> {
        Ok(None)
    }
}

// ============================================================================
// REMOTE SESSIONS
// ============================================================================

/// Verifies session tokens against the identity provider's API.
pub struct RemoteSessions {
    client: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
    /// sha256(token) → (user, expires_at)
    cache: Arc<DashMap<String, (CurrentUser, i64)>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

impl RemoteSessions {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, secret_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
            cache: Arc::new(DashMap::new()),
        }
    }

    fn session_token(headers: &HeaderMap) -> Option<String> {
        if let Some(bearer) = header_str(headers, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            return Some(bearer.trim().to_string());
        }
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
            .filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl IdentityProvider for RemoteSessions {
    async fn resolve(&self, headers: &HeaderMap) -> ApiResult<Option<CurrentUser>> {
        let token = match Self::session_token(headers) {
            Some(t) => t,
            None => return Ok(None),
        };
        let key = hex::encode(Sha256::digest(token.as_bytes()));
        let now = chrono::Utc::now().timestamp();
        if let Some(hit) = self.cache.get(&key) {
            if hit.1 > now {
                return Ok(Some(hit.0.clone()));
            }
        }

        let mut request = self
            .client
            .post(format!("{}/v1/sessions/verify", self.base_url))
            .timeout(Duration::from_secs(10))
            .json(&serde_json::json!({ "token": token }));
        if let Some(secret) = &self.secret_key {
            request = request.bearer_auth(secret);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to reach identity provider: {}", e);
            ApiError::BadGateway("Identity provider unavailable".into())
        })?;
        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => {
                self.cache.remove(&key);
                return Ok(None);
            }
            s => {
                tracing::error!(status = %s, "Identity provider rejected session verification");
                return Err(ApiError::BadGateway("Identity provider unavailable".into()));
            }
        }
        let session: SessionUser = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse identity provider response: {}", e);
            ApiError::BadGateway("Identity provider unavailable".into())
        })?;

        let user = CurrentUser {
            id: session.id,
            email: session.email.map(|e| e.to_lowercase()),
            email_verified: session.email_verified,
            display_name: session.name,
            avatar_url: session.image_url,
        };
        self.cache.retain(|_, (_, expires)| *expires > now);
        self.cache
            .insert(key, (user.clone(), now + SESSION_CACHE_TTL_SECS));
        Ok(Some(user))
    }
}

// ============================================================================
// EXTRACTORS
// ============================================================================

/// The caller, if signed in.
pub struct MaybeUser(pub Option<CurrentUser>);

/// A signed-in caller; rejects anonymous requests with 401.
pub struct AuthUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = state.identity.resolve(&parts.headers).await?;
        if let Some(user) = &user {
            state.db.upsert_user(user, eventhub_core::time::now_timestamp())?;
        }
        Ok(MaybeUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match MaybeUser::from_request_parts(parts, state).await? {
            MaybeUser(Some(user)) => Ok(AuthUser(user)),
            MaybeUser(None) => Err(ApiError::Unauthorized),
        }
    }
}
