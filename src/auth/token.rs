// src/auth/token.rs

//! Access tokens from the identity provider.
//!
//! - [`TokenProvider`] performs one token request; [`AadTokenProvider`] does
//!   it over HTTP with a client-credentials grant.
//! - [`TokenManager`] derives the authority from the credential's tenant,
//!   caches tokens until shortly before they expire and retries the
//!   provider's transient outages.
//! - [`Authenticator`] filters out credentials that do not take part in
//!   authentication at all.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::credential::Credential;
use crate::errors::{NiftiBatchError, Result};
use crate::retry::{RetryPolicy, retry};

/// Default authority; `{tenant}` is replaced by the credential's tenant.
pub const DEFAULT_AUTHORITY: &str = "https://login.windows.net/{tenant}";

/// Cached tokens are considered stale this long before they actually expire.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Longest lifetime a token is trusted for, whatever the provider claims.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Opaque bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    /// `expires_in` is capped at [`MAX_TOKEN_LIFETIME`].
    pub fn new(value: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + expires_in.min(MAX_TOKEN_LIFETIME),
        }
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Still valid for at least `margin`.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        Instant::now()
            .checked_add(margin)
            .is_some_and(|t| t < self.expires_at)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One client-credentials token request.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub authority: String,
    pub client_id: String,
    pub client_secret: String,
    pub resource: String,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("authority", &self.authority)
            .field("client_id", &self.client_id)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Performs a single token request against an identity provider.
///
/// Provider-reported failures must surface as
/// [`NiftiBatchError::IdentityProvider`] so the manager can tell transient
/// outages apart.
pub trait TokenProvider: Send + Sync {
    fn request_token<'a>(
        &'a self,
        request: &'a TokenRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>>;
}

/// Azure AD style `POST {authority}/oauth2/token` provider.
#[derive(Debug, Clone, Default)]
pub struct AadTokenProvider {
    http: reqwest::Client,
}

impl AadTokenProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

/// Some providers send `expires_in` as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn as_duration(&self) -> Option<Duration> {
        let secs = match self {
            ExpiresIn::Seconds(s) => *s,
            ExpiresIn::Text(s) => s.trim().parse().ok()?,
        };
        Some(Duration::from_secs(secs).min(MAX_TOKEN_LIFETIME))
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

impl TokenProvider for AadTokenProvider {
    fn request_token<'a>(
        &'a self,
        request: &'a TokenRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/oauth2/token", request.authority.trim_end_matches('/'));
            debug!(url = %url, client_id = %request.client_id, "requesting access token");

            let form = [
                ("grant_type", "client_credentials"),
                ("client_id", request.client_id.as_str()),
                ("client_secret", request.client_secret.as_str()),
                ("resource", request.resource.as_str()),
            ];
            let resp = self.http.post(&url).form(&form).send().await?;
            let status = resp.status();
            let body = resp.text().await?;

            if !status.is_success() {
                return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                    Ok(err) => NiftiBatchError::IdentityProvider {
                        code: err.error,
                        description: err.error_description,
                    },
                    Err(_) => NiftiBatchError::Service {
                        status: status.as_u16(),
                        url,
                        message: body.trim().to_string(),
                    },
                });
            }

            let token: TokenResponse = serde_json::from_str(&body)?;
            let lifetime = token
                .expires_in
                .as_ref()
                .and_then(ExpiresIn::as_duration)
                .unwrap_or(DEFAULT_TOKEN_LIFETIME);
            Ok(AccessToken::new(token.access_token, lifetime))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    authority: String,
    client_id: String,
    resource: String,
}

/// Acquires and caches tokens for one resource.
pub struct TokenManager<P = AadTokenProvider> {
    provider: P,
    authority_template: String,
    resource: String,
    retry_policy: RetryPolicy,
    refresh_margin: Duration,
    cache: Mutex<HashMap<CacheKey, AccessToken>>,
}

impl<P> fmt::Debug for TokenManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("authority_template", &self.authority_template)
            .field("resource", &self.resource)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl TokenManager<AadTokenProvider> {
    pub fn new(resource: impl Into<String>) -> Self {
        Self::with_provider(AadTokenProvider::default(), resource)
    }
}

impl<P: TokenProvider> TokenManager<P> {
    pub fn with_provider(provider: P, resource: impl Into<String>) -> Self {
        Self {
            provider,
            authority_template: DEFAULT_AUTHORITY.to_string(),
            resource: resource.into(),
            retry_policy: RetryPolicy::identity_provider(),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Override the authority template. `{tenant}` is substituted; a
    /// template without it is used as-is.
    pub fn with_authority_template(mut self, template: impl Into<String>) -> Self {
        self.authority_template = template.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn authority_for(&self, credential: &Credential) -> String {
        self.authority_template.replace("{tenant}", &credential.tenant)
    }

    /// Get a bearer token for `credential`, from cache when still fresh.
    pub async fn acquire_token(&self, credential: &Credential) -> Result<AccessToken> {
        if !credential.supports_real_authentication {
            return Err(NiftiBatchError::Authentication(
                "credential does not support real authentication".to_string(),
            ));
        }

        let request = TokenRequest {
            authority: self.authority_for(credential),
            client_id: credential.client_id.clone(),
            client_secret: credential.secret.clone(),
            resource: self.resource.clone(),
        };
        let key = CacheKey {
            authority: request.authority.clone(),
            client_id: request.client_id.clone(),
            resource: request.resource.clone(),
        };

        if let Some(token) = self.cached(&key) {
            debug!(authority = %key.authority, "using cached access token");
            return Ok(token);
        }

        let token = retry(
            self.retry_policy,
            NiftiBatchError::is_transient_identity_error,
            |attempt| {
                debug!(attempt, authority = %request.authority, "acquiring access token");
                self.provider.request_token(&request)
            },
        )
        .await?;

        if token.secret().is_empty() {
            return Err(NiftiBatchError::Authentication(
                "Failed to retrieve access token".to_string(),
            ));
        }

        info!(authority = %key.authority, "acquired access token");
        self.store(key, token.clone());
        Ok(token)
    }

    fn cached(&self, key: &CacheKey) -> Option<AccessToken> {
        let cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("token cache mutex poisoned; requesting a new token");
                return None;
            }
        };
        cache
            .get(key)
            .filter(|t| t.is_fresh(self.refresh_margin))
            .cloned()
    }

    fn store(&self, key: CacheKey, token: AccessToken) {
        match self.cache.lock() {
            Ok(mut cache) => {
                cache.insert(key, token);
            }
            Err(_) => warn!("token cache mutex poisoned; not caching token"),
        }
    }
}

/// Entry point for callers holding a possibly-empty credential.
#[derive(Debug)]
pub struct Authenticator<P = AadTokenProvider> {
    tokens: TokenManager<P>,
}

impl<P: TokenProvider> Authenticator<P> {
    pub fn new(tokens: TokenManager<P>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &TokenManager<P> {
        &self.tokens
    }

    /// `None` for credentials that do not authenticate; otherwise a token.
    pub async fn authenticate(&self, credential: &Credential) -> Result<Option<AccessToken>> {
        if !credential.supports_real_authentication {
            debug!("credential does not authenticate; skipping token acquisition");
            return Ok(None);
        }
        self.tokens.acquire_token(credential).await.map(Some)
    }
}
