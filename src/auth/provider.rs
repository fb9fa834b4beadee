use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::auth::AuthUser;
use crate::auth::jwt::OidcVerifier;
use crate::config::Config;
use crate::utils::identity_cache::IdentityCache;

/// Turns the raw `Authorization` header of a request into a principal.
pub trait IdentityProvider: Send + Sync {
    fn identify<'a>(&'a self, authorization: &'a str) -> BoxFuture<'a, Result<AuthUser, String>>;
}

/// Asks the legacy user manager who owns a token.
pub struct LegacyIdentifier {
    url: String,
    client: reqwest::Client,
    cache: IdentityCache,
}

impl LegacyIdentifier {
    pub fn new(url: String, client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            url,
            client,
            cache: IdentityCache::new(ttl),
        }
    }

    async fn profile(&self, authorization: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(&self.url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| format!("Identification failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Identification refused with status {status}"));
        }
        response
            .json()
            .await
            .map_err(|e| format!("Identification returned an unreadable profile: {e}"))
    }
}

/// OIDC verification first, then the legacy identification service.
pub struct Authenticator {
    oidc: Option<OidcVerifier>,
    legacy: Option<LegacyIdentifier>,
    legacy_key: String,
    oidc_key: String,
}

impl Authenticator {
    pub fn new(oidc: Option<OidcVerifier>, legacy: Option<LegacyIdentifier>, config: &Config) -> Self {
        Self {
            oidc,
            legacy,
            legacy_key: config.legacy_auth_identifier.clone(),
            oidc_key: config.oidc_auth_identifier.clone(),
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let oidc = config
            .oidc_jwks_uri
            .clone()
            .map(|uri| OidcVerifier::new(uri, client.clone()));
        let legacy = config.identification_url.clone().map(|url| {
            LegacyIdentifier::new(
                url,
                client,
                Duration::from_secs(config.identity_cache_ttl_secs),
            )
        });
        if oidc.is_none() && legacy.is_none() {
            warn!("Neither OIDC_JWKS_URI nor IDENTIFICATION_URL set, every request will be refused");
        }
        Self::new(oidc, legacy, config)
    }

    async fn resolve(&self, authorization: &str) -> Result<AuthUser, String> {
        let token = authorization
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "Authorization header must start with Bearer".to_string())?;

        let mut failure = "No identity provider configured".to_string();

        if let Some(oidc) = &self.oidc {
            match oidc.verify(token).await {
                Ok(claims) => {
                    return Ok(AuthUser::from_profile(claims, &self.legacy_key, &self.oidc_key));
                }
                Err(e) => {
                    debug!(error = %e, "OIDC verification failed");
                    failure = e;
                }
            }
        }

        if let Some(legacy) = &self.legacy {
            if let Some(user) = legacy.cache.get(token).await {
                return Ok(user);
            }
            let profile = legacy.profile(authorization).await?;
            let user = AuthUser::from_profile(profile, &self.legacy_key, &self.oidc_key);
            legacy.cache.remember(token, user.clone()).await;
            return Ok(user);
        }

        Err(failure)
    }
}

impl IdentityProvider for Authenticator {
    fn identify<'a>(&'a self, authorization: &'a str) -> BoxFuture<'a, Result<AuthUser, String>> {
        self.resolve(authorization).boxed()
    }
}
