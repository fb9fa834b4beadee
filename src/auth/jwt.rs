use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use moka::future::Cache;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, warn};

/// Key sets by JWKS URI. Rotated keys are picked up on the first token
/// signed with an unknown `kid`.
static JWKS_CACHE: Lazy<Cache<String, Arc<JwkSet>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(16)
        .time_to_live(Duration::from_secs(3600))
        .build()
});

/// Verifies OIDC access tokens against the issuer's published key set.
pub struct OidcVerifier {
    jwks_uri: String,
    client: reqwest::Client,
}

impl OidcVerifier {
    pub fn new(jwks_uri: String, client: reqwest::Client) -> Self {
        Self { jwks_uri, client }
    }

    async fn fetch_key_set(&self) -> Result<Arc<JwkSet>, String> {
        debug!(uri = %self.jwks_uri, "Fetching JWKS");
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("JWKS unavailable: {e}"))?;
        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| format!("JWKS unreadable: {e}"))?;
        Ok(Arc::new(keys))
    }

    async fn key_set(&self) -> Result<Arc<JwkSet>, String> {
        JWKS_CACHE
            .try_get_with(self.jwks_uri.clone(), self.fetch_key_set())
            .await
            .map_err(|e| e.to_string())
    }

    /// Returns the token's claims when its signature and expiry check out.
    pub async fn verify(&self, token: &str) -> Result<Value, String> {
        let header = decode_header(token).map_err(|e| e.to_string())?;

        let mut keys = self.key_set().await?;
        let mut jwk = select_key(&keys, header.kid.as_deref()).cloned();
        if jwk.is_none() {
            JWKS_CACHE.invalidate(&self.jwks_uri).await;
            keys = self.key_set().await?;
            jwk = select_key(&keys, header.kid.as_deref()).cloned();
        }
        let jwk = jwk.ok_or_else(|| {
            warn!(kid = ?header.kid, "No JWKS key matches the token");
            "Unknown signing key".to_string()
        })?;

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| e.to_string())?;
        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;

        decode::<Value>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| e.to_string())
    }
}

/// Key named by `kid`, or the only key of a single-key set.
fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a jsonwebtoken::jwk::Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}
