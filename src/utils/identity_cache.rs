use moka::future::Cache;
use std::time::Duration;

use crate::auth::auth::AuthUser;

/// Principals resolved by the legacy identification service, keyed by the
/// bearer token that identified them.
#[derive(Clone)]
pub struct IdentityCache {
    inner: Cache<String, AuthUser>,
}

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(50_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, token: &str) -> Option<AuthUser> {
        self.inner.get(token).await
    }

    pub async fn remember(&self, token: &str, user: AuthUser) {
        self.inner.insert(token.to_string(), user).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> AuthUser {
        AuthUser::from_profile(json!({ "_id": "1", "username": "ito" }), "username", "preferred_username")
    }

    #[actix_web::test]
    async fn remembers_principal_per_token() {
        let cache = IdentityCache::new(Duration::from_secs(60));
        assert!(cache.get("t1").await.is_none());
        cache.remember("t1", user()).await;
        assert_eq!(cache.get("t1").await, Some(user()));
        assert!(cache.get("t2").await.is_none());
    }

    #[actix_web::test]
    async fn entries_expire_after_ttl() {
        let cache = IdentityCache::new(Duration::from_millis(20));
        cache.remember("t1", user()).await;
        actix_web::rt::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("t1").await.is_none());
    }
}
