use crate::model::identity::{IdentityFields, UserIdentity, json_id};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};
use serde_json::Value;

/// Principal attached to the request by `auth_middleware`.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    /// Legacy user ID (`_id` or `properties._id`)
    pub user_id: Option<String>,
    /// Username as issued by the legacy user manager
    pub username: Option<String>,
    /// Username claim of an OIDC token
    pub preferred_username: Option<String>,
}

impl AuthUser {
    /// Reads a principal from a legacy user profile or a set of OIDC claims.
    pub fn from_profile(profile: Value, legacy_key: &str, oidc_key: &str) -> Self {
        let text = |key: &str| {
            profile
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            user_id: json_id(&profile),
            username: text(legacy_key),
            preferred_username: text(oidc_key),
        }
    }

    /// Every identity this principal may have been stored under.
    pub fn identities(&self) -> Vec<UserIdentity> {
        let mut identities = Vec::with_capacity(2);
        if let Some(id) = &self.user_id {
            identities.push(UserIdentity::LegacyId(id.clone()));
        }
        if let Some(name) = self.username.as_ref().or(self.preferred_username.as_ref()) {
            identities.push(UserIdentity::OidcUsername(name.clone()));
        }
        identities
    }

    /// Identity columns written when this principal creates a record.
    ///
    /// A legacy principal fills both columns so that lookups keep working
    /// under either scheme. An OIDC principal only has its username.
    pub fn entry_fields(&self) -> IdentityFields {
        match (&self.user_id, &self.username, &self.preferred_username) {
            (Some(id), Some(username), None) => IdentityFields {
                user_id: Some(id.clone()),
                oidc_user_identifier: Some(username.clone()),
            },
            (_, _, preferred) => IdentityFields {
                user_id: None,
                oidc_user_identifier: preferred.clone(),
            },
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> &str {
        self.user_id
            .as_deref()
            .or(self.username.as_deref())
            .or(self.preferred_username.as_deref())
            .unwrap_or("anonymous")
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthUser>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(ErrorUnauthorized("User not authenticated"))),
        }
    }
}
