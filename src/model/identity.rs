//! Identity schemes and how a path identifier turns into a storage filter.
//!
//! Records are keyed either by the legacy user ID (`user_id` column) or by
//! the OIDC username (`oidc_user_identifier` column). Both may be populated
//! on records written during the migration between the two.

use crate::auth::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::utils::db_utils::{SqlFilter, SqlValue};
use serde_json::Value;
use strum_macros::Display;

pub const SELF_IDENTIFIER: &str = "self";

pub const USER_ID_COLUMN: &str = "user_id";
pub const OIDC_COLUMN: &str = "oidc_user_identifier";

/// Longest string still treated as a legacy numeric ID.
const LEGACY_ID_MAX_LEN: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UserIdentity {
    LegacyId(String),
    OidcUsername(String),
}

impl UserIdentity {
    /// Guesses the scheme from the identifier's shape: purely numeric
    /// strings are legacy IDs, everything else is a username. This can
    /// misclassify usernames made of digits, so only the `Classify` mode
    /// relies on it.
    pub fn classify(raw: &str) -> Self {
        let numeric = !raw.is_empty()
            && raw.len() <= LEGACY_ID_MAX_LEN
            && raw.bytes().all(|b| b.is_ascii_digit());
        if numeric {
            UserIdentity::LegacyId(raw.to_string())
        } else {
            UserIdentity::OidcUsername(raw.to_string())
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            UserIdentity::LegacyId(_) => USER_ID_COLUMN,
            UserIdentity::OidcUsername(_) => OIDC_COLUMN,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            UserIdentity::LegacyId(v) | UserIdentity::OidcUsername(v) => v,
        }
    }

    /// Identities under which a stored record can be found.
    pub fn of_record(user_id: Option<&str>, oidc_user_identifier: Option<&str>) -> Vec<Self> {
        user_id
            .map(|id| UserIdentity::LegacyId(id.to_string()))
            .into_iter()
            .chain(oidc_user_identifier.map(|name| UserIdentity::OidcUsername(name.to_string())))
            .collect()
    }
}

/// How an identifier other than `self` is mapped onto identity columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionMode {
    /// Pick one column from the identifier's shape
    Classify,
    /// Match the identifier against both columns
    Either,
}

/// Non-empty disjunction of identities.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityFilter(Vec<UserIdentity>);

impl IdentityFilter {
    pub fn new(identities: Vec<UserIdentity>) -> ApiResult<Self> {
        if identities.is_empty() {
            return Err(ApiError::bad_request("User ID not provided"));
        }
        Ok(Self(identities))
    }

    pub fn identities(&self) -> &[UserIdentity] {
        &self.0
    }

    /// `(user_id = ? OR oidc_user_identifier = ? ...)`
    pub fn to_sql(&self) -> SqlFilter {
        let clauses = self
            .0
            .iter()
            .map(|identity| format!("{} = ?", identity.column()))
            .collect::<Vec<_>>()
            .join(" OR ");
        let values = self
            .0
            .iter()
            .map(|identity| SqlValue::String(identity.value().to_string()))
            .collect();
        SqlFilter::new(format!("({clauses})"), values)
    }
}

/// Identity columns to write on a new or upserted record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentityFields {
    pub user_id: Option<String>,
    pub oidc_user_identifier: Option<String>,
}

impl IdentityFields {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.oidc_user_identifier.is_none()
    }

    fn from_identity(identity: UserIdentity) -> Self {
        match identity {
            UserIdentity::LegacyId(id) => Self {
                user_id: Some(id),
                oidc_user_identifier: None,
            },
            UserIdentity::OidcUsername(name) => Self {
                user_id: None,
                oidc_user_identifier: Some(name),
            },
        }
    }
}

/// Maps a path identifier onto the filter used to read records.
pub fn resolve_user_query(
    identifier: &str,
    principal: Option<&AuthUser>,
    mode: ResolutionMode,
) -> ApiResult<IdentityFilter> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(ApiError::bad_request("User ID not provided"));
    }

    if identifier == SELF_IDENTIFIER {
        let principal = principal.ok_or_else(|| {
            ApiError::unauthorized("User not authenticated or ID not provided")
        })?;
        return IdentityFilter::new(principal.identities());
    }

    let identities = match mode {
        ResolutionMode::Classify => vec![UserIdentity::classify(identifier)],
        ResolutionMode::Either => vec![
            UserIdentity::LegacyId(identifier.to_string()),
            UserIdentity::OidcUsername(identifier.to_string()),
        ],
    };
    IdentityFilter::new(identities)
}

/// Maps an identifier list from a query string onto a filter, `None` when
/// the list is empty.
pub fn resolve_identifier_list(
    identifiers: &[String],
    mode: ResolutionMode,
) -> Option<IdentityFilter> {
    let identities = identifiers
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .flat_map(|id| match mode {
            ResolutionMode::Classify => vec![UserIdentity::classify(id)],
            ResolutionMode::Either => vec![
                UserIdentity::LegacyId(id.to_string()),
                UserIdentity::OidcUsername(id.to_string()),
            ],
        })
        .collect::<Vec<_>>();
    IdentityFilter::new(identities).ok()
}

/// Decides which identity columns a created record gets.
///
/// `identifier` is the path segment when the route is user scoped, the body
/// fields are used by unscoped creation routes.
pub fn resolve_entry_fields(
    identifier: Option<&str>,
    body: IdentityFields,
    principal: Option<&AuthUser>,
    mode: ResolutionMode,
) -> ApiResult<IdentityFields> {
    let fields = match identifier.map(str::trim) {
        Some(SELF_IDENTIFIER) => principal
            .ok_or_else(|| ApiError::unauthorized("User identifier not provided"))?
            .entry_fields(),
        Some(id) if !id.is_empty() => match mode {
            ResolutionMode::Classify => IdentityFields::from_identity(UserIdentity::classify(id)),
            ResolutionMode::Either => {
                IdentityFields::from_identity(UserIdentity::OidcUsername(id.to_string()))
            }
        },
        _ => body,
    };

    if fields.is_empty() {
        return Err(ApiError::bad_request("User identifier not provided"));
    }
    Ok(fields)
}

/// Reads the legacy ID of a user object: `_id`, or `properties._id` for
/// graph-backed profiles. Numeric IDs are rendered as strings.
pub fn json_id(user: &Value) -> Option<String> {
    user.get("_id")
        .and_then(scalar_id)
        .or_else(|| user.get("properties")?.get("_id").and_then(scalar_id))
}

/// Non-empty string or number as an ID string.
pub fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
