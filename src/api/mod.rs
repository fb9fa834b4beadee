pub mod allocations;
pub mod entries;
pub mod groups;
pub mod info;

use actix_web::{HttpRequest, web};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::repo::Page;

/// Query parameters shared by every listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Calendar year, defaults to the current one
    pub year: Option<i32>,
    /// First day of the window, overrides `year`
    pub start_date: Option<String>,
    /// Last day of the window (inclusive), overrides `year`
    pub end_date: Option<String>,
    /// Page size, 0 for no limit
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

impl ListQuery {
    /// Effective `(limit, skip)` echoed back in list responses.
    pub fn window(&self, config: &Config) -> (i64, i64) {
        let limit = self.limit.unwrap_or(config.default_batch_size).max(0);
        let skip = self.skip.unwrap_or(0).max(0);
        (limit, skip)
    }

    pub fn page(&self, config: &Config) -> Page {
        let (limit, skip) = self.window(config);
        Page::new(limit, skip)
    }
}

/// Parses a record ID taken from the path or a body.
pub fn parse_id(raw: &str) -> ApiResult<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::bad_request("ID is not provided"));
    }
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid ID: {raw}")))
}

/// Every value of a repeatable query key, accepting both `key=` and `key[]=`.
pub fn query_list(req: &HttpRequest, keys: &[&str]) -> Vec<String> {
    let pairs = web::Query::<Vec<(String, String)>>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .unwrap_or_default();

    pairs
        .into_iter()
        .filter(|(key, _)| {
            let key = key.strip_suffix("[]").unwrap_or(key);
            keys.contains(&key)
        })
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Raw `Authorization` header, forwarded as is to peer services.
pub fn authorization(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
}
