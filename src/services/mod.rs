//! Outbound HTTP to peer services.

pub mod membership;

use once_cell::sync::Lazy;
use std::time::Duration;

/// Header carrying the member count of a paginated listing.
pub const TOTAL_HEADER: &str = "X-Total";

/// Shared connection pool for every outbound call.
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
});
