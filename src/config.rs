use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    pub database_url: String,
    pub database_connect_attempts: u32,

    // Peer services
    pub group_manager_api_url: Option<String>,
    pub workplace_manager_api_url: Option<String>,
    pub user_manager_api_url: Option<String>,
    pub identification_url: Option<String>,
    pub oidc_jwks_uri: Option<String>,

    // Principal fields carrying the username of each identity scheme
    pub oidc_auth_identifier: String,
    pub legacy_auth_identifier: String,

    pub default_batch_size: i64,
    pub rate_protected_per_min: u32,
    pub identity_cache_ttl_secs: u64,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let app_port: u16 = parse_or(&var, "APP_PORT", 80)?;
        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| format!("0.0.0.0:{app_port}"));

        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => {
                let host = var("DATABASE_HOST").unwrap_or_else(|| "mysql".to_string());
                let port: u16 = parse_or(&var, "DATABASE_PORT", 3306)?;
                let name = var("DATABASE_NAME").unwrap_or_else(|| "nenkyuu_calendar".to_string());
                let credentials = match (var("DATABASE_USER"), var("DATABASE_PASSWORD")) {
                    (Some(user), Some(password)) => format!("{user}:{password}@"),
                    (Some(user), None) => format!("{user}@"),
                    _ => String::new(),
                };
                format!("mysql://{credentials}{host}:{port}/{name}")
            }
        };

        let user_manager_api_url = var("USER_MANAGER_API_URL").map(trim_slash);
        let identification_url = var("IDENTIFICATION_URL").or_else(|| {
            user_manager_api_url
                .as_ref()
                .map(|base| format!("{base}/v3/users/self"))
        });

        Ok(Self {
            server_addr,
            database_url,
            database_connect_attempts: parse_or(&var, "DATABASE_CONNECT_ATTEMPTS", 12)?,
            group_manager_api_url: var("GROUP_MANAGER_API_URL").map(trim_slash),
            workplace_manager_api_url: var("WORKPLACE_MANAGER_API_URL").map(trim_slash),
            user_manager_api_url,
            identification_url,
            oidc_jwks_uri: var("OIDC_JWKS_URI"),
            oidc_auth_identifier: var("OIDC_AUTH_IDENTIFIER")
                .unwrap_or_else(|| "preferred_username".to_string()),
            legacy_auth_identifier: var("LEGACY_AUTH_IDENTIFIER")
                .unwrap_or_else(|| "username".to_string()),
            default_batch_size: parse_or(&var, "DEFAULT_BATCH_SIZE", 100)?,
            rate_protected_per_min: parse_or(&var, "RATE_PROTECTED_PER_MIN", 1000)?,
            identity_cache_ttl_secs: parse_or(&var, "IDENTITY_CACHE_TTL_SECS", 60)?,
            log_dir: var("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        })
    }

    /// Database URL with the password masked, safe to print or return.
    pub fn redacted_database_url(&self) -> String {
        redact_password(&self.database_url)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn redact_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
