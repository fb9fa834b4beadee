use actix_web::{HttpResponse, get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::Config;
use crate::db::Database;

#[derive(Serialize, ToSchema)]
pub struct DatabaseInfo {
    /// Connection URL with the password masked
    pub url: String,
    pub connected: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AuthInfo {
    pub identification_url: Option<String>,
    pub oidc_jwks_uri: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ServiceInfo {
    pub application_name: String,
    pub version: String,
    pub auth: AuthInfo,
    pub group_manager_api_url: Option<String>,
    pub workplace_manager_api_url: Option<String>,
    pub user_manager_api_url: Option<String>,
    pub database: DatabaseInfo,
}

impl ServiceInfo {
    pub fn collect(config: &Config, database: &Database) -> Self {
        Self {
            application_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            auth: AuthInfo {
                identification_url: config.identification_url.clone(),
                oidc_jwks_uri: config.oidc_jwks_uri.clone(),
            },
            group_manager_api_url: config.group_manager_api_url.clone(),
            workplace_manager_api_url: config.workplace_manager_api_url.clone(),
            user_manager_api_url: config.user_manager_api_url.clone(),
            database: DatabaseInfo {
                url: config.redacted_database_url(),
                connected: database.is_ready(),
            },
        }
    }
}

/// Service identity and wiring, public.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service information", body = ServiceInfo)),
    tag = "Info"
)]
#[get("/")]
pub async fn index(config: web::Data<Config>, database: web::Data<Database>) -> HttpResponse {
    HttpResponse::Ok().json(ServiceInfo::collect(&config, &database))
}
