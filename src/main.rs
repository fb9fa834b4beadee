use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod repo;
mod routes;
mod services;
mod utils;

use auth::provider::{Authenticator, IdentityProvider};
use config::Config;
use db::Database;
use services::HTTP_CLIENT;
use services::membership::{MembershipClient, MembershipDirectory};

use crate::docs::ApiDoc;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Server starting...");

    let database = Database::connect(&config).await?;
    database.migrate().await?;
    let database = Data::new(database);
    let pool = Data::new(database.pool().clone());

    let identity: Arc<dyn IdentityProvider> =
        Arc::new(Authenticator::from_config(&config, HTTP_CLIENT.clone()));
    let identity = Data::from(identity);

    let directory: Arc<dyn MembershipDirectory> = Arc::new(MembershipClient::new(
        HTTP_CLIENT.clone(),
        config.group_manager_api_url.clone(),
        config.workplace_manager_api_url.clone(),
    ));
    let directory = Data::from(directory);

    let limiter = routes::build_limiter(config.rate_protected_per_min)?;
    let metrics = routes::build_metrics()?;
    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);
    let openapi = ApiDoc::openapi();

    let server_database = database.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/docs/{_:.*}") // wildcard so JS/CSS assets resolve
                    .url("/api-doc/openapi.json", openapi.clone()),
            )
            .app_data(pool.clone())
            .app_data(server_database.clone())
            .app_data(config_data.clone())
            .app_data(identity.clone())
            .app_data(directory.clone())
            .configure(|cfg| routes::configure(cfg, limiter.clone()))
            .wrap(metrics.clone())
            .wrap(routes::cors())
    })
    .bind(&server_addr)?
    .run()
    .await?;

    info!("Server stopped");
    database.close().await;
    Ok(())
}
