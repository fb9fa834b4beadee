use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use strum_macros::Display;
use tracing::{info, warn};

use crate::config::Config;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum DbState {
    Connecting,
    Ready,
    Closed,
}

impl DbState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => DbState::Ready,
            2 => DbState::Closed,
            _ => DbState::Connecting,
        }
    }
}

/// Connection pool plus the lifecycle state reported by `GET /`.
pub struct Database {
    pool: MySqlPool,
    state: AtomicU8,
}

impl Database {
    /// Opens the pool, retrying every few seconds while MySQL comes up.
    pub async fn connect(config: &Config) -> Result<Self> {
        let attempts = config.database_connect_attempts.max(1);
        let target = config.redacted_database_url();

        for attempt in 1..=attempts {
            info!(url = %target, attempt, "Connecting to database");
            match MySqlPoolOptions::new()
                .max_connections(10)
                .connect(&config.database_url)
                .await
            {
                Ok(pool) => {
                    info!(url = %target, "Database connected");
                    return Ok(Self::ready(pool));
                }
                Err(e) if attempt < attempts => {
                    warn!(error = %e, attempt, "Database connection failed, retrying in 5s");
                    actix_web::rt::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Database unreachable after {attempts} attempts")
                    });
                }
            }
        }
        bail!("Database unreachable")
    }

    /// Wraps an already open pool.
    pub fn ready(pool: MySqlPool) -> Self {
        Self {
            pool,
            state: AtomicU8::new(DbState::Ready as u8),
        }
    }

    /// Wraps a pool that connects on first use.
    pub fn lazy(config: &Config) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .connect_lazy(&config.database_url)
            .context("DATABASE_URL is not a valid MySQL URL")?;
        Ok(Self {
            pool,
            state: AtomicU8::new(DbState::Connecting as u8),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn state(&self) -> DbState {
        DbState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == DbState::Ready && !self.pool.is_closed()
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.state.store(DbState::Closed as u8, Ordering::Release);
        self.pool.close().await;
        info!("Database connection closed");
    }
}
