use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{PgUserRepo, UserRepo};
use crate::config::{AppConfig, JwtConfig};
use crate::tasks::repo::{PgTaskRepo, TaskRepo};

/// Process-wide, read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<JwtKeys>,
    pub users: Arc<dyn UserRepo>,
    pub tasks: Arc<dyn TaskRepo>,
}

impl AppState {
    /// Connects to Postgres and applies pending migrations.
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run database migrations")?;

        Ok(Self::with_pool(&config.jwt, db))
    }

    pub fn with_pool(jwt: &JwtConfig, db: PgPool) -> Self {
        Self::from_parts(
            jwt,
            Arc::new(PgUserRepo::new(db.clone())),
            Arc::new(PgTaskRepo::new(db)),
        )
    }

    pub fn from_parts(
        jwt: &JwtConfig,
        users: Arc<dyn UserRepo>,
        tasks: Arc<dyn TaskRepo>,
    ) -> Self {
        Self {
            keys: Arc::new(JwtKeys::new(jwt)),
            users,
            tasks,
        }
    }

    /// State backed by an in-memory store, for router tests.
    #[cfg(test)]
    pub fn fake(store: Arc<crate::memory::MemoryStore>) -> Self {
        let jwt = JwtConfig {
            secret: "test".into(),
            issuer: "test".into(),
            audience: "test".into(),
            ttl_minutes: 60 * 24,
        };
        Self::from_parts(&jwt, store.clone(), store)
    }
}
