use crate::config::AppConfig;
use crate::store::{MemoryStore, PgStore, RecordStore};
use crate::users::services::UserService;
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Option<PgPool>,
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (db, store) = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                let store = Arc::new(PgStore::new(db.clone())) as Arc<dyn RecordStore>;
                (Some(db), store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory user store");
                (None, Arc::new(MemoryStore::new()) as Arc<dyn RecordStore>)
            }
        };

        let users = UserService::from_config(&config, store).context("build user service")?;
        Ok(Self { db, config, users })
    }

    /// In-memory state with a cheap hashing work factor.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            hashing: crate::config::HashingConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..AppConfig::default()
        });
        let store = Arc::new(MemoryStore::new()) as Arc<dyn RecordStore>;
        let users = UserService::from_config(&config, store).expect("fake user service");
        Self {
            db: None,
            config,
            users,
        }
    }
}
