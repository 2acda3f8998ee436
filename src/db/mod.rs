mod dashboard;
mod models;
mod repository;
mod sessions;
mod users;

pub use dashboard::dashboard_stats;
pub use models::*;
pub use repository::{Entity, Repository, Versioned, WriteOutcome};
pub use sessions::SessionRepository;
pub use users::UserRepository;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};
use crate::kv::{KvStore, MemoryKv, SqliteKv};

/// Open the configured key-value store.
pub async fn init(config: &StoreConfig) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config.backend {
        StoreBackend::Sqlite => {
            std::fs::create_dir_all(&config.data_dir).with_context(|| {
                format!("Failed to create data directory: {}", config.data_dir.display())
            })?;
            Arc::new(
                SqliteKv::open(&config.data_dir)
                    .await
                    .context("Failed to open SQLite store")?,
            )
        }
        StoreBackend::Memory => Arc::new(MemoryKv::new()),
    };

    info!(backend = store.name(), "Key-value store ready");
    Ok(store)
}

/// All repositories, built once at startup over a shared store handle.
#[derive(Clone)]
pub struct Repositories {
    pub patients: Repository<Patient>,
    pub rooms: Repository<Room>,
    pub appointments: Repository<Appointment>,
    pub users: UserRepository,
    pub sessions: SessionRepository,
}

impl Repositories {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            patients: Repository::new(store.clone()),
            rooms: Repository::new(store.clone()),
            appointments: Repository::new(store.clone()),
            users: UserRepository::new(store.clone()),
            sessions: SessionRepository::new(store),
        }
    }
}
