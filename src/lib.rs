pub mod api;
pub mod config;
pub mod db;
pub mod kv;

use config::Config;
use std::sync::Arc;

use crate::db::Repositories;
use crate::kv::KvStore;

/// Process-wide state shared by every request
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
    pub repos: Repositories,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn KvStore>) -> Self {
        let repos = Repositories::new(store.clone());
        Self {
            config,
            store,
            repos,
        }
    }
}
