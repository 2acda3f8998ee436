//! Login sessions keyed by the SHA-256 of the cookie token.

use std::sync::Arc;

use super::models::SessionRecord;
use crate::kv::{KvError, KvKey, KvStore};

const SESSIONS: &str = "sessions";

#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn KvStore>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(session_id: &str) -> KvKey {
        KvKey::new([SESSIONS, session_id])
    }

    pub async fn create(&self, session: &SessionRecord) -> Result<(), KvError> {
        self.store.set(&Self::key(&session.session_id), session).await
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, KvError> {
        match self.store.find(&Self::key(session_id)).await? {
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), KvError> {
        self.store.delete(&Self::key(session_id)).await
    }
}
