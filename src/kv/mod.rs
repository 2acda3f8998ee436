//! Key-value persistence for the clinic.
//!
//! Everything the server stores lives in a [`KvStore`]: ordered string-tuple
//! keys mapping to JSON values. Each write stamps the entry with a strictly
//! increasing [`Versionstamp`], which callers use as a precondition token for
//! optimistic concurrency through [`AtomicOperation`].

mod memory;
mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Separator between key parts in the encoded form. Sorts below every
/// printable character so that prefix ranges stay contiguous.
const KEY_SEPARATOR: char = '\u{1f}';

/// Upper bound for a prefix range scan (the character after the separator).
const KEY_RANGE_END: char = '\u{20}';

/// Monotonic write version assigned by the store
pub type Versionstamp = u64;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("failed to (de)serialize value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A key made of ordered string parts, e.g. `["users_by_role", "psychologist", email]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KvKey(Vec<String>);

impl KvKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Last part of the key, usually the record id
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Encode into the flat string form used by the backends.
    pub fn encode(&self) -> Result<String, KvError> {
        if self.0.is_empty() {
            return Err(KvError::InvalidKey("key has no parts".to_string()));
        }
        for part in &self.0 {
            if part.contains(KEY_SEPARATOR) {
                return Err(KvError::InvalidKey(format!(
                    "key part {:?} contains a reserved character",
                    part
                )));
            }
        }
        Ok(self.0.join(&KEY_SEPARATOR.to_string()))
    }

    pub fn decode(encoded: &str) -> Self {
        Self(encoded.split(KEY_SEPARATOR).map(str::to_string).collect())
    }

    /// Half-open range `[start, end)` covering every key strictly under this prefix.
    pub fn prefix_range(&self) -> Result<(String, String), KvError> {
        let base = self.encode()?;
        Ok((
            format!("{}{}", base, KEY_SEPARATOR),
            format!("{}{}", base, KEY_RANGE_END),
        ))
    }
}

/// A stored value together with its version
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub key: KvKey,
    pub value: Value,
    pub versionstamp: Versionstamp,
}

impl KvEntry {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, KvError> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Precondition on a key: `None` means the key must not exist.
#[derive(Debug, Clone)]
pub struct Check {
    pub key: KvKey,
    pub versionstamp: Option<Versionstamp>,
}

#[derive(Debug, Clone)]
pub enum Mutation {
    Set { key: KvKey, value: Value },
    Delete { key: KvKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    Committed(Versionstamp),
    CheckFailed,
}

impl CommitResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed(_))
    }
}

/// All-or-nothing batch of checks and mutations
#[derive(Debug, Clone, Default)]
pub struct AtomicOperation {
    pub checks: Vec<Check>,
    pub mutations: Vec<Mutation>,
}

impl AtomicOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, key: KvKey, versionstamp: Option<Versionstamp>) -> Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    pub fn set<T: Serialize>(mut self, key: KvKey, value: &T) -> Result<Self, KvError> {
        let value = serde_json::to_value(value)?;
        self.mutations.push(Mutation::Set { key, value });
        Ok(self)
    }

    pub fn delete(mut self, key: KvKey) -> Self {
        self.mutations.push(Mutation::Delete { key });
        self
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>, KvError>;

    /// All entries strictly under `prefix`, in key order.
    async fn list(&self, prefix: &KvKey) -> Result<Vec<KvEntry>, KvError>;

    /// Apply an atomic operation. Nothing is written if any check fails.
    async fn commit(&self, op: AtomicOperation) -> Result<CommitResult, KvError>;

    /// Human readable backend name for logs
    fn name(&self) -> &'static str;
}

impl dyn KvStore {
    /// Point read for a lookup key built from client input. A key that cannot
    /// be encoded cannot have been stored, so it reads as absent.
    pub async fn find(&self, key: &KvKey) -> Result<Option<KvEntry>, KvError> {
        match self.get(key).await {
            Err(KvError::InvalidKey(reason)) => {
                tracing::debug!(reason = %reason, "Lookup with unencodable key");
                Ok(None)
            }
            result => result,
        }
    }

    /// Unconditional write of a single key
    pub async fn set<T: Serialize + Sync>(&self, key: &KvKey, value: &T) -> Result<(), KvError> {
        self.commit(AtomicOperation::new().set(key.clone(), value)?).await?;
        Ok(())
    }

    /// Unconditional delete of a single key; deleting a missing key is not an error
    pub async fn delete(&self, key: &KvKey) -> Result<(), KvError> {
        self.commit(AtomicOperation::new().delete(key.clone())).await?;
        Ok(())
    }
}
