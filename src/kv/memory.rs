//! Process-local store used for tests and `backend = "memory"`.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{AtomicOperation, CommitResult, KvEntry, KvError, KvKey, KvStore, Mutation, Versionstamp};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, (Value, Versionstamp)>,
    version: Versionstamp,
}

/// In-memory store. The whole operation runs under one lock, which is what
/// makes checks and mutations atomic.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>, KvError> {
        let encoded = key.encode()?;
        let inner = self.inner.lock();
        Ok(inner.entries.get(&encoded).map(|(value, versionstamp)| KvEntry {
            key: key.clone(),
            value: value.clone(),
            versionstamp: *versionstamp,
        }))
    }

    async fn list(&self, prefix: &KvKey) -> Result<Vec<KvEntry>, KvError> {
        let (start, end) = prefix.prefix_range()?;
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .range(start..end)
            .map(|(key, (value, versionstamp))| KvEntry {
                key: KvKey::decode(key),
                value: value.clone(),
                versionstamp: *versionstamp,
            })
            .collect())
    }

    async fn commit(&self, op: AtomicOperation) -> Result<CommitResult, KvError> {
        // Encode everything up front so an invalid key cannot leave a partial write
        let checks = op
            .checks
            .iter()
            .map(|c| Ok((c.key.encode()?, c.versionstamp)))
            .collect::<Result<Vec<_>, KvError>>()?;
        let mutations = op
            .mutations
            .into_iter()
            .map(|m| match m {
                Mutation::Set { key, value } => Ok((key.encode()?, Some(value))),
                Mutation::Delete { key } => Ok((key.encode()?, None)),
            })
            .collect::<Result<Vec<_>, KvError>>()?;

        let mut inner = self.inner.lock();

        for (key, expected) in &checks {
            let current = inner.entries.get(key).map(|(_, v)| *v);
            if current != *expected {
                return Ok(CommitResult::CheckFailed);
            }
        }

        inner.version += 1;
        let version = inner.version;
        for (key, value) in mutations {
            match value {
                Some(value) => {
                    inner.entries.insert(key, (value, version));
                }
                None => {
                    inner.entries.remove(&key);
                }
            }
        }

        Ok(CommitResult::Committed(version))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
