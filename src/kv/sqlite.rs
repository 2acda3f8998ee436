//! SQLite-backed store.
//!
//! Entries live in a single `kv_entries` table. An atomic operation runs in
//! one transaction whose first statement bumps the versionstamp counter, so the
//! write lock is held before any check is evaluated and concurrent commits are
//! serialized by SQLite itself. Dropping the transaction on an error path rolls
//! it back and returns the connection to the pool.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

use super::{AtomicOperation, CommitResult, KvEntry, KvError, KvKey, KvStore, Mutation, Versionstamp};

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<(), sqlx::Error> {
    for statement in sql.split(';') {
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Open (creating if needed) the store database inside `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self, KvError> {
        let db_path = data_dir.join("clinic.db");
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        info!("Initializing store at {}", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        execute_sql(&pool, include_str!("../../migrations/001_kv.sql")).await?;

        info!("Store initialized successfully");
        Ok(Self { pool })
    }
}

fn row_to_entry(key: &str, value: &str, versionstamp: i64) -> Result<KvEntry, KvError> {
    Ok(KvEntry {
        key: KvKey::decode(key),
        value: serde_json::from_str(value)?,
        versionstamp: versionstamp as Versionstamp,
    })
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>, KvError> {
        let encoded = key.encode()?;
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT key, value, versionstamp FROM kv_entries WHERE key = ?")
                .bind(&encoded)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(k, v, vs)| row_to_entry(&k, &v, vs)).transpose()
    }

    async fn list(&self, prefix: &KvKey) -> Result<Vec<KvEntry>, KvError> {
        let (start, end) = prefix.prefix_range()?;
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT key, value, versionstamp FROM kv_entries WHERE key >= ? AND key < ? ORDER BY key",
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|(k, v, vs)| row_to_entry(k, v, *vs))
            .collect()
    }

    async fn commit(&self, op: AtomicOperation) -> Result<CommitResult, KvError> {
        let mut tx = self.pool.begin().await?;

        let (version,): (i64,) =
            sqlx::query_as("UPDATE kv_version SET value = value + 1 WHERE id = 1 RETURNING value")
                .fetch_one(&mut *tx)
                .await?;

        for check in &op.checks {
            let encoded = check.key.encode()?;
            let current: Option<(i64,)> =
                sqlx::query_as("SELECT versionstamp FROM kv_entries WHERE key = ?")
                    .bind(&encoded)
                    .fetch_optional(&mut *tx)
                    .await?;

            if current.map(|(v,)| v as Versionstamp) != check.versionstamp {
                debug!(key = %encoded, "Atomic check failed");
                tx.rollback().await?;
                return Ok(CommitResult::CheckFailed);
            }
        }

        for mutation in op.mutations {
            match mutation {
                Mutation::Set { key, value } => {
                    sqlx::query(
                        r#"
                        INSERT INTO kv_entries (key, value, versionstamp) VALUES (?, ?, ?)
                        ON CONFLICT(key) DO UPDATE SET
                            value = excluded.value,
                            versionstamp = excluded.versionstamp
                        "#,
                    )
                    .bind(key.encode()?)
                    .bind(serde_json::to_string(&value)?)
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::Delete { key } => {
                    sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                        .bind(key.encode()?)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(CommitResult::Committed(version as Versionstamp))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
