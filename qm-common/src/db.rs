//! Key/value storage layer
//!
//! SQLite-backed store for the persisted keys shared between contexts.
//! Two scopes mirror the external store the policy lives in: "sync" for
//! user-synchronized keys (the settings) and "local" for machine-local keys
//! (the cached configuration document and its metadata).
//!
//! Every write broadcasts a [`QmEvent::StorageChanged`] on the shared event
//! bus; reads never write.

use crate::events::{EventBus, QmEvent};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Storage scope for a persisted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Synchronized across installations (the policy).
    Sync,
    /// Local to this machine (the cached configuration document).
    Local,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Sync => "sync",
            Scope::Local => "local",
        }
    }
}

/// SQLite-backed key/value store with change notification.
#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
    bus: EventBus,
}

impl KvStore {
    /// Open (creating if needed) the store at `db_path`.
    pub async fn open(db_path: &Path, bus: EventBus) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new store: {}", db_path.display());
        } else {
            info!("Opened existing store: {}", db_path.display());
        }

        // WAL allows concurrent readers with one writer
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        create_kv_table(&pool).await?;

        Ok(Self { pool, bus })
    }

    /// In-memory store for tests and ephemeral contexts.
    pub async fn open_in_memory(bus: EventBus) -> Result<Self> {
        // A single connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        create_kv_table(&pool).await?;
        Ok(Self { pool, bus })
    }

    /// The event bus this store broadcasts changes on.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Read a key, deserializing its JSON value. Absent keys are `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, scope: Scope, key: &str) -> Result<Option<T>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_store WHERE scope = ? AND key = ?")
                .bind(scope.as_str())
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Replace a key's value and broadcast the change.
    pub async fn put_json<T: Serialize + ?Sized>(&self, scope: Scope, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO kv_store (scope, key, value, updated_at) \
             VALUES (?, ?, ?, datetime('now')) \
             ON CONFLICT (scope, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(scope.as_str())
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;

        self.bus.emit(QmEvent::StorageChanged {
            scope,
            key: key.to_string(),
        });
        Ok(())
    }

    /// Remove a key. Broadcasts only if something was actually removed.
    pub async fn remove(&self, scope: Scope, key: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM kv_store WHERE scope = ? AND key = ?")
            .bind(scope.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.bus.emit(QmEvent::StorageChanged {
                scope,
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

async fn create_kv_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS kv_store (
            scope TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (scope, key)
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}
