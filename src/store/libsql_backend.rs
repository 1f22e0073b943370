//! libSQL backend: async `PresetStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::PresetStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and throwaway runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl PresetStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn upsert_preset(
        &self,
        user_id: &str,
        preset_name: &str,
        credential: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO presets (user_id, preset_name, credential, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (user_id, preset_name)
                 DO UPDATE SET credential = excluded.credential, updated_at = excluded.updated_at",
                params![user_id, preset_name, credential, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_preset: {e}")))?;

        debug!(user_id = user_id, preset = preset_name, "Preset saved");
        Ok(())
    }

    async fn list_preset_names(&self, user_id: &str) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT preset_name FROM presets WHERE user_id = ?1 ORDER BY preset_name",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_preset_names: {e}")))?;

        let mut names = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_preset_names: {e}")))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_preset_names: {e}")))?;
            names.push(name);
        }
        Ok(names)
    }

    async fn list_presets(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT preset_name, credential FROM presets WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_presets: {e}")))?;

        let mut presets = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_presets: {e}")))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_presets: {e}")))?;
            let credential: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("list_presets: {e}")))?;
            presets.insert(name, credential);
        }
        Ok(presets)
    }

    async fn fetch_credential(
        &self,
        user_id: &str,
        preset_name: &str,
    ) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT credential FROM presets WHERE user_id = ?1 AND preset_name = ?2",
                params![user_id, preset_name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_credential: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map_err(|e| DatabaseError::Query(format!("fetch_credential: {e}"))),
            Ok(None) => Ok(String::new()),
            Err(e) => Err(DatabaseError::Query(format!("fetch_credential: {e}"))),
        }
    }

    async fn preset_exists(
        &self,
        user_id: &str,
        preset_name: &str,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT EXISTS(SELECT 1 FROM presets WHERE user_id = ?1 AND preset_name = ?2)",
                params![user_id, preset_name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("preset_exists: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|found| found != 0)
                .map_err(|e| DatabaseError::Query(format!("preset_exists: {e}"))),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("preset_exists: {e}"))),
        }
    }

    async fn delete_preset(&self, user_id: &str, preset_name: &str) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM presets WHERE user_id = ?1 AND preset_name = ?2",
                params![user_id, preset_name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_preset: {e}")))?;

        debug!(
            user_id = user_id,
            preset = preset_name,
            removed = count,
            "Preset delete executed"
        );
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
