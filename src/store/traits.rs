//! `PresetStore` trait: async interface for saved credentials.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Backend-agnostic storage for per-user named credentials.
///
/// `(user_id, preset_name)` is unique. Credentials are returned in plaintext
/// to their owner and must never be logged.
#[async_trait]
pub trait PresetStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert a preset, overwriting the credential if the name already exists.
    async fn upsert_preset(
        &self,
        user_id: &str,
        preset_name: &str,
        credential: &str,
    ) -> Result<(), DatabaseError>;

    /// Names of all the user's presets, ordered by name.
    async fn list_preset_names(&self, user_id: &str) -> Result<Vec<String>, DatabaseError>;

    /// All of the user's presets as name → credential.
    async fn list_presets(&self, user_id: &str)
    -> Result<BTreeMap<String, String>, DatabaseError>;

    /// The credential saved under `preset_name`, or an empty string when
    /// there is no such preset.
    async fn fetch_credential(
        &self,
        user_id: &str,
        preset_name: &str,
    ) -> Result<String, DatabaseError>;

    /// Whether the user has a preset called `preset_name`.
    async fn preset_exists(&self, user_id: &str, preset_name: &str)
    -> Result<bool, DatabaseError>;

    /// Delete a preset. Deleting a missing preset is a no-op; call
    /// [`preset_exists`](Self::preset_exists) first to tell the two apart.
    async fn delete_preset(&self, user_id: &str, preset_name: &str) -> Result<(), DatabaseError>;
}
