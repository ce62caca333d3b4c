//! Per-employee folder resolution.
//!
//! A [`FolderStore`] is a parent container that can be probed for an
//! employee's folder, asked to create one, and asked to rewrite its metadata.
//! [`FolderResolver`] runs the probe → create-if-missing → update sequence on
//! top of any store so that each (parent scope, identity key) pair ends up
//! with exactly one folder.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdentityKey;

pub mod drive;
pub mod locks;
#[cfg(test)]
pub(crate) mod memory;
pub mod pg;
pub mod resolver;

pub use drive::DriveFolderStore;
pub use pg::PgFolderStore;
pub use resolver::{
    DuplicateGroup, FolderResolver, Plan, Resolution, ResolveError, ResolveStage, SkipReason,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderBackend {
    #[default]
    Database,
    Drive,
}

impl fmt::Display for FolderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderBackend::Database => f.write_str("database"),
            FolderBackend::Drive => f.write_str("drive"),
        }
    }
}

/// Mutable descriptive fields written onto a folder on every resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FolderMetadata {
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl FolderMetadata {
    /// Trims every field, drops blank optionals and falls back to the
    /// identity key when no display name was given.
    pub fn normalized_for(self, owner: &IdentityKey) -> Self {
        let name = self.name.trim();
        Self {
            name: if name.is_empty() {
                owner.to_string()
            } else {
                name.to_string()
            },
            department: clean_optional(self.department),
            position: clean_optional(self.position),
            phone: clean_optional(self.phone),
        }
    }
}

pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A resolved folder as reported by its store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderRecord {
    pub id: String,
    pub parent_scope: String,
    pub owner_email: String,
    #[serde(flatten)]
    pub metadata: FolderMetadata,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(FolderRecord),
    /// Another caller created the folder first; this is theirs.
    Existing(FolderRecord),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("folder {0} not found")]
    NotFound(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait FolderStore: Send + Sync + 'static {
    fn backend(&self) -> FolderBackend;

    /// Exact match on the stored owner email. `Ok(None)` means the folder does
    /// not exist; transport problems are always errors.
    async fn find_by_owner(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
    ) -> StoreResult<Option<FolderRecord>>;

    async fn create_if_absent(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
        metadata: &FolderMetadata,
    ) -> StoreResult<CreateOutcome>;

    async fn update_metadata(
        &self,
        folder: &FolderRecord,
        metadata: &FolderMetadata,
    ) -> StoreResult<FolderRecord>;

    async fn list(&self, parent_scope: &str) -> StoreResult<Vec<FolderRecord>>;
}
