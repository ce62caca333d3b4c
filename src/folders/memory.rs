use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{CreateOutcome, FolderBackend, FolderMetadata, FolderRecord, FolderStore, StoreError, StoreResult};
use crate::identity::IdentityKey;

/// In-memory store. With `atomic_create` off it behaves like a remote API
/// without uniqueness guarantees: create always adds a folder.
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub folders: Mutex<Vec<FolderRecord>>,
    pub atomic_create: bool,
    pub probe_delay: Option<Duration>,
    pub fail_probe: AtomicBool,
    pub hang_updates: AtomicBool,
    pub probes: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
}

impl MemoryStore {
    pub fn atomic() -> Self {
        Self {
            atomic_create: true,
            ..Default::default()
        }
    }

    pub fn racy(probe_delay: Duration) -> Self {
        Self {
            probe_delay: Some(probe_delay),
            ..Default::default()
        }
    }

    pub async fn count(&self) -> usize {
        self.folders.lock().await.len()
    }
}

#[async_trait]
impl FolderStore for MemoryStore {
    fn backend(&self) -> FolderBackend {
        FolderBackend::Database
    }

    async fn find_by_owner(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
    ) -> StoreResult<Option<FolderRecord>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset".into()));
        }
        let found = self
            .folders
            .lock()
            .await
            .iter()
            .find(|f| f.parent_scope == parent_scope && f.owner_email == owner.as_str())
            .cloned();
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn create_if_absent(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
        metadata: &FolderMetadata,
    ) -> StoreResult<CreateOutcome> {
        let mut folders = self.folders.lock().await;
        if self.atomic_create {
            if let Some(existing) = folders
                .iter()
                .find(|f| f.parent_scope == parent_scope && f.owner_email == owner.as_str())
            {
                return Ok(CreateOutcome::Existing(existing.clone()));
            }
        }
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let folder = FolderRecord {
            id: format!("F{n}"),
            parent_scope: parent_scope.to_string(),
            owner_email: owner.to_string(),
            metadata: metadata.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        folders.push(folder.clone());
        Ok(CreateOutcome::Created(folder))
    }

    async fn update_metadata(
        &self,
        folder: &FolderRecord,
        metadata: &FolderMetadata,
    ) -> StoreResult<FolderRecord> {
        if self.hang_updates.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut folders = self.folders.lock().await;
        let stored = folders
            .iter_mut()
            .find(|f| f.id == folder.id)
            .ok_or_else(|| StoreError::NotFound(folder.id.clone()))?;
        stored.metadata = metadata.clone();
        stored.updated_at = Some(Utc::now());
        Ok(stored.clone())
    }

    async fn list(&self, parent_scope: &str) -> StoreResult<Vec<FolderRecord>> {
        Ok(self
            .folders
            .lock()
            .await
            .iter()
            .filter(|f| f.parent_scope == parent_scope)
            .cloned()
            .collect())
    }
}
