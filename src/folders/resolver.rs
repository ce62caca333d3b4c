use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::locks::KeyedLocks;
use super::{CreateOutcome, FolderBackend, FolderMetadata, FolderRecord, FolderStore, StoreError};
use crate::identity::IdentityKey;
use crate::request::with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStage {
    Probe,
    Create,
    Update,
    List,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolveStage::Probe => "probing",
            ResolveStage::Create => "creating",
            ResolveStage::Update => "updating",
            ResolveStage::List => "listing",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
#[error("folder resolution failed while {stage}: {source}")]
pub struct ResolveError {
    pub stage: ResolveStage,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InvalidIdentity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Resolved { folder: FolderRecord, created: bool },
    Skipped { reason: SkipReason },
}

impl Resolution {
    pub fn folder(&self) -> Option<&FolderRecord> {
        match self {
            Resolution::Resolved { folder, .. } => Some(folder),
            Resolution::Skipped { .. } => None,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, Resolution::Resolved { created: true, .. })
    }
}

/// What a resolution would do, computed from a probe alone.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Plan {
    Create { owner_email: String },
    Update { folder: FolderRecord },
    Skip { reason: SkipReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub owner_email: String,
    pub folders: Vec<FolderRecord>,
}

enum ResolveState {
    Probe,
    Create,
    UpdateExisting {
        folder: FolderRecord,
        created: bool,
    },
}

pub struct FolderResolver {
    store: Arc<dyn FolderStore>,
    locks: KeyedLocks,
    timeout: Duration,
}

impl FolderResolver {
    pub fn new(store: Arc<dyn FolderStore>, timeout: Duration) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            timeout,
        }
    }

    pub fn backend(&self) -> FolderBackend {
        self.store.backend()
    }

    /// Finds or creates the folder for `raw_email` under `parent_scope` and
    /// writes `metadata` onto it.
    ///
    /// Calls for the same scope and key are serialized within this resolver;
    /// stores that enforce uniqueness themselves also cover callers in other
    /// processes. An unusable email is reported as [`Resolution::Skipped`]
    /// without touching the store.
    pub async fn resolve(
        &self,
        parent_scope: &str,
        raw_email: &str,
        metadata: FolderMetadata,
    ) -> Result<Resolution, ResolveError> {
        let Some(owner) = IdentityKey::derive(raw_email) else {
            debug!(backend = %self.backend(), parent_scope, "skipping resolution for invalid identity");
            return Ok(Resolution::Skipped {
                reason: SkipReason::InvalidIdentity,
            });
        };
        let metadata = metadata.normalized_for(&owner);

        let _guard = self.locks.lock(parent_scope, owner.as_str()).await;

        let mut state = ResolveState::Probe;
        loop {
            state = match state {
                ResolveState::Probe => {
                    let existing = self
                        .call(
                            ResolveStage::Probe,
                            parent_scope,
                            &owner,
                            self.store.find_by_owner(parent_scope, &owner),
                        )
                        .await?;
                    match existing {
                        Some(folder) => ResolveState::UpdateExisting {
                            folder,
                            created: false,
                        },
                        None => ResolveState::Create,
                    }
                }
                ResolveState::Create => {
                    let outcome = self
                        .call(
                            ResolveStage::Create,
                            parent_scope,
                            &owner,
                            self.store
                                .create_if_absent(parent_scope, &owner, &metadata),
                        )
                        .await?;
                    match outcome {
                        CreateOutcome::Created(folder) => {
                            info!(
                                backend = %self.backend(),
                                parent_scope,
                                owner = %owner,
                                folder_id = %folder.id,
                                "created employee folder"
                            );
                            ResolveState::UpdateExisting {
                                folder,
                                created: true,
                            }
                        }
                        CreateOutcome::Existing(folder) => {
                            warn!(
                                backend = %self.backend(),
                                parent_scope,
                                owner = %owner,
                                folder_id = %folder.id,
                                "folder appeared between probe and create; reusing it"
                            );
                            ResolveState::UpdateExisting {
                                folder,
                                created: false,
                            }
                        }
                    }
                }
                ResolveState::UpdateExisting { folder, created } => {
                    let folder = self
                        .call(
                            ResolveStage::Update,
                            parent_scope,
                            &owner,
                            self.store.update_metadata(&folder, &metadata),
                        )
                        .await?;
                    debug!(
                        backend = %self.backend(),
                        parent_scope,
                        owner = %owner,
                        folder_id = %folder.id,
                        created,
                        "resolved employee folder"
                    );
                    return Ok(Resolution::Resolved { folder, created });
                }
            };
        }
    }

    /// Probes only; nothing is written.
    pub async fn plan(&self, parent_scope: &str, raw_email: &str) -> Result<Plan, ResolveError> {
        let Some(owner) = IdentityKey::derive(raw_email) else {
            return Ok(Plan::Skip {
                reason: SkipReason::InvalidIdentity,
            });
        };

        let existing = self
            .call(
                ResolveStage::Probe,
                parent_scope,
                &owner,
                self.store.find_by_owner(parent_scope, &owner),
            )
            .await?;

        Ok(match existing {
            Some(folder) => Plan::Update { folder },
            None => Plan::Create {
                owner_email: owner.into_string(),
            },
        })
    }

    pub async fn list(&self, parent_scope: &str) -> Result<Vec<FolderRecord>, ResolveError> {
        let mut folders = with_timeout(self.timeout, self.store.list(parent_scope))
            .await
            .into_result(StoreError::TimedOut)
            .map_err(|source| {
                error!(backend = %self.backend(), parent_scope, error = %source, "failed to list folders");
                ResolveError {
                    stage: ResolveStage::List,
                    source,
                }
            })?;
        folders.sort_by(|a, b| {
            a.metadata
                .name
                .cmp(&b.metadata.name)
                .then_with(|| a.owner_email.cmp(&b.owner_email))
        });
        Ok(folders)
    }

    /// Owners that ended up with more than one folder in `parent_scope`.
    pub async fn duplicates(&self, parent_scope: &str) -> Result<Vec<DuplicateGroup>, ResolveError> {
        let mut by_owner: BTreeMap<String, Vec<FolderRecord>> = BTreeMap::new();
        for folder in self.list(parent_scope).await? {
            let key = IdentityKey::derive(&folder.owner_email)
                .map(IdentityKey::into_string)
                .unwrap_or_else(|| folder.owner_email.clone());
            by_owner.entry(key).or_default().push(folder);
        }

        Ok(by_owner
            .into_iter()
            .filter(|(_, folders)| folders.len() > 1)
            .map(|(owner_email, folders)| DuplicateGroup {
                owner_email,
                folders,
            })
            .collect())
    }

    async fn call<T>(
        &self,
        stage: ResolveStage,
        parent_scope: &str,
        owner: &IdentityKey,
        request: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ResolveError> {
        with_timeout(self.timeout, request)
            .await
            .into_result(StoreError::TimedOut)
            .map_err(|source| {
                error!(
                    backend = %self.backend(),
                    parent_scope,
                    owner = %owner,
                    %stage,
                    error = %source,
                    "folder resolution failed"
                );
                ResolveError { stage, source }
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::folders::memory::MemoryStore;

    fn metadata(name: &str, department: &str) -> FolderMetadata {
        FolderMetadata {
            name: name.to_string(),
            department: Some(department.to_string()),
            ..Default::default()
        }
    }

    fn resolver(store: Arc<MemoryStore>) -> FolderResolver {
        FolderResolver::new(store, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn sequential_resolutions_converge_on_one_folder() {
        let store = Arc::new(MemoryStore::atomic());
        let resolver = resolver(store.clone());

        let first = resolver
            .resolve("ROOT", "jane.doe@acme.com", metadata("Jane Doe", "Sales"))
            .await
            .unwrap();
        assert!(first.created());
        let first_id = first.folder().unwrap().id.clone();
        assert_eq!(first_id, "F1");

        let second = resolver
            .resolve("ROOT", "Jane.Doe@ACME.com ", metadata("Jane Doe", "Marketing"))
            .await
            .unwrap();
        assert!(!second.created());
        let folder = second.folder().unwrap();
        assert_eq!(folder.id, first_id);
        assert_eq!(folder.metadata.department.as_deref(), Some("Marketing"));

        let garbled = resolver
            .resolve("ROOT", "  not-an-email ", metadata("Nobody", "None"))
            .await
            .unwrap();
        assert!(matches!(
            garbled,
            Resolution::Skipped {
                reason: SkipReason::InvalidIdentity
            }
        ));

        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn creates_once_then_only_updates() {
        let store = Arc::new(MemoryStore::atomic());
        let resolver = resolver(store.clone());

        for _ in 0..5 {
            resolver
                .resolve("ROOT", "sam@acme.com", metadata("Sam", "Ops"))
                .await
                .unwrap();
        }

        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.updates.load(Ordering::SeqCst), 5);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn latest_metadata_wins_including_cleared_fields() {
        let store = Arc::new(MemoryStore::atomic());
        let resolver = resolver(store.clone());

        resolver
            .resolve(
                "ROOT",
                "lee@acme.com",
                FolderMetadata {
                    name: "Lee".into(),
                    department: Some("Finance".into()),
                    position: Some("Analyst".into()),
                    phone: Some("555-0100".into()),
                },
            )
            .await
            .unwrap();

        let resolution = resolver
            .resolve("ROOT", "lee@acme.com", metadata("Lee Park", "Legal"))
            .await
            .unwrap();
        let stored = &resolution.folder().unwrap().metadata;
        assert_eq!(stored.name, "Lee Park");
        assert_eq!(stored.department.as_deref(), Some("Legal"));
        assert_eq!(stored.position, None);
        assert_eq!(stored.phone, None);
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let store = Arc::new(MemoryStore::atomic());
        let resolver = resolver(store.clone());

        let root = resolver
            .resolve("ROOT", "kim@acme.com", metadata("Kim", "HR"))
            .await
            .unwrap();
        let archive = resolver
            .resolve("ARCHIVE", "kim@acme.com", metadata("Kim", "HR"))
            .await
            .unwrap();

        assert!(root.created());
        assert!(archive.created());
        assert_ne!(root.folder().unwrap().id, archive.folder().unwrap().id);
    }

    #[tokio::test]
    async fn invalid_identity_never_touches_store() {
        let store = Arc::new(MemoryStore::atomic());
        let resolver = resolver(store.clone());

        let resolution = resolver.resolve("ROOT", "", FolderMetadata::default()).await.unwrap();
        assert!(resolution.folder().is_none());
        assert_eq!(store.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_failure_aborts_without_creating() {
        let store = Arc::new(MemoryStore::atomic());
        store.fail_probe.store(true, Ordering::SeqCst);
        let resolver = resolver(store.clone());

        let err = resolver
            .resolve("ROOT", "jane.doe@acme.com", metadata("Jane", "Sales"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, ResolveStage::Probe);
        assert!(matches!(err.source, StoreError::Transport(_)));
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_update_times_out() {
        let store = Arc::new(MemoryStore::atomic());
        store.hang_updates.store(true, Ordering::SeqCst);
        let resolver = FolderResolver::new(store.clone(), Duration::from_millis(200));

        let err = resolver
            .resolve("ROOT", "jane.doe@acme.com", metadata("Jane", "Sales"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, ResolveStage::Update);
        assert!(matches!(err.source, StoreError::TimedOut(_)));
    }

    #[tokio::test]
    async fn concurrent_resolutions_converge_without_store_uniqueness() {
        let store = Arc::new(MemoryStore::racy(Duration::from_millis(20)));
        let resolver = Arc::new(resolver(store.clone()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let resolver = resolver.clone();
                tokio::spawn(async move {
                    resolver
                        .resolve("ROOT", "jane.doe@acme.com", metadata("Jane Doe", &format!("D{i}")))
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            let resolution = handle.await.unwrap().unwrap();
            ids.push(resolution.folder().unwrap().id.clone());
        }

        ids.dedup();
        assert_eq!(ids, vec!["F1".to_string()]);
        assert_eq!(store.count().await, 1);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn separate_resolvers_rely_on_atomic_create() {
        let store = Arc::new(MemoryStore {
            atomic_create: true,
            probe_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let a = resolver(store.clone());
        let b = resolver(store.clone());

        let (left, right) = tokio::join!(
            a.resolve("ROOT", "jane.doe@acme.com", metadata("Jane", "Sales")),
            b.resolve("ROOT", "jane.doe@acme.com", metadata("Jane", "Sales")),
        );
        let left = left.unwrap();
        let right = right.unwrap();

        assert_eq!(left.folder().unwrap().id, right.folder().unwrap().id);
        assert_eq!(store.count().await, 1);
        assert!(left.created() ^ right.created());
    }

    #[tokio::test]
    async fn plan_reports_without_writing() {
        let store = Arc::new(MemoryStore::atomic());
        let resolver = resolver(store.clone());

        let plan = resolver.plan("ROOT", "new@acme.com").await.unwrap();
        assert!(matches!(plan, Plan::Create { ref owner_email } if owner_email == "new@acme.com"));
        assert_eq!(store.count().await, 0);

        resolver
            .resolve("ROOT", "new@acme.com", metadata("New", "Ops"))
            .await
            .unwrap();
        let plan = resolver.plan("ROOT", "NEW@acme.com").await.unwrap();
        assert!(matches!(plan, Plan::Update { .. }));

        let plan = resolver.plan("ROOT", "nope").await.unwrap();
        assert!(matches!(plan, Plan::Skip { .. }));
    }

    #[tokio::test]
    async fn duplicates_groups_owners_with_several_folders() {
        let store = Arc::new(MemoryStore::default());
        let owner = IdentityKey::derive("dup@acme.com").unwrap();
        store
            .create_if_absent("ROOT", &owner, &metadata("Dup", "A"))
            .await
            .unwrap();
        store
            .create_if_absent("ROOT", &owner, &metadata("Dup", "B"))
            .await
            .unwrap();
        let single = IdentityKey::derive("solo@acme.com").unwrap();
        store
            .create_if_absent("ROOT", &single, &metadata("Solo", "A"))
            .await
            .unwrap();

        let resolver = resolver(store);
        let groups = resolver.duplicates("ROOT").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].owner_email, "dup@acme.com");
        assert_eq!(groups[0].folders.len(), 2);
    }
}
