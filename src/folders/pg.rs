use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use tokio::task;
use uuid::Uuid;

use super::{CreateOutcome, FolderBackend, FolderMetadata, FolderRecord, FolderStore, StoreError, StoreResult};
use crate::db::PgPool;
use crate::identity::IdentityKey;
use crate::models::{EmployeeFolder, NewEmployeeFolder};
use crate::schema::employee_folders;

/// Folders kept in the `employee_folders` table. The unique index on
/// `(parent_scope, owner_email)` makes creation an atomic insert-if-absent.
#[derive(Clone)]
pub struct PgFolderStore {
    pool: PgPool,
}

#[derive(AsChangeset)]
#[diesel(table_name = employee_folders)]
#[diesel(treat_none_as_null = true)]
struct FolderChangeset<'a> {
    name: &'a str,
    department: Option<&'a str>,
    position: Option<&'a str>,
    phone: Option<&'a str>,
    updated_at: chrono::NaiveDateTime,
}

impl PgFolderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| StoreError::Transport(format!("database pool error: {err}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Transport(format!("database task failed: {err}")))?
    }
}

fn find_owned(
    conn: &mut PgConnection,
    parent_scope: &str,
    owner_email: &str,
) -> QueryResult<Option<EmployeeFolder>> {
    employee_folders::table
        .filter(employee_folders::parent_scope.eq(parent_scope))
        .filter(employee_folders::owner_email.eq(owner_email))
        .first(conn)
        .optional()
}

#[async_trait]
impl FolderStore for PgFolderStore {
    fn backend(&self) -> FolderBackend {
        FolderBackend::Database
    }

    async fn find_by_owner(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
    ) -> StoreResult<Option<FolderRecord>> {
        let parent_scope = parent_scope.to_string();
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            Ok(find_owned(conn, &parent_scope, &owner)?.map(folder_to_record))
        })
        .await
    }

    async fn create_if_absent(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
        metadata: &FolderMetadata,
    ) -> StoreResult<CreateOutcome> {
        let new_folder = NewEmployeeFolder {
            id: Uuid::new_v4(),
            parent_scope: parent_scope.to_string(),
            owner_email: owner.to_string(),
            name: metadata.name.clone(),
            department: metadata.department.clone(),
            position: metadata.position.clone(),
            phone: metadata.phone.clone(),
        };

        self.with_conn(move |conn| {
            let inserted = diesel::insert_into(employee_folders::table)
                .values(&new_folder)
                .on_conflict((employee_folders::parent_scope, employee_folders::owner_email))
                .do_nothing()
                .execute(conn)?;

            let folder = find_owned(conn, &new_folder.parent_scope, &new_folder.owner_email)?
                .ok_or_else(|| StoreError::NotFound(new_folder.id.to_string()))?;

            if inserted == 1 {
                Ok(CreateOutcome::Created(folder_to_record(folder)))
            } else {
                Ok(CreateOutcome::Existing(folder_to_record(folder)))
            }
        })
        .await
    }

    async fn update_metadata(
        &self,
        folder: &FolderRecord,
        metadata: &FolderMetadata,
    ) -> StoreResult<FolderRecord> {
        let folder_id = Uuid::parse_str(&folder.id)
            .map_err(|_| StoreError::NotFound(folder.id.clone()))?;
        let metadata = metadata.clone();

        self.with_conn(move |conn| {
            let changeset = FolderChangeset {
                name: &metadata.name,
                department: metadata.department.as_deref(),
                position: metadata.position.as_deref(),
                phone: metadata.phone.as_deref(),
                updated_at: Utc::now().naive_utc(),
            };

            let updated = diesel::update(employee_folders::table.find(folder_id))
                .set(&changeset)
                .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::NotFound(folder_id.to_string()));
            }

            let folder: EmployeeFolder = employee_folders::table.find(folder_id).first(conn)?;
            Ok(folder_to_record(folder))
        })
        .await
    }

    async fn list(&self, parent_scope: &str) -> StoreResult<Vec<FolderRecord>> {
        let parent_scope = parent_scope.to_string();
        self.with_conn(move |conn| {
            let folders: Vec<EmployeeFolder> = employee_folders::table
                .filter(employee_folders::parent_scope.eq(&parent_scope))
                .order((employee_folders::name.asc(), employee_folders::owner_email.asc()))
                .load(conn)?;
            Ok(folders.into_iter().map(folder_to_record).collect())
        })
        .await
    }
}

fn folder_to_record(folder: EmployeeFolder) -> FolderRecord {
    FolderRecord {
        id: folder.id.to_string(),
        parent_scope: folder.parent_scope,
        owner_email: folder.owner_email,
        metadata: FolderMetadata {
            name: folder.name,
            department: folder.department,
            position: folder.position,
            phone: folder.phone,
        },
        created_at: Some(DateTime::<Utc>::from_naive_utc_and_offset(
            folder.created_at,
            Utc,
        )),
        updated_at: Some(DateTime::<Utc>::from_naive_utc_and_offset(
            folder.updated_at,
            Utc,
        )),
    }
}
