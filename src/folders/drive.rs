//! Folders kept in a Drive-style document store (Google Drive v3 REST shape).
//!
//! Each employee folder is a Drive folder under the parent scope folder and
//! carries the owner's identity key in `appProperties.ownerEmail`, together
//! with the rest of the metadata. The API offers no conditional create, so
//! [`DriveFolderStore::create_if_absent`] re-probes right before creating and
//! relies on the resolver's per-key lock for in-process callers.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{CreateOutcome, FolderBackend, FolderMetadata, FolderRecord, FolderStore, StoreError, StoreResult};
use crate::identity::IdentityKey;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,parents,appProperties,createdTime,modifiedTime";
const OWNER_PROPERTY: &str = "ownerEmail";
const PAGE_SIZE: &str = "100";

#[derive(Clone)]
pub struct DriveFolderStore {
    client: Client,
    files_url: Url,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    app_properties: HashMap<String, String>,
    created_time: Option<DateTime<Utc>>,
    modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

impl DriveFolderStore {
    pub fn new(api_url: &str, access_token: impl Into<String>) -> anyhow::Result<Self> {
        let mut base = Url::parse(api_url).context("DRIVE_API_URL must be a valid URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let files_url = base
            .join("drive/v3/files")
            .context("failed to build Drive files URL")?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build Drive HTTP client")?;

        Ok(Self {
            client,
            files_url,
            access_token: access_token.into(),
        })
    }

    fn file_url(&self, file_id: &str) -> StoreResult<Url> {
        let mut url = self.files_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidResponse("Drive API URL cannot be a base".into()))?
            .push(file_id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        check_status(response).await
    }

    async fn search(&self, query: String) -> StoreResult<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let fields = format!("nextPageToken,files({FILE_FIELDS})");

        loop {
            let mut request = self.client.get(self.files_url.clone()).query(&[
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", PAGE_SIZE),
            ]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: FileList = decode(self.send(request).await?).await?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl FolderStore for DriveFolderStore {
    fn backend(&self) -> FolderBackend {
        FolderBackend::Drive
    }

    async fn find_by_owner(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
    ) -> StoreResult<Option<FolderRecord>> {
        let query = format!(
            "{} and appProperties has {{ key='{}' and value='{}' }}",
            children_query(parent_scope),
            OWNER_PROPERTY,
            escape_query_value(owner.as_str()),
        );
        let mut matches = self.search(query).await?;
        if matches.len() > 1 {
            debug!(parent_scope, owner = %owner, count = matches.len(), "multiple drive folders share an owner");
        }
        // Oldest folder is canonical when duplicates already exist.
        matches.sort_by(|a, b| a.created_time.cmp(&b.created_time).then_with(|| a.id.cmp(&b.id)));
        Ok(matches
            .into_iter()
            .next()
            .and_then(|file| file_to_record(file, parent_scope)))
    }

    async fn create_if_absent(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
        metadata: &FolderMetadata,
    ) -> StoreResult<CreateOutcome> {
        if let Some(existing) = self.find_by_owner(parent_scope, owner).await? {
            return Ok(CreateOutcome::Existing(existing));
        }

        let body = json!({
            "name": metadata.name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_scope],
            "appProperties": app_properties(owner.as_str(), metadata),
        });
        let request = self
            .client
            .post(self.files_url.clone())
            .query(&[("fields", FILE_FIELDS)])
            .json(&body);

        let file: DriveFile = decode(self.send(request).await?).await?;
        let file_id = file.id.clone();
        file_to_record(file, parent_scope)
            .map(CreateOutcome::Created)
            .ok_or_else(|| {
                StoreError::InvalidResponse(format!("created folder {file_id} has no owner property"))
            })
    }

    async fn update_metadata(
        &self,
        folder: &FolderRecord,
        metadata: &FolderMetadata,
    ) -> StoreResult<FolderRecord> {
        let body = json!({
            "name": metadata.name,
            "appProperties": app_properties(&folder.owner_email, metadata),
        });
        let request = self
            .client
            .patch(self.file_url(&folder.id)?)
            .query(&[("fields", FILE_FIELDS)])
            .json(&body);

        let response = match self.send(request).await {
            Err(StoreError::NotFound(_)) => return Err(StoreError::NotFound(folder.id.clone())),
            other => other?,
        };
        let file: DriveFile = decode(response).await?;
        file_to_record(file, &folder.parent_scope)
            .ok_or_else(|| StoreError::InvalidResponse(format!("folder {} lost its owner property", folder.id)))
    }

    async fn list(&self, parent_scope: &str) -> StoreResult<Vec<FolderRecord>> {
        let files = self.search(children_query(parent_scope)).await?;
        Ok(files
            .into_iter()
            .filter_map(|file| file_to_record(file, parent_scope))
            .collect())
    }
}

fn children_query(parent_scope: &str) -> String {
    format!(
        "'{}' in parents and mimeType = '{}' and trashed = false",
        escape_query_value(parent_scope),
        FOLDER_MIME_TYPE
    )
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `null` removes a property on update, so cleared fields do not linger.
fn app_properties(owner_email: &str, metadata: &FolderMetadata) -> Value {
    json!({
        OWNER_PROPERTY: owner_email,
        "department": metadata.department,
        "position": metadata.position,
        "phone": metadata.phone,
    })
}

fn file_to_record(mut file: DriveFile, parent_scope: &str) -> Option<FolderRecord> {
    let owner_email = file.app_properties.remove(OWNER_PROPERTY)?;
    let parent_scope = if file.parents.iter().any(|parent| parent == parent_scope) {
        parent_scope.to_string()
    } else {
        file.parents
            .into_iter()
            .next()
            .unwrap_or_else(|| parent_scope.to_string())
    };

    Some(FolderRecord {
        id: file.id,
        parent_scope,
        owner_email,
        metadata: FolderMetadata {
            name: file.name,
            department: file.app_properties.remove("department"),
            position: file.app_properties.remove("position"),
            phone: file.app_properties.remove("phone"),
        },
        created_at: file.created_time,
        updated_at: file.modified_time,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> StoreResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| StoreError::InvalidResponse(err.to_string()))
}

async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, reasons) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (
            envelope.error.message,
            envelope
                .error
                .errors
                .into_iter()
                .map(|detail| detail.reason)
                .collect::<Vec<_>>(),
        ),
        Err(_) => (body, Vec::new()),
    };
    let quota_related = reasons.iter().any(|reason| {
        let reason = reason.to_ascii_lowercase();
        reason.contains("quota") || reason.contains("ratelimit")
    });

    Err(match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::QuotaExceeded(message),
        StatusCode::FORBIDDEN if quota_related => StoreError::QuotaExceeded(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(message),
        _ => StoreError::Transport(format!("drive responded with {status}: {message}")),
    })
}
