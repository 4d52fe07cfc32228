use async_trait::async_trait;
use common::error::diagnostics::DiagnosticMessage;
use common::types::{Backend, ObjectStoreKind};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use staging::api::{
    BranchIntrospection, FileFilter, FileMetadata, JobApi, JobId, JobStatus, LoadJobRequest,
    MetadataLookup, RemoteError, TransferMetrics, WorkspaceApi,
};
use staging::branch::BranchId;
use staging::load_type::TableMetadata;
use staging::source::TableId;
use staging::strategy::ProjectCapabilities;
use staging::workspace::WorkspaceHandle;
use thiserror::Error;
use tracing::debug;

const TOKEN_HEADER: &str = "X-StorageApi-Token";
const NATIVE_BRANCH_FEATURE: &str = "protected-default-branch";
const INVALID_MARKER_CODE: &str = "storage.invalidChangedSince";

#[derive(Debug, Error)]
pub enum StorageClientError {
    #[error("not found: {context}")]
    NotFound { context: DiagnosticMessage },
    #[error("connectivity error: {context}")]
    FailedToConnect { context: DiagnosticMessage },
    #[error("change marker rejected: {context}")]
    InvalidMarker { context: DiagnosticMessage },
    #[error("request rejected: {context}")]
    Rejected { context: DiagnosticMessage },
    #[error("unexpected response: {context}")]
    UnexpectedError { context: DiagnosticMessage },
}

impl StorageClientError {
    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn failed_to_connect(message: impl Into<String>) -> Self {
        Self::FailedToConnect {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn invalid_marker(message: impl Into<String>) -> Self {
        Self::InvalidMarker {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedError {
            context: DiagnosticMessage::new(message.into()),
        }
    }
}

impl From<reqwest::Error> for StorageClientError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            StorageClientError::failed_to_connect(err.to_string())
        } else if let Some(status) = err.status() {
            match status {
                StatusCode::NOT_FOUND => StorageClientError::not_found(err.to_string()),
                _ => StorageClientError::unexpected(format!(
                    "{err} - status code {}",
                    status.as_u16()
                )),
            }
        } else {
            StorageClientError::unexpected(format!(
                "unexpected error sending storage API request: {err}"
            ))
        }
    }
}

impl From<StorageClientError> for RemoteError {
    fn from(err: StorageClientError) -> Self {
        match err {
            StorageClientError::NotFound { context } => RemoteError::NotFound { context },
            StorageClientError::InvalidMarker { context } => RemoteError::InvalidMarker { context },
            StorageClientError::Rejected { context } => RemoteError::Rejected { context },
            StorageClientError::FailedToConnect { context }
            | StorageClientError::UnexpectedError { context } => {
                RemoteError::Transport { context }
            }
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableDetail {
    id: TableId,
    bucket: BucketDetail,
    #[serde(default)]
    is_alias: bool,
    #[serde(default)]
    alias_columns_auto_sync: bool,
    #[serde(default)]
    alias_filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BucketDetail {
    backend: Backend,
}

impl From<TableDetail> for TableMetadata {
    fn from(detail: TableDetail) -> Self {
        TableMetadata {
            id: detail.id,
            backend: detail.bucket.backend,
            is_alias: detail.is_alias,
            alias_columns_auto_sync: detail.alias_columns_auto_sync,
            alias_row_filter: detail.alias_filter.is_some_and(|filter| !filter.is_null()),
        }
    }
}

#[derive(Deserialize)]
struct TableRef {
    id: TableId,
}

#[derive(Deserialize)]
struct JobRef {
    id: String,
}

#[derive(Deserialize)]
struct JobDetail {
    status: String,
    #[serde(default)]
    error: Option<JobErrorDetail>,
    #[serde(default)]
    results: Vec<TransferMetrics>,
}

#[derive(Deserialize)]
struct JobErrorDetail {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenDetail {
    #[serde(default)]
    branch_id: Option<String>,
    owner: OwnerDetail,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerDetail {
    #[serde(default)]
    backends: Vec<Backend>,
    #[serde(default)]
    file_storage_providers: Vec<ObjectStoreKind>,
    #[serde(default)]
    features: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchDetail {
    id: serde_json::Value,
    #[serde(default)]
    is_default: bool,
}

#[derive(Serialize)]
struct CreateWorkspace {
    backend: Backend,
}

/// HTTP client for the storage API.
#[derive(Debug, Clone)]
pub struct StorageApiClient {
    base_url: String,
    token: String,
    client: Client,
}

impl StorageApiClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/storage{path}", self.base_url)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header(TOKEN_HEADER, &self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageClientError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body: ErrorBody = resp.json().await.unwrap_or(ErrorBody {
            error: "could not parse error body".into(),
            code: None,
        });
        Err(match status {
            StatusCode::NOT_FOUND => StorageClientError::not_found(body.error),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
                if body.code.as_deref() == Some(INVALID_MARKER_CODE) =>
            {
                StorageClientError::invalid_marker(body.error)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                StorageClientError::rejected(body.error)
            }
            status => StorageClientError::unexpected(format!(
                "{} - status code {}",
                body.error,
                status.as_u16()
            )),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StorageClientError> {
        debug!("GET {path}");
        Ok(self.send(self.get(path)).await?.json().await?)
    }

    async fn branches(&self) -> Result<Vec<BranchDetail>, StorageClientError> {
        self.get_json("/dev-branches").await
    }

    async fn token_detail(&self) -> Result<TokenDetail, StorageClientError> {
        self.get_json("/tokens/verify").await
    }
}

fn branch_id(raw: &serde_json::Value) -> BranchId {
    match raw {
        serde_json::Value::String(id) => BranchId::new(id.clone()),
        other => BranchId::new(other.to_string()),
    }
}

#[async_trait]
impl MetadataLookup for StorageApiClient {
    async fn table_exists(&self, branch: &BranchId, id: &TableId) -> Result<bool, RemoteError> {
        match self
            .send(self.get(&format!("/branch/{branch}/tables/{id}")))
            .await
        {
            Ok(_) => Ok(true),
            Err(StorageClientError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn table_info(
        &self,
        branch: &BranchId,
        id: &TableId,
    ) -> Result<TableMetadata, RemoteError> {
        let detail: TableDetail = self
            .get_json(&format!("/branch/{branch}/tables/{id}"))
            .await?;
        Ok(detail.into())
    }

    async fn list_files(
        &self,
        branch: &BranchId,
        filter: &FileFilter,
    ) -> Result<Vec<FileMetadata>, RemoteError> {
        let mut query = vec![
            ("q", filter.query.clone()),
            ("limit", filter.limit.to_string()),
        ];
        if let Some(since) = &filter.since {
            query.push(("sinceId", since.to_string()));
        }
        let request = self.get(&format!("/branch/{branch}/files")).query(&query);
        Ok(self
            .send(request)
            .await?
            .json()
            .await
            .map_err(StorageClientError::from)?)
    }

    async fn search_tables(
        &self,
        branch: &BranchId,
        key: &str,
        value: &str,
    ) -> Result<Vec<TableId>, RemoteError> {
        let request = self
            .get(&format!("/branch/{branch}/search/tables"))
            .query(&[("metadataKey", key), ("metadataValue", value)]);
        let found: Vec<TableRef> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(StorageClientError::from)?;
        Ok(found.into_iter().map(|table| table.id).collect())
    }
}

#[async_trait]
impl JobApi for StorageApiClient {
    async fn submit_load_job(&self, request: &LoadJobRequest) -> Result<JobId, RemoteError> {
        let post = self
            .client
            .post(self.url("/jobs/load"))
            .header(TOKEN_HEADER, &self.token)
            .json(request);
        let job: JobRef = self
            .send(post)
            .await?
            .json()
            .await
            .map_err(StorageClientError::from)?;
        Ok(JobId(job.id))
    }

    async fn poll_job(&self, id: &JobId) -> Result<JobStatus, RemoteError> {
        let job: JobDetail = self.get_json(&format!("/jobs/{id}")).await?;
        match job.status.as_str() {
            "waiting" | "processing" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Succeeded(job.results)),
            "error" => Ok(JobStatus::Failed(
                job.error
                    .map(|error| error.message)
                    .unwrap_or_else(|| "job failed without a message".into()),
            )),
            other => Err(StorageClientError::unexpected(format!(
                "job {id} reports unknown status '{other}'"
            ))
            .into()),
        }
    }
}

#[async_trait]
impl BranchIntrospection for StorageApiClient {
    async fn current_branch_id(&self) -> Result<BranchId, RemoteError> {
        match self.token_detail().await?.branch_id {
            Some(id) => Ok(BranchId::new(id)),
            None => self.default_branch_id().await,
        }
    }

    async fn default_branch_id(&self) -> Result<BranchId, RemoteError> {
        let branches = self.branches().await?;
        branches
            .iter()
            .find(|branch| branch.is_default)
            .map(|branch| branch_id(&branch.id))
            .ok_or_else(|| RemoteError::not_found("project has no default branch"))
    }

    async fn project_capabilities(&self) -> Result<ProjectCapabilities, RemoteError> {
        let owner = self.token_detail().await?.owner;
        Ok(ProjectCapabilities {
            has_native_branch_storage: owner
                .features
                .iter()
                .any(|feature| feature == NATIVE_BRANCH_FEATURE),
            backends: owner.backends,
            object_stores: owner.file_storage_providers,
        })
    }
}

#[async_trait]
impl WorkspaceApi for StorageApiClient {
    async fn create_workspace(&self, backend: Backend) -> Result<WorkspaceHandle, RemoteError> {
        let post = self
            .client
            .post(self.url("/workspaces"))
            .header(TOKEN_HEADER, &self.token)
            .json(&CreateWorkspace { backend });
        let created: JobRef = self
            .send(post)
            .await?
            .json()
            .await
            .map_err(StorageClientError::from)?;
        Ok(WorkspaceHandle::new(created.id, backend))
    }

    async fn delete_workspace(&self, handle: &WorkspaceHandle) -> Result<(), RemoteError> {
        let delete = self
            .client
            .delete(self.url(&format!("/workspaces/{}", handle.id)))
            .header(TOKEN_HEADER, &self.token);
        self.send(delete).await?;
        Ok(())
    }
}
