//! Contracts with the remote storage API.
//!
//! The engine only talks to storage through these traits. The HTTP client in
//! `shared_clients` implements them for real; tests use an in-memory fake.

use crate::branch::BranchId;
use crate::load_type::{LoadType, TableMetadata};
use crate::source::{TableId, WhereFilter};
use crate::state::{ChangeFilter, Marker, SourceKey};
use crate::strategy::{ProjectCapabilities, StagingTarget};
use crate::workspace::WorkspaceHandle;
use async_trait::async_trait;
use common::error::diagnostics::DiagnosticMessage;
use common::types::Backend;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not found: {context}")]
    NotFound { context: DiagnosticMessage },
    #[error("change marker rejected: {context}")]
    InvalidMarker { context: DiagnosticMessage },
    #[error("request rejected: {context}")]
    Rejected { context: DiagnosticMessage },
    #[error("transport error: {context}")]
    Transport { context: DiagnosticMessage },
}

impl RemoteError {
    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
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
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            context: DiagnosticMessage::new(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the API reports for one transferred item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetrics {
    pub key: SourceKey,
    pub destination: String,
    #[serde(default)]
    pub objects: u64,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub rows: Option<u64>,
    /// Newest change marker among the transferred data; absent when nothing
    /// matched.
    #[serde(default)]
    pub last_marker: Option<Marker>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded(Vec<TransferMetrics>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Marker>,
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadSource {
    Table {
        id: TableId,
        branch: BranchId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        columns: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        where_filter: Option<WhereFilter>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
        overwrite: bool,
    },
    Files {
        query: String,
        branch: BranchId,
        limit: u64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        processed_tags: Vec<String>,
        overwrite: bool,
    },
}

/// A single transfer inside a load job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadItem {
    pub key: SourceKey,
    pub source: LoadSource,
    pub destination: String,
    pub load_type: LoadType,
    #[serde(default)]
    pub change_filter: ChangeFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadGroup {
    pub load_type: LoadType,
    pub items: Vec<LoadItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadJobRequest {
    pub target: StagingTarget,
    pub groups: Vec<LoadGroup>,
}

impl LoadJobRequest {
    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|group| group.items.len()).sum()
    }
}

/// Read-only metadata lookups, always scoped to a branch.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn table_exists(&self, branch: &BranchId, id: &TableId) -> Result<bool, RemoteError>;

    async fn table_info(&self, branch: &BranchId, id: &TableId)
        -> Result<TableMetadata, RemoteError>;

    async fn list_files(
        &self,
        branch: &BranchId,
        filter: &FileFilter,
    ) -> Result<Vec<FileMetadata>, RemoteError>;

    async fn search_tables(
        &self,
        branch: &BranchId,
        key: &str,
        value: &str,
    ) -> Result<Vec<TableId>, RemoteError>;
}

#[async_trait]
pub trait JobApi: Send + Sync {
    async fn submit_load_job(&self, request: &LoadJobRequest) -> Result<JobId, RemoteError>;

    async fn poll_job(&self, id: &JobId) -> Result<JobStatus, RemoteError>;
}

#[async_trait]
pub trait BranchIntrospection: Send + Sync {
    /// Branch the current credentials operate in.
    async fn current_branch_id(&self) -> Result<BranchId, RemoteError>;

    async fn default_branch_id(&self) -> Result<BranchId, RemoteError>;

    async fn project_capabilities(&self) -> Result<ProjectCapabilities, RemoteError>;
}

#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    async fn create_workspace(&self, backend: Backend) -> Result<WorkspaceHandle, RemoteError>;

    async fn delete_workspace(&self, handle: &WorkspaceHandle) -> Result<(), RemoteError>;
}

