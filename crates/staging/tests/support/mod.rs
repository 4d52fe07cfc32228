#![allow(dead_code)]

use async_trait::async_trait;
use common::types::{Backend, ObjectStoreKind};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use staging::api::{
    BranchIntrospection, FileFilter, FileMetadata, JobApi, JobId, JobStatus, LoadJobRequest,
    MetadataLookup, RemoteError, TransferMetrics, WorkspaceApi,
};
use staging::branch::{BranchContext, BranchId};
use staging::load_type::TableMetadata;
use staging::source::TableId;
use staging::state::{ChangeFilter, Marker};
use staging::strategy::ProjectCapabilities;
use staging::workspace::WorkspaceHandle;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

static TAG_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(NOT )?tags:"([^"]+)""#).expect("tag clause pattern"));

pub const DEFAULT_BRANCH: &str = "100";
pub const DEV_BRANCH: &str = "123";

pub fn default_branch() -> BranchId {
    BranchId::new(DEFAULT_BRANCH)
}

pub fn dev_branch() -> BranchId {
    BranchId::new(DEV_BRANCH)
}

pub fn dev_context(native: bool) -> BranchContext {
    BranchContext {
        active: dev_branch(),
        default: default_branch(),
        has_native_branch_storage: native,
    }
}

pub fn default_context(native: bool) -> BranchContext {
    BranchContext::default_only(default_branch(), native)
}

pub fn table_id(raw: &str) -> TableId {
    raw.parse().expect("valid table id")
}

/// How a submitted job behaves when polled.
#[derive(Debug, Clone)]
pub enum JobScript {
    /// Running for `polls` polls, then succeeded.
    SucceedAfter(usize),
    Fail(String),
    /// Never leaves `Running`.
    Hang,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<(BranchId, TableId), TableMetadata>,
    files: Vec<(BranchId, FileMetadata)>,
    searchable: Vec<(BranchId, String, String, TableId)>,
    table_probes: Vec<(BranchId, TableId)>,
    file_probes: Vec<(BranchId, String)>,
    scripts: VecDeque<JobScript>,
    jobs: HashMap<JobId, (JobScript, LoadJobRequest, usize)>,
    submitted: Vec<LoadJobRequest>,
    transferred: HashMap<String, (u64, Option<Marker>)>,
    rejected_markers: HashSet<String>,
    capabilities: ProjectCapabilities,
    token_branch: Option<BranchId>,
    created_workspaces: Vec<WorkspaceHandle>,
    deleted_workspaces: Vec<WorkspaceHandle>,
}

/// In-memory storage API. Jobs succeed on the first poll unless scripted
/// otherwise; each transferred item reports one object unless
/// [`FakeStorage::set_transfer`] says differently.
#[derive(Default)]
pub struct FakeStorage {
    inner: RwLock<Inner>,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_capabilities(capabilities: ProjectCapabilities) -> Arc<Self> {
        let storage = Self::default();
        storage.inner.write().capabilities = capabilities;
        Arc::new(storage)
    }

    /// Scopes the token to `branch`; unscoped tokens work in the default one.
    pub fn scope_token_to(&self, branch: &BranchId) {
        self.inner.write().token_branch = Some(branch.clone());
    }

    pub fn add_table(&self, branch: &BranchId, id: &str, backend: Backend) {
        let id = table_id(id);
        let meta = TableMetadata {
            id: id.clone(),
            backend,
            is_alias: false,
            alias_columns_auto_sync: false,
            alias_row_filter: false,
        };
        self.inner.write().tables.insert((branch.clone(), id), meta);
    }

    pub fn add_file(&self, branch: &BranchId, name: &str, tags: &[&str]) {
        let mut inner = self.inner.write();
        let id = inner.files.len() as u64 + 1;
        inner.files.push((
            branch.clone(),
            FileMetadata {
                id,
                name: name.to_string(),
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
            },
        ));
    }

    pub fn add_searchable(&self, branch: &BranchId, key: &str, value: &str, id: &str) {
        self.inner.write().searchable.push((
            branch.clone(),
            key.to_string(),
            value.to_string(),
            table_id(id),
        ));
    }

    pub fn script_jobs(&self, scripts: impl IntoIterator<Item = JobScript>) {
        self.inner.write().scripts.extend(scripts);
    }

    /// Objects and marker reported for transfers into `destination`.
    pub fn set_transfer(&self, destination: &str, objects: u64, marker: Option<&str>) {
        self.inner.write().transferred.insert(
            destination.to_string(),
            (objects, marker.map(Marker::new)),
        );
    }

    pub fn reject_marker(&self, marker: &str) {
        self.inner.write().rejected_markers.insert(marker.to_string());
    }

    pub fn submitted(&self) -> Vec<LoadJobRequest> {
        self.inner.read().submitted.clone()
    }

    pub fn table_probes(&self) -> Vec<(BranchId, TableId)> {
        self.inner.read().table_probes.clone()
    }

    pub fn file_probes(&self) -> Vec<(BranchId, String)> {
        self.inner.read().file_probes.clone()
    }

    pub fn created_workspaces(&self) -> Vec<WorkspaceHandle> {
        self.inner.read().created_workspaces.clone()
    }

    pub fn deleted_workspaces(&self) -> Vec<WorkspaceHandle> {
        self.inner.read().deleted_workspaces.clone()
    }
}

/// Include tags must all be present, exclude tags absent.
fn matches_query(query: &str, file: &FileMetadata) -> bool {
    TAG_CLAUSE.captures_iter(query).all(|caps| {
        let has_tag = file.tags.iter().any(|tag| tag == &caps[2]);
        if caps.get(1).is_some() {
            !has_tag
        } else {
            has_tag
        }
    })
}

#[async_trait]
impl MetadataLookup for FakeStorage {
    async fn table_exists(&self, branch: &BranchId, id: &TableId) -> Result<bool, RemoteError> {
        let mut inner = self.inner.write();
        inner.table_probes.push((branch.clone(), id.clone()));
        Ok(inner.tables.contains_key(&(branch.clone(), id.clone())))
    }

    async fn table_info(
        &self,
        branch: &BranchId,
        id: &TableId,
    ) -> Result<TableMetadata, RemoteError> {
        self.inner
            .read()
            .tables
            .get(&(branch.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("table {id} in branch {branch}")))
    }

    async fn list_files(
        &self,
        branch: &BranchId,
        filter: &FileFilter,
    ) -> Result<Vec<FileMetadata>, RemoteError> {
        let mut inner = self.inner.write();
        inner
            .file_probes
            .push((branch.clone(), filter.query.clone()));
        Ok(inner
            .files
            .iter()
            .filter(|(owner, file)| owner == branch && matches_query(&filter.query, file))
            .map(|(_, file)| file.clone())
            .take(filter.limit as usize)
            .collect())
    }

    async fn search_tables(
        &self,
        branch: &BranchId,
        key: &str,
        value: &str,
    ) -> Result<Vec<TableId>, RemoteError> {
        Ok(self
            .inner
            .read()
            .searchable
            .iter()
            .filter(|(owner, k, v, _)| owner == branch && k == key && v == value)
            .map(|(_, _, _, id)| id.clone())
            .collect())
    }
}

#[async_trait]
impl JobApi for FakeStorage {
    async fn submit_load_job(&self, request: &LoadJobRequest) -> Result<JobId, RemoteError> {
        let mut inner = self.inner.write();
        for item in request.groups.iter().flat_map(|group| group.items.iter()) {
            if let ChangeFilter::After(marker) = &item.change_filter {
                if inner.rejected_markers.contains(marker.as_str()) {
                    return Err(RemoteError::invalid_marker(format!(
                        "cannot parse changed since value '{marker}'"
                    )));
                }
            }
        }

        let id = JobId(format!("job-{}", inner.submitted.len() + 1));
        let script = inner
            .scripts
            .pop_front()
            .unwrap_or(JobScript::SucceedAfter(0));
        inner.submitted.push(request.clone());
        inner
            .jobs
            .insert(id.clone(), (script, request.clone(), 0));
        Ok(id)
    }

    async fn poll_job(&self, id: &JobId) -> Result<JobStatus, RemoteError> {
        let mut inner = self.inner.write();
        let transferred = inner.transferred.clone();
        let (script, request, polls) = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| RemoteError::not_found(format!("job {id}")))?;
        *polls += 1;

        Ok(match script {
            JobScript::SucceedAfter(running) if *polls > *running => JobStatus::Succeeded(
                request
                    .groups
                    .iter()
                    .flat_map(|group| group.items.iter())
                    .map(|item| {
                        let (objects, marker) = transferred
                            .get(&item.destination)
                            .cloned()
                            .unwrap_or((1, None));
                        TransferMetrics {
                            key: item.key.clone(),
                            destination: item.destination.clone(),
                            objects,
                            bytes: objects * 1_024,
                            rows: Some(objects * 10),
                            last_marker: marker,
                        }
                    })
                    .collect(),
            ),
            JobScript::Fail(reason) => JobStatus::Failed(reason.clone()),
            JobScript::SucceedAfter(_) | JobScript::Hang => JobStatus::Running,
        })
    }
}

#[async_trait]
impl BranchIntrospection for FakeStorage {
    async fn current_branch_id(&self) -> Result<BranchId, RemoteError> {
        Ok(self
            .inner
            .read()
            .token_branch
            .clone()
            .unwrap_or_else(default_branch))
    }

    async fn default_branch_id(&self) -> Result<BranchId, RemoteError> {
        Ok(default_branch())
    }

    async fn project_capabilities(&self) -> Result<ProjectCapabilities, RemoteError> {
        Ok(self.inner.read().capabilities.clone())
    }
}

#[async_trait]
impl WorkspaceApi for FakeStorage {
    async fn create_workspace(&self, backend: Backend) -> Result<WorkspaceHandle, RemoteError> {
        let mut inner = self.inner.write();
        let handle = WorkspaceHandle::new(
            format!("ws-{}", inner.created_workspaces.len() + 1),
            backend,
        );
        inner.created_workspaces.push(handle.clone());
        Ok(handle)
    }

    async fn delete_workspace(&self, handle: &WorkspaceHandle) -> Result<(), RemoteError> {
        self.inner.write().deleted_workspaces.push(handle.clone());
        Ok(())
    }
}

pub fn snowflake_project() -> ProjectCapabilities {
    ProjectCapabilities {
        backends: vec![Backend::Snowflake],
        object_stores: vec![ObjectStoreKind::S3],
        has_native_branch_storage: false,
    }
}
