//! Where staged data goes, and who serves it.

use crate::error::StagingError;
use crate::workspace::WorkspaceHandle;
use common::types::{Backend, ObjectStoreKind};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagingTarget {
    Local { path: PathBuf },
    ObjectStore { provider: ObjectStoreKind },
    Workspace(WorkspaceHandle),
}

impl StagingTarget {
    pub fn workspace_backend(&self) -> Option<Backend> {
        match self {
            StagingTarget::Workspace(handle) => Some(handle.backend),
            _ => None,
        }
    }
}

impl Display for StagingTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingTarget::Local { path } => write!(f, "local directory {}", path.display()),
            StagingTarget::ObjectStore { provider } => write!(f, "{provider} object store"),
            StagingTarget::Workspace(handle) => {
                write!(f, "{} workspace {}", handle.backend, handle.id)
            }
        }
    }
}

/// What the project behind the current token can do.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectCapabilities {
    #[serde(default)]
    pub backends: Vec<Backend>,
    #[serde(default)]
    pub object_stores: Vec<ObjectStoreKind>,
    #[serde(default)]
    pub has_native_branch_storage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LocalFilesystem,
    ObjectStore(ObjectStoreKind),
    Workspace(Backend),
}

/// Data and metadata may come from different providers for the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingStrategy {
    pub data: Provider,
    pub metadata: Provider,
    /// Per-table clone/view/copy decisions apply.
    pub decides_load_types: bool,
    /// Several inputs may share one load job. Exports to local disk and
    /// object stores run as one job per input.
    pub supports_batched_jobs: bool,
    /// One job may carry groups of different load types.
    pub supports_mixed_batches: bool,
}

impl StagingStrategy {
    pub fn workspace_backend(&self) -> Option<Backend> {
        match self.data {
            Provider::Workspace(backend) => Some(backend),
            _ => None,
        }
    }
}

pub fn resolve_strategy(
    target: &StagingTarget,
    capabilities: &ProjectCapabilities,
) -> Result<StagingStrategy, StagingError> {
    match target {
        StagingTarget::Local { .. } => Ok(StagingStrategy {
            data: Provider::LocalFilesystem,
            metadata: Provider::LocalFilesystem,
            decides_load_types: false,
            supports_batched_jobs: false,
            supports_mixed_batches: false,
        }),
        StagingTarget::ObjectStore { provider } => {
            if !capabilities.object_stores.contains(provider) {
                return Err(StagingError::backend_unsupported(format!(
                    "object store '{provider}' is not configured for this project (available: {})",
                    list(&capabilities.object_stores)
                )));
            }
            Ok(StagingStrategy {
                data: Provider::ObjectStore(*provider),
                metadata: Provider::LocalFilesystem,
                decides_load_types: false,
                supports_batched_jobs: false,
                supports_mixed_batches: false,
            })
        }
        StagingTarget::Workspace(handle) => {
            let backend = handle.backend;
            if !capabilities.backends.contains(&backend) {
                return Err(StagingError::backend_unsupported(format!(
                    "workspace backend '{backend}' is not available to this project (available: {})",
                    list(&capabilities.backends)
                )));
            }
            Ok(StagingStrategy {
                data: Provider::Workspace(backend),
                metadata: Provider::LocalFilesystem,
                decides_load_types: true,
                supports_batched_jobs: true,
                supports_mixed_batches: backend.supports_mixed_load_jobs(),
            })
        }
    }
}

fn list<T: Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
