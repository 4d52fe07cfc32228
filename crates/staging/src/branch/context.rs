use crate::api::BranchIntrospection;
use crate::error::StagingError;
use crate::strategy::ProjectCapabilities;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

impl BranchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BranchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Branch setup of one run. Built once, never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchContext {
    pub active: BranchId,
    pub default: BranchId,
    pub has_native_branch_storage: bool,
}

impl BranchContext {
    /// Context of a run on the default branch.
    pub fn default_only(default: BranchId, has_native_branch_storage: bool) -> Self {
        Self {
            active: default.clone(),
            default,
            has_native_branch_storage,
        }
    }

    pub fn is_dev_branch(&self) -> bool {
        self.active != self.default
    }

    /// Branch ID, or `None` on the default branch.
    pub fn dev_branch(&self) -> Option<&BranchId> {
        self.is_dev_branch().then_some(&self.active)
    }
}

/// Reads the branch context and project capabilities for the current token.
///
/// `branch_override` replaces the token's own branch, e.g. when a run is
/// pinned to a branch from configuration.
pub async fn introspect(
    api: &dyn BranchIntrospection,
    branch_override: Option<BranchId>,
) -> Result<(BranchContext, ProjectCapabilities), StagingError> {
    let active = match branch_override {
        Some(branch) => branch,
        None => api.current_branch_id().await?,
    };
    let default = api.default_branch_id().await?;
    let capabilities = api.project_capabilities().await?;

    let context = BranchContext {
        active,
        default,
        has_native_branch_storage: capabilities.has_native_branch_storage,
    };
    if let Some(branch) = context.dev_branch() {
        info!(
            "Running in development branch {branch} ({} branch storage)",
            if context.has_native_branch_storage {
                "native"
            } else {
                "emulated"
            }
        );
    }
    Ok((context, capabilities))
}
