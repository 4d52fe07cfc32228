use crate::types::{Backend, ObjectStoreKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

///  ---------------- Staging target config ----------------
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetConfig {
    Local {
        path: PathBuf,
    },
    ObjectStore {
        provider: ObjectStoreKind,
    },
    Workspace {
        backend: Backend,
        /// Existing workspace to load into; a scoped workspace is created
        /// (and dropped afterwards) when absent.
        #[serde(default)]
        workspace_id: Option<String>,
    },
}
