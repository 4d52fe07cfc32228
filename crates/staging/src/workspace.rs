use crate::api::WorkspaceApi;
use crate::error::StagingError;
use common::types::Backend;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

/// A staging workspace owned by the current run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceHandle {
    pub id: String,
    pub backend: Backend,
}

impl WorkspaceHandle {
    pub fn new(id: impl Into<String>, backend: Backend) -> Self {
        Self {
            id: id.into(),
            backend,
        }
    }
}

/// Creates a `backend` workspace, hands it to `f`, and deletes it afterwards
/// whatever `f` returned.
///
/// A failed delete is reported only when `f` itself succeeded; otherwise the
/// error from `f` wins.
pub async fn with_workspace<F, Fut, T>(
    api: &dyn WorkspaceApi,
    backend: Backend,
    f: F,
) -> Result<T, StagingError>
where
    F: FnOnce(WorkspaceHandle) -> Fut,
    Fut: Future<Output = Result<T, StagingError>>,
{
    let handle = api.create_workspace(backend).await?;
    info!("Created {} workspace {}", handle.backend, handle.id);

    let result = f(handle.clone()).await;

    let released = api.delete_workspace(&handle).await;
    match (&result, released) {
        (_, Ok(())) => info!("Deleted workspace {}", handle.id),
        (Ok(_), Err(err)) => return Err(err.into()),
        (Err(_), Err(err)) => warn!("Failed to delete workspace {}: {err}", handle.id),
    }
    result
}
