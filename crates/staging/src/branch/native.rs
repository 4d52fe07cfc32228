use super::{
    no_search_match, search_unique, state_table_id, BranchContext, BranchId,
    InputRewriter, ResolvedFileInput, ResolvedTable,
};
use crate::api::{FileFilter, MetadataLookup};
use crate::error::StagingError;
use crate::query::selection_query;
use crate::source::{FileInput, TableId, TableInput, TableSearchInput};
use crate::state::{SourceKey, StateSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Branch-scoped storage: reads go to the development branch and fall back
/// to the default branch when the data is not there.
pub struct NativeBranchRewriter {
    context: BranchContext,
    metadata: Arc<dyn MetadataLookup>,
}

impl NativeBranchRewriter {
    pub fn new(context: BranchContext, metadata: Arc<dyn MetadataLookup>) -> Self {
        Self { context, metadata }
    }

    fn fallback_note(&self, branch: &BranchId, what: &str) -> String {
        format!(
            "Input \"{what}\" not found in branch {branch}, using default branch {} instead.",
            self.context.default
        )
    }
}

#[async_trait]
impl InputRewriter for NativeBranchRewriter {
    async fn search_table(&self, input: &TableSearchInput) -> Result<TableId, StagingError> {
        let metadata = self.metadata.as_ref();
        if let Some(found) = search_unique(metadata, &self.context.active, input).await? {
            return Ok(found);
        }
        if self.context.is_dev_branch() {
            if let Some(found) = search_unique(metadata, &self.context.default, input).await? {
                return Ok(found);
            }
        }
        Err(no_search_match(input))
    }

    async fn rewrite_table(&self, input: &TableInput) -> Result<ResolvedTable, StagingError> {
        let Some(branch) = self.context.dev_branch() else {
            return Ok(ResolvedTable::unchanged(input, self.context.active.clone()));
        };
        if self.metadata.table_exists(branch, &input.source).await? {
            return Ok(ResolvedTable::unchanged(input, branch.clone()));
        }

        let provenance = self.fallback_note(branch, &input.source.to_string());
        warn!("{provenance}");
        Ok(ResolvedTable {
            provenance: Some(provenance),
            ..ResolvedTable::unchanged(input, self.context.default.clone())
        })
    }

    async fn rewrite_files(&self, input: &FileInput) -> Result<ResolvedFileInput, StagingError> {
        let Some(branch) = self.context.dev_branch() else {
            return Ok(ResolvedFileInput::unchanged(input, self.context.active.clone()));
        };
        // excluded tags mark already processed files; those still prove the
        // branch owns this input
        let owned = FileInput {
            tags: input.include_tags().cloned().collect(),
            ..input.clone()
        };
        let probe = FileFilter {
            query: selection_query(&owned),
            since: None,
            limit: 1,
        };
        if !self.metadata.list_files(branch, &probe).await?.is_empty() {
            return Ok(ResolvedFileInput::unchanged(input, branch.clone()));
        }

        let provenance = self.fallback_note(branch, &input.describe());
        warn!("{provenance}");
        Ok(ResolvedFileInput {
            provenance: Some(provenance),
            ..ResolvedFileInput::unchanged(input, self.context.default.clone())
        })
    }

    /// Keys stay as they are; the same IDs name data in every branch.
    async fn rewrite_state_destinations(
        &self,
        state: &StateSnapshot,
    ) -> Result<StateSnapshot, StagingError> {
        for (key, _) in state.iter() {
            if let SourceKey::Table(raw) = key {
                state_table_id(raw)?;
            }
        }
        Ok(state.clone())
    }
}
