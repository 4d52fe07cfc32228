use super::{
    log_provenance, no_search_match, search_unique, state_table_id, BranchContext, BranchId,
    InputRewriter, ResolvedFileInput, ResolvedTable,
};
use crate::api::{FileFilter, MetadataLookup};
use crate::error::StagingError;
use crate::query::tag_conjunction;
use crate::source::{FileInput, TableId, TableInput, TableSearchInput, Tag};
use crate::state::{SourceKey, StateSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Branches emulated inside production storage: branch tables live in
/// buckets named `c-<branch>-<bucket>`, branch files carry `<branch>-<tag>`
/// tags. Everything is physically stored in the default branch.
pub struct EmulatedBranchRewriter {
    context: BranchContext,
    metadata: Arc<dyn MetadataLookup>,
}

impl EmulatedBranchRewriter {
    pub fn new(context: BranchContext, metadata: Arc<dyn MetadataLookup>) -> Self {
        Self { context, metadata }
    }

    fn storage_branch(&self) -> BranchId {
        self.context.default.clone()
    }

    /// Prefixed counterpart of `id` if that table exists.
    async fn branch_table(&self, id: &TableId) -> Result<Option<TableId>, StagingError> {
        let Some(branch) = self.context.dev_branch() else {
            return Ok(None);
        };
        if is_branch_bucket(branch, id.bucket()) {
            return Ok(None);
        }
        let bucket = branch_bucket(branch, id.bucket());
        let candidate = TableId::new(id.stage(), &bucket, id.table()).map_err(|_| {
            StagingError::branch_resolution(format!(
                "cannot derive a branch table for '{id}' in branch {branch}: '{bucket}' is not a valid bucket"
            ))
        })?;

        let exists = self
            .metadata
            .table_exists(&self.context.default, &candidate)
            .await?;
        debug!("Branch table {candidate} exists: {exists}");
        Ok(exists.then_some(candidate))
    }

    /// Prefixed counterpart of `input` if any files carry its include tags.
    async fn branch_files(&self, input: &FileInput) -> Result<Option<FileInput>, StagingError> {
        let Some(branch) = self.context.dev_branch() else {
            return Ok(None);
        };
        if input.include_tags().all(|tag| is_branch_tag(branch, &tag.name)) {
            return Ok(None);
        }

        let physical = FileInput {
            tags: input
                .tags
                .iter()
                .map(|tag| Tag {
                    name: branch_tag(branch, &tag.name),
                    match_mode: tag.match_mode,
                })
                .collect(),
            processed_tags: input
                .processed_tags
                .iter()
                .map(|tag| branch_tag(branch, tag))
                .collect(),
            ..input.clone()
        };
        let include: Vec<Tag> = physical.include_tags().cloned().collect();
        let probe = FileFilter {
            query: tag_conjunction(&include).unwrap_or_default(),
            since: None,
            limit: 1,
        };

        let files = self
            .metadata
            .list_files(&self.context.default, &probe)
            .await?;
        debug!("Branch files for '{}': {}", probe.query, files.len());
        Ok((!files.is_empty()).then_some(physical))
    }
}

#[async_trait]
impl InputRewriter for EmulatedBranchRewriter {
    async fn search_table(&self, input: &TableSearchInput) -> Result<TableId, StagingError> {
        search_unique(self.metadata.as_ref(), &self.context.default, input)
            .await?
            .ok_or_else(|| no_search_match(input))
    }

    async fn rewrite_table(&self, input: &TableInput) -> Result<ResolvedTable, StagingError> {
        let Some(physical) = self.branch_table(&input.source).await? else {
            return Ok(ResolvedTable::unchanged(input, self.storage_branch()));
        };

        let resolved = ResolvedTable {
            provenance: Some(format!(
                "Using dev input \"{physical}\" instead of \"{}\".",
                input.source
            )),
            original: input.source.clone(),
            physical,
            branch: self.storage_branch(),
            options: input.options.clone(),
        };
        log_provenance(&resolved.provenance);
        Ok(resolved)
    }

    async fn rewrite_files(&self, input: &FileInput) -> Result<ResolvedFileInput, StagingError> {
        if let (Some(branch), Some(query)) = (self.context.dev_branch(), &input.query) {
            return Err(StagingError::branch_resolution(format!(
                "file query '{query}' cannot be isolated to development branch {branch}; select the files by tags instead"
            )));
        }
        let Some(physical) = self.branch_files(input).await? else {
            return Ok(ResolvedFileInput::unchanged(input, self.storage_branch()));
        };

        let resolved = ResolvedFileInput {
            provenance: Some(format!(
                "Using dev input \"{}\" instead of \"{}\".",
                physical.describe(),
                input.describe()
            )),
            original: input.clone(),
            physical,
            branch: self.storage_branch(),
        };
        log_provenance(&resolved.provenance);
        Ok(resolved)
    }

    async fn rewrite_state_destinations(
        &self,
        state: &StateSnapshot,
    ) -> Result<StateSnapshot, StagingError> {
        let mut rewritten = Vec::with_capacity(state.len());
        for (key, marker) in state.iter() {
            let key = match key {
                SourceKey::Table(raw) => {
                    let id = state_table_id(raw)?;
                    match self.branch_table(&id).await? {
                        Some(physical) => SourceKey::table(&physical),
                        None => key.clone(),
                    }
                }
                SourceKey::Files { tags, query: None } => {
                    let input = FileInput::tagged(tags.clone());
                    match self.branch_files(&input).await? {
                        Some(physical) => SourceKey::files(&physical),
                        None => key.clone(),
                    }
                }
                SourceKey::Files { .. } => key.clone(),
            };
            rewritten.push((key, marker.clone()));
        }
        Ok(rewritten.into_iter().collect())
    }
}

fn branch_bucket(branch: &BranchId, bucket: &str) -> String {
    let name = bucket.strip_prefix("c-").unwrap_or(bucket);
    format!("c-{branch}-{name}")
}

fn is_branch_bucket(branch: &BranchId, bucket: &str) -> bool {
    bucket.starts_with(&format!("c-{branch}-"))
}

fn branch_tag(branch: &BranchId, tag: &str) -> String {
    format!("{branch}-{tag}")
}

fn is_branch_tag(branch: &BranchId, tag: &str) -> bool {
    tag.starts_with(&format!("{branch}-"))
}
