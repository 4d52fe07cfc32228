//! Development branch rewriting of inputs.
//!
//! A run in a development branch reads branch data where it exists and
//! production data otherwise. How "branch data" is located depends on the
//! project: older projects emulate branches with prefixed bucket and tag
//! names, newer ones have branch-scoped storage. [`rewriter_for`] picks the
//! matching [`InputRewriter`] once per run.

mod context;
mod emulated;
mod native;

pub use context::{introspect, BranchContext, BranchId};
pub use emulated::EmulatedBranchRewriter;
pub use native::NativeBranchRewriter;

use crate::api::MetadataLookup;
use crate::error::StagingError;
use crate::source::{FileInput, TableId, TableInput, TableOptions, TableSearchInput};
use crate::state::{SourceKey, StateSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// A table input bound to the physical table and branch it is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTable {
    pub original: TableId,
    pub physical: TableId,
    pub branch: BranchId,
    pub options: TableOptions,
    pub provenance: Option<String>,
}

impl ResolvedTable {
    fn unchanged(input: &TableInput, branch: BranchId) -> Self {
        Self {
            original: input.source.clone(),
            physical: input.source.clone(),
            branch,
            options: input.options.clone(),
            provenance: None,
        }
    }

    /// The input this table was resolved from.
    pub fn unresolved(&self) -> TableInput {
        TableInput {
            source: self.original.clone(),
            options: self.options.clone(),
        }
    }
}

/// A file input with the tags actually searched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFileInput {
    pub original: FileInput,
    pub physical: FileInput,
    pub branch: BranchId,
    pub provenance: Option<String>,
}

impl ResolvedFileInput {
    fn unchanged(input: &FileInput, branch: BranchId) -> Self {
        Self {
            original: input.clone(),
            physical: input.clone(),
            branch,
            provenance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Table(ResolvedTable),
    Files(ResolvedFileInput),
}

impl ResolvedSource {
    /// State key of the data actually read.
    pub fn key(&self) -> SourceKey {
        match self {
            ResolvedSource::Table(table) => SourceKey::table(&table.physical),
            ResolvedSource::Files(files) => SourceKey::files(&files.physical),
        }
    }

    pub fn branch(&self) -> &BranchId {
        match self {
            ResolvedSource::Table(table) => &table.branch,
            ResolvedSource::Files(files) => &files.branch,
        }
    }

    pub fn provenance(&self) -> Option<&str> {
        match self {
            ResolvedSource::Table(table) => table.provenance.as_deref(),
            ResolvedSource::Files(files) => files.provenance.as_deref(),
        }
    }
}

#[async_trait]
pub trait InputRewriter: Send + Sync {
    /// Locates a table searched by metadata; exactly one match is required.
    async fn search_table(&self, input: &TableSearchInput) -> Result<TableId, StagingError>;

    async fn rewrite_table(&self, input: &TableInput) -> Result<ResolvedTable, StagingError>;

    async fn rewrite_files(&self, input: &FileInput) -> Result<ResolvedFileInput, StagingError>;

    /// Rewrites state keys the way sources are rewritten, so adaptive lookups
    /// find markers stored for the physical source.
    async fn rewrite_state_destinations(
        &self,
        state: &StateSnapshot,
    ) -> Result<StateSnapshot, StagingError>;
}

pub fn rewriter_for(
    context: &BranchContext,
    metadata: Arc<dyn MetadataLookup>,
) -> Box<dyn InputRewriter> {
    if context.has_native_branch_storage {
        Box::new(NativeBranchRewriter::new(context.clone(), metadata))
    } else {
        Box::new(EmulatedBranchRewriter::new(context.clone(), metadata))
    }
}

fn log_provenance(provenance: &Option<String>) {
    if let Some(note) = provenance {
        info!("{note}");
    }
}

/// Table ID stored in a state key.
fn state_table_id(raw: &str) -> Result<TableId, StagingError> {
    raw.parse().map_err(|_| {
        StagingError::branch_resolution(format!(
            "state entry '{raw}' is not a table ID of the form {{stage}}.{{bucket}}.{{table}}"
        ))
    })
}

/// `Ok(None)` when nothing matches in `branch`.
async fn search_unique(
    metadata: &dyn MetadataLookup,
    branch: &BranchId,
    input: &TableSearchInput,
) -> Result<Option<TableId>, StagingError> {
    let mut found = metadata
        .search_tables(branch, &input.key, &input.value)
        .await?;
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        n => Err(StagingError::invalid_spec(format!(
            "table search '{}={}' is ambiguous: {n} tables match ({})",
            input.key,
            input.value,
            found
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn no_search_match(input: &TableSearchInput) -> StagingError {
    StagingError::invalid_spec(format!(
        "table search '{}={}' matched no table",
        input.key, input.value
    ))
}
