//! Runs one input staging pass end to end.
//!
//! `Resolving -> Deciding -> Submitting -> Polling -> Completed | Failed`.
//! Nothing is submitted unless every source resolved, and any failed or
//! timed out job fails the whole run.

mod batching;
mod polling;

pub use polling::PollSettings;

use crate::api::{
    JobApi, JobId, LoadItem, LoadJobRequest, LoadSource, MetadataLookup, TransferMetrics,
};
use crate::branch::{rewriter_for, BranchContext, BranchId, InputRewriter, ResolvedSource};
use crate::error::StagingError;
use crate::load_type::{decide, LoadType, TransferOptions};
use crate::query::build_query;
use crate::source::{ChangeSince, SourceSpec, TableInput};
use crate::state::{
    resolve_change_filter, update_state, ChangeFilter, Marker, SourceKey, StateSnapshot,
};
use crate::strategy::{resolve_strategy, ProjectCapabilities, StagingStrategy, StagingTarget};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Destination of file inputs that do not name one.
pub const DEFAULT_FILE_DESTINATION: &str = "files";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Resolving,
    Deciding,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl Display for RunPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Resolving => "resolving",
            RunPhase::Deciding => "deciding",
            RunPhase::Submitting => "submitting",
            RunPhase::Polling => "polling",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

struct PhaseLog {
    current: RunPhase,
}

impl PhaseLog {
    fn start() -> Self {
        info!("Input staging: {}", RunPhase::Resolving);
        Self {
            current: RunPhase::Resolving,
        }
    }

    fn enter(&mut self, next: RunPhase) {
        info!("Input staging: {} -> {next}", self.current);
        self.current = next;
    }

    fn fail(&mut self, err: &StagingError) {
        error!(
            "Input staging: {} -> {}: {err}",
            self.current,
            RunPhase::Failed
        );
        self.current = RunPhase::Failed;
    }
}

/// Outcome for one source of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub key: SourceKey,
    pub destination: String,
    pub branch: BranchId,
    pub load_type: LoadType,
    pub job_id: JobId,
    pub objects: u64,
    pub bytes: u64,
    pub rows: Option<u64>,
    pub last_marker: Option<Marker>,
    pub provenance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub results: Vec<TransferResult>,
    /// Prior state plus every marker produced by this run.
    pub state: StateSnapshot,
    pub jobs: Vec<JobId>,
}

struct Resolved {
    source: ResolvedSource,
    change_filter: ChangeFilter,
}

pub struct Orchestrator {
    metadata: Arc<dyn MetadataLookup>,
    jobs: Arc<dyn JobApi>,
    capabilities: ProjectCapabilities,
    settings: PollSettings,
    clock: fn() -> DateTime<Utc>,
}

impl Orchestrator {
    pub fn new(
        metadata: Arc<dyn MetadataLookup>,
        jobs: Arc<dyn JobApi>,
        capabilities: ProjectCapabilities,
        settings: PollSettings,
    ) -> Self {
        Self {
            metadata,
            jobs,
            capabilities,
            settings,
            clock: Utc::now,
        }
    }

    /// Fixes "now" for relative time filters.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn resolve_and_transfer(
        &self,
        specs: &[SourceSpec],
        context: &BranchContext,
        prior: &StateSnapshot,
        target: &StagingTarget,
    ) -> Result<TransferOutcome, StagingError> {
        let mut phases = PhaseLog::start();
        match self.run(&mut phases, specs, context, prior, target).await {
            Ok(outcome) => {
                phases.enter(RunPhase::Completed);
                Ok(outcome)
            }
            Err(err) => {
                phases.fail(&err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        phases: &mut PhaseLog,
        specs: &[SourceSpec],
        context: &BranchContext,
        prior: &StateSnapshot,
        target: &StagingTarget,
    ) -> Result<TransferOutcome, StagingError> {
        check_unique_destinations(specs)?;
        let strategy = resolve_strategy(target, &self.capabilities)?;
        let rewriter = rewriter_for(context, Arc::clone(&self.metadata));
        let state = rewriter.rewrite_state_destinations(prior).await?;

        let mut resolved = Vec::with_capacity(specs.len());
        for spec in specs {
            let source = resolve_source(rewriter.as_ref(), spec).await?;
            let change_filter = resolve_change_filter(spec.change_since(), &state, &source.key());
            resolved.push(Resolved {
                source,
                change_filter,
            });
        }

        phases.enter(RunPhase::Deciding);
        let mut items = Vec::with_capacity(resolved.len());
        for entry in &resolved {
            items.push(self.load_item(&strategy, entry).await?);
        }

        phases.enter(RunPhase::Submitting);
        let requests = batching::plan_jobs(target, &strategy, items);
        let mut job_ids = Vec::with_capacity(requests.len());
        for request in &requests {
            let id = self.jobs.submit_load_job(request).await?;
            info!(
                "Submitted load job {id} with {} input(s) into {target}",
                request.item_count()
            );
            job_ids.push(id);
        }

        phases.enter(RunPhase::Polling);
        let metrics = polling::poll_all(Arc::clone(&self.jobs), &job_ids, self.settings).await?;

        let mut results = Vec::new();
        let mut updates = StateSnapshot::new();
        for ((request, id), reported) in requests.iter().zip(&job_ids).zip(metrics) {
            for mut result in collect_results(request, id, &reported) {
                let marker = result.last_marker.clone().filter(|_| result.objects > 0);
                updates = update_state(&updates, result.key.clone(), marker);
                result.provenance = resolved
                    .iter()
                    .find(|entry| entry.source.key() == result.key)
                    .and_then(|entry| entry.source.provenance().map(str::to_string));
                results.push(result);
            }
        }
        debug!("Run produced {} state entries", updates.len());

        Ok(TransferOutcome {
            results,
            state: prior.merge(&state).merge(&updates),
            jobs: job_ids,
        })
    }

    async fn load_item(
        &self,
        strategy: &StagingStrategy,
        entry: &Resolved,
    ) -> Result<LoadItem, StagingError> {
        let key = entry.source.key();
        match &entry.source {
            ResolvedSource::Table(table) => {
                let load_type = match strategy.workspace_backend() {
                    Some(backend) if strategy.decides_load_types => {
                        let meta = self
                            .metadata
                            .table_info(&table.branch, &table.physical)
                            .await?;
                        let options =
                            TransferOptions::for_table(&table.options, entry.change_filter.clone());
                        let load_type = decide(&meta, backend, &options);
                        debug!("{} loads into {backend} workspace as {load_type}", table.physical);
                        load_type
                    }
                    _ => LoadType::Copy,
                };
                Ok(LoadItem {
                    key,
                    source: LoadSource::Table {
                        id: table.physical.clone(),
                        branch: table.branch.clone(),
                        columns: table.options.columns.clone(),
                        where_filter: table.options.where_filter.clone(),
                        limit: table.options.limit,
                        overwrite: table.options.overwrite,
                    },
                    destination: table.options.destination.clone(),
                    load_type,
                    change_filter: entry.change_filter.clone(),
                })
            }
            ResolvedSource::Files(files) => {
                let input = &files.physical;
                // literal filters are part of the query already
                let change_filter = match &input.change_since {
                    ChangeSince::Adaptive => entry.change_filter.clone(),
                    ChangeSince::Empty | ChangeSince::Literal(_) => ChangeFilter::None,
                };
                Ok(LoadItem {
                    key,
                    source: LoadSource::Files {
                        query: build_query(input, (self.clock)())?,
                        branch: files.branch.clone(),
                        limit: input.limit,
                        processed_tags: input.processed_tags.clone(),
                        overwrite: input.overwrite,
                    },
                    destination: input
                        .destination
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FILE_DESTINATION.to_string()),
                    load_type: LoadType::Copy,
                    change_filter,
                })
            }
        }
    }
}

async fn resolve_source(
    rewriter: &dyn InputRewriter,
    spec: &SourceSpec,
) -> Result<ResolvedSource, StagingError> {
    match spec {
        SourceSpec::TableById(input) => Ok(ResolvedSource::Table(rewriter.rewrite_table(input).await?)),
        SourceSpec::TableBySearch(search) => {
            let source = rewriter.search_table(search).await?;
            info!(
                "Table search '{}={}' resolved to {source}",
                search.key, search.value
            );
            let input = TableInput {
                source,
                options: search.options.clone(),
            };
            Ok(ResolvedSource::Table(rewriter.rewrite_table(&input).await?))
        }
        SourceSpec::FileByTags(input) | SourceSpec::FileByQuery(input) => {
            Ok(ResolvedSource::Files(rewriter.rewrite_files(input).await?))
        }
    }
}

/// Two table inputs writing the same destination would overwrite each other.
fn check_unique_destinations(specs: &[SourceSpec]) -> Result<(), StagingError> {
    let mut seen = HashSet::new();
    for spec in specs {
        let destination = match spec {
            SourceSpec::TableById(input) => &input.options.destination,
            SourceSpec::TableBySearch(input) => &input.options.destination,
            SourceSpec::FileByTags(_) | SourceSpec::FileByQuery(_) => continue,
        };
        if !seen.insert(destination.as_str()) {
            return Err(StagingError::invalid_spec(format!(
                "destination '{destination}' is used by more than one table input ({})",
                spec.describe()
            )));
        }
    }
    Ok(())
}

fn find_metrics<'a>(
    reported: &'a [TransferMetrics],
    key: &SourceKey,
    destination: &str,
) -> Option<&'a TransferMetrics> {
    reported
        .iter()
        .find(|metrics| metrics.key == *key && metrics.destination == destination)
}

fn collect_results(
    request: &LoadJobRequest,
    id: &JobId,
    reported: &[TransferMetrics],
) -> Vec<TransferResult> {
    request
        .groups
        .iter()
        .flat_map(|group| group.items.iter())
        .map(|item| {
            let metrics = find_metrics(reported, &item.key, &item.destination);
            if metrics.is_none() {
                warn!(
                    "Load job {id} reported nothing for {} -> {}",
                    item.key, item.destination
                );
            }
            TransferResult {
                key: item.key.clone(),
                destination: item.destination.clone(),
                branch: match &item.source {
                    LoadSource::Table { branch, .. } | LoadSource::Files { branch, .. } => {
                        branch.clone()
                    }
                },
                load_type: item.load_type,
                job_id: id.clone(),
                objects: metrics.map_or(0, |m| m.objects),
                bytes: metrics.map_or(0, |m| m.bytes),
                rows: metrics.and_then(|m| m.rows),
                last_marker: metrics.and_then(|m| m.last_marker.clone()),
                provenance: None,
            }
        })
        .collect()
}
