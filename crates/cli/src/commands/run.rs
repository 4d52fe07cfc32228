use crate::commands::state_file::{load_state, save_state};
use clap::Args;
use common::config::loader::{read_config, storage_token};
use common::config::{StagerConfig, TargetConfig};
use common::error::AppError;
use shared_clients::StorageApiClient;
use staging::branch::{introspect, BranchId};
use staging::strategy::{resolve_strategy, ProjectCapabilities, StagingTarget};
use staging::workspace::{with_workspace, WorkspaceHandle};
use staging::{Orchestrator, PollSettings, SourceSpec, StagingError, TransferOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// State file; overrides `state_path` from the project file
    #[arg(long)]
    pub state: Option<PathBuf>,
    /// Branch to run in instead of the token's own
    #[arg(long)]
    pub branch: Option<String>,
}

pub fn handle_run(args: &RunArgs, config_path: Option<PathBuf>) -> Result<(), AppError> {
    let config = read_config(config_path).map_err(AppError::init)?;
    let runtime = Runtime::new().map_err(AppError::init)?;
    runtime.block_on(run(args, config))
}

async fn run(args: &RunArgs, config: StagerConfig) -> Result<(), AppError> {
    let specs = SourceSpec::from_mapping(&config.input).map_err(AppError::init)?;
    let token = storage_token(&config.storage).map_err(AppError::init)?;
    let client = Arc::new(StorageApiClient::new(&config.storage.url, token));

    let branch = args.branch.clone().or(config.branch.clone()).map(BranchId::new);
    let (context, capabilities) = introspect(client.as_ref(), branch)
        .await
        .map_err(AppError::init)?;

    check_target(&config.target, &capabilities).map_err(AppError::init)?;

    let state_path = args.state.clone().or(config.state_path.clone());
    let prior = load_state(state_path.as_deref())?;

    let orchestrator = Orchestrator::new(
        client.clone(),
        client.clone(),
        capabilities,
        PollSettings::from_config(&config.polling),
    );

    let outcome = match &config.target {
        TargetConfig::Workspace {
            backend,
            workspace_id: None,
        } => {
            with_workspace(client.as_ref(), *backend, |handle| {
                let orchestrator = &orchestrator;
                let specs = &specs;
                let context = &context;
                let prior = &prior;
                async move {
                    orchestrator
                        .resolve_and_transfer(
                            specs,
                            context,
                            prior,
                            &StagingTarget::Workspace(handle),
                        )
                        .await
                }
            })
            .await
        }
        target => {
            orchestrator
                .resolve_and_transfer(&specs, &context, &prior, &staging_target(target))
                .await
        }
    }
    .map_err(AppError::run)?;

    report(&outcome);
    save_state(state_path.as_deref(), &outcome.state)
}

/// Fails on an unavailable backend before a scoped workspace is created.
fn check_target(
    target: &TargetConfig,
    capabilities: &ProjectCapabilities,
) -> Result<(), StagingError> {
    resolve_strategy(&staging_target(target), capabilities).map(|_| ())
}

fn staging_target(target: &TargetConfig) -> StagingTarget {
    match target {
        TargetConfig::Local { path } => StagingTarget::Local { path: path.clone() },
        TargetConfig::ObjectStore { provider } => StagingTarget::ObjectStore {
            provider: *provider,
        },
        TargetConfig::Workspace {
            backend,
            workspace_id,
        } => StagingTarget::Workspace(WorkspaceHandle::new(
            workspace_id.clone().unwrap_or_default(),
            *backend,
        )),
    }
}

fn report(outcome: &TransferOutcome) {
    for result in &outcome.results {
        info!(
            "{} -> {} ({}, job {}): {} object(s), {} byte(s)",
            result.key,
            result.destination,
            result.load_type,
            result.job_id,
            result.objects,
            result.bytes
        );
    }
    info!(
        "Staged {} input(s) in {} job(s)",
        outcome.results.len(),
        outcome.jobs.len()
    );
}
