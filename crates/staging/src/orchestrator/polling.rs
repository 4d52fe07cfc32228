use crate::api::{JobApi, JobId, JobStatus, TransferMetrics};
use crate::error::StagingError;
use common::config::components::project::PollingConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Upper bound for waiting on all jobs of a run together.
    pub timeout: Duration,
}

impl PollSettings {
    pub fn from_config(cfg: &PollingConfig) -> Self {
        Self {
            interval: cfg.interval(),
            timeout: cfg.timeout(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3_600),
        }
    }
}

async fn poll_until_done(
    api: &dyn JobApi,
    id: &JobId,
    interval: Duration,
) -> Result<Vec<TransferMetrics>, StagingError> {
    loop {
        match api.poll_job(id).await? {
            JobStatus::Running => {
                debug!("Load job {id} still running");
                tokio::time::sleep(interval).await;
            }
            JobStatus::Succeeded(metrics) => return Ok(metrics),
            JobStatus::Failed(reason) => {
                return Err(StagingError::remote_job_failure(id.to_string(), reason))
            }
        }
    }
}

/// Waits for every job on its own task. Results come back in the order of
/// `jobs`; the first failure aborts the remaining polls.
pub(crate) async fn poll_all(
    api: Arc<dyn JobApi>,
    jobs: &[JobId],
    settings: PollSettings,
) -> Result<Vec<Vec<TransferMetrics>>, StagingError> {
    let mut tasks = JoinSet::new();
    for (index, id) in jobs.iter().cloned().enumerate() {
        let api = Arc::clone(&api);
        tasks.spawn(async move {
            let result = poll_until_done(api.as_ref(), &id, settings.interval).await;
            (index, result)
        });
    }

    let mut done = Vec::with_capacity(jobs.len());
    let collect = async {
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined
                .map_err(|err| StagingError::remote(format!("polling task failed: {err}")))?;
            done.push((index, result?));
        }
        Ok::<_, StagingError>(())
    };

    let Ok(collected) = tokio::time::timeout(settings.timeout, collect).await else {
        let finished: HashSet<usize> = done.iter().map(|(index, _)| *index).collect();
        let pending = jobs
            .iter()
            .enumerate()
            .filter(|(index, _)| !finished.contains(index))
            .map(|(_, id)| id.to_string())
            .collect::<Vec<_>>();
        return Err(StagingError::timeout(format!(
            "load jobs [{}] did not finish within {:?}",
            pending.join(", "),
            settings.timeout
        )));
    };
    collected?;
    done.sort_by_key(|(index, _)| *index);
    Ok(done.into_iter().map(|(_, metrics)| metrics).collect())
}
