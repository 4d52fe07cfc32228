use crate::api::{LoadGroup, LoadItem, LoadJobRequest};
use crate::load_type::group_consecutive;
use crate::strategy::{StagingStrategy, StagingTarget};

/// Splits decided items into load jobs.
///
/// Runs of equal load types form groups. A target with mixed batch support
/// gets every group in a single job; other batching targets get one job per
/// group, and targets without batching one job per item.
pub(crate) fn plan_jobs(
    target: &StagingTarget,
    strategy: &StagingStrategy,
    items: Vec<LoadItem>,
) -> Vec<LoadJobRequest> {
    let groups: Vec<LoadGroup> = group_consecutive(
        items
            .into_iter()
            .map(|item| (item.load_type, item))
            .collect(),
    )
    .into_iter()
    .map(|(load_type, items)| LoadGroup { load_type, items })
    .collect();

    let job = |groups: Vec<LoadGroup>| LoadJobRequest {
        target: target.clone(),
        groups,
    };

    if groups.is_empty() {
        Vec::new()
    } else if !strategy.supports_batched_jobs {
        groups
            .into_iter()
            .flat_map(|group| {
                let load_type = group.load_type;
                group.items.into_iter().map(move |item| LoadGroup {
                    load_type,
                    items: vec![item],
                })
            })
            .map(|group| job(vec![group]))
            .collect()
    } else if strategy.supports_mixed_batches {
        vec![job(groups)]
    } else {
        groups.into_iter().map(|group| job(vec![group])).collect()
    }
}
