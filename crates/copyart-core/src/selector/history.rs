use copyart_host::{BuildOrder, BuildRecord, BuildResult, JobRecord};

use crate::context::PickContext;

/// Newest completed build older than the last match that satisfies
/// `accept`.
pub(super) fn next_completed(
    job: &JobRecord,
    ctx: &PickContext,
    accept: impl Fn(&BuildRecord) -> bool,
) -> Option<BuildRecord> {
    let before = ctx
        .last_match()
        .filter(|last| last.job == job.full_name)
        .map(|last| last.number);
    ctx.host()
        .builds(&job.full_name, BuildOrder::NewestFirst)
        .into_iter()
        .filter(|build| before.map_or(true, |number| build.number < number))
        .filter(BuildRecord::is_completed)
        .find(|build| accept(build))
}

pub(super) fn meets_status(build: &BuildRecord, stable_only: bool) -> bool {
    match build.result {
        Some(BuildResult::Success) => true,
        Some(BuildResult::Unstable) => !stable_only,
        _ => false,
    }
}
