use copyart_host::{BuildRecord, JobRecord};

use super::FallbackEntry;
use crate::context::PickContext;
use crate::error::Result;
use crate::filter::Filter;

/// Try each entry in order on a fresh clone of `ctx`.
///
/// The entry's filter is combined with the caller's: a `None` on either
/// side leaves the other unchanged, otherwise both must accept.
pub(super) fn pick(
    entries: &[FallbackEntry],
    job: &JobRecord,
    ctx: &mut PickContext,
) -> Result<Option<BuildRecord>> {
    for entry in entries {
        let mut attempt = ctx.clone();
        if !entry.filter.is_none() {
            let filter = if ctx.filter().is_none() {
                entry.filter.clone()
            } else {
                Filter::And(vec![ctx.filter().clone(), entry.filter.clone()])
            };
            attempt.set_filter(filter);
        }
        attempt.reset();

        ctx.log_debug(format!("Fallback: trying {}", entry.selector.display_name()));
        if let Some(build) = entry.selector.pick_build_to_copy_from(job, &mut attempt)? {
            return Ok(Some(build));
        }
    }
    Ok(None)
}
