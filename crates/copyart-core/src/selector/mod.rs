//! Build selectors
//!
//! A selector walks a job's builds and proposes candidates one at a time.
//! [`Selector::pick_build_to_copy_from`] drives that walk: every candidate
//! is recorded as the context's last match, skipped when unreadable and
//! returned once the context filter accepts it.
//!
//! Composite selectors (`Fallback`, `Parameterized`) replace the walk with
//! their own logic.

mod fallback;
mod history;
mod specific;
mod triggering;

use std::collections::VecDeque;

use copyart_host::{BuildRecord, JobRecord};

use crate::context::PickContext;
use crate::error::Result;
use crate::filter::Filter;

pub use specific::Permalink;
pub use triggering::TriggeringSelector;

/// Resumable state a selector keeps in the pick context between calls.
#[derive(Debug, Clone)]
pub(crate) enum SelectorProgress {
    /// Upstream candidates not yet proposed, in proposal order.
    Upstream(VecDeque<BuildRecord>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Latest completed build, whatever its result.
    LastCompleted,
    /// Latest stable build, or latest successful-or-unstable build.
    Status { stable_only: bool },
    /// Latest completed build that archived artifacts.
    LastWithArtifacts,
    /// Latest build marked keep-forever.
    Saved,
    /// One build named by number, id or display name.
    Specific { build_number: String },
    /// One build named by a permalink.
    Permalink(Permalink),
    /// A selector decoded from a variable at pick time.
    Parameterized { parameter_name: String },
    /// First entry that finds a build wins.
    Fallback(Vec<FallbackEntry>),
    /// Builds of the job that started the copier, directly or transitively.
    Triggering(TriggeringSelector),
}

/// One `(selector, filter)` alternative of a fallback selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEntry {
    pub selector: Selector,
    pub filter: Filter,
}

impl FallbackEntry {
    pub fn new(selector: Selector, filter: Filter) -> Self {
        Self { selector, filter }
    }
}

impl Selector {
    pub fn display_name(&self) -> &'static str {
        match self {
            Selector::LastCompleted => "Latest completed build",
            Selector::Status { stable_only: true } => "Latest stable build",
            Selector::Status { stable_only: false } => "Latest successful build",
            Selector::LastWithArtifacts => "Latest build with artifacts",
            Selector::Saved => "Latest saved build",
            Selector::Specific { .. } => "Specific build",
            Selector::Permalink(_) => "Permalink",
            Selector::Parameterized { .. } => "Specified by a build parameter",
            Selector::Fallback(_) => "Fallback",
            Selector::Triggering(_) => "Upstream build that triggered this job",
        }
    }

    /// Pick the build to copy from in `job`, or `None` when no candidate
    /// passes the context filter.
    pub fn pick_build_to_copy_from(
        &self,
        job: &JobRecord,
        ctx: &mut PickContext,
    ) -> Result<Option<BuildRecord>> {
        match self {
            Selector::Fallback(entries) => fallback::pick(entries, job, ctx),
            Selector::Parameterized { parameter_name } => {
                let text = ctx
                    .env()
                    .get(parameter_name.trim())
                    .unwrap_or("")
                    .to_string();
                let decoded = ctx.step().codecs().decode_selector(&text)?;
                let Some(selector) = decoded else {
                    ctx.log_info(format!(
                        "{}: {parameter_name} is not set",
                        self.display_name()
                    ));
                    return Ok(None);
                };
                ctx.log_debug(format!(
                    "{}: using {}",
                    self.display_name(),
                    selector.display_name()
                ));
                selector.pick_build_to_copy_from(job, ctx)
            }
            _ => self.pick_by_enumeration(job, ctx),
        }
    }

    fn pick_by_enumeration(
        &self,
        job: &JobRecord,
        ctx: &mut PickContext,
    ) -> Result<Option<BuildRecord>> {
        while let Some(candidate) = self.next_build(job, ctx)? {
            ctx.set_last_match(Some(candidate.clone()));
            if !ctx.host().can_read_build(&candidate.build_ref()) {
                ctx.log_debug(format!(
                    "{}: not permitted to read",
                    candidate.full_display_name()
                ));
                continue;
            }
            if ctx.filter().is_selectable(&candidate, &*ctx)? {
                ctx.log_debug(format!(
                    "{}: selected by {}",
                    candidate.full_display_name(),
                    self.display_name()
                ));
                return Ok(Some(candidate));
            }
            ctx.log_debug(format!(
                "{}: declined by {}",
                candidate.full_display_name(),
                ctx.filter().display_name()
            ));
        }
        Ok(None)
    }

    /// Next candidate after the context's last match, or `None` when
    /// exhausted. Composite selectors never enumerate.
    pub fn next_build(&self, job: &JobRecord, ctx: &mut PickContext) -> Result<Option<BuildRecord>> {
        let next = match self {
            Selector::LastCompleted => history::next_completed(job, ctx, |_| true),
            Selector::Status { stable_only } => {
                let stable_only = *stable_only;
                history::next_completed(job, ctx, move |build| history::meets_status(build, stable_only))
            }
            Selector::LastWithArtifacts => {
                history::next_completed(job, ctx, |build| build.has_artifacts)
            }
            Selector::Saved => history::next_completed(job, ctx, |build| build.keep_forever),
            Selector::Specific { build_number } => specific::next_specific(build_number, job, ctx),
            Selector::Permalink(permalink) => specific::next_permalink(*permalink, job, ctx),
            Selector::Triggering(selector) => selector.next_build(job, ctx),
            Selector::Parameterized { .. } | Selector::Fallback(_) => None,
        };
        Ok(next)
    }
}
