use std::fmt;
use std::str::FromStr;

use copyart_host::{BuildOrder, BuildRecord, BuildRef, BuildResult, JobRecord};

use crate::context::PickContext;

/// Named shortcuts to well-known builds of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permalink {
    LastBuild,
    LastStableBuild,
    LastSuccessfulBuild,
    LastFailedBuild,
    LastUnstableBuild,
    LastUnsuccessfulBuild,
    LastCompletedBuild,
}

impl Permalink {
    pub const ALL: [Permalink; 7] = [
        Permalink::LastBuild,
        Permalink::LastStableBuild,
        Permalink::LastSuccessfulBuild,
        Permalink::LastFailedBuild,
        Permalink::LastUnstableBuild,
        Permalink::LastUnsuccessfulBuild,
        Permalink::LastCompletedBuild,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Permalink::LastBuild => "lastBuild",
            Permalink::LastStableBuild => "lastStableBuild",
            Permalink::LastSuccessfulBuild => "lastSuccessfulBuild",
            Permalink::LastFailedBuild => "lastFailedBuild",
            Permalink::LastUnstableBuild => "lastUnstableBuild",
            Permalink::LastUnsuccessfulBuild => "lastUnsuccessfulBuild",
            Permalink::LastCompletedBuild => "lastCompletedBuild",
        }
    }

    fn matches(self, build: &BuildRecord) -> bool {
        match self {
            Permalink::LastBuild => true,
            Permalink::LastStableBuild => build.result == Some(BuildResult::Success),
            Permalink::LastSuccessfulBuild => build
                .result
                .is_some_and(|r| r.is_better_or_equal_to(BuildResult::Unstable)),
            Permalink::LastFailedBuild => build.result == Some(BuildResult::Failure),
            Permalink::LastUnstableBuild => build.result == Some(BuildResult::Unstable),
            Permalink::LastUnsuccessfulBuild => build
                .result
                .is_some_and(|r| r != BuildResult::Success),
            Permalink::LastCompletedBuild => build.is_completed(),
        }
    }

    pub fn resolve(self, builds: Vec<BuildRecord>) -> Option<BuildRecord> {
        builds.into_iter().find(|build| self.matches(build))
    }
}

impl FromStr for Permalink {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permalink::ALL
            .into_iter()
            .find(|permalink| permalink.id() == s.trim())
            .ok_or_else(|| format!("unknown permalink: {s}"))
    }
}

impl fmt::Display for Permalink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Build named by number, then by persisted id, then by display name.
/// Proposes at most one candidate per pick.
pub(super) fn next_specific(
    build_number: &str,
    job: &JobRecord,
    ctx: &PickContext,
) -> Option<BuildRecord> {
    if ctx.last_match().is_some() {
        return None;
    }
    let name = ctx.env().expand(build_number);
    let name = name.trim();
    if name.is_empty() {
        ctx.log_info("Specific build: build number is blank");
        return None;
    }
    let host = ctx.host();
    if let Ok(number) = name.parse::<u32>() {
        if let Some(build) = host.build(&BuildRef::new(job.full_name.clone(), number)) {
            return Some(build);
        }
    }
    let found = host
        .builds(&job.full_name, BuildOrder::NewestFirst)
        .into_iter()
        .find(|build| build.id() == name || build.display_name() == name);
    if found.is_none() {
        ctx.log_info(format!("Specific build: {name} not found in {}", job.full_name));
    }
    found
}

pub(super) fn next_permalink(
    permalink: Permalink,
    job: &JobRecord,
    ctx: &PickContext,
) -> Option<BuildRecord> {
    if ctx.last_match().is_some() {
        return None;
    }
    permalink.resolve(ctx.host().builds(&job.full_name, BuildOrder::NewestFirst))
}
