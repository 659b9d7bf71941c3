use std::collections::{BTreeMap, BTreeSet, VecDeque};

use copyart_host::{BuildRecord, BuildRef, Cause, Host, JobRecord};

use super::SelectorProgress;
use crate::context::PickContext;
use crate::settings::UpstreamStrategy;

/// Selects builds of the job being copied from that caused the copier,
/// directly or through a chain of other jobs.
///
/// The copier's upstream builds are found through its trigger causes and,
/// when `allow_upstream_dependencies` is set, through its recorded upstream
/// builds. A build of another job is searched recursively. Candidates are
/// proposed oldest or newest first per the upstream strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggeringSelector {
    pub upstream_strategy: UpstreamStrategy,
    pub allow_upstream_dependencies: bool,
}

impl TriggeringSelector {
    pub fn new(upstream_strategy: UpstreamStrategy, allow_upstream_dependencies: bool) -> Self {
        Self {
            upstream_strategy,
            allow_upstream_dependencies,
        }
    }

    pub(super) fn next_build(&self, job: &JobRecord, ctx: &mut PickContext) -> Option<BuildRecord> {
        if ctx.progress_mut().is_none() {
            let newest_first = self
                .upstream_strategy
                .resolve(ctx.step().settings().upstream_strategy)
                == UpstreamStrategy::UseNewest;

            let mut found = BTreeMap::new();
            let mut visited = BTreeSet::new();
            self.collect(ctx.host(), job, ctx.copier(), &mut found, &mut visited);
            let mut candidates: Vec<BuildRecord> = found.into_values().collect();
            candidates.sort_by_key(|build| build.number);
            if newest_first {
                candidates.reverse();
            }
            ctx.log_debug(format!(
                "Upstream builds of {} triggering {}: {:?}",
                job.full_name,
                ctx.copier().full_display_name(),
                candidates.iter().map(|b| b.number).collect::<Vec<_>>()
            ));
            *ctx.progress_mut() = Some(SelectorProgress::Upstream(candidates.into()));
        }

        let progress = ctx.progress_mut();
        let next = match progress {
            Some(SelectorProgress::Upstream(queue)) => queue.pop_front(),
            None => None,
        };
        if next.is_none() {
            *progress = None;
        }
        next
    }

    fn collect(
        &self,
        host: &dyn Host,
        job: &JobRecord,
        parent: &BuildRecord,
        found: &mut BTreeMap<BuildRef, BuildRecord>,
        visited: &mut BTreeSet<BuildRef>,
    ) {
        let job_names = [job.full_name.as_str(), job.root_name()];

        let mut upstream: VecDeque<BuildRef> = parent
            .causes
            .iter()
            .filter_map(|cause| match cause {
                Cause::Upstream { job, number } => Some(BuildRef::new(job.clone(), *number)),
                _ => None,
            })
            .collect();
        if self.allow_upstream_dependencies {
            if let Some(builds) = &parent.upstream_builds {
                upstream.extend(
                    builds
                        .iter()
                        .map(|(job, number)| BuildRef::new(job.clone(), *number)),
                );
            }
        }

        for upstream_ref in upstream {
            if job_names.contains(&upstream_ref.job.as_str()) {
                let own = BuildRef::new(job.full_name.clone(), upstream_ref.number);
                if let Some(build) = host.build(&own) {
                    found.insert(own, build);
                }
            } else if visited.insert(upstream_ref.clone()) {
                if let Some(build) = host.build(&upstream_ref) {
                    self.collect(host, job, &build, found, visited);
                }
            }
        }
    }
}
