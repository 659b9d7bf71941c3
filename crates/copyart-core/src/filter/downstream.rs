use copyart_host::{BuildRecord, BuildRef};

use crate::context::PickContext;

const NAME: &str = "Downstream of";

/// Accepts builds that record a specific build of an upstream project as
/// their upstream.
///
/// The upstream build is named by number, persisted id or display name,
/// tried in that order. Both fields are expanded against the step's
/// variables at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamFilter {
    upstream_project_name: String,
    upstream_build_number: String,
}

impl DownstreamFilter {
    pub fn new(project: impl Into<String>, build: impl Into<String>) -> Self {
        Self {
            upstream_project_name: project.into().trim().to_string(),
            upstream_build_number: build.into().trim().to_string(),
        }
    }

    pub fn upstream_project_name(&self) -> &str {
        &self.upstream_project_name
    }

    pub fn upstream_build_number(&self) -> &str {
        &self.upstream_build_number
    }

    pub(crate) fn is_selectable(&self, candidate: &BuildRecord, ctx: &PickContext) -> bool {
        let host = ctx.host();

        let tracks_upstream = host
            .job(&candidate.job)
            .map(|job| job.kind.tracks_upstream_relationships())
            .unwrap_or(false);
        if !tracks_upstream {
            ctx.log_info(format!(
                "{NAME}: {} does not track upstream builds",
                candidate.full_display_name()
            ));
            return false;
        }

        let base = host
            .job(&ctx.copier().job)
            .map(|job| job.root_name().to_string())
            .unwrap_or_else(|| ctx.copier().job.clone());

        let project_name = ctx.env().expand(&self.upstream_project_name);
        if project_name.trim().is_empty() {
            ctx.log_info(format!("{NAME}: upstream project name is blank"));
            return false;
        }
        let build_number = ctx.env().expand(&self.upstream_build_number);
        if build_number.trim().is_empty() {
            ctx.log_info(format!("{NAME}: upstream build number is blank"));
            return false;
        }

        let upstream_job = match host.resolve_job(&project_name, &base) {
            Some(job) if host.can_read_job(&job.full_name) => job,
            _ => {
                ctx.log_info(format!(
                    "{NAME}: upstream project {project_name} is not found or not readable"
                ));
                return false;
            }
        };
        if !upstream_job.kind.tracks_upstream_relationships() {
            ctx.log_info(format!(
                "{NAME}: upstream project {} does not track downstream builds",
                upstream_job.full_name
            ));
            return false;
        }

        let upstream_build = candidate
            .upstream_number_for(&upstream_job.full_name)
            .map(|number| BuildRef::new(upstream_job.full_name.clone(), number))
            .filter(|build| host.can_read_build(build))
            .and_then(|build| host.build(&build));
        let Some(upstream_build) = upstream_build else {
            ctx.log_debug(format!(
                "{NAME}: {} has no readable upstream build of {}",
                candidate.full_display_name(),
                upstream_job.full_name
            ));
            return false;
        };

        if let Ok(number) = build_number.parse::<u32>() {
            if number == upstream_build.number {
                return true;
            }
        }
        if build_number == upstream_build.id() || build_number == upstream_build.display_name() {
            return true;
        }

        ctx.log_debug(format!(
            "{NAME}: {} is downstream of {}, not of {build_number}",
            candidate.full_display_name(),
            upstream_build.full_display_name()
        ));
        false
    }
}
