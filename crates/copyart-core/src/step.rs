//! The copy-artifact build step: resolve the project, pick a build, copy.

use std::path::{Path, PathBuf};

use copyart_host::BuildRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::CodecRegistry;
use crate::context::{PickContext, StepContext};
use crate::error::{CopyError, Result};
use crate::filter::Filter;
use crate::obs::{self, StepSpan};
use crate::operation::{CopiedFile, CopyOperation, CopyOutcome, OperationContext};
use crate::selector::Selector;

/// Prefix of the variable that receives the selected build number.
pub const RESULT_VARIABLE_PREFIX: &str = "COPYARTIFACT_BUILD_NUMBER_";

/// JSON form of a step, as written in step files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyArtifactStepConfig {
    pub project_name: String,
    /// Tagged selector. Defaults to the latest stable build.
    #[serde(default)]
    pub selector: Option<Value>,
    /// Tagged filter. Defaults to no filter.
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub operation: CopyOperation,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub result_variable_suffix: Option<String>,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyArtifactStep {
    pub project_name: String,
    pub selector: Selector,
    pub filter: Filter,
    pub operation: CopyOperation,
    /// Succeed without copying when nothing can be found or copied.
    pub optional: bool,
    pub result_variable_suffix: Option<String>,
    pub verbose: bool,
}

/// What a step did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub selected: Option<BuildRef>,
    pub outcome: CopyOutcome,
    pub files: Vec<CopiedFile>,
    /// Result variable published into the step's variables, if any.
    pub result_variable: Option<(String, String)>,
}

impl CopyArtifactStep {
    pub fn new(project_name: impl Into<String>, selector: Selector) -> Self {
        Self {
            project_name: project_name.into(),
            selector,
            filter: Filter::None,
            operation: CopyOperation::default(),
            optional: false,
            result_variable_suffix: None,
            verbose: false,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_operation(mut self, operation: CopyOperation) -> Self {
        self.operation = operation;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_result_variable_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.result_variable_suffix = Some(suffix.into());
        self
    }

    pub fn from_config(config: CopyArtifactStepConfig, codecs: &CodecRegistry) -> Result<Self> {
        let selector = match &config.selector {
            Some(value) => codecs.selector_from_value(value)?,
            None => Selector::Status { stable_only: true },
        };
        let filter = match &config.filter {
            Some(Value::Null) | None => Filter::None,
            Some(value) => codecs.filter_from_value(value)?,
        };
        Ok(Self {
            project_name: config.project_name,
            selector,
            filter,
            operation: config.operation,
            optional: config.optional,
            result_variable_suffix: config.result_variable_suffix,
            verbose: config.verbose,
        })
    }

    /// Variable name for a suffix: upper-cased, with every character
    /// outside `[A-Z0-9]` replaced by `_`.
    pub fn result_variable_name(suffix: &str) -> String {
        let normalized: String = suffix
            .to_ascii_uppercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{RESULT_VARIABLE_PREFIX}{normalized}")
    }

    /// Run the step in `ctx`, copying into `workspace`.
    ///
    /// On success the selected build number is published into the step's
    /// variables when a result suffix is set, and the copied files are
    /// recorded against the copier build.
    pub fn perform(&self, ctx: &mut StepContext, workspace: &Path) -> Result<StepReport> {
        let _span = StepSpan::enter(&ctx.copier().full_display_name());
        if self.verbose {
            *ctx = ctx.clone().with_verbose(true);
        }

        let project_name = ctx.env().expand(&self.project_name);
        let base = ctx
            .host()
            .job(&ctx.copier().job)
            .map(|job| job.root_name().to_string())
            .unwrap_or_else(|| ctx.copier().job.clone());
        let job = match ctx.host().resolve_job(&project_name, &base) {
            Some(job) if ctx.host().can_read_job(&job.full_name) => job,
            _ => return self.skip_or_fail(ctx, CopyError::ProjectNotFound(project_name)),
        };

        let mut pick = PickContext::new(ctx.clone()).with_filter(self.filter.clone());
        let build = match self.selector.pick_build_to_copy_from(&job, &mut pick)? {
            Some(build) => build,
            None => {
                obs::emit_build_not_found(&job.full_name, self.selector.display_name());
                return self.skip_or_fail(ctx, CopyError::NoBuildFound(job.full_name));
            }
        };
        obs::emit_build_selected(&job.full_name, build.number);

        let result_variable = self.result_variable_suffix.as_deref().map(|suffix| {
            let name = Self::result_variable_name(suffix);
            let value = build.number.to_string();
            ctx.env_mut().insert(name.clone(), value.clone());
            (name, value)
        });

        let workspace: PathBuf = workspace.to_path_buf();
        let report = self
            .operation
            .perform(&build, &OperationContext::new(ctx.clone(), workspace))?;

        if report.outcome == CopyOutcome::NothingToDo {
            let err = CopyError::NothingCopied(build.full_display_name());
            if !self.optional {
                return Err(err);
            }
            ctx.log_info(err.to_string());
        }

        let copier = ctx.copier().build_ref();
        for (source, files) in report.files_by_source() {
            ctx.host().record_copied_artifacts(&copier, &source, &files)?;
        }

        Ok(StepReport {
            selected: Some(build.build_ref()),
            outcome: report.outcome,
            files: report.files,
            result_variable,
        })
    }

    fn skip_or_fail(&self, ctx: &StepContext, err: CopyError) -> Result<StepReport> {
        if self.optional {
            ctx.log_info(format!("{err} (optional, continuing)"));
            Ok(StepReport::default())
        } else {
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_variable_name() {
        assert_eq!(
            CopyArtifactStep::result_variable_name("my-lib.v2"),
            "COPYARTIFACT_BUILD_NUMBER_MY_LIB_V2"
        );
    }

    #[test]
    fn test_config_defaults() {
        let config: CopyArtifactStepConfig =
            serde_json::from_str(r#"{"project_name": "up"}"#).unwrap();
        let step = CopyArtifactStep::from_config(config, &CodecRegistry::standard()).unwrap();
        assert_eq!(step.selector, Selector::Status { stable_only: true });
        assert!(step.filter.is_none());
        assert!(!step.optional);
    }

    #[test]
    fn test_config_with_invalid_filter() {
        let config: CopyArtifactStepConfig =
            serde_json::from_str(r#"{"project_name": "up", "filter": {"Nope": {}}}"#).unwrap();
        let err = CopyArtifactStep::from_config(config, &CodecRegistry::standard()).unwrap_err();
        assert!(matches!(err, CopyError::InvalidFilter(_)));
    }
}
