//! Build host data model
//!
//! Jobs and builds are plain serde records so that hosts can be described by
//! a JSON manifest and fakes can be assembled directly in tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a single build: the job's full name plus the build number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildRef {
    pub job: String,
    pub number: u32,
}

impl BuildRef {
    pub fn new(job: impl Into<String>, number: u32) -> Self {
        Self {
            job: job.into(),
            number,
        }
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.job, self.number)
    }
}

/// Final result of a completed build, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl BuildResult {
    /// True when `self` is at least as good as `other`.
    pub fn is_better_or_equal_to(self, other: BuildResult) -> bool {
        self <= other
    }
}

/// Why a build was started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cause {
    /// Triggered by the completion of another build.
    Upstream { job: String, number: u32 },
    /// Started manually.
    User { name: String },
    /// Started by a schedule.
    Timer,
}

impl Cause {
    pub fn upstream(job: impl Into<String>, number: u32) -> Self {
        Cause::Upstream {
            job: job.into(),
            number,
        }
    }
}

/// A build parameter value as recorded on the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Text(String),
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Boolean(value)
    }
}

/// Shape of a job, which drives fan-out and upstream bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    #[default]
    Freestyle,
    /// Scripted pipelines keep no fingerprint-based upstream relationships
    /// and expose no per-build workspace.
    Pipeline,
    /// Multi-configuration parent job.
    Matrix,
    /// One configuration of a matrix job.
    MatrixConfiguration { root: String },
    /// Multi-module parent job.
    ModuleSet,
    /// One module of a module-set job.
    Module { root: String },
}

impl JobKind {
    pub fn tracks_upstream_relationships(&self) -> bool {
        !matches!(self, JobKind::Pipeline)
    }

    pub fn has_workspace(&self) -> bool {
        !matches!(self, JobKind::Pipeline)
    }
}

/// A job registered with the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Slash separated full name, e.g. `folder/project`.
    pub full_name: String,
    #[serde(default)]
    pub kind: JobKind,
}

impl JobRecord {
    pub fn new(full_name: impl Into<String>, kind: JobKind) -> Self {
        Self {
            full_name: full_name.into(),
            kind,
        }
    }

    pub fn freestyle(full_name: impl Into<String>) -> Self {
        Self::new(full_name, JobKind::Freestyle)
    }

    /// Last path segment of the full name.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit('/')
            .next()
            .unwrap_or(self.full_name.as_str())
    }

    /// Full name of the top-level project this job belongs to.
    pub fn root_name(&self) -> &str {
        match &self.kind {
            JobKind::MatrixConfiguration { root } | JobKind::Module { root } => root,
            _ => &self.full_name,
        }
    }
}

/// Sub-builds spawned by a composite build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Composite {
    Matrix { runs: Vec<BuildRef> },
    ModuleSet { modules: Vec<BuildRef> },
}

/// A single build of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub job: String,
    pub number: u32,
    /// Persisted identifier. Defaults to the build number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// `None` while the build is still running.
    #[serde(default)]
    pub result: Option<BuildResult>,
    #[serde(default)]
    pub keep_forever: bool,
    #[serde(default)]
    pub has_artifacts: bool,
    #[serde(default)]
    pub causes: Vec<Cause>,
    /// Upstream builds recorded through fingerprints, keyed by job full name.
    /// `None` for build types that keep no such record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_builds: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<Composite>,
}

impl BuildRecord {
    /// A completed, successful build with no extra metadata.
    pub fn new(job: impl Into<String>, number: u32) -> Self {
        Self {
            job: job.into(),
            number,
            id: None,
            display_name: None,
            result: Some(BuildResult::Success),
            keep_forever: false,
            has_artifacts: false,
            causes: Vec::new(),
            upstream_builds: None,
            parameters: BTreeMap::new(),
            composite: None,
        }
    }

    pub fn with_result(mut self, result: Option<BuildResult>) -> Self {
        self.result = result;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn kept_forever(mut self) -> Self {
        self.keep_forever = true;
        self
    }

    pub fn with_artifacts(mut self) -> Self {
        self.has_artifacts = true;
        self
    }

    pub fn caused_by(mut self, cause: Cause) -> Self {
        self.causes.push(cause);
        self
    }

    pub fn with_upstream_build(mut self, job: impl Into<String>, number: u32) -> Self {
        self.upstream_builds
            .get_or_insert_with(BTreeMap::new)
            .insert(job.into(), number);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_composite(mut self, composite: Composite) -> Self {
        self.composite = Some(composite);
        self
    }

    pub fn build_ref(&self) -> BuildRef {
        BuildRef::new(self.job.clone(), self.number)
    }

    pub fn id(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.number.to_string())
    }

    pub fn display_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("#{}", self.number))
    }

    /// `job #n`, used in log lines.
    pub fn full_display_name(&self) -> String {
        format!("{} {}", self.job, self.display_name())
    }

    pub fn is_completed(&self) -> bool {
        self.result.is_some()
    }

    /// Number of the build of `job` that this build records as its upstream,
    /// from the fingerprint record first and the trigger causes second.
    pub fn upstream_number_for(&self, job: &str) -> Option<u32> {
        if let Some(number) = self
            .upstream_builds
            .as_ref()
            .and_then(|builds| builds.get(job))
        {
            return Some(*number);
        }
        self.causes.iter().find_map(|cause| match cause {
            Cause::Upstream { job: upstream, number } if upstream == job => Some(*number),
            _ => None,
        })
    }
}

/// Order in which a job's builds are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOrder {
    OldestFirst,
    NewestFirst,
}

/// Provenance of one file fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub digest: String,
    pub file_name: String,
    /// Build that first produced the file.
    pub original: BuildRef,
    /// Every build known to have used the file.
    #[serde(default)]
    pub usages: BTreeSet<BuildRef>,
    pub created_at: DateTime<Utc>,
}

/// Per-build actions recorded by copy steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildActions {
    /// File name to digest, merged across copy passes.
    #[serde(default)]
    pub fingerprints: BTreeMap<String, String>,
    /// Files this build copied, grouped by source build.
    #[serde(default)]
    pub copied_artifacts: BTreeMap<String, BTreeSet<String>>,
}
