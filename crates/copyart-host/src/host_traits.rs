//! Host trait definitions for copyart
//!
//! These traits define the services a copy step needs from the build host:
//! - `BuildRegistry`: job and build lookup, permissions, artifact storage
//! - `FingerprintStore`: file provenance records keyed by digest
//! - `ArtifactArchive`: a virtual, non-filesystem artifact store
//!
//! All traits are synchronous and backend-agnostic. In-memory fakes are
//! provided via the `fakes` module.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::model::{BuildActions, BuildOrder, BuildRecord, BuildRef, FingerprintRecord, JobRecord};
use crate::Result;

// ---------------------------------------------------------------------------
// ArtifactArchive
// ---------------------------------------------------------------------------

/// Artifacts of one build held outside the local filesystem.
///
/// Paths are `/` separated and relative to the archive root.
pub trait ArtifactArchive: Send + Sync + fmt::Debug {
    /// Whether the archive root exists at all.
    fn exists(&self) -> bool;

    /// Every file path in the archive.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Open a file for streaming.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Last modification time, when the archive tracks one.
    fn last_modified(&self, path: &str) -> io::Result<Option<SystemTime>>;
}

/// Where a build's artifacts are stored.
#[derive(Debug, Clone)]
pub enum ArtifactManager {
    /// Plain directory on the local filesystem.
    Standard { dir: PathBuf },
    /// Virtual archive.
    Archive(Arc<dyn ArtifactArchive>),
}

// ---------------------------------------------------------------------------
// BuildRegistry
// ---------------------------------------------------------------------------

/// Registry of jobs and builds.
///
/// Guarantees:
/// - `builds(job, order)` lists every build of `job` sorted by number.
/// - `build(r)` returns the same record listed by `builds`.
/// - Recording methods merge with what was recorded before.
pub trait BuildRegistry: Send + Sync {
    /// Look up a job by its full name.
    fn job(&self, full_name: &str) -> Option<JobRecord>;

    /// Look up a build.
    fn build(&self, build: &BuildRef) -> Option<BuildRecord>;

    /// Every build of a job.
    fn builds(&self, job: &str, order: BuildOrder) -> Vec<BuildRecord>;

    fn can_read_job(&self, full_name: &str) -> bool;

    fn can_read_build(&self, build: &BuildRef) -> bool;

    /// Artifact storage of a build, if it has any.
    fn artifact_manager(&self, build: &BuildRef) -> Option<ArtifactManager>;

    /// Workspace directory a build ran in, if still available.
    fn workspace(&self, build: &BuildRef) -> Option<PathBuf>;

    /// Merge `fingerprints` (file name to digest) into the build's actions.
    fn add_fingerprint_action(
        &self,
        build: &BuildRef,
        fingerprints: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Record that `copier` copied `files` from `source`.
    fn record_copied_artifacts(
        &self,
        copier: &BuildRef,
        source: &BuildRef,
        files: &[String],
    ) -> Result<()>;

    /// Actions recorded against a build so far.
    fn actions(&self, build: &BuildRef) -> BuildActions;

    /// Resolve a job name the way a user types it in a job configured under
    /// `base_job`: relative to the base job's folder first, then absolute.
    /// A leading `/` forces an absolute lookup.
    fn resolve_job(&self, name: &str, base_job: &str) -> Option<JobRecord> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Some(absolute) = name.strip_prefix('/') {
            return normalize_job_path(absolute).and_then(|path| self.job(&path));
        }
        let folder = base_job.rsplit_once('/').map(|(folder, _)| folder);
        let relative = match folder {
            Some(folder) => format!("{folder}/{name}"),
            None => name.to_string(),
        };
        normalize_job_path(&relative)
            .and_then(|path| self.job(&path))
            .or_else(|| normalize_job_path(name).and_then(|path| self.job(&path)))
    }
}

/// Collapse `.` and `..` segments of a job path. `None` when `..` climbs
/// above the root.
pub fn normalize_job_path(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

// ---------------------------------------------------------------------------
// FingerprintStore
// ---------------------------------------------------------------------------

/// Store of file fingerprints.
///
/// Guarantees:
/// - `get_or_create` never replaces the original build of an existing record.
/// - `associate` is idempotent.
pub trait FingerprintStore: Send + Sync {
    /// Fetch the record for `digest`, creating it with `origin` as the
    /// producing build if absent.
    fn get_or_create(
        &self,
        origin: &BuildRef,
        file_name: &str,
        digest: &str,
    ) -> Result<FingerprintRecord>;

    /// Record that `build` used the file with `digest`.
    fn associate(&self, digest: &str, build: &BuildRef) -> Result<()>;

    fn fingerprint(&self, digest: &str) -> Option<FingerprintRecord>;
}

/// Everything a copy step needs from its host.
pub trait Host: BuildRegistry + FingerprintStore {}

impl<T: BuildRegistry + FingerprintStore> Host for T {}
