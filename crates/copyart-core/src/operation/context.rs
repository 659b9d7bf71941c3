use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use copyart_host::{ArtifactArchive, BuildRecord, BuildRef};

use super::digest::ContentDigest;
use super::scan::PatternSet;
use super::CopiedFile;
use crate::context::StepContext;

/// Where a copy runs and on whose behalf.
#[derive(Debug, Clone)]
pub struct OperationContext {
    step: StepContext,
    workspace: PathBuf,
}

impl OperationContext {
    pub fn new(step: StepContext, workspace: impl Into<PathBuf>) -> Self {
        Self {
            step,
            workspace: workspace.into(),
        }
    }

    pub fn step(&self) -> &StepContext {
        &self.step
    }

    /// Directory target paths are resolved against.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Root the files of a source build are scanned from.
#[derive(Debug, Clone)]
pub(crate) enum SourceRoot {
    Dir(PathBuf),
    Archive(Arc<dyn ArtifactArchive>),
}

/// State of copying from one source build.
///
/// Each sub-build of a composite build is copied through its own context,
/// forked from the parent's, so digest state and fingerprints never leak
/// between passes.
#[derive(Clone)]
pub struct CopyContext {
    step: StepContext,
    src: BuildRecord,
    target_base_dir: PathBuf,
    target_dir_path: String,
    src_base_dir: String,
    patterns: Arc<PatternSet>,
    flatten: bool,
    fingerprint_artifacts: bool,
    pub(crate) source_root: Option<SourceRoot>,
    digest: Option<ContentDigest>,
    pub(crate) fingerprints: BTreeMap<String, String>,
    pub(crate) copied: Vec<CopiedFile>,
}

impl CopyContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        step: StepContext,
        src: BuildRecord,
        target_base_dir: PathBuf,
        target_dir_path: String,
        src_base_dir: String,
        patterns: PatternSet,
        flatten: bool,
        fingerprint_artifacts: bool,
    ) -> Self {
        Self {
            step,
            src,
            target_base_dir,
            target_dir_path,
            src_base_dir,
            patterns: Arc::new(patterns),
            flatten,
            fingerprint_artifacts,
            source_root: None,
            digest: None,
            fingerprints: BTreeMap::new(),
            copied: Vec::new(),
        }
    }

    /// Context for a sub-build, sharing configuration but no copy state.
    pub fn fork(&self, src: BuildRecord) -> Self {
        Self {
            src,
            source_root: None,
            digest: None,
            fingerprints: BTreeMap::new(),
            copied: Vec::new(),
            ..self.clone()
        }
    }

    pub fn step(&self) -> &StepContext {
        &self.step
    }

    pub fn src(&self) -> &BuildRecord {
        &self.src
    }

    pub fn src_ref(&self) -> BuildRef {
        self.src.build_ref()
    }

    pub fn copier_ref(&self) -> BuildRef {
        self.step.copier().build_ref()
    }

    pub fn target_base_dir(&self) -> &Path {
        &self.target_base_dir
    }

    pub fn set_target_base_dir(&mut self, dir: PathBuf) {
        self.target_base_dir = dir;
    }

    /// Target base directory joined with the configured target path.
    pub fn target_dir(&self) -> PathBuf {
        self.target_dir_path
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .fold(self.target_base_dir.clone(), |dir, segment| dir.join(segment))
    }

    pub fn src_base_dir(&self) -> &str {
        &self.src_base_dir
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn is_flatten(&self) -> bool {
        self.flatten
    }

    pub fn is_fingerprint_artifacts(&self) -> bool {
        self.fingerprint_artifacts
    }

    pub fn fingerprints(&self) -> &BTreeMap<String, String> {
        &self.fingerprints
    }

    /// Start a copy pass from `root`.
    pub(crate) fn begin(&mut self, root: SourceRoot) {
        self.source_root = Some(root);
        self.digest = self.fingerprint_artifacts.then(ContentDigest::new);
        self.fingerprints.clear();
    }

    pub(crate) fn digest_update(&mut self, chunk: &[u8]) {
        if let Some(digest) = self.digest.as_mut() {
            digest.update(chunk);
        }
    }

    pub(crate) fn finish_digest(&mut self) -> Option<String> {
        self.digest.as_mut().map(ContentDigest::finish)
    }

    pub fn log_debug(&self, message: impl AsRef<str>) {
        self.step.log_debug(message);
    }

    pub fn log_info(&self, message: impl AsRef<str>) {
        self.step.log_info(message);
    }
}

impl fmt::Debug for CopyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyContext")
            .field("src", &self.src.build_ref())
            .field("target_dir", &self.target_dir())
            .field("src_base_dir", &self.src_base_dir)
            .field("flatten", &self.flatten)
            .field("fingerprint_artifacts", &self.fingerprint_artifacts)
            .finish_non_exhaustive()
    }
}
