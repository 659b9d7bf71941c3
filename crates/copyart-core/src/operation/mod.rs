//! Copying files out of a selected build
//!
//! [`CopyOperation::perform`] copies from one build. Composite builds fan
//! out: a module-set build copies its own files and then each module's, a
//! matrix build copies each configuration run into a subdirectory named
//! after the configuration. Every pass runs `init`, scan, copy and `end`,
//! and `end` runs even when the pass fails.

mod context;
mod digest;
mod file_info;
mod scan;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use copyart_host::{ArtifactManager, BuildRecord, BuildRef, Composite};
use serde::{Deserialize, Serialize};

pub use context::{CopyContext, OperationContext};
pub use digest::{digest_file, ContentDigest};
pub use file_info::FileInfo;
pub use scan::PatternSet;

use context::SourceRoot;

use crate::error::{CopyError, Result};
use crate::obs;

/// What a copy reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopySource {
    /// Archived artifacts, wherever the build stores them.
    #[default]
    Artifacts,
    /// Archived artifacts in a local directory only.
    LegacyArtifacts,
    /// The workspace the build ran in.
    Workspace,
}

impl CopySource {
    fn describe(self) -> &'static str {
        match self {
            CopySource::Artifacts | CopySource::LegacyArtifacts => "artifacts",
            CopySource::Workspace => "the workspace",
        }
    }
}

/// Result of a copy, ordered so that merging keeps the stronger outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
    #[default]
    NothingToDo,
    Succeeded,
}

impl CopyOutcome {
    /// `Succeeded` if either side succeeded.
    pub fn merge(self, other: CopyOutcome) -> CopyOutcome {
        self.max(other)
    }
}

/// A file that was copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedFile {
    pub source: BuildRef,
    pub relative_path: String,
    pub destination: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReport {
    pub outcome: CopyOutcome,
    pub files: Vec<CopiedFile>,
}

impl CopyReport {
    pub fn merge(&mut self, other: CopyReport) {
        self.outcome = self.outcome.merge(other.outcome);
        self.files.extend(other.files);
    }

    /// Copied file paths grouped by source build.
    pub fn files_by_source(&self) -> BTreeMap<BuildRef, Vec<String>> {
        let mut grouped: BTreeMap<BuildRef, Vec<String>> = BTreeMap::new();
        for file in &self.files {
            grouped
                .entry(file.source.clone())
                .or_default()
                .push(file.relative_path.clone());
        }
        grouped
    }
}

/// A configured copy: what to read, which files, and where they land.
///
/// String fields are expanded against the step's variables when the copy
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyOperation {
    pub source: CopySource,
    /// Comma separated include patterns. Blank means every file.
    pub includes: String,
    /// Comma separated exclude patterns. Blank means none.
    pub excludes: String,
    /// Target directory relative to the workspace.
    pub target_dir: String,
    /// Directory within the source that paths are relative to.
    pub src_base_dir: String,
    pub flatten: bool,
    pub fingerprint_artifacts: bool,
}

impl Default for CopyOperation {
    fn default() -> Self {
        Self {
            source: CopySource::Artifacts,
            includes: String::new(),
            excludes: String::new(),
            target_dir: String::new(),
            src_base_dir: String::new(),
            flatten: false,
            fingerprint_artifacts: true,
        }
    }
}

impl CopyOperation {
    pub fn new(source: CopySource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn with_includes(mut self, includes: impl Into<String>) -> Self {
        self.includes = includes.into();
        self
    }

    pub fn with_excludes(mut self, excludes: impl Into<String>) -> Self {
        self.excludes = excludes.into();
        self
    }

    pub fn with_target_dir(mut self, target_dir: impl Into<String>) -> Self {
        self.target_dir = target_dir.into();
        self
    }

    pub fn with_src_base_dir(mut self, src_base_dir: impl Into<String>) -> Self {
        self.src_base_dir = src_base_dir.into();
        self
    }

    pub fn flattened(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn with_fingerprints(mut self, fingerprint_artifacts: bool) -> Self {
        self.fingerprint_artifacts = fingerprint_artifacts;
        self
    }

    /// Copy files from `src` into the base context's workspace.
    pub fn perform(&self, src: &BuildRecord, base: &OperationContext) -> Result<CopyReport> {
        let ctx = self.prepare(src, base)?;
        let host = base.step().host();

        match &src.composite {
            Some(Composite::ModuleSet { modules }) => {
                let mut report = self.copy_direct(ctx.clone())?;
                for module in modules {
                    match host.build(module) {
                        Some(build) => report.merge(self.copy_direct(ctx.fork(build))?),
                        None => ctx.log_debug(format!("Module build {module} is gone")),
                    }
                }
                Ok(report)
            }
            Some(Composite::Matrix { runs }) => {
                let mut report = CopyReport::default();
                for run in runs {
                    let Some(build) = host.build(run) else {
                        ctx.log_debug(format!("Configuration run {run} is gone"));
                        continue;
                    };
                    let configuration = host
                        .job(&build.job)
                        .map(|job| job.name().to_string())
                        .unwrap_or_else(|| {
                            build.job.rsplit('/').next().unwrap_or(&build.job).to_string()
                        });
                    let mut child = ctx.fork(build);
                    child.set_target_base_dir(ctx.target_base_dir().join(configuration));
                    report.merge(self.copy_direct(child)?);
                }
                Ok(report)
            }
            None => self.copy_direct(ctx),
        }
    }

    fn prepare(&self, src: &BuildRecord, base: &OperationContext) -> Result<CopyContext> {
        let env = base.step().env();
        let patterns = PatternSet::new(&env.expand(&self.includes), &env.expand(&self.excludes))?;
        Ok(CopyContext::new(
            base.step().clone(),
            src.clone(),
            base.workspace().to_path_buf(),
            env.expand(&self.target_dir),
            env.expand(&self.src_base_dir),
            patterns,
            self.flatten,
            self.fingerprint_artifacts,
        ))
    }

    /// One full pass over a single build, without fan-out.
    fn copy_direct(&self, mut ctx: CopyContext) -> Result<CopyReport> {
        ctx.log_debug(format!(
            "Copying {} from {}",
            self.source.describe(),
            ctx.src().full_display_name()
        ));
        let target = ctx.target_dir();
        fs::create_dir_all(&target).map_err(|e| CopyError::io(&target, e))?;

        let copied = self.copy_files(&mut ctx, &target);
        let ended = self.end(&ctx);
        let count = copied?;
        ended?;

        let outcome = if count > 0 {
            CopyOutcome::Succeeded
        } else {
            CopyOutcome::NothingToDo
        };
        obs::emit_copy_finished(&ctx.src().full_display_name(), count, count > 0);
        Ok(CopyReport {
            outcome,
            files: std::mem::take(&mut ctx.copied),
        })
    }

    fn copy_files(&self, ctx: &mut CopyContext, target: &Path) -> Result<usize> {
        if !self.init(ctx)? {
            return Ok(0);
        }
        let files = self.scan(ctx)?;
        let mut count = 0;
        for file in &files {
            ctx.step().cancel().check()?;
            let dest = file.destination(target, ctx.is_flatten());
            ctx.log_debug(format!("Copying {} to {}", file.relative_path(), dest.display()));
            self.copy_one(file, &dest, ctx)?;
            count += 1;
        }
        ctx.log_info(format!(
            "Copied {count} {} from \"{}\" build number {}",
            if count == 1 { "artifact" } else { "artifacts" },
            ctx.src().job,
            ctx.src().number
        ));
        Ok(count)
    }

    /// Locate the source root. `false` declines the pass.
    fn init(&self, ctx: &mut CopyContext) -> Result<bool> {
        let src = ctx.src_ref();
        let host = ctx.step().host();
        let root = match self.source {
            CopySource::Artifacts => match host.artifact_manager(&src) {
                Some(ArtifactManager::Standard { dir }) => Some(SourceRoot::Dir(dir)),
                Some(ArtifactManager::Archive(archive)) if archive.exists() => {
                    Some(SourceRoot::Archive(archive))
                }
                _ => None,
            },
            CopySource::LegacyArtifacts => match host.artifact_manager(&src) {
                Some(ArtifactManager::Standard { dir }) => Some(SourceRoot::Dir(dir)),
                _ => None,
            },
            CopySource::Workspace => {
                let has_workspace = host
                    .job(&src.job)
                    .map_or(true, |job| job.kind.has_workspace());
                if has_workspace {
                    host.workspace(&src).map(SourceRoot::Dir)
                } else {
                    None
                }
            }
        };
        let Some(root) = root else {
            ctx.log_info(format!(
                "Unable to find {} of {}",
                self.source.describe(),
                ctx.src().full_display_name()
            ));
            return Ok(false);
        };
        ctx.begin(root);
        Ok(true)
    }

    fn scan(&self, ctx: &CopyContext) -> Result<Vec<FileInfo>> {
        let cancel = ctx.step().cancel();
        match &ctx.source_root {
            Some(SourceRoot::Dir(dir)) => {
                let root = ctx
                    .src_base_dir()
                    .split(['/', '\\'])
                    .filter(|segment| !segment.is_empty() && *segment != ".")
                    .fold(dir.clone(), |dir, segment| dir.join(segment));
                scan::scan_dir(&root, ctx.patterns(), cancel)
            }
            Some(SourceRoot::Archive(archive)) => {
                scan::scan_archive(archive, ctx.src_base_dir(), ctx.patterns(), cancel)
            }
            None => Ok(Vec::new()),
        }
    }

    fn copy_one(&self, file: &FileInfo, dest: &Path, ctx: &mut CopyContext) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CopyError::io(parent, e))?;
        }
        if let Ok(existing) = fs::symlink_metadata(dest) {
            if !existing.is_dir() {
                fs::remove_file(dest).map_err(|e| CopyError::io(dest, e))?;
            }
        }

        if let Some(link) = file.symlink_target() {
            make_symlink(link, dest).map_err(|e| CopyError::io(dest, e))?;
            ctx.copied.push(CopiedFile {
                source: ctx.src_ref(),
                relative_path: file.relative_path().to_string(),
                destination: dest.to_path_buf(),
                digest: None,
            });
            return Ok(());
        }

        let mut reader = file.open()?;
        let mut out = File::create(dest).map_err(|e| CopyError::io(dest, e))?;
        let mut buf = vec![0u8; ctx.step().settings().buffer_size.max(1)];
        loop {
            ctx.step().cancel().check()?;
            let n = reader
                .read(&mut buf)
                .map_err(|e| CopyError::io(file.source(), e))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).map_err(|e| CopyError::io(dest, e))?;
            ctx.digest_update(&buf[..n]);
        }
        drop(out);

        for (what, error) in file.copy_meta_to(dest) {
            ctx.step().log_exception(
                format!("Failed to copy {what} of {} to {}", file.relative_path(), dest.display()),
                &error,
            );
        }

        let digest = ctx.finish_digest();
        if let Some(digest) = &digest {
            let src = ctx.src_ref();
            let copier = ctx.copier_ref();
            let host = ctx.step().host();
            host.get_or_create(&src, file.file_name(), digest)?;
            host.associate(digest, &src)?;
            host.associate(digest, &copier)?;
            ctx.fingerprints
                .insert(file.file_name().to_string(), digest.clone());
        }
        ctx.copied.push(CopiedFile {
            source: ctx.src_ref(),
            relative_path: file.relative_path().to_string(),
            destination: dest.to_path_buf(),
            digest,
        });
        Ok(())
    }

    /// Attach fingerprints gathered by the pass to the source and copier
    /// builds. Runs after every pass, including failed or declined ones.
    fn end(&self, ctx: &CopyContext) -> Result<()> {
        if ctx.fingerprints().is_empty() {
            return Ok(());
        }
        let host = ctx.step().host();
        for build in [ctx.src_ref(), ctx.copier_ref()] {
            host.add_fingerprint_action(&build, ctx.fingerprints())?;
            obs::emit_fingerprints_recorded(&build.to_string(), ctx.fingerprints().len());
        }
        Ok(())
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
