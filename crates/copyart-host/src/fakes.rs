//! In-memory host implementations
//!
//! Provides `MemoryHost` and `MemoryArchive`, which satisfy the trait
//! contracts without touching the filesystem. The manifest loader in
//! `manifest` fills a `MemoryHost` from disk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::Utc;

use crate::host_traits::*;
use crate::model::*;
use crate::Result;

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

/// In-memory build registry and fingerprint store.
#[derive(Debug, Default)]
pub struct MemoryHost {
    jobs: Mutex<BTreeMap<String, JobRecord>>,
    builds: Mutex<BTreeMap<BuildRef, BuildRecord>>,
    unreadable_jobs: Mutex<BTreeSet<String>>,
    unreadable_builds: Mutex<BTreeSet<BuildRef>>,
    artifacts: Mutex<HashMap<BuildRef, ArtifactManager>>,
    workspaces: Mutex<HashMap<BuildRef, PathBuf>>,
    actions: Mutex<BTreeMap<BuildRef, BuildActions>>,
    fingerprints: Mutex<BTreeMap<String, FingerprintRecord>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, job: JobRecord) {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.full_name.clone(), job);
    }

    /// Register a build. Its job is registered as freestyle if unknown.
    pub fn add_build(&self, build: BuildRecord) {
        {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.entry(build.job.clone())
                .or_insert_with(|| JobRecord::freestyle(build.job.clone()));
        }
        self.builds.lock().unwrap().insert(build.build_ref(), build);
    }

    pub fn deny_job(&self, full_name: &str) {
        self.unreadable_jobs
            .lock()
            .unwrap()
            .insert(full_name.to_string());
    }

    pub fn deny_build(&self, build: BuildRef) {
        self.unreadable_builds.lock().unwrap().insert(build);
    }

    pub fn set_artifacts(&self, build: BuildRef, manager: ArtifactManager) {
        self.artifacts.lock().unwrap().insert(build, manager);
    }

    pub fn set_workspace(&self, build: BuildRef, dir: PathBuf) {
        self.workspaces.lock().unwrap().insert(build, dir);
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    /// Snapshot of every recorded action, for persistence.
    pub fn all_actions(&self) -> BTreeMap<BuildRef, BuildActions> {
        self.actions.lock().unwrap().clone()
    }

    /// Snapshot of every fingerprint, for persistence.
    pub fn all_fingerprints(&self) -> Vec<FingerprintRecord> {
        self.fingerprints.lock().unwrap().values().cloned().collect()
    }

    /// Replace recorded actions and fingerprints with previously saved ones.
    pub fn restore(&self, actions: BTreeMap<BuildRef, BuildActions>, fingerprints: Vec<FingerprintRecord>) {
        *self.actions.lock().unwrap() = actions;
        *self.fingerprints.lock().unwrap() = fingerprints
            .into_iter()
            .map(|record| (record.digest.clone(), record))
            .collect();
    }
}

impl BuildRegistry for MemoryHost {
    fn job(&self, full_name: &str) -> Option<JobRecord> {
        self.jobs.lock().unwrap().get(full_name).cloned()
    }

    fn build(&self, build: &BuildRef) -> Option<BuildRecord> {
        self.builds.lock().unwrap().get(build).cloned()
    }

    fn builds(&self, job: &str, order: BuildOrder) -> Vec<BuildRecord> {
        let builds = self.builds.lock().unwrap();
        let mut found: Vec<BuildRecord> = builds
            .range(BuildRef::new(job, 0)..=BuildRef::new(job, u32::MAX))
            .map(|(_, build)| build.clone())
            .collect();
        if order == BuildOrder::NewestFirst {
            found.reverse();
        }
        found
    }

    fn can_read_job(&self, full_name: &str) -> bool {
        !self.unreadable_jobs.lock().unwrap().contains(full_name)
    }

    fn can_read_build(&self, build: &BuildRef) -> bool {
        self.can_read_job(&build.job) && !self.unreadable_builds.lock().unwrap().contains(build)
    }

    fn artifact_manager(&self, build: &BuildRef) -> Option<ArtifactManager> {
        self.artifacts.lock().unwrap().get(build).cloned()
    }

    fn workspace(&self, build: &BuildRef) -> Option<PathBuf> {
        self.workspaces.lock().unwrap().get(build).cloned()
    }

    fn add_fingerprint_action(
        &self,
        build: &BuildRef,
        fingerprints: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut actions = self.actions.lock().unwrap();
        actions
            .entry(build.clone())
            .or_default()
            .fingerprints
            .extend(fingerprints.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn record_copied_artifacts(
        &self,
        copier: &BuildRef,
        source: &BuildRef,
        files: &[String],
    ) -> Result<()> {
        let mut actions = self.actions.lock().unwrap();
        actions
            .entry(copier.clone())
            .or_default()
            .copied_artifacts
            .entry(source.to_string())
            .or_default()
            .extend(files.iter().cloned());
        Ok(())
    }

    fn actions(&self, build: &BuildRef) -> BuildActions {
        self.actions
            .lock()
            .unwrap()
            .get(build)
            .cloned()
            .unwrap_or_default()
    }
}

impl FingerprintStore for MemoryHost {
    fn get_or_create(
        &self,
        origin: &BuildRef,
        file_name: &str,
        digest: &str,
    ) -> Result<FingerprintRecord> {
        let mut fingerprints = self.fingerprints.lock().unwrap();
        let record = fingerprints
            .entry(digest.to_string())
            .or_insert_with(|| FingerprintRecord {
                digest: digest.to_string(),
                file_name: file_name.to_string(),
                original: origin.clone(),
                usages: BTreeSet::new(),
                created_at: Utc::now(),
            });
        Ok(record.clone())
    }

    fn associate(&self, digest: &str, build: &BuildRef) -> Result<()> {
        let mut fingerprints = self.fingerprints.lock().unwrap();
        if let Some(record) = fingerprints.get_mut(digest) {
            record.usages.insert(build.clone());
        }
        Ok(())
    }

    fn fingerprint(&self, digest: &str) -> Option<FingerprintRecord> {
        self.fingerprints.lock().unwrap().get(digest).cloned()
    }
}

// ---------------------------------------------------------------------------
// MemoryArchive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ArchivedFile {
    content: Vec<u8>,
    modified: Option<SystemTime>,
}

/// Virtual artifact archive backed by a map of path to bytes.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    present: bool,
    files: BTreeMap<String, ArchivedFile>,
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self {
            present: true,
            files: BTreeMap::new(),
        }
    }
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// An archive whose root does not exist.
    pub fn missing() -> Self {
        Self {
            present: false,
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(
            path.into(),
            ArchivedFile {
                content: content.into(),
                modified: None,
            },
        );
        self
    }

    pub fn with_modified(mut self, path: &str, modified: SystemTime) -> Self {
        if let Some(file) = self.files.get_mut(path) {
            file.modified = Some(modified);
        }
        self
    }

    pub fn into_manager(self) -> ArtifactManager {
        ArtifactManager::Archive(Arc::new(self))
    }
}

impl ArtifactArchive for MemoryArchive {
    fn exists(&self) -> bool {
        self.present
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = self.files.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{path} not in archive"))
        })?;
        Ok(Box::new(Cursor::new(file.content.clone())))
    }

    fn last_modified(&self, path: &str) -> io::Result<Option<SystemTime>> {
        Ok(self.files.get(path).and_then(|file| file.modified))
    }
}
