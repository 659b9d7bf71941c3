//! Filesystem-backed host described by a JSON manifest.
//!
//! Layout under the host root:
//!
//! ```text
//! host.json                               jobs, builds, permissions
//! state.json                              fingerprints and build actions
//! jobs/<job>/builds/<number>/archive/     archived artifacts of a build
//! jobs/<job>/workspace/                   workspace of the job
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HostError;
use crate::fakes::MemoryHost;
use crate::host_traits::ArtifactManager;
use crate::model::{BuildActions, BuildRecord, BuildRef, FingerprintRecord, JobRecord};
use crate::Result;

pub const MANIFEST_FILE: &str = "host.json";
pub const STATE_FILE: &str = "state.json";

/// Contents of `host.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostManifest {
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
    #[serde(default)]
    pub builds: Vec<BuildRecord>,
    #[serde(default)]
    pub unreadable_jobs: Vec<String>,
    #[serde(default)]
    pub unreadable_builds: Vec<BuildRef>,
}

/// Contents of `state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HostState {
    #[serde(default)]
    actions: Vec<RecordedActions>,
    #[serde(default)]
    fingerprints: Vec<FingerprintRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordedActions {
    build: BuildRef,
    #[serde(flatten)]
    actions: BuildActions,
}

pub fn job_dir(root: &Path, job: &str) -> PathBuf {
    job.split('/')
        .fold(root.join("jobs"), |dir, segment| dir.join(segment))
}

pub fn build_archive_dir(root: &Path, build: &BuildRef) -> PathBuf {
    job_dir(root, &build.job)
        .join("builds")
        .join(build.number.to_string())
        .join("archive")
}

pub fn job_workspace_dir(root: &Path, job: &str) -> PathBuf {
    job_dir(root, job).join("workspace")
}

/// Load the host rooted at `root` into memory.
pub fn load_host(root: &Path) -> Result<MemoryHost> {
    let manifest_path = root.join(MANIFEST_FILE);
    let text = fs::read_to_string(&manifest_path).map_err(|e| HostError::io(&manifest_path, e))?;
    let manifest: HostManifest = serde_json::from_str(&text)?;

    let host = MemoryHost::new();
    for job in manifest.jobs {
        host.add_job(job);
    }
    for build in manifest.builds {
        let build_ref = build.build_ref();
        host.add_build(build);

        let archive = build_archive_dir(root, &build_ref);
        if archive.is_dir() {
            host.set_artifacts(build_ref.clone(), ArtifactManager::Standard { dir: archive });
        }
        let workspace = job_workspace_dir(root, &build_ref.job);
        if workspace.is_dir() {
            host.set_workspace(build_ref, workspace);
        }
    }
    for job in &manifest.unreadable_jobs {
        host.deny_job(job);
    }
    for build in manifest.unreadable_builds {
        host.deny_build(build);
    }

    let state_path = root.join(STATE_FILE);
    if state_path.is_file() {
        let text = fs::read_to_string(&state_path).map_err(|e| HostError::io(&state_path, e))?;
        let state: HostState = serde_json::from_str(&text)?;
        host.restore(
            state
                .actions
                .into_iter()
                .map(|recorded| (recorded.build, recorded.actions))
                .collect(),
            state.fingerprints,
        );
    }

    debug!(root = %root.display(), jobs = host.jobs().len(), "Loaded host manifest");
    Ok(host)
}

/// Persist recorded actions and fingerprints to `state.json`, atomically.
pub fn save_state(root: &Path, host: &MemoryHost) -> Result<()> {
    let state = HostState {
        actions: host
            .all_actions()
            .into_iter()
            .map(|(build, actions)| RecordedActions { build, actions })
            .collect(),
        fingerprints: host.all_fingerprints(),
    };
    let json = serde_json::to_vec_pretty(&state)?;

    let mut tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| HostError::io(root, e))?;
    tmp.write_all(&json).map_err(|e| HostError::io(tmp.path(), e))?;
    let target = root.join(STATE_FILE);
    tmp.persist(&target)
        .map_err(|e| HostError::io(&target, e.error))?;
    debug!(path = %target.display(), "Saved host state");
    Ok(())
}
