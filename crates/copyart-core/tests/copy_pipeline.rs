//! Copying files out of a build: layout, fan-out, metadata and
//! fingerprints.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use copyart_core::{
    digest_file, CancelToken, ContentDigest, CopyError, CopyOperation, CopyOutcome, CopySettings, CopySource,
    EnvVars, OperationContext, StepContext, UpstreamStrategy,
};
use copyart_host::{
    ArtifactArchive, ArtifactManager, BuildRecord, BuildRef, BuildRegistry, Composite, FingerprintStore, JobKind,
    JobRecord, MemoryArchive, MemoryHost,
};
use tempfile::TempDir;

struct Fixture {
    host: Arc<MemoryHost>,
    storage: TempDir,
    workspace: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            host: Arc::new(MemoryHost::new()),
            storage: tempfile::tempdir().unwrap(),
            workspace: tempfile::tempdir().unwrap(),
        }
    }

    /// Register `job #number` with archived files under a directory.
    fn archived_build(&self, build: BuildRecord, files: &[(&str, &str)]) -> BuildRecord {
        let dir = self
            .storage
            .path()
            .join(build.job.replace('/', "_"))
            .join(build.number.to_string());
        fs::create_dir_all(&dir).unwrap();
        for (path, content) in files {
            let file = dir.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        }
        self.host
            .set_artifacts(build.build_ref(), ArtifactManager::Standard { dir });
        self.host.add_build(build.clone());
        build
    }

    fn base(&self) -> OperationContext {
        self.base_with(CancelToken::new())
    }

    fn base_with(&self, cancel: CancelToken) -> OperationContext {
        let step = StepContext::new(self.host.clone(), copier(), EnvVars::new().with("DEST", "out"))
            .with_settings(CopySettings::new(UpstreamStrategy::UseOldest).with_buffer_size(4))
            .with_cancel(cancel);
        OperationContext::new(step, self.workspace.path())
    }

    fn target(&self, relative: &str) -> std::path::PathBuf {
        self.workspace.path().join(relative)
    }
}

fn copier() -> BuildRecord {
    BuildRecord::new("down", 4)
}

fn sha256(content: &str) -> String {
    let mut digest = ContentDigest::new();
    digest.update(content.as_bytes());
    digest.finish()
}

/// Archive with one file that fails to open and one that trips a cancel
/// token after its first chunk is read.
#[derive(Debug, Default)]
struct ScriptedArchive {
    files: Vec<(String, String)>,
    unreadable: Option<String>,
    cancels: Option<(String, CancelToken)>,
}

impl ScriptedArchive {
    fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    fn unreadable(mut self, path: &str) -> Self {
        self.unreadable = Some(path.to_string());
        self
    }

    fn cancels_while_reading(mut self, path: &str, token: CancelToken) -> Self {
        self.cancels = Some((path.to_string(), token));
        self
    }
}

impl ArtifactArchive for ScriptedArchive {
    fn exists(&self) -> bool {
        true
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.files.iter().map(|(path, _)| path.clone()).collect())
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        if self.unreadable.as_deref() == Some(path) {
            return Err(io::Error::new(io::ErrorKind::Other, "archive went away"));
        }
        let content = self
            .files
            .iter()
            .find(|(candidate, _)| candidate == path)
            .map(|(_, content)| content.clone().into_bytes())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        let reader: Box<dyn Read + Send> = match &self.cancels {
            Some((target, token)) if target == path => Box::new(CancelAfterFirstRead {
                inner: Cursor::new(content),
                token: token.clone(),
            }),
            _ => Box::new(Cursor::new(content)),
        };
        Ok(reader)
    }

    fn last_modified(&self, _path: &str) -> io::Result<Option<SystemTime>> {
        Ok(None)
    }
}

struct CancelAfterFirstRead {
    inner: Cursor<Vec<u8>>,
    token: CancelToken,
}

impl Read for CancelAfterFirstRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.token.cancel();
        Ok(n)
    }
}

impl Fixture {
    fn scripted_build(&self, archive: ScriptedArchive) -> BuildRecord {
        let src = BuildRecord::new("up", 1);
        self.host.add_build(src.clone());
        self.host
            .set_artifacts(src.build_ref(), ArtifactManager::Archive(Arc::new(archive)));
        src
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn copies_preserving_structure() {
    let fx = Fixture::new();
    let src = fx.archived_build(
        BuildRecord::new("up", 1),
        &[("a.txt", "a"), ("dir/b.txt", "b"), ("dir/c.log", "c")],
    );

    let op = CopyOperation::new(CopySource::Artifacts)
        .with_includes("**/*.txt")
        .with_target_dir("$DEST");
    let report = op.perform(&src, &fx.base()).unwrap();

    assert_eq!(report.outcome, CopyOutcome::Succeeded);
    assert_eq!(report.files.len(), 2);
    assert_eq!(read(&fx.target("out/a.txt")), "a");
    assert_eq!(read(&fx.target("out/dir/b.txt")), "b");
    assert!(!fx.target("out/dir/c.log").exists());
}

#[test]
fn flatten_drops_directories() {
    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("a.txt", "a"), ("dir/b.txt", "b")]);

    let op = CopyOperation::new(CopySource::Artifacts).flattened();
    op.perform(&src, &fx.base()).unwrap();

    assert_eq!(read(&fx.target("a.txt")), "a");
    assert_eq!(read(&fx.target("b.txt")), "b");
    assert!(!fx.target("dir").exists());
}

#[test]
fn excludes_and_src_base_dir() {
    let fx = Fixture::new();
    let src = fx.archived_build(
        BuildRecord::new("up", 1),
        &[("dist/app.jar", "jar"), ("dist/app-sources.jar", "src"), ("other.jar", "x")],
    );

    let op = CopyOperation::new(CopySource::Artifacts)
        .with_src_base_dir("dist")
        .with_excludes("*-sources.jar");
    let report = op.perform(&src, &fx.base()).unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(read(&fx.target("app.jar")), "jar");
    assert!(!fx.target("other.jar").exists());
}

#[test]
fn copying_twice_gives_the_same_tree() {
    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("a.txt", "a"), ("dir/b.txt", "b")]);
    let op = CopyOperation::new(CopySource::Artifacts);

    let first = op.perform(&src, &fx.base()).unwrap();
    let second = op.perform(&src, &fx.base()).unwrap();

    assert_eq!(first.files, second.files);
    assert_eq!(read(&fx.target("dir/b.txt")), "b");
}

#[test]
fn no_storage_is_nothing_to_do_but_creates_target() {
    let fx = Fixture::new();
    let src = BuildRecord::new("up", 1);
    fx.host.add_build(src.clone());

    let op = CopyOperation::new(CopySource::Artifacts).with_target_dir("empty");
    let report = op.perform(&src, &fx.base()).unwrap();

    assert_eq!(report.outcome, CopyOutcome::NothingToDo);
    assert!(report.files.is_empty());
    assert!(fx.target("empty").is_dir());
}

#[test]
fn nothing_matching_is_nothing_to_do() {
    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("a.txt", "a")]);

    let op = CopyOperation::new(CopySource::Artifacts).with_includes("*.zip");
    let report = op.perform(&src, &fx.base()).unwrap();
    assert_eq!(report.outcome, CopyOutcome::NothingToDo);
}

#[test]
fn fingerprints_recorded_on_source_and_copier() {
    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("a.txt", "hello"), ("dir/b.txt", "b")]);

    let report = CopyOperation::new(CopySource::Artifacts)
        .perform(&src, &fx.base())
        .unwrap();

    let digest = digest_file(&fx.target("a.txt")).unwrap();
    assert_eq!(
        digest,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert!(report.files.iter().all(|f| f.digest.is_some()));

    for build in [BuildRef::new("up", 1), copier().build_ref()] {
        let actions = fx.host.actions(&build);
        assert_eq!(actions.fingerprints.get("a.txt"), Some(&digest));
        assert!(actions.fingerprints.contains_key("b.txt"));
    }

    let record = fx.host.fingerprint(&digest).unwrap();
    assert_eq!(record.original, BuildRef::new("up", 1));
    assert!(record.usages.contains(&BuildRef::new("up", 1)));
    assert!(record.usages.contains(&copier().build_ref()));
}

#[test]
fn fingerprinting_can_be_disabled() {
    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("a.txt", "a")]);

    let report = CopyOperation::new(CopySource::Artifacts)
        .with_fingerprints(false)
        .perform(&src, &fx.base())
        .unwrap();

    assert_eq!(report.outcome, CopyOutcome::Succeeded);
    assert!(report.files[0].digest.is_none());
    assert!(fx.host.actions(&BuildRef::new("up", 1)).fingerprints.is_empty());
}

#[test]
fn matrix_runs_land_in_configuration_directories() {
    let fx = Fixture::new();
    fx.host.add_job(JobRecord::new("up", JobKind::Matrix));
    for config in ["cfg1", "cfg2"] {
        fx.host.add_job(JobRecord::new(
            format!("up/{config}"),
            JobKind::MatrixConfiguration { root: "up".into() },
        ));
        fx.archived_build(BuildRecord::new(format!("up/{config}"), 3), &[("f.txt", config)]);
    }
    let parent = BuildRecord::new("up", 3).with_composite(Composite::Matrix {
        runs: vec![BuildRef::new("up/cfg1", 3), BuildRef::new("up/cfg2", 3)],
    });
    fx.host.add_build(parent.clone());

    let report = CopyOperation::new(CopySource::Artifacts)
        .with_target_dir("target")
        .perform(&parent, &fx.base())
        .unwrap();

    assert_eq!(report.outcome, CopyOutcome::Succeeded);
    assert_eq!(read(&fx.target("cfg1/target/f.txt")), "cfg1");
    assert_eq!(read(&fx.target("cfg2/target/f.txt")), "cfg2");
    assert_eq!(report.files_by_source().len(), 2);
}

#[test]
fn module_set_copies_own_files_then_modules() {
    let fx = Fixture::new();
    fx.host.add_job(JobRecord::new("app", JobKind::ModuleSet));
    fx.host
        .add_job(JobRecord::new("app/core", JobKind::Module { root: "app".into() }));
    fx.archived_build(BuildRecord::new("app/core", 2), &[("core.jar", "core")]);
    let parent = fx.archived_build(
        BuildRecord::new("app", 2).with_composite(Composite::ModuleSet {
            modules: vec![BuildRef::new("app/core", 2)],
        }),
        &[],
    );

    let report = CopyOperation::new(CopySource::Artifacts)
        .perform(&parent, &fx.base())
        .unwrap();

    assert_eq!(report.outcome, CopyOutcome::Succeeded);
    assert_eq!(read(&fx.target("core.jar")), "core");
}

#[test]
fn virtual_archive_is_scanned_and_streamed() {
    let fx = Fixture::new();
    let src = BuildRecord::new("up", 1);
    fx.host.add_build(src.clone());
    fx.host.set_artifacts(
        src.build_ref(),
        MemoryArchive::new()
            .with_file("lib/a.jar", "jar")
            .with_file("README", "readme")
            .into_manager(),
    );

    let report = CopyOperation::new(CopySource::Artifacts)
        .with_includes("lib/")
        .perform(&src, &fx.base())
        .unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(read(&fx.target("lib/a.jar")), "jar");

    let legacy = CopyOperation::new(CopySource::LegacyArtifacts)
        .perform(&src, &fx.base())
        .unwrap();
    assert_eq!(legacy.outcome, CopyOutcome::NothingToDo);
}

#[test]
fn missing_virtual_archive_declines() {
    let fx = Fixture::new();
    let src = BuildRecord::new("up", 1);
    fx.host.add_build(src.clone());
    fx.host
        .set_artifacts(src.build_ref(), MemoryArchive::missing().into_manager());

    let report = CopyOperation::new(CopySource::Artifacts)
        .perform(&src, &fx.base())
        .unwrap();
    assert_eq!(report.outcome, CopyOutcome::NothingToDo);
}

#[test]
fn workspace_source_reads_build_workspace() {
    let fx = Fixture::new();
    let ws = fx.storage.path().join("ws");
    fs::create_dir_all(ws.join("build")).unwrap();
    fs::write(ws.join("build/out.bin"), "bin").unwrap();
    let src = BuildRecord::new("up", 1);
    fx.host.add_build(src.clone());
    fx.host.set_workspace(src.build_ref(), ws);

    let report = CopyOperation::new(CopySource::Workspace)
        .with_includes("build/*.bin")
        .perform(&src, &fx.base())
        .unwrap();
    assert_eq!(report.outcome, CopyOutcome::Succeeded);
    assert_eq!(read(&fx.target("build/out.bin")), "bin");
}

#[test]
fn invalid_pattern_fails_before_copying() {
    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("a.txt", "a")]);
    let err = CopyOperation::new(CopySource::Artifacts)
        .with_includes("a[")
        .perform(&src, &fx.base())
        .unwrap_err();
    assert!(matches!(err, CopyError::Pattern { .. }));
}

#[test]
fn cancelled_copy_stops_with_cancelled() {
    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("a.txt", "a")]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = CopyOperation::new(CopySource::Artifacts)
        .perform(&src, &fx.base_with(cancel))
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!fx.target("a.txt").exists());
}

#[test]
fn failed_copy_still_records_fingerprints_of_finished_files() {
    let fx = Fixture::new();
    let src = fx.scripted_build(
        ScriptedArchive::default()
            .with_file("a.txt", "alpha")
            .with_file("b.txt", "beta")
            .unreadable("b.txt"),
    );

    let err = CopyOperation::new(CopySource::Artifacts)
        .perform(&src, &fx.base())
        .unwrap_err();
    assert!(matches!(err, CopyError::Io { .. }));

    for build in [src.build_ref(), copier().build_ref()] {
        let fingerprints = fx.host.actions(&build).fingerprints;
        assert_eq!(fingerprints.len(), 1);
        assert_eq!(fingerprints.get("a.txt"), Some(&sha256("alpha")));
    }
    assert!(fx.host.fingerprint(&sha256("alpha")).is_some());
    assert_eq!(read(&fx.target("a.txt")), "alpha");
}

#[test]
fn cancelling_mid_file_commits_nothing_for_that_file() {
    let fx = Fixture::new();
    let cancel = CancelToken::new();
    let src = fx.scripted_build(
        ScriptedArchive::default()
            .with_file("a.txt", "alpha")
            .with_file("b.txt", "0123456789")
            .cancels_while_reading("b.txt", cancel.clone()),
    );

    let err = CopyOperation::new(CopySource::Artifacts)
        .perform(&src, &fx.base_with(cancel))
        .unwrap_err();
    assert!(err.is_cancelled());

    // One 4-byte chunk landed before the copy stopped.
    assert_eq!(read(&fx.target("b.txt")), "0123");

    let fingerprints = fx.host.actions(&src.build_ref()).fingerprints;
    assert!(fingerprints.contains_key("a.txt"));
    assert!(!fingerprints.contains_key("b.txt"));
    assert!(fx.host.fingerprint(&sha256("0123456789")).is_none());
    assert!(fx.host.fingerprint(&sha256("0123")).is_none());
    assert_eq!(fx.host.all_fingerprints().len(), 1);
}

#[cfg(unix)]
#[test]
fn permissions_and_symlinks_are_preserved() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let src = fx.archived_build(BuildRecord::new("up", 1), &[("run.sh", "#!/bin/sh\n")]);
    let dir = fx.storage.path().join("up").join("1");
    fs::set_permissions(dir.join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();
    std::os::unix::fs::symlink("run.sh", dir.join("latest.sh")).unwrap();

    let report = CopyOperation::new(CopySource::Artifacts)
        .perform(&src, &fx.base())
        .unwrap();
    assert_eq!(report.files.len(), 2);

    let mode = fs::metadata(fx.target("run.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let link = fx.target("latest.sh");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("run.sh"));

    let link_entry = report
        .files
        .iter()
        .find(|f| f.relative_path == "latest.sh")
        .unwrap();
    assert!(link_entry.digest.is_none());
}

#[test]
fn modification_time_is_propagated() {
    use std::time::{Duration, SystemTime};

    let fx = Fixture::new();
    let src = BuildRecord::new("up", 1);
    fx.host.add_build(src.clone());
    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    fx.host.set_artifacts(
        src.build_ref(),
        MemoryArchive::new()
            .with_file("a.txt", "a")
            .with_modified("a.txt", stamp)
            .into_manager(),
    );

    CopyOperation::new(CopySource::Artifacts)
        .perform(&src, &fx.base())
        .unwrap();
    let modified = fs::metadata(fx.target("a.txt")).unwrap().modified().unwrap();
    assert_eq!(modified, stamp);
}
