use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use copyart_host::ArtifactArchive;

use crate::error::{CopyError, Result};

#[derive(Clone)]
enum Origin {
    Disk(PathBuf),
    Archive {
        archive: Arc<dyn ArtifactArchive>,
        path: String,
    },
}

/// One file selected for copying, with the metadata that travels with it.
#[derive(Clone)]
pub struct FileInfo {
    relative_path: String,
    origin: Origin,
    symlink_target: Option<PathBuf>,
    mode: Option<u32>,
    modified: Option<SystemTime>,
}

impl FileInfo {
    pub(crate) fn from_disk(path: &Path, relative_path: String) -> Result<Self> {
        let metadata = fs::symlink_metadata(path).map_err(|e| CopyError::io(path, e))?;
        let symlink_target = if metadata.file_type().is_symlink() {
            Some(fs::read_link(path).map_err(|e| CopyError::io(path, e))?)
        } else {
            None
        };
        Ok(Self {
            relative_path,
            origin: Origin::Disk(path.to_path_buf()),
            symlink_target,
            mode: unix_mode(&metadata),
            modified: metadata.modified().ok(),
        })
    }

    pub(crate) fn from_archive(
        archive: Arc<dyn ArtifactArchive>,
        path: String,
        relative_path: String,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            relative_path,
            origin: Origin::Archive { archive, path },
            symlink_target: None,
            mode: None,
            modified,
        }
    }

    /// `/` separated path relative to the scanned root.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(self.relative_path.as_str())
    }

    pub fn symlink_target(&self) -> Option<&Path> {
        self.symlink_target.as_deref()
    }

    pub fn mode(&self) -> Option<u32> {
        self.mode
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Display form of where the content comes from.
    pub fn source(&self) -> String {
        match &self.origin {
            Origin::Disk(path) => path.display().to_string(),
            Origin::Archive { path, .. } => path.clone(),
        }
    }

    pub(crate) fn open(&self) -> Result<Box<dyn Read + Send>> {
        match &self.origin {
            Origin::Disk(path) => {
                let file = File::open(path).map_err(|e| CopyError::io(path, e))?;
                let reader: Box<dyn Read + Send> = Box::new(file);
                Ok(reader)
            }
            Origin::Archive { archive, path } => {
                archive.open(path).map_err(|e| CopyError::io(path, e))
            }
        }
    }

    /// Where the file lands under `target_dir`.
    pub fn destination(&self, target_dir: &Path, flatten: bool) -> PathBuf {
        if flatten {
            target_dir.join(self.file_name())
        } else {
            self.relative_path
                .split('/')
                .fold(target_dir.to_path_buf(), |dir, segment| dir.join(segment))
        }
    }

    /// Apply permissions and modification time to a copied file.
    pub(crate) fn copy_meta_to(&self, dest: &Path) -> Vec<(&'static str, io::Error)> {
        let mut failures = Vec::new();
        if let Some(modified) = self.modified {
            let touched = File::options()
                .write(true)
                .open(dest)
                .and_then(|file| file.set_modified(modified));
            if let Err(e) = touched {
                failures.push(("modification time", e));
            }
        }
        if let Some(mode) = self.mode {
            if let Err(e) = set_unix_mode(dest, mode) {
                failures.push(("permissions", e));
            }
        }
        failures
    }
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("relative_path", &self.relative_path)
            .field("source", &self.source())
            .field("symlink_target", &self.symlink_target)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(unix)]
fn unix_mode(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    if metadata.file_type().is_symlink() {
        return None;
    }
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn set_unix_mode(dest: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dest, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_unix_mode(_dest: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
