//! Include/exclude file matching and source scanning.

use std::path::Path;
use std::sync::Arc;

use copyart_host::ArtifactArchive;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use super::file_info::FileInfo;
use crate::cancel::CancelToken;
use crate::error::{CopyError, Result};

/// Comma separated Ant-style include and exclude patterns.
///
/// `*` stays within one path segment, `**` spans segments, and a pattern
/// ending in `/` matches everything below that directory.
#[derive(Debug, Clone)]
pub struct PatternSet {
    includes: GlobSet,
    excludes: Option<GlobSet>,
}

impl PatternSet {
    /// Blank `includes` means every file. Blank `excludes` means none.
    pub fn new(includes: &str, excludes: &str) -> Result<Self> {
        let includes = if includes.trim().is_empty() {
            "**"
        } else {
            includes
        };
        let excludes = if excludes.trim().is_empty() {
            None
        } else {
            Some(build_set(excludes)?)
        };
        Ok(Self {
            includes: build_set(includes)?,
            excludes,
        })
    }

    /// Whether a `/` separated relative path is selected.
    pub fn is_match(&self, relative: &str) -> bool {
        self.includes.is_match(relative)
            && !self
                .excludes
                .as_ref()
                .is_some_and(|excludes| excludes.is_match(relative))
    }
}

fn build_set(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for token in patterns.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = normalize(token);
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| CopyError::Pattern {
                pattern: token.to_string(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| CopyError::Pattern {
        pattern: patterns.to_string(),
        reason: e.to_string(),
    })
}

fn normalize(token: &str) -> String {
    let token = token.replace('\\', "/");
    let token = token.trim_start_matches("./");
    if token.ends_with('/') {
        format!("{token}**")
    } else {
        token.to_string()
    }
}

/// Files under `root` selected by `patterns`, in path order. Symbolic links
/// are reported as files and never followed.
pub(crate) fn scan_dir(root: &Path, patterns: &PatternSet, cancel: &CancelToken) -> Result<Vec<FileInfo>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
    {
        cancel.check()?;
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            CopyError::io(path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !patterns.is_match(&relative) {
            continue;
        }
        found.push(FileInfo::from_disk(entry.path(), relative)?);
    }
    Ok(found)
}

/// Files of `archive` below `base` selected by `patterns`, in path order.
pub(crate) fn scan_archive(
    archive: &Arc<dyn ArtifactArchive>,
    base: &str,
    patterns: &PatternSet,
    cancel: &CancelToken,
) -> Result<Vec<FileInfo>> {
    let prefix = base.trim_matches('/');
    let mut paths = archive
        .list()
        .map_err(|e| CopyError::io(prefix, e))?;
    paths.sort();

    let mut found = Vec::new();
    for path in paths {
        cancel.check()?;
        let relative = if prefix.is_empty() {
            path.as_str()
        } else {
            match path.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')) {
                Some(rest) => rest,
                None => continue,
            }
        };
        if relative.split('/').any(|segment| segment == "..") || !patterns.is_match(relative) {
            continue;
        }
        let modified = archive
            .last_modified(&path)
            .map_err(|e| CopyError::io(&path, e))?;
        found.push(FileInfo::from_archive(
            Arc::clone(archive),
            path.clone(),
            relative.to_string(),
            modified,
        ));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_includes_everything() {
        let set = PatternSet::new("", "").unwrap();
        assert!(set.is_match("a.txt"));
        assert!(set.is_match("deep/dir/b.bin"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let set = PatternSet::new("*.txt", "").unwrap();
        assert!(set.is_match("a.txt"));
        assert!(!set.is_match("dir/a.txt"));

        let deep = PatternSet::new("**/*.txt", "").unwrap();
        assert!(deep.is_match("a.txt"));
        assert!(deep.is_match("dir/sub/a.txt"));
    }

    #[test]
    fn test_excludes_win() {
        let set = PatternSet::new("**/*.jar, docs/", "**/*-sources.jar").unwrap();
        assert!(set.is_match("lib/app.jar"));
        assert!(!set.is_match("lib/app-sources.jar"));
        assert!(set.is_match("docs/index.html"));
        assert!(!set.is_match("README"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PatternSet::new("a[", "").unwrap_err();
        assert!(matches!(err, CopyError::Pattern { .. }));
    }
}
