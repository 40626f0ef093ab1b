//! Copying mapped sources into the destination tree.
//!
//! Each [`MappingEntry`] names a file or directory under the source root and a
//! destination under the destination root. Directories are mirrored
//! recursively; exclude globs are matched against paths relative to the source
//! root, and a matching directory is pruned with everything beneath it.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::MaterializeError;
use crate::mapping::MappingEntry;

/// Directory nesting below a mapped directory that is still descended into.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// What to do when a declared source path does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSourcePolicy {
    /// Abort the run.
    #[default]
    Fail,
    /// Log and move on to the next entry.
    Skip,
}

impl std::str::FromStr for MissingSourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "skip" => Ok(Self::Skip),
            other => Err(format!("expected 'fail' or 'skip', got '{}'", other)),
        }
    }
}

/// Summary of one materialization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Destination paths written, relative to the destination root.
    pub files_written: Vec<String>,
    /// Sources skipped because they did not exist.
    pub skipped_sources: Vec<String>,
    /// Source-relative paths pruned by an exclude glob.
    pub excluded: Vec<String>,
}

impl MaterializeReport {
    pub fn any_written(&self) -> bool {
        !self.files_written.is_empty()
    }
}

/// Copies mapping entries from `source_root` into `dest_root`.
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    source_root: PathBuf,
    dest_root: PathBuf,
    policy: MissingSourcePolicy,
    max_depth: usize,
}

impl FileMaterializer {
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            policy: MissingSourcePolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_policy(mut self, policy: MissingSourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Copy every entry in order.
    pub fn materialize(&self, entries: &[MappingEntry]) -> Result<MaterializeReport, MaterializeError> {
        info!(
            entries = entries.len(),
            source_root = %self.source_root.display(),
            dest_root = %self.dest_root.display(),
            "copying mapped sources"
        );
        let mut report = MaterializeReport::default();
        for entry in entries {
            self.materialize_entry(entry, &mut report)?;
        }
        info!(
            written = report.files_written.len(),
            skipped = report.skipped_sources.len(),
            excluded = report.excluded.len(),
            "finished copying"
        );
        Ok(report)
    }

    fn materialize_entry(
        &self,
        entry: &MappingEntry,
        report: &mut MaterializeReport,
    ) -> Result<(), MaterializeError> {
        let dest_rel = checked_relative(&entry.destination)?;
        if escapes_root(Path::new(&entry.source)) {
            return Err(MaterializeError::SourceOutsideRoot(entry.source.clone()));
        }
        let source_path = self.source_root.join(&entry.source);

        if !source_path.exists() {
            return match self.policy {
                MissingSourcePolicy::Fail => Err(MaterializeError::MissingSource(entry.source.clone())),
                MissingSourcePolicy::Skip => {
                    info!(source = %entry.source, "source not found, skipping");
                    report.skipped_sources.push(entry.source.clone());
                    Ok(())
                }
            };
        }

        if source_path.is_dir() {
            self.copy_dir(&source_path, &dest_rel, &entry.exclude, 0, report)
        } else {
            self.copy_file(&source_path, &dest_rel, report)
        }
    }

    fn copy_dir(
        &self,
        source_dir: &Path,
        dest_rel: &Path,
        exclude: &[String],
        depth: usize,
        report: &mut MaterializeReport,
    ) -> Result<(), MaterializeError> {
        if depth > self.max_depth {
            warn!(path = %source_dir.display(), "max recursion depth exceeded");
            return Ok(());
        }

        let mut children: Vec<_> = std::fs::read_dir(source_dir)
            .map_err(|e| io_error(source_dir, e))?
            .collect::<Result<_, _>>()
            .map_err(|e| io_error(source_dir, e))?;
        children.sort_by_key(|c| c.file_name());

        for child in children {
            let path = child.path();
            let rel = self.source_relative(&path);
            let is_dir = path.is_dir();
            if is_excluded(&rel, is_dir, exclude) {
                info!(path = %rel, "skipping excluded path");
                report.excluded.push(rel);
                continue;
            }
            let child_dest = dest_rel.join(child.file_name());
            if is_dir {
                self.copy_dir(&path, &child_dest, exclude, depth + 1, report)?;
            } else {
                self.copy_file(&path, &child_dest, report)?;
            }
        }
        Ok(())
    }

    fn copy_file(
        &self,
        source: &Path,
        dest_rel: &Path,
        report: &mut MaterializeReport,
    ) -> Result<(), MaterializeError> {
        let dest = self.dest_root.join(dest_rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::copy(source, &dest).map_err(|e| io_error(source, e))?;
        let written = to_slash(dest_rel);
        debug!(from = %source.display(), to = %written, "copied file");
        report.files_written.push(written);
        Ok(())
    }

    fn source_relative(&self, path: &Path) -> String {
        to_slash(path.strip_prefix(&self.source_root).unwrap_or(path))
    }
}

/// Reject destinations that would land outside the destination root.
fn checked_relative(destination: &str) -> Result<PathBuf, MaterializeError> {
    let path = Path::new(destination);
    if escapes_root(path) {
        return Err(MaterializeError::OutsideRoot(destination.to_string()));
    }
    Ok(path.to_path_buf())
}

fn escapes_root(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Test `rel` against the exclude globs. Directories are also tested with a
/// trailing slash so `dir/` style patterns prune them.
fn is_excluded(rel: &str, is_dir: bool, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        let pattern = pattern.replace('\\', "/");
        glob_match::glob_match(&pattern, rel)
            || (is_dir && glob_match::glob_match(&pattern, &format!("{}/", rel)))
    })
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn io_error(path: &Path, source: std::io::Error) -> MaterializeError {
    MaterializeError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_copies_single_file_creating_parents() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "openapi.yml", "openapi: 3.1.0\n");

        let report = FileMaterializer::new(src.path(), dst.path())
            .materialize(&[MappingEntry::new("openapi.yml", "fern/openapi.yml")])
            .unwrap();

        assert_eq!(report.files_written, vec!["fern/openapi.yml".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dst.path().join("fern/openapi.yml")).unwrap(),
            "openapi: 3.1.0\n"
        );
    }

    #[test]
    fn test_overwrites_existing_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "a.yml", "new");
        write(dst.path(), "out/a.yml", "old");

        FileMaterializer::new(src.path(), dst.path())
            .materialize(&[MappingEntry::new("a.yml", "out/a.yml")])
            .unwrap();
        assert_eq!(std::fs::read_to_string(dst.path().join("out/a.yml")).unwrap(), "new");
    }

    #[test]
    fn test_directory_exclude_prunes_subtree() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "docs/guide.md", "g");
        write(src.path(), "docs/drafts/wip.md", "w");
        write(src.path(), "docs/drafts/deep/more.md", "m");
        write(src.path(), "docs/notes.tmp", "t");

        let entry = MappingEntry::new("docs", "site/docs").with_exclude(&["docs/drafts", "**/*.tmp"]);
        let report = FileMaterializer::new(src.path(), dst.path())
            .materialize(&[entry])
            .unwrap();

        assert_eq!(report.files_written, vec!["site/docs/guide.md".to_string()]);
        assert_eq!(
            report.excluded,
            vec!["docs/drafts".to_string(), "docs/notes.tmp".to_string()]
        );
        assert!(!dst.path().join("site/docs/drafts").exists());
    }

    #[test]
    fn test_trailing_slash_pattern_prunes_directory() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "docs/keep.md", "k");
        write(src.path(), "docs/private/secret.md", "s");

        let entry = MappingEntry::new("docs", "out").with_exclude(&["docs/private/"]);
        let report = FileMaterializer::new(src.path(), dst.path())
            .materialize(&[entry])
            .unwrap();
        assert_eq!(report.files_written, vec!["out/keep.md".to_string()]);
    }

    #[test]
    fn test_missing_source_fails_by_default() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let err = FileMaterializer::new(src.path(), dst.path())
            .materialize(&[MappingEntry::new("nope.yml", "out/nope.yml")])
            .unwrap_err();
        assert_eq!(err.to_string(), "source path nope.yml not found");
    }

    #[test]
    fn test_missing_source_skipped_under_skip_policy() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "a.yml", "a");
        let report = FileMaterializer::new(src.path(), dst.path())
            .with_policy(MissingSourcePolicy::Skip)
            .materialize(&[
                MappingEntry::new("nope.yml", "out/nope.yml"),
                MappingEntry::new("a.yml", "out/a.yml"),
            ])
            .unwrap();
        assert_eq!(report.skipped_sources, vec!["nope.yml".to_string()]);
        assert!(report.any_written());
    }

    #[test]
    fn test_depth_limit_stops_descent() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "tree/top.md", "0");
        write(src.path(), "tree/a/one.md", "1");
        write(src.path(), "tree/a/b/two.md", "2");

        let report = FileMaterializer::new(src.path(), dst.path())
            .with_max_depth(1)
            .materialize(&[MappingEntry::new("tree", "out")])
            .unwrap();
        assert_eq!(
            report.files_written,
            vec!["out/a/one.md".to_string(), "out/top.md".to_string()]
        );
    }

    #[test]
    fn test_destination_outside_root_rejected() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "a.yml", "a");
        let err = FileMaterializer::new(src.path(), dst.path())
            .materialize(&[MappingEntry::new("a.yml", "../escape.yml")])
            .unwrap_err();
        assert!(matches!(err, MaterializeError::OutsideRoot(_)));
    }

    #[test]
    fn test_source_outside_root_rejected() {
        let outer = tempfile::tempdir().unwrap();
        let src = outer.path().join("workspace");
        let dst = tempfile::tempdir().unwrap();
        write(outer.path(), "secret.txt", "token");
        write(&src, "a.yml", "a");

        let err = FileMaterializer::new(&src, dst.path())
            .with_policy(MissingSourcePolicy::Skip)
            .materialize(&[MappingEntry::new("../secret.txt", "leak.txt")])
            .unwrap_err();

        assert!(matches!(err, MaterializeError::SourceOutsideRoot(ref s) if s == "../secret.txt"));
        assert!(!dst.path().join("leak.txt").exists());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("skip".parse::<MissingSourcePolicy>().unwrap(), MissingSourcePolicy::Skip);
        assert_eq!(" FAIL ".parse::<MissingSourcePolicy>().unwrap(), MissingSourcePolicy::Fail);
        assert!("maybe".parse::<MissingSourcePolicy>().is_err());
    }
}
