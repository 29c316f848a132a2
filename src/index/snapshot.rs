//! In-memory snapshot of the files and directories below a set of roots

use crate::error::{CensusError, Result};
use crate::index::types::{file_id, FileEntry, FileId, WalkPolicy};
use crate::index::walker::{walk, Visit, Visitor};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::DirEntry;

/// Files keyed by id plus the set of recorded directory paths
///
/// Built once per query and dropped with the response.
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    files: FxHashMap<FileId, FileEntry>,
    dirs: FxHashSet<String>,
    /// Root currently being walked
    root: PathBuf,
    /// Resolved root that relative depths are measured against
    current: PathBuf,
    policy: WalkPolicy,
}

impl SnapshotIndex {
    pub fn new(policy: WalkPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Walk `roots` and return the populated snapshot
    pub fn build(roots: &[PathBuf], policy: WalkPolicy) -> Result<Self> {
        let mut index = Self::new(policy);
        walk(roots, &mut index)?;
        debug!(
            files = index.files.len(),
            dirs = index.dirs.len(),
            "snapshot built"
        );
        Ok(index)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Full paths of every recorded file, in map order
    pub fn files(&self) -> Vec<String> {
        self.files.values().map(|f| f.full_path.clone()).collect()
    }

    /// Full paths of every recorded directory, in set order
    pub fn dirs(&self) -> Vec<String> {
        self.dirs.iter().cloned().collect()
    }

    pub fn file(&self, id: FileId) -> Option<&FileEntry> {
        self.files.get(&id)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    fn insert(&mut self, entry: FileEntry) {
        self.files.insert(entry.id, entry);
    }

    /// Drop a file by full path
    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.files.remove(&file_id(path))
    }

    /// Re-key a file under a new path that must exist on disk
    pub fn relocate(&mut self, from: &str, to: &Path) -> Result<()> {
        if !self.files.contains_key(&file_id(from)) {
            return Err(CensusError::PathNotFound(from.to_string()));
        }
        fs::metadata(to).map_err(|source| CensusError::Stat {
            path: to.display().to_string(),
            source,
        })?;

        if let Some(mut entry) = self.remove(from) {
            entry.relocate(to);
            self.insert(entry);
        }
        Ok(())
    }
}

impl Visitor for SnapshotIndex {
    fn enter_root(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        self.current = root.to_path_buf();
    }

    fn visit(&mut self, entry: &DirEntry) -> Visit {
        let Ok(relative) = entry.path().strip_prefix(&self.root) else {
            return Visit::Continue;
        };
        if relative.as_os_str().is_empty() {
            return Visit::Continue;
        }

        let depth = relative.components().count();
        let name = entry.file_name().to_string_lossy();
        let full_path = self.current.join(relative);

        if entry.file_type().is_dir() {
            if self.policy.cuts_off(depth)
                || self.policy.is_ignored(&name)
                || self.policy.hides(&name)
            {
                return Visit::SkipSubtree;
            }
            self.dirs.insert(full_path.to_string_lossy().into_owned());
            return Visit::Continue;
        }

        if self.policy.beyond(depth) || self.policy.hides(&name) {
            return Visit::Continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                self.insert(FileEntry::new(&full_path, &metadata));
                Visit::Continue
            }
            Err(err) if err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                debug!(path = %full_path.display(), "file vanished during walk");
                Visit::Continue
            }
            Err(err) => Visit::Abort(CensusError::Walk(format!(
                "{}: {}",
                full_path.display(),
                err
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Root with `a.txt`, `.hidden`, `sub/b.txt`, `sub/deeper/c.txt`,
    /// `.cache/d.txt` and `node_modules/e.js`
    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("sub/b.txt"), "bb").unwrap();
        fs::write(root.join("sub/deeper/c.txt"), "ccc").unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache/d.txt"), "d").unwrap();
        fs::create_dir(root.join("node_modules")).unwrap();
        fs::write(root.join("node_modules/e.js"), "e").unwrap();
        dir
    }

    fn relative(root: &Path, paths: Vec<String>) -> HashSet<String> {
        paths
            .into_iter()
            .map(|p| {
                Path::new(&p)
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_depth_one_hides_subdirs_and_dotfiles() {
        let dir = fixture();
        let policy = WalkPolicy {
            depth: 1,
            ..Default::default()
        };
        let index = SnapshotIndex::build(&[dir.path().to_path_buf()], policy).unwrap();

        assert_eq!(relative(dir.path(), index.files()), set(&["a.txt"]));
        assert!(index.dirs().is_empty());
    }

    #[test]
    fn test_unbounded_with_hidden() {
        let dir = fixture();
        let policy = WalkPolicy {
            show_hidden: true,
            ..Default::default()
        };
        let index = SnapshotIndex::build(&[dir.path().to_path_buf()], policy).unwrap();

        assert_eq!(
            relative(dir.path(), index.files()),
            set(&[
                "a.txt",
                ".hidden",
                "sub/b.txt",
                "sub/deeper/c.txt",
                ".cache/d.txt",
                "node_modules/e.js",
            ])
        );
        assert_eq!(
            relative(dir.path(), index.dirs()),
            set(&["sub", "sub/deeper", ".cache", "node_modules"])
        );
    }

    #[test]
    fn test_hidden_directory_is_not_descended() {
        let dir = fixture();
        let index =
            SnapshotIndex::build(&[dir.path().to_path_buf()], WalkPolicy::default()).unwrap();

        let files = relative(dir.path(), index.files());
        assert!(!files.contains(".hidden"));
        assert!(!files.contains(".cache/d.txt"));
        assert!(!relative(dir.path(), index.dirs()).contains(".cache"));
    }

    #[test]
    fn test_ignored_names_skip_subtree() {
        let dir = fixture();
        let policy = WalkPolicy {
            ignore: vec!["node_modules".to_string(), "deeper".to_string()],
            ..Default::default()
        };
        let index = SnapshotIndex::build(&[dir.path().to_path_buf()], policy).unwrap();

        assert_eq!(
            relative(dir.path(), index.files()),
            set(&["a.txt", "sub/b.txt"])
        );
        assert_eq!(relative(dir.path(), index.dirs()), set(&["sub"]));
    }

    #[test]
    fn test_depth_two_records_first_level_dirs() {
        let dir = fixture();
        let policy = WalkPolicy {
            depth: 2,
            ..Default::default()
        };
        let index = SnapshotIndex::build(&[dir.path().to_path_buf()], policy).unwrap();

        assert_eq!(
            relative(dir.path(), index.files()),
            set(&["a.txt", "sub/b.txt", "node_modules/e.js"])
        );
        assert_eq!(
            relative(dir.path(), index.dirs()),
            set(&["sub", "node_modules"])
        );
        for path in index.files() {
            let depth = Path::new(&path).strip_prefix(dir.path()).unwrap().components().count();
            assert!(depth <= 2);
        }
    }

    #[test]
    fn test_depth_zero_records_nothing() {
        let dir = fixture();
        let policy = WalkPolicy {
            depth: 0,
            ..Default::default()
        };
        let index = SnapshotIndex::build(&[dir.path().to_path_buf()], policy).unwrap();
        assert_eq!(index.file_count(), 0);
        assert_eq!(index.dir_count(), 0);
    }

    #[test]
    fn test_multiple_roots_track_current() {
        let first = fixture();
        let second = fixture();
        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let policy = WalkPolicy {
            depth: 1,
            ..Default::default()
        };
        let index = SnapshotIndex::build(&roots, policy).unwrap();

        assert_eq!(index.file_count(), 2);
        assert_eq!(index.root(), second.path());
        assert_eq!(index.current(), second.path());
    }

    #[test]
    fn test_entries_carry_metadata() {
        let dir = fixture();
        let index =
            SnapshotIndex::build(&[dir.path().to_path_buf()], WalkPolicy::default()).unwrap();

        let path = dir.path().join("sub/deeper/c.txt");
        let path = path.to_string_lossy();
        let entry = index.file(file_id(&path)).unwrap();
        assert_eq!(entry.size_bytes, 3);
        assert_eq!(
            entry.parent_directory,
            dir.path().join("sub/deeper").to_string_lossy()
        );
    }

    #[test]
    fn test_remove_and_relocate() {
        let dir = fixture();
        let mut index =
            SnapshotIndex::build(&[dir.path().to_path_buf()], WalkPolicy::default()).unwrap();

        let a = dir.path().join("a.txt").to_string_lossy().into_owned();
        let b = dir.path().join("sub/b.txt").to_string_lossy().into_owned();
        let moved = dir.path().join("sub/deeper/a.txt");
        fs::rename(&a, &moved).unwrap();

        index.relocate(&a, &moved).unwrap();
        assert!(index.file(file_id(&a)).is_none());
        let entry = index.file(file_id(&moved.to_string_lossy())).unwrap();
        assert_eq!(
            entry.parent_directory,
            dir.path().join("sub/deeper").to_string_lossy()
        );

        assert!(matches!(
            index.relocate(&a, &moved),
            Err(CensusError::PathNotFound(_))
        ));
        assert!(matches!(
            index.relocate(&b, &dir.path().join("missing")),
            Err(CensusError::Stat { .. })
        ));

        assert!(index.remove(&b).is_some());
        assert!(index.remove(&b).is_none());
    }
}
