use std::collections::hash_map::DefaultHasher;
use std::fs::Metadata;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::SystemTime;

/// Identifier of a file in a snapshot, derived from its full path
pub type FileId = u64;

/// Hash a full path into a file id
///
/// Any change to the path changes the id. Ids are recomputed for every
/// snapshot and never persisted.
pub fn file_id(full_path: &str) -> FileId {
    let mut hasher = DefaultHasher::new();
    full_path.hash(&mut hasher);
    hasher.finish()
}

/// One indexed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: FileId,
    pub full_path: String,
    pub parent_directory: String,
    pub size_bytes: u64,
    pub modified_time: SystemTime,
}

impl FileEntry {
    pub fn new(full_path: &Path, metadata: &Metadata) -> Self {
        let path = full_path.to_string_lossy().into_owned();
        Self {
            id: file_id(&path),
            parent_directory: parent_of(full_path),
            full_path: path,
            size_bytes: metadata.len(),
            modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// Point the entry at a new path, recomputing its id
    pub fn relocate(&mut self, to: &Path) {
        self.full_path = to.to_string_lossy().into_owned();
        self.parent_directory = parent_of(to);
        self.id = file_id(&self.full_path);
    }
}

fn parent_of(path: &Path) -> String {
    path.parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What a walk records and where it stops
#[derive(Debug, Clone)]
pub struct WalkPolicy {
    /// Maximum relative depth; negative means unbounded
    pub depth: i32,
    /// Directory leaf names that are neither recorded nor descended into
    pub ignore: Vec<String>,
    /// Record entries whose name starts with `.`
    pub show_hidden: bool,
}

impl Default for WalkPolicy {
    fn default() -> Self {
        Self {
            depth: -1,
            ignore: Vec::new(),
            show_hidden: false,
        }
    }
}

impl WalkPolicy {
    /// A directory at `depth` sits on or past the cutoff and must not be
    /// recorded or descended into.
    pub fn cuts_off(&self, depth: usize) -> bool {
        self.depth >= 0 && depth >= self.depth as usize
    }

    /// A file at `depth` lies past the cutoff. Only reachable with a zero
    /// depth, since deeper files live under directories already cut off.
    pub fn beyond(&self, depth: usize) -> bool {
        self.depth >= 0 && depth > self.depth as usize
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|ignored| ignored == name)
    }

    pub fn hides(&self, name: &str) -> bool {
        !self.show_hidden && name.starts_with('.')
    }
}
