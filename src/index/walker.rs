//! Depth-first traversal of one or more roots
//!
//! The walker owns iteration order and subtree skipping; what gets recorded
//! is up to the [`Visitor`].

use crate::error::{CensusError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// What the walker should do after visiting an entry
#[derive(Debug)]
pub enum Visit {
    Continue,
    /// Do not descend into this entry. Ignored for non-directories.
    SkipSubtree,
    /// Stop the whole walk and return the error
    Abort(CensusError),
}

pub trait Visitor {
    /// Called before the first entry of each root
    fn enter_root(&mut self, root: &Path);

    /// Called once per entry below the root, never for the root itself
    fn visit(&mut self, entry: &DirEntry) -> Visit;
}

/// Walk every root in order, feeding entries to `visitor`
///
/// Roots are not validated here; callers check they exist first. Entries the
/// walker cannot read (permission denied, vanished directories) are logged
/// and skipped.
pub fn walk<V: Visitor + ?Sized>(roots: &[PathBuf], visitor: &mut V) -> Result<()> {
    for root in roots {
        debug!(root = %root.display(), "walking root");
        visitor.enter_root(root);

        let mut entries = WalkDir::new(root).min_depth(1).into_iter();
        while let Some(next) = entries.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };

            match visitor.visit(&entry) {
                Visit::Continue => {}
                Visit::SkipSubtree => {
                    if entry.file_type().is_dir() {
                        entries.skip_current_dir();
                    }
                }
                Visit::Abort(err) => return Err(err),
            }
        }
    }

    Ok(())
}
