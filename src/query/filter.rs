//! Regex include/exclude passes over path lists

use crate::error::{CensusError, Result};
use regex::{Regex, RegexBuilder};

/// Which way a pass filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Keep paths that match (grep)
    Include,
    /// Keep paths that do not match (vgrep)
    Exclude,
}

/// A compiled filter pass
#[derive(Debug, Clone)]
pub struct PathFilter {
    regex: Regex,
    direction: Direction,
}

impl PathFilter {
    /// Compile `pattern`, or return `None` for an empty pattern, which means
    /// no filtering was requested in either direction.
    pub fn new(pattern: &str, case_sensitive: bool, direction: Direction) -> Result<Option<Self>> {
        if pattern.is_empty() {
            return Ok(None);
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| CensusError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Some(Self { regex, direction }))
    }

    /// Unanchored: a match anywhere in the path counts
    pub fn keeps(&self, path: &str) -> bool {
        let found = self.regex.is_match(path);
        match self.direction {
            Direction::Include => found,
            Direction::Exclude => !found,
        }
    }

    pub fn apply(&self, paths: Vec<String>) -> Vec<String> {
        paths.into_iter().filter(|p| self.keeps(p)).collect()
    }
}

/// Run one filter pass over `paths`
///
/// An empty pattern returns the input untouched, even for an exclude pass.
pub fn filter(
    paths: Vec<String>,
    pattern: &str,
    case_sensitive: bool,
    inclusive: bool,
) -> Result<Vec<String>> {
    let direction = if inclusive {
        Direction::Include
    } else {
        Direction::Exclude
    };
    match PathFilter::new(pattern, case_sensitive, direction)? {
        Some(pass) if !paths.is_empty() => Ok(pass.apply(paths)),
        _ => Ok(paths),
    }
}
