use crate::error::{CensusError, Result};
use crate::index::{SnapshotIndex, WalkPolicy};
use crate::query::filter::{Direction, PathFilter};
use crate::server::protocol::QueryRequest;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Check every root, stopping at the first one that is missing
pub fn validate_roots(paths: &[String]) -> Result<Vec<PathBuf>> {
    paths
        .iter()
        .map(|path| match fs::metadata(path) {
            Ok(_) => Ok(PathBuf::from(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CensusError::PathNotFound(path.clone()))
            }
            Err(source) => Err(CensusError::Stat {
                path: path.clone(),
                source,
            }),
        })
        .collect()
}

/// Compile the request's filters in application order:
/// vgrep, vgrep-case, grep, grep-case
fn compile_filters(request: &QueryRequest) -> Result<Vec<PathFilter>> {
    let passes = [
        (&request.vgrep, false, Direction::Exclude),
        (&request.vgrep_case, true, Direction::Exclude),
        (&request.grep, false, Direction::Include),
        (&request.grep_case, true, Direction::Include),
    ];

    let mut filters = Vec::new();
    for (pattern, case_sensitive, direction) in passes {
        if let Some(filter) = PathFilter::new(pattern, case_sensitive, direction)? {
            filters.push(filter);
        }
    }
    Ok(filters)
}

/// Run a query against the local filesystem
///
/// Returns the matching paths, sorted and joined with newlines.
pub fn run(request: &QueryRequest) -> Result<String> {
    let roots = validate_roots(&request.paths)?;
    // Patterns are checked before walking so a bad regex fails fast
    let filters = compile_filters(request)?;

    let policy = WalkPolicy {
        depth: request.depth,
        ignore: request.ignore_paths.clone(),
        show_hidden: request.show_hidden,
    };
    let index = SnapshotIndex::build(&roots, policy)?;

    let mut paths = if request.dir_mode {
        index.dirs()
    } else {
        index.files()
    };
    for filter in &filters {
        paths = filter.apply(paths);
    }
    paths.sort_unstable();

    debug!(
        roots = roots.len(),
        results = paths.len(),
        dir_mode = request.dir_mode,
        "query complete"
    );
    Ok(paths.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub/b.txt"), "b").unwrap();
        fs::write(root.join("sub/Notes.MD"), "n").unwrap();
        dir
    }

    fn request(root: &Path) -> QueryRequest {
        QueryRequest {
            paths: vec![root.to_string_lossy().into_owned()],
            ..Default::default()
        }
    }

    fn relative(root: &Path, joined: &str) -> HashSet<String> {
        joined
            .lines()
            .map(|p| {
                Path::new(p)
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
    fn test_depth_one_without_hidden() {
        let dir = fixture();
        let req = QueryRequest {
            depth: 1,
            ..request(dir.path())
        };
        assert_eq!(relative(dir.path(), &run(&req).unwrap()), set(&["a.txt"]));
    }

    #[test]
    fn test_unbounded_with_hidden() {
        let dir = fixture();
        let req = QueryRequest {
            show_hidden: true,
            ..request(dir.path())
        };
        assert_eq!(
            relative(dir.path(), &run(&req).unwrap()),
            set(&["a.txt", ".hidden", "sub/b.txt", "sub/Notes.MD"])
        );
    }

    #[test]
    fn test_dir_mode() {
        let dir = fixture();
        let req = QueryRequest {
            dir_mode: true,
            ..request(dir.path())
        };
        assert_eq!(relative(dir.path(), &run(&req).unwrap()), set(&["sub"]));
    }

    #[test]
    fn test_output_is_sorted() {
        let dir = fixture();
        let out = run(&request(dir.path())).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn test_grep_and_vgrep_intersect() {
        let dir = fixture();
        let req = QueryRequest {
            grep: "/sub/".to_string(),
            vgrep: r"\.md$".to_string(),
            ..request(dir.path())
        };
        assert_eq!(relative(dir.path(), &run(&req).unwrap()), set(&["sub/b.txt"]));
    }

    #[test]
    fn test_case_sensitive_passes_are_independent() {
        let dir = fixture();
        let insensitive = QueryRequest {
            grep: r"/notes\.md$".to_string(),
            ..request(dir.path())
        };
        assert_eq!(
            relative(dir.path(), &run(&insensitive).unwrap()),
            set(&["sub/Notes.MD"])
        );

        let sensitive = QueryRequest {
            grep_case: r"/notes\.md$".to_string(),
            ..request(dir.path())
        };
        assert_eq!(run(&sensitive).unwrap(), "");

        let excluded = QueryRequest {
            vgrep_case: r"\.MD$".to_string(),
            vgrep: r"/A\.TXT$".to_string(),
            ..request(dir.path())
        };
        assert_eq!(relative(dir.path(), &run(&excluded).unwrap()), set(&["sub/b.txt"]));
    }

    #[test]
    fn test_missing_root_stops_on_first() {
        let dir = fixture();
        let missing = dir.path().join("nope").to_string_lossy().into_owned();
        let also_missing = dir.path().join("nope2").to_string_lossy().into_owned();
        let req = QueryRequest {
            paths: vec![
                dir.path().to_string_lossy().into_owned(),
                missing.clone(),
                also_missing,
            ],
            ..Default::default()
        };
        match run(&req) {
            Err(CensusError::PathNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected PathNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let dir = fixture();
        let req = QueryRequest {
            vgrep: "[".to_string(),
            ..request(dir.path())
        };
        assert!(matches!(run(&req), Err(CensusError::InvalidPattern { .. })));
    }

    #[test]
    fn test_multiple_roots() {
        let first = fixture();
        let second = fixture();
        let req = QueryRequest {
            depth: 1,
            paths: vec![
                first.path().to_string_lossy().into_owned(),
                second.path().to_string_lossy().into_owned(),
            ],
            ..Default::default()
        };
        assert_eq!(run(&req).unwrap().lines().count(), 2);
    }
}
