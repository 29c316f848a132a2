#![no_main]

use census::query::{Direction, PathFilter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Patterns are client supplied: compiling and applying one must only
    // ever fail with an error
    let (pattern, path) = data.split_once('\n').unwrap_or((data, "/srv/data/file.txt"));
    for case_sensitive in [true, false] {
        if let Ok(Some(filter)) = PathFilter::new(pattern, case_sensitive, Direction::Include) {
            let _ = filter.keeps(path);
        }
    }
});
