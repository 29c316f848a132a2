//! Translate roots between a host's home directory and the portable `~` form
//!
//! The client remotizes before sending so the daemon can localize against its
//! own home directory. Home is resolved once per call and threaded through.

use crate::error::{CensusError, Result};
use std::path::{Path, PathBuf};

/// Current user's home directory
pub fn home_dir() -> Result<PathBuf> {
    require_home(dirs::home_dir())
}

fn require_home(home: Option<PathBuf>) -> Result<PathBuf> {
    home.ok_or(CensusError::HomeDirUnavailable)
}

/// Replace a leading `~` with this host's home directory
pub fn localize(paths: &[String]) -> Result<Vec<String>> {
    let home = home_dir()?;
    Ok(localize_with(paths, &home))
}

/// Replace a leading home directory with `~`
pub fn remotize(paths: &[String]) -> Result<Vec<String>> {
    let home = home_dir()?;
    Ok(remotize_with(paths, &home))
}

/// Only `~` and `~/...` are expanded; `~user` forms are left alone.
pub fn localize_with(paths: &[String], home: &Path) -> Vec<String> {
    paths
        .iter()
        .map(|path| {
            if path == "~" {
                home.to_string_lossy().into_owned()
            } else if let Some(rest) = path.strip_prefix("~/") {
                home.join(rest).to_string_lossy().into_owned()
            } else {
                path.clone()
            }
        })
        .collect()
}

/// Matches whole components, so `/home/me2` is not under `/home/me`.
pub fn remotize_with(paths: &[String], home: &Path) -> Vec<String> {
    paths
        .iter()
        .map(|path| match Path::new(path).strip_prefix(home) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Ok(rest) => format!("~/{}", rest.to_string_lossy()),
            Err(_) => path.clone(),
        })
        .collect()
}
