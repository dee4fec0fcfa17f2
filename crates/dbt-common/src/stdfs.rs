use crate::{FsResult, ectx};

use crate::constants::{DBT_DEFAULT_PROFILES_DIR_NAME, DBT_PROFILES_DIR_ENV};
use crate::error::LiftableResult;
use std::path::{Path, PathBuf};

/// Wrapper around [`std::fs::read_to_string`] that returns a useful error in case of failure.
pub fn read_to_string<P: AsRef<Path>>(path: P) -> FsResult<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).lift(ectx!("Failed to read file: {}", path.display()))
}

/// Wrapper around [`std::fs::exists`] that returns a useful error in case of failure.
pub fn exists<P: AsRef<Path>>(path: P) -> FsResult<bool> {
    let path = path.as_ref();
    std::fs::exists(path).lift(ectx!(
        "Failed to check if file/dir exists: {}",
        path.display()
    ))
}

/// Directories searched for `profiles.yml`, most specific first: an explicit
/// directory, then `$DBT_PROFILES_DIR`, then `~/.dbt`.
pub fn profiles_dir_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = explicit {
        candidates.push(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(DBT_PROFILES_DIR_ENV) {
        candidates.push(PathBuf::from(dir));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(DBT_DEFAULT_PROFILES_DIR_NAME));
    }
    candidates
}
