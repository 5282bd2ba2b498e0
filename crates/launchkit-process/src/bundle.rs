//! Bundled resource resolution.
//!
//! An application ships its helper next to the launcher binary, or inside a
//! macOS-style bundle where the launcher lives in `Contents/MacOS/` and
//! resources in `Contents/Resources/`. Resolution turns a logical resource
//! name into the first matching on-disk executable.

use crate::validation::validate_executable;
use launchkit_common::{LaunchError, LaunchResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Candidate locations for `name`, relative to the directory holding the
/// launcher executable, in lookup order.
pub fn bundle_candidates(exe_dir: &Path, name: &str) -> Vec<PathBuf> {
    let mut candidates = vec![exe_dir.join(name)];

    if let Some(contents) = exe_dir.parent() {
        candidates.push(contents.join("Resources").join(name));
    }

    #[cfg(windows)]
    {
        let with_ext: Vec<PathBuf> = candidates
            .iter()
            .filter(|p| p.extension().is_none())
            .map(|p| p.with_extension("exe"))
            .collect();
        candidates.extend(with_ext);
    }

    candidates
}

/// Resolve `name` against the bundle layout rooted at `exe_dir`.
///
/// Returns `ExecutableNotFound` naming the primary candidate when nothing
/// matches.
pub fn resolve_in(exe_dir: &Path, name: &str) -> LaunchResult<PathBuf> {
    if name.is_empty() || Path::new(name).components().count() != 1 {
        return Err(LaunchError::invalid_spec(format!(
            "Bundled resource name must be a single path component: {:?}",
            name
        )));
    }

    let candidates = bundle_candidates(exe_dir, name);
    for candidate in &candidates {
        if validate_executable(candidate).is_ok() {
            debug!("Resolved bundled resource {} to {}", name, candidate.display());
            return Ok(candidate.clone());
        }
        debug!("Bundled resource candidate rejected: {}", candidate.display());
    }

    Err(LaunchError::executable_not_found(exe_dir.join(name)))
}

/// Resolve `name` relative to the currently running executable.
pub fn resolve_bundled_resource(name: &str) -> LaunchResult<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| {
        LaunchError::invalid_spec(format!("Cannot locate current executable: {}", e))
    })?;

    let exe_dir = exe.parent().ok_or_else(|| {
        LaunchError::invalid_spec(format!(
            "Current executable has no parent directory: {}",
            exe.display()
        ))
    })?;

    resolve_in(exe_dir, name)
}
