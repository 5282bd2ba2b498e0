//! Launch-time validation.

use launchkit_common::{LaunchError, LaunchResult};
use std::path::Path;

/// Validate that `path` names an existing, executable regular file.
///
/// Symlinks are followed. On Unix at least one execute bit must be set; on
/// other platforms existence as a regular file is enough.
pub fn validate_executable(path: &Path) -> LaunchResult<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Err(LaunchError::executable_not_found(path)),
    };

    if !metadata.is_file() {
        return Err(LaunchError::executable_not_found(path));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(LaunchError::executable_not_found(path));
        }
    }

    Ok(())
}
