//! Process existence checking.

use std::io;

/// Check if a process with the given PID exists.
///
/// On Unix this uses `kill(pid, 0)`, which sends no signal but reports
/// whether the PID is live. A zombie (exited but not yet reaped) still
/// counts as existing.
///
/// # Returns
///
/// * `Ok(true)` - Process exists
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - The check itself failed
///
/// # Examples
///
/// ```rust,no_run
/// use launchkit_process::process_exists;
///
/// if process_exists(1234).unwrap() {
///     println!("Process 1234 is running");
/// }
/// ```
pub fn process_exists(pid: u32) -> io::Result<bool> {
    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process existence check is only available on Unix",
        ))
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        // Exists, but belongs to someone else
        Err(Errno::EPERM) => Ok(true),
        Err(e) => Err(io::Error::from(e)),
    }
}
