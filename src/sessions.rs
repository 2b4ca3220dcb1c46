//! Session table readers.
//!
//! A reader produces the current list of login sessions, one entry per
//! session, with the owning user and how long its terminal has been idle.

#[cfg(unix)]
mod utmp;

use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;

use crate::domain::SessionEntry;

#[cfg(unix)]
pub use utmp::UtmpSource;

/// Trait for session table sources.
pub trait SessionSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Read every active login session.
    ///
    /// `now` is the poll's wall-clock timestamp and is used for every idle
    /// computation in this call. Sessions whose idle time cannot be read are
    /// reported with idle 0 rather than failing the whole read.
    fn list_sessions(&self, now: SystemTime) -> Result<Vec<SessionEntry>, SessionError>;
}

/// Errors that can occur while reading the session table.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session table unavailable: {0}")]
    Unavailable(String),

    #[error("Device directory not found: {}", .0.display())]
    DeviceDirNotFound(PathBuf),
}

/// Whole seconds between `accessed` and `now`, clamped to 0 when the access
/// time lies in the future.
pub fn idle_since(accessed: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(accessed).map_or(0, |d| d.as_secs())
}

/// Idle seconds of the terminal `line` under `device_dir`.
///
/// The line always resolves inside `device_dir`: a leading `/` is dropped and
/// lines with `.` or `..` components are rejected. Returns 0 (active) if the
/// device cannot be inspected.
pub fn device_idle(device_dir: &Path, line: &str, now: SystemTime) -> u64 {
    let relative = Path::new(line.trim_start_matches('/'));
    if relative.as_os_str().is_empty() {
        debug!("Session without terminal line, treating as active");
        return 0;
    }
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        debug!("Rejecting terminal line {:?} outside device directory", line);
        return 0;
    }

    let path = device_dir.join(relative);
    match fs::metadata(&path).and_then(|m| m.accessed()) {
        Ok(accessed) => idle_since(accessed, now),
        Err(e) => {
            debug!(
                "Cannot read access time of {}: {}. Treating as active",
                path.display(),
                e
            );
            0
        }
    }
}
