//! Login sessions from the system's utmpx database.
//!
//! Walks the user accounting records with `getutxent` and derives each
//! session's idle time from the access time of its terminal device.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use libc::c_char;
use tracing::debug;
use tracing::trace;

use super::SessionError;
use super::SessionSource;
use super::device_idle;
use crate::domain::SessionEntry;
use crate::domain::UserName;

/// The utmpx iteration functions share one process-wide cursor.
static UTMPX_CURSOR: Mutex<()> = Mutex::new(());

/// A `USER_PROCESS` record copied out of the utmpx database.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoginRecord {
    user: String,
    line: String,
}

/// Session source backed by utmpx and the terminal devices.
#[derive(Debug, Clone)]
pub struct UtmpSource {
    device_dir: PathBuf,
}

impl UtmpSource {
    /// Create a source resolving terminal lines under `device_dir` (normally `/dev`).
    pub fn new(device_dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let device_dir = device_dir.into();
        if !device_dir.is_dir() {
            return Err(SessionError::DeviceDirNotFound(device_dir));
        }
        Ok(Self { device_dir })
    }

    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }
}

impl SessionSource for UtmpSource {
    fn name(&self) -> &'static str {
        "utmpx"
    }

    fn list_sessions(&self, now: SystemTime) -> Result<Vec<SessionEntry>, SessionError> {
        let records = read_login_records()?;
        trace!("Read {} login records", records.len());

        let sessions = records
            .into_iter()
            .filter(|r| !r.user.is_empty())
            .map(|r| {
                let idle = device_idle(&self.device_dir, &r.line, now);
                SessionEntry::new(UserName::new(r.user), idle)
            })
            .collect();

        Ok(sessions)
    }
}

/// Copy every `USER_PROCESS` record out of the utmpx database.
fn read_login_records() -> Result<Vec<LoginRecord>, SessionError> {
    let _cursor = UTMPX_CURSOR
        .lock()
        .map_err(|_| SessionError::Unavailable("utmpx cursor lock poisoned".to_string()))?;

    let mut records = Vec::new();

    // SAFETY: the cursor lock serializes all utmpx calls in this process.
    // getutxent returns a pointer into static storage that stays valid until
    // the next call; the fields are copied out before advancing.
    unsafe {
        libc::setutxent();
        loop {
            let entry = libc::getutxent();
            if entry.is_null() {
                break;
            }

            let entry = &*entry;
            if entry.ut_type != libc::USER_PROCESS {
                continue;
            }

            records.push(LoginRecord {
                user: decode_field(&entry.ut_user),
                line: decode_field(&entry.ut_line),
            });
        }
        libc::endutxent();
    }

    if records.is_empty() {
        debug!("No user sessions in utmpx");
    }

    Ok(records)
}

/// Decode a NUL-padded fixed-width utmpx field.
///
/// The field need not be NUL-terminated when it is completely filled.
fn decode_field(field: &[c_char]) -> String {
    #[allow(clippy::cast_sign_loss)]
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
