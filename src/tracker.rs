//! Session tracking across polls.
//!
//! Diffs each freshly read session table against the users seen so far and
//! reports new logins, users waking up from idle, and the least idle user.
//!
//! Idle rules:
//! - The first sighting of a user in a poll overwrites its idle time
//! - Further sessions of the same user in that poll can only lower it
//! - A user is awoken when its previous idle was at least the threshold and
//!   its idle time dropped since the previous poll

use std::collections::HashMap;
use std::collections::TryReserveError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use thiserror::Error;
use tracing::debug;

use crate::domain::LeastIdle;
use crate::domain::PollReport;
use crate::domain::SessionEntry;
use crate::domain::UserName;

/// Idle threshold used in release builds (one hour).
pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 60 * 60;

/// Idle threshold used in debug builds.
pub const DEBUG_IDLE_THRESHOLD_SECS: u64 = 10;

/// Errors that fail a whole poll.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Cannot allocate a record for user {user}: {source}")]
    Exhausted {
        user: UserName,
        #[source]
        source: TryReserveError,
    },
}

/// Identifies one pass over the session table.
///
/// Derived from the wall clock at whole-second resolution, so two polls
/// within the same second share a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpochToken(u64);

impl EpochToken {
    /// Token for a poll started at `now`. Times before the Unix epoch map to 0.
    pub fn from_time(now: SystemTime) -> Self {
        Self(now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs()))
    }
}

/// Last known state of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user: UserName,

    /// Minimum idle seconds over the user's sessions in the current epoch.
    pub idle: u64,

    /// Idle seconds at the end of the previous poll.
    pub idle_old: u64,

    /// Epoch at which `idle` was last overwritten.
    pub epoch: EpochToken,
}

impl SessionRecord {
    fn new(user: UserName, idle: u64, epoch: EpochToken) -> Self {
        Self {
            user,
            idle,
            idle_old: 0,
            epoch,
        }
    }

    /// Fold one more session of this user into the record.
    fn observe(&mut self, idle: u64, epoch: EpochToken) {
        if self.epoch != epoch {
            // Stale value from an earlier epoch: replace, never min-combine
            self.epoch = epoch;
            self.idle = idle;
        } else if idle < self.idle {
            self.idle = idle;
        }
    }

    fn has_awoken(&self, threshold: u64) -> bool {
        self.idle_old >= threshold && self.idle < self.idle_old
    }
}

/// Tracks users across polls of the session table.
#[derive(Debug)]
pub struct SessionTracker {
    records: HashMap<UserName, SessionRecord>,

    /// False until the first poll completes (and again after `reset`).
    has_prior_epoch: bool,

    /// Minimum idle seconds before a drop in idle counts as awoken.
    idle_threshold: u64,
}

impl SessionTracker {
    /// Create an empty tracker that has never polled.
    pub fn new(idle_threshold: u64) -> Self {
        Self {
            records: HashMap::new(),
            has_prior_epoch: false,
            idle_threshold,
        }
    }

    /// Process one snapshot of the session table taken at `now`.
    ///
    /// Sessions may repeat a user; each one is folded into that user's
    /// record. Users missing from the snapshot keep their record untouched.
    ///
    /// The first poll after creation or reset only records a baseline: no
    /// logins or awoken users are reported and `idle_old` stays 0.
    ///
    /// On error, records created earlier in the same poll are kept, but the
    /// prior epoch is not set and `idle_old` is not advanced.
    pub fn poll<I>(&mut self, now: SystemTime, sessions: I) -> Result<PollReport, TrackerError>
    where
        I: IntoIterator<Item = SessionEntry>,
    {
        let epoch = EpochToken::from_time(now);
        let mut report = PollReport::default();

        for SessionEntry { user, idle_seconds } in sessions {
            let idle = if let Some(record) = self.records.get_mut(&user) {
                record.observe(idle_seconds, epoch);
                record.idle
            } else {
                if let Err(source) = self.records.try_reserve(1) {
                    return Err(TrackerError::Exhausted { user, source });
                }

                debug!("Adding new user {} with idle {}s", user, idle_seconds);
                if self.has_prior_epoch {
                    report.new_logins.push(user.clone());
                }
                self.records.insert(
                    user.clone(),
                    SessionRecord::new(user.clone(), idle_seconds, epoch),
                );
                idle_seconds
            };

            if idle < report.least_idle_seconds() {
                report.least_idle = Some(LeastIdle {
                    user,
                    idle_seconds: idle,
                });
            }
        }

        if self.has_prior_epoch {
            let mut awoken: Vec<UserName> = self
                .records
                .values()
                .filter(|r| r.has_awoken(self.idle_threshold))
                .inspect(|r| {
                    debug!(
                        "User {} turned from idle to active (was {}s, now {}s)",
                        r.user, r.idle_old, r.idle
                    );
                })
                .map(|r| r.user.clone())
                .collect();
            awoken.sort();
            report.newly_active = awoken;

            for record in self.records.values_mut() {
                record.idle_old = record.idle;
            }
        }

        self.has_prior_epoch = true;
        Ok(report)
    }

    /// Drop every record and forget the prior epoch.
    ///
    /// The next poll behaves like the very first one.
    pub fn reset(&mut self) {
        debug!("Releasing {} session records", self.records.len());
        self.records.clear();
        self.records.shrink_to_fit();
        self.has_prior_epoch = false;
    }

    /// Look up the record for a user.
    pub fn record(&self, user: &str) -> Option<&SessionRecord> {
        self.records.get(&UserName::new(user))
    }

    /// Number of distinct users tracked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no user is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true once a poll has completed since creation or reset.
    pub fn has_prior_epoch(&self) -> bool {
        self.has_prior_epoch
    }

    pub fn idle_threshold(&self) -> u64 {
        self.idle_threshold
    }
}
