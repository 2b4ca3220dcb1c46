//! Session monitor: one session source plus one tracker.
//!
//! A poll holds the tracker lock from reading the wall clock until the
//! tracker has finished, so concurrent callers see whole polls only.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;

use anyhow::Context;
use anyhow::Result;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::domain::PollReport;
use crate::sessions::SessionSource;
use crate::tracker::SessionTracker;

/// Polls a session source and tracks logins and idle transitions.
pub struct SessionMonitor<S> {
    source: S,
    tracker: Mutex<SessionTracker>,
}

impl<S: SessionSource> SessionMonitor<S> {
    /// Create a monitor that has never polled.
    pub fn new(source: S, idle_threshold: u64) -> Self {
        Self {
            source,
            tracker: Mutex::new(SessionTracker::new(idle_threshold)),
        }
    }

    /// Read the session table once and update the tracker.
    ///
    /// The wall clock is captured once, right before reading the table, and
    /// used for both idle computation and the poll's epoch.
    pub fn poll(&self) -> Result<PollReport> {
        let mut tracker = self.lock_tracker()?;

        let now = SystemTime::now();
        let sessions = self
            .source
            .list_sessions(now)
            .with_context(|| format!("Failed to read sessions from {}", self.source.name()))?;
        trace!("{} sessions from {}", sessions.len(), self.source.name());

        let report = tracker
            .poll(now, sessions)
            .context("Failed to update session tracker")?;

        for user in &report.new_logins {
            info!("New login detected: {}", user);
        }
        for user in &report.newly_active {
            info!("User {} turned from idle to active", user);
        }
        if let Some(ref least) = report.least_idle {
            trace!("Least idle user: {} ({}s)", least.user, least.idle_seconds);
        }

        Ok(report)
    }

    /// Forget every tracked user; the next poll starts a fresh baseline.
    pub fn reset(&self) -> Result<()> {
        let mut tracker = self.lock_tracker()?;
        tracker.reset();
        debug!("Session tracker reset");
        Ok(())
    }

    /// Number of distinct users tracked so far.
    pub fn tracked_users(&self) -> Result<usize> {
        Ok(self.lock_tracker()?.len())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock_tracker(&self) -> Result<MutexGuard<'_, SessionTracker>> {
        self.tracker
            .lock()
            .map_err(|_| anyhow::anyhow!("Session tracker lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionEntry;
    use crate::domain::UserName;
    use crate::sessions::SessionError;
    use std::sync::Arc;
    use std::thread;

    /// In-memory session table that tests can rewrite between polls.
    #[derive(Default)]
    struct StaticSource {
        sessions: Mutex<Vec<SessionEntry>>,
        fail: Mutex<bool>,
    }

    impl StaticSource {
        fn set(&self, entries: &[(&str, u64)]) {
            *self.sessions.lock().unwrap() = entries
                .iter()
                .map(|(user, idle)| SessionEntry::new(*user, *idle))
                .collect();
        }

        fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }
    }

    impl SessionSource for StaticSource {
        fn name(&self) -> &'static str {
            "static"
        }

        fn list_sessions(&self, _now: SystemTime) -> Result<Vec<SessionEntry>, SessionError> {
            if *self.fail.lock().unwrap() {
                return Err(SessionError::Unavailable("test failure".to_string()));
            }
            Ok(self.sessions.lock().unwrap().clone())
        }
    }

    #[test]
    fn test_first_poll_is_baseline() {
        let monitor = SessionMonitor::new(StaticSource::default(), 10);
        monitor.source().set(&[("alice", 5), ("bob", 40)]);

        let report = monitor.poll().unwrap();
        assert!(!report.has_events());
        assert_eq!(report.least_idle_user().unwrap().as_str(), "alice");
        assert_eq!(monitor.tracked_users().unwrap(), 2);
    }

    #[test]
    fn test_login_and_awoken_across_polls() {
        let monitor = SessionMonitor::new(StaticSource::default(), 10);
        monitor.source().set(&[("alice", 30)]);
        monitor.poll().unwrap();
        monitor.poll().unwrap();

        monitor.source().set(&[("alice", 1), ("bob", 0)]);
        let report = monitor.poll().unwrap();

        assert_eq!(report.new_logins, vec![UserName::new("bob")]);
        assert_eq!(report.newly_active, vec![UserName::new("alice")]);
    }

    #[test]
    fn test_idle_user_at_startup_not_awoken() {
        let monitor = SessionMonitor::new(StaticSource::default(), 10);
        monitor.source().set(&[("alice", 5000)]);
        monitor.poll().unwrap();

        monitor.source().set(&[("alice", 2)]);
        let report = monitor.poll().unwrap();
        assert!(report.newly_active.is_empty());
    }

    #[test]
    fn test_failed_read_fails_poll() {
        let monitor = SessionMonitor::new(StaticSource::default(), 10);
        monitor.source().set_failing(true);

        let err = monitor.poll().unwrap_err();
        assert!(err.to_string().contains("Failed to read sessions from static"));
        assert_eq!(monitor.tracked_users().unwrap(), 0);
    }

    #[test]
    fn test_failed_first_read_keeps_baseline_pending() {
        let monitor = SessionMonitor::new(StaticSource::default(), 10);
        monitor.source().set_failing(true);
        assert!(monitor.poll().is_err());

        monitor.source().set_failing(false);
        monitor.source().set(&[("alice", 5)]);
        let report = monitor.poll().unwrap();
        assert!(report.new_logins.is_empty());
    }

    #[test]
    fn test_reset_restarts_baseline() {
        let monitor = SessionMonitor::new(StaticSource::default(), 10);
        monitor.source().set(&[("alice", 5)]);
        monitor.poll().unwrap();

        monitor.reset().unwrap();
        assert_eq!(monitor.tracked_users().unwrap(), 0);

        monitor.source().set(&[("alice", 5), ("bob", 1)]);
        let report = monitor.poll().unwrap();
        assert!(report.new_logins.is_empty());
    }

    #[test]
    fn test_concurrent_polls_report_each_login_once() {
        let monitor = Arc::new(SessionMonitor::new(StaticSource::default(), 10));
        monitor.source().set(&[("alice", 5)]);
        monitor.poll().unwrap();
        monitor.source().set(&[("alice", 5), ("bob", 0)]);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || monitor.poll().unwrap().new_logins.len())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1);
    }
}
