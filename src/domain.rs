//! Domain types shared by the tracker, the session readers and the reports.

use std::fmt;

use serde::Serialize;

/// Width of the user name field in a Linux utmp record.
pub const UT_NAMESIZE: usize = 32;

/// Maximum length in bytes of a user name.
///
/// The last byte of the utmp field is reserved for the terminating NUL.
pub const MAX_USER_LEN: usize = UT_NAMESIZE - 1;

/// User identifier from the session table (newtype for type safety).
///
/// Names longer than [`MAX_USER_LEN`] bytes are truncated on a character
/// boundary. This is lossy: two long names sharing the same prefix are
/// tracked as one user, exactly as the session table itself stores them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserName(String);

impl UserName {
    /// Create a user name, truncating it to [`MAX_USER_LEN`] bytes.
    pub fn new(value: impl Into<String>) -> Self {
        let mut value = value.into();
        if value.len() > MAX_USER_LEN {
            let mut end = MAX_USER_LEN;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            value.truncate(end);
        }
        Self(value)
    }

    /// Get the user name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One active login session as read from the session table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    /// Owner of the session.
    pub user: UserName,

    /// Seconds since the last activity on the session's terminal.
    pub idle_seconds: u64,
}

impl SessionEntry {
    /// Create a new session entry.
    pub fn new(user: impl Into<UserName>, idle_seconds: u64) -> Self {
        Self {
            user: user.into(),
            idle_seconds,
        }
    }
}

/// The least idle user seen during a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeastIdle {
    pub user: UserName,
    pub idle_seconds: u64,
}

/// Outcome of a single poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Users that were not known before this poll.
    ///
    /// Always empty on the first poll after creation or reset.
    pub new_logins: Vec<UserName>,

    /// Users that went from idle to active since the previous poll.
    pub newly_active: Vec<UserName>,

    /// Least idle user among the sessions seen this poll.
    pub least_idle: Option<LeastIdle>,
}

impl PollReport {
    /// Idle seconds of the least idle user, or `u64::MAX` if no session was seen.
    pub fn least_idle_seconds(&self) -> u64 {
        self.least_idle.as_ref().map_or(u64::MAX, |l| l.idle_seconds)
    }

    /// Name of the least idle user, if any session was seen.
    pub fn least_idle_user(&self) -> Option<&UserName> {
        self.least_idle.as_ref().map(|l| &l.user)
    }

    /// Returns true if this poll detected a login or an awoken user.
    pub fn has_events(&self) -> bool {
        !self.new_logins.is_empty() || !self.newly_active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_short_is_kept() {
        let user = UserName::new("root");
        assert_eq!(user.as_str(), "root");
        assert_eq!(user.to_string(), "root");
    }

    #[test]
    fn test_user_name_truncated_to_max_len() {
        let long = "a".repeat(MAX_USER_LEN + 8);
        let user = UserName::new(long);
        assert_eq!(user.as_str().len(), MAX_USER_LEN);
    }

    #[test]
    fn test_user_name_truncation_respects_char_boundary() {
        // ASCII up to one byte short of the limit, then a two byte character
        let name = format!("{}é", "b".repeat(MAX_USER_LEN - 1));
        let user = UserName::new(name);
        assert_eq!(user.as_str(), "b".repeat(MAX_USER_LEN - 1));
    }

    #[test]
    fn test_truncated_names_compare_equal() {
        let prefix = "c".repeat(MAX_USER_LEN);
        let a = UserName::new(format!("{prefix}-alice"));
        let b = UserName::new(format!("{prefix}-bob"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_width_names_sharing_prefix_are_one_user() {
        let prefix = "x".repeat(UT_NAMESIZE - 1);
        let a = UserName::new(format!("{prefix}a"));
        let b = UserName::new(format!("{prefix}b"));

        assert_eq!(a, b);
        assert_eq!(a.as_str(), prefix);
    }

    #[test]
    fn test_name_at_max_len_is_kept() {
        let name = "y".repeat(MAX_USER_LEN);
        assert_eq!(UserName::new(name.clone()).as_str(), name);
    }

    #[test]
    fn test_empty_report() {
        let report = PollReport::default();
        assert!(!report.has_events());
        assert!(report.least_idle_user().is_none());
        assert_eq!(report.least_idle_seconds(), u64::MAX);
    }

    #[test]
    fn test_report_serializes_user_names_as_strings() {
        let report = PollReport {
            new_logins: vec![UserName::new("alice")],
            newly_active: vec![],
            least_idle: Some(LeastIdle {
                user: UserName::new("alice"),
                idle_seconds: 3,
            }),
        };

        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"{"new_logins":["alice"],"newly_active":[],"least_idle":{"user":"alice","idle_seconds":3}}"#
        );
    }
}
