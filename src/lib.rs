//! loginwatchd - watch the login session table for new logins and users
//! returning from idle.
//!
//! Each poll reads the current sessions, diffs them against the users seen in
//! earlier polls, and reports new logins, awoken users and the least idle user.

pub mod config;
pub mod domain;
pub mod monitor;
pub mod report;
pub mod sessions;
pub mod tracker;
