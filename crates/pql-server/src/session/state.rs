//! Per-session state: access mode, statement history, and variables.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// History entries kept per session; the oldest fall off first.
pub const MAX_HISTORY: usize = 500;

/// Whether a session may run mutations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "read_only",
            AccessMode::ReadWrite => "read_write",
        }
    }

    pub fn allows_mutation(self) -> bool {
        self == AccessMode::ReadWrite
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub pql: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub mode: AccessMode,
    pub created_at: DateTime<Utc>,
    history: VecDeque<HistoryEntry>,
    variables: BTreeMap<String, String>,
    started: Instant,
    last_active: Instant,
    executing: bool,
}

impl Session {
    pub fn new(mode: AccessMode) -> Self {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            created_at: Utc::now(),
            history: VecDeque::new(),
            variables: BTreeMap::new(),
            started: now,
            last_active: now,
            executing: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Idle past `idle_timeout` or older than `max_age`.
    pub fn is_expired(&self, now: Instant, idle_timeout: Duration, max_age: Duration) -> bool {
        self.idle_for(now) > idle_timeout || self.age(now) > max_age
    }

    /// Claim the session for one statement. `false` if one is already running.
    pub fn begin_execution(&mut self) -> bool {
        !std::mem::replace(&mut self.executing, true)
    }

    pub fn end_execution(&mut self) {
        self.executing = false;
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn record(&mut self, pql: impl Into<String>) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            pql: pql.into(),
            at: Utc::now(),
        });
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drop all history, returning how many entries were removed.
    pub fn clear_history(&mut self) -> usize {
        let n = self.history.len();
        self.history.clear();
        n
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_statement_at_a_time() {
        let mut s = Session::new(AccessMode::ReadWrite);
        assert!(!s.is_executing());
        assert!(s.begin_execution());
        assert!(!s.begin_execution());
        assert!(s.is_executing());
        s.end_execution();
        assert!(s.begin_execution());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut s = Session::new(AccessMode::ReadWrite);
        for i in 0..MAX_HISTORY + 5 {
            s.record(format!("count lease limit {i}"));
        }
        assert_eq!(s.history_len(), MAX_HISTORY);
        assert_eq!(s.history().next().unwrap().pql, "count lease limit 5");
        assert_eq!(s.clear_history(), MAX_HISTORY);
        assert_eq!(s.history_len(), 0);
    }

    #[test]
    fn test_expiry() {
        let s = Session::new(AccessMode::ReadOnly);
        let now = Instant::now();
        assert!(!s.is_expired(now, Duration::from_secs(60), Duration::from_secs(3600)));
        let later = now + Duration::from_secs(120);
        assert!(s.is_expired(later, Duration::from_secs(60), Duration::from_secs(3600)));
        assert!(s.is_expired(later, Duration::from_secs(600), Duration::from_secs(90)));
    }

    #[test]
    fn test_mode_rendering() {
        assert_eq!(AccessMode::default(), AccessMode::ReadWrite);
        assert!(!AccessMode::ReadOnly.allows_mutation());
        assert_eq!(AccessMode::ReadOnly.to_string(), "read_only");
    }
}
