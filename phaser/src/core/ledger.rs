//! Progress ledger state and its mutations.
//!
//! The ledger is the single source of truth for resumability. All sets are
//! stored as insertion-ordered, duplicate-free vectors so the serialized
//! record stays stable across writes. Persistence lives in
//! `io::ledger_store`; this module only defines the state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::ProcessedPair;

/// Current on-disk format version.
pub const LEDGER_VERSION: u32 = 1;

/// Durable record of login and interaction progress for one era.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Assigned once when the era starts, stable across resumes.
    pub session_id: String,
    /// Account ids attempted at least once in this era.
    #[serde(default)]
    pub login_attempts: Vec<String>,
    #[serde(default)]
    pub successful_logins: Vec<String>,
    #[serde(default)]
    pub failed_logins: Vec<String>,
    /// Completed (account, resource) interactions. Only grows within an era.
    #[serde(default)]
    pub processed: Vec<ProcessedPair>,
    /// Task in flight, kept for crash diagnostics.
    #[serde(default)]
    pub current_account: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

fn default_version() -> u32 {
    LEDGER_VERSION
}

/// Rejected ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("account {0} has no successful login in this session")]
    NotAuthenticated(String),
}

/// Entries removed by a surgical cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupCounts {
    pub login_attempts: usize,
    pub successful_logins: usize,
    pub failed_logins: usize,
    pub processed: usize,
    pub current_account_reset: bool,
}

impl CleanupCounts {
    pub fn total(&self) -> usize {
        self.login_attempts
            + self.successful_logins
            + self.failed_logins
            + self.processed
            + usize::from(self.current_account_reset)
    }
}

impl LedgerState {
    /// Start a new era at `now`.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            version: LEDGER_VERSION,
            session_id: session_id_for(now),
            login_attempts: Vec::new(),
            successful_logins: Vec::new(),
            failed_logins: Vec::new(),
            processed: Vec::new(),
            current_account: None,
            start_time: now,
            last_update: now,
        }
    }

    /// Start the era that follows this one. Its session id always differs from
    /// the current one, even within the same second.
    pub fn next_era(&self, now: DateTime<Utc>) -> Self {
        let mut next = Self::fresh(now);
        next.session_id = next_session_id(&self.session_id, now);
        next
    }

    /// Record the final outcome of a login. The most recent outcome wins.
    pub fn record_login(&mut self, account_id: &str, success: bool) {
        insert_unique(&mut self.login_attempts, account_id);
        if success {
            insert_unique(&mut self.successful_logins, account_id);
            self.failed_logins.retain(|id| id != account_id);
        } else {
            insert_unique(&mut self.failed_logins, account_id);
            self.successful_logins.retain(|id| id != account_id);
        }
    }

    /// Mark a pair completed. Returns `Ok(false)` if it was already recorded.
    pub fn record_processed(&mut self, account_id: &str, resource: &str) -> Result<bool, LedgerError> {
        if !self.is_successful(account_id) {
            return Err(LedgerError::NotAuthenticated(account_id.to_string()));
        }
        if self.has_processed(account_id, resource) {
            return Ok(false);
        }
        self.processed.push(ProcessedPair::new(account_id, resource));
        Ok(true)
    }

    pub fn set_current(&mut self, account_id: Option<&str>) {
        self.current_account = account_id.map(str::to_string);
    }

    pub fn was_attempted(&self, account_id: &str) -> bool {
        self.login_attempts.iter().any(|id| id == account_id)
    }

    pub fn is_successful(&self, account_id: &str) -> bool {
        self.successful_logins.iter().any(|id| id == account_id)
    }

    pub fn is_failed(&self, account_id: &str) -> bool {
        self.failed_logins.iter().any(|id| id == account_id)
    }

    pub fn has_processed(&self, account_id: &str, resource: &str) -> bool {
        self.processed
            .iter()
            .any(|pair| pair.account_id == account_id && pair.resource == resource)
    }

    /// Remove every trace of `account_ids` without starting a new era.
    pub fn remove_accounts(&mut self, account_ids: &[String]) -> CleanupCounts {
        let doomed = |id: &String| account_ids.contains(id);

        let mut counts = CleanupCounts {
            login_attempts: remove_matching(&mut self.login_attempts, doomed),
            successful_logins: remove_matching(&mut self.successful_logins, doomed),
            failed_logins: remove_matching(&mut self.failed_logins, doomed),
            ..CleanupCounts::default()
        };

        let before = self.processed.len();
        self.processed
            .retain(|pair| !account_ids.contains(&pair.account_id));
        counts.processed = before - self.processed.len();

        if self
            .current_account
            .as_ref()
            .is_some_and(|current| account_ids.contains(current))
        {
            self.current_account = None;
            counts.current_account_reset = true;
        }
        counts
    }

    /// Check structural invariants. Returns one message per violation.
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for id in &self.successful_logins {
            if self.is_failed(id) {
                errors.push(format!("account {id} is both successful and failed"));
            }
        }
        for id in self.successful_logins.iter().chain(&self.failed_logins) {
            if !self.was_attempted(id) {
                errors.push(format!("account {id} has an outcome but no login attempt"));
            }
        }
        for pair in &self.processed {
            if !self.was_attempted(&pair.account_id) {
                errors.push(format!(
                    "processed pair ({}, {}) belongs to an account never attempted",
                    pair.account_id, pair.resource
                ));
            }
        }
        push_duplicates(&mut errors, "login_attempts", &self.login_attempts);
        push_duplicates(&mut errors, "successful_logins", &self.successful_logins);
        push_duplicates(&mut errors, "failed_logins", &self.failed_logins);
        for (idx, pair) in self.processed.iter().enumerate() {
            if self.processed[..idx].contains(pair) {
                errors.push(format!(
                    "duplicate processed pair ({}, {})",
                    pair.account_id, pair.resource
                ));
            }
        }
        errors
    }
}

/// Session ids are the era start time, `YYYYMMDD_HHMMSS`.
pub fn session_id_for(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// `session_id_for(now)`, with a `_N` counter when `previous` was issued in
/// the same second.
pub fn next_session_id(previous: &str, now: DateTime<Utc>) -> String {
    let base = session_id_for(now);
    if previous == base {
        return format!("{base}_2");
    }
    let counter = previous
        .strip_prefix(base.as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|n| n.parse::<u32>().ok());
    match counter {
        Some(n) => format!("{base}_{}", n + 1),
        None => base,
    }
}

fn insert_unique(set: &mut Vec<String>, id: &str) {
    if !set.iter().any(|existing| existing == id) {
        set.push(id.to_string());
    }
}

fn remove_matching(set: &mut Vec<String>, doomed: impl Fn(&String) -> bool) -> usize {
    let before = set.len();
    set.retain(|id| !doomed(id));
    before - set.len()
}

fn push_duplicates(errors: &mut Vec<String>, field: &str, ids: &[String]) {
    for (idx, id) in ids.iter().enumerate() {
        if ids[..idx].contains(id) {
            errors.push(format!("duplicate id {id} in {field}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger() -> LedgerState {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        LedgerState::fresh(now)
    }

    #[test]
    fn next_era_in_same_second_gets_distinct_ids() {
        let first = ledger();
        let now = first.start_time;

        let second = first.next_era(now);
        let third = second.next_era(now);

        assert_eq!(second.session_id, "20260304_050607_2");
        assert_eq!(third.session_id, "20260304_050607_3");
        assert!(third.login_attempts.is_empty());
    }

    #[test]
    fn next_era_in_later_second_drops_counter() {
        let first = ledger().next_era(ledger().start_time);
        let later = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 8).unwrap();

        assert_eq!(first.next_era(later).session_id, "20260304_050608");
    }

    #[test]
    fn fresh_ledger_uses_timestamp_session_id() {
        let state = ledger();
        assert_eq!(state.session_id, "20260304_050607");
        assert!(state.login_attempts.is_empty());
        assert_eq!(state.current_account, None);
    }

    #[test]
    fn login_outcomes_stay_disjoint_after_every_call() {
        let mut state = ledger();
        let script = [
            ("a", true),
            ("b", false),
            ("a", false),
            ("b", true),
            ("a", true),
            ("c", false),
            ("c", false),
        ];
        for (id, success) in script {
            state.record_login(id, success);
            assert!(state.violations().is_empty(), "{:?}", state.violations());
            assert_eq!(state.is_successful(id), success);
            assert_eq!(state.is_failed(id), !success);
        }
        assert_eq!(state.login_attempts, vec!["a", "b", "c"]);
        assert_eq!(state.successful_logins, vec!["b", "a"]);
        assert_eq!(state.failed_logins, vec!["c"]);
    }

    #[test]
    fn record_processed_is_idempotent() {
        let mut state = ledger();
        state.record_login("a", true);

        assert_eq!(state.record_processed("a", "r1"), Ok(true));
        assert_eq!(state.record_processed("a", "r1"), Ok(false));
        assert_eq!(state.processed.len(), 1);
    }

    #[test]
    fn record_processed_requires_successful_login() {
        let mut state = ledger();
        state.record_login("a", false);

        let err = state.record_processed("a", "r1").unwrap_err();
        assert_eq!(err, LedgerError::NotAuthenticated("a".to_string()));
        assert!(state.processed.is_empty());
    }

    #[test]
    fn remove_accounts_is_surgical() {
        let mut state = ledger();
        state.record_login("A", true);
        state.record_processed("A", "r1").expect("record");
        state.record_login("B", true);
        state.record_processed("B", "r1").expect("record");
        state.record_login("C", false);
        state.set_current(Some("A"));
        let untouched_b: Vec<ProcessedPair> = state
            .processed
            .iter()
            .filter(|pair| pair.account_id == "B")
            .cloned()
            .collect();

        let counts = state.remove_accounts(&["A".to_string()]);

        assert_eq!(
            counts,
            CleanupCounts {
                login_attempts: 1,
                successful_logins: 1,
                failed_logins: 0,
                processed: 1,
                current_account_reset: true,
            }
        );
        assert_eq!(counts.total(), 4);
        assert_eq!(state.login_attempts, vec!["B", "C"]);
        assert_eq!(state.successful_logins, vec!["B"]);
        assert_eq!(state.failed_logins, vec!["C"]);
        assert_eq!(state.processed, untouched_b);
        assert_eq!(state.current_account, None);
    }

    #[test]
    fn remove_accounts_keeps_unrelated_current_account() {
        let mut state = ledger();
        state.record_login("A", true);
        state.set_current(Some("B"));

        let counts = state.remove_accounts(&["A".to_string()]);

        assert!(!counts.current_account_reset);
        assert_eq!(state.current_account.as_deref(), Some("B"));
    }

    #[test]
    fn violations_report_hand_edited_records() {
        let mut state = ledger();
        state.successful_logins.push("x".to_string());
        state.failed_logins.push("x".to_string());
        state.login_attempts.push("y".to_string());
        state.login_attempts.push("y".to_string());

        let errors = state.violations();
        assert!(errors.iter().any(|err| err.contains("both successful and failed")));
        assert!(errors.iter().any(|err| err.contains("no login attempt")));
        assert!(errors.iter().any(|err| err.contains("duplicate id y")));
    }
}
