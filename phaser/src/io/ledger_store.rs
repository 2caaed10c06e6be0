//! Ledger persistence (`.phaser/state/ledger.json`).
//!
//! Every mutation is written through before the call returns, so an abrupt
//! termination loses at most the task that was in flight.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info};

use crate::core::ledger::{CleanupCounts, LedgerState};

/// Ledger bound to its file.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    state: LedgerState,
}

impl Ledger {
    /// Load the ledger at `path`, or start a fresh era and persist it.
    ///
    /// A record that fails to parse or violates the ledger invariants is a
    /// startup error; it is never silently replaced.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut ledger = Self {
                path: path.to_path_buf(),
                state: LedgerState::fresh(Utc::now()),
            };
            ledger.persist()?;
            info!(session_id = %ledger.state.session_id, "started new session");
            return Ok(ledger);
        }
        let state = load_ledger(path)?;
        let violations = state.violations();
        if !violations.is_empty() {
            bail!(
                "ledger {} is inconsistent: {}",
                path.display(),
                violations.join("; ")
            );
        }
        info!(
            session_id = %state.session_id,
            attempted = state.login_attempts.len(),
            processed = state.processed.len(),
            "resumed session"
        );
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// Load an existing ledger without creating one. Returns `None` if absent.
    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::open(path).map(Some)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn mark_login_attempt(&mut self, account_id: &str, success: bool) -> Result<()> {
        self.state.record_login(account_id, success);
        self.persist()
    }

    /// Returns `false` if the pair was already recorded.
    pub fn mark_post_processed(&mut self, account_id: &str, resource: &str) -> Result<bool> {
        let added = self.state.record_processed(account_id, resource)?;
        if added {
            self.persist()?;
        }
        Ok(added)
    }

    pub fn set_current_account(&mut self, account_id: Option<&str>) -> Result<()> {
        if self.state.current_account.as_deref() == account_id {
            return Ok(());
        }
        self.state.set_current(account_id);
        self.persist()
    }

    /// Discard all progress and start a new era.
    pub fn reset_session(&mut self) -> Result<()> {
        let next = self.state.next_era(Utc::now());
        let previous = std::mem::replace(&mut self.state, next);
        info!(
            previous = %previous.session_id,
            session_id = %self.state.session_id,
            "session reset"
        );
        self.persist()
    }

    /// Surgically remove accounts from every set. The era continues.
    pub fn remove_accounts(&mut self, account_ids: &[String]) -> Result<CleanupCounts> {
        let counts = self.state.remove_accounts(account_ids);
        if counts.total() > 0 {
            self.persist()?;
        }
        Ok(counts)
    }

    fn persist(&mut self) -> Result<()> {
        self.state.last_update = Utc::now();
        write_ledger(&self.path, &self.state)
    }
}

/// Read and parse a ledger file.
pub fn load_ledger(path: &Path) -> Result<LedgerState> {
    debug!(path = %path.display(), "loading ledger");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read ledger {}", path.display()))?;
    let state: LedgerState = serde_json::from_str(&contents)
        .with_context(|| format!("parse ledger {}", path.display()))?;
    Ok(state)
}

fn write_ledger(path: &Path, state: &LedgerState) -> Result<()> {
    debug!(path = %path.display(), session_id = %state.session_id, "writing ledger");
    let mut buf = serde_json::to_string_pretty(state).context("serialize ledger")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies a missing ledger starts a new session and is persisted.
    #[test]
    fn open_creates_fresh_ledger() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state/ledger.json");

        let ledger = Ledger::open(&path).expect("open");

        assert!(path.is_file());
        assert!(ledger.state().login_attempts.is_empty());
        assert_eq!(load_ledger(&path).expect("load"), *ledger.state());
    }

    /// Verifies mutations survive a reopen with the same session id.
    #[test]
    fn mutations_are_written_through() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ledger.json");
        let mut ledger = Ledger::open(&path).expect("open");
        let session_id = ledger.state().session_id.clone();

        ledger.mark_login_attempt("a1", true).expect("login");
        ledger.mark_login_attempt("a2", false).expect("login");
        assert!(ledger.mark_post_processed("a1", "r1").expect("processed"));
        assert!(!ledger.mark_post_processed("a1", "r1").expect("processed again"));
        ledger.set_current_account(Some("a1")).expect("current");
        drop(ledger);

        let reopened = Ledger::open(&path).expect("reopen");
        let state = reopened.state();
        assert_eq!(state.session_id, session_id);
        assert_eq!(state.successful_logins, vec!["a1"]);
        assert_eq!(state.failed_logins, vec!["a2"]);
        assert_eq!(state.processed.len(), 1);
        assert_eq!(state.current_account.as_deref(), Some("a1"));
    }

    /// Ensures an unauthenticated interaction is rejected and not persisted.
    #[test]
    fn processed_pair_requires_successful_login() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ledger.json");
        let mut ledger = Ledger::open(&path).expect("open");

        let err = ledger.mark_post_processed("ghost", "r1").unwrap_err();

        assert!(err.to_string().contains("ghost"));
        assert!(load_ledger(&path).expect("load").processed.is_empty());
    }

    /// Ensures a corrupt ledger is reported instead of replaced.
    #[test]
    fn corrupt_ledger_is_a_startup_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ledger.json");
        fs::write(&path, "{not json").expect("write");

        let err = Ledger::open(&path).unwrap_err();

        assert!(format!("{err:#}").contains("parse ledger"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "{not json");
    }

    /// Ensures a hand-edited ledger that breaks the outcome invariants is rejected.
    #[test]
    fn inconsistent_ledger_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ledger.json");
        let mut state = LedgerState::fresh(Utc::now());
        state.record_login("a1", true);
        state.failed_logins.push("a1".to_string());
        write_ledger(&path, &state).expect("write");

        let err = Ledger::open(&path).unwrap_err();

        assert!(err.to_string().contains("both successful and failed"));
    }

    /// Verifies reset starts a new, empty session.
    #[test]
    fn reset_discards_progress() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ledger.json");
        let mut ledger = Ledger::open(&path).expect("open");
        ledger.mark_login_attempt("a1", true).expect("login");
        ledger.mark_post_processed("a1", "r1").expect("processed");

        ledger.reset_session().expect("reset");

        let state = load_ledger(&path).expect("load");
        assert!(state.login_attempts.is_empty());
        assert!(state.processed.is_empty());
    }

    /// Verifies cleanup persists and leaves other accounts intact.
    #[test]
    fn remove_accounts_persists() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ledger.json");
        let mut ledger = Ledger::open(&path).expect("open");
        ledger.mark_login_attempt("a1", true).expect("login");
        ledger.mark_login_attempt("a2", true).expect("login");
        ledger.mark_post_processed("a1", "r1").expect("processed");

        let counts = ledger.remove_accounts(&["a1".to_string()]).expect("remove");

        assert_eq!(counts.total(), 3);
        let state = load_ledger(&path).expect("load");
        assert_eq!(state.login_attempts, vec!["a2"]);
        assert!(state.processed.is_empty());
    }
}
