//! Out-of-band ledger maintenance: surgical account cleanup and full reset.

use anyhow::{Result, bail};
use tracing::info;

use crate::core::ledger::CleanupCounts;
use crate::io::ledger_store::Ledger;

/// Result of `cleanup_accounts`. In a dry run nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub account_ids: Vec<String>,
    pub counts: CleanupCounts,
    pub dry_run: bool,
}

/// Result of `reset_session`. In a dry run nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub previous_session_id: String,
    /// `None` for a dry run.
    pub new_session_id: Option<String>,
    pub login_attempts: usize,
    pub processed: usize,
}

/// Remove every trace of `account_ids` from the ledger, or preview it.
///
/// Ids are trimmed and deduplicated. The session id and the entries of every
/// other account are untouched.
pub fn cleanup_accounts(
    ledger: &mut Ledger,
    account_ids: &[String],
    dry_run: bool,
) -> Result<CleanupReport> {
    let mut ids: Vec<String> = Vec::new();
    for id in account_ids {
        let id = id.trim();
        if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    if ids.is_empty() {
        bail!("no account ids given");
    }

    let counts = if dry_run {
        ledger.state().clone().remove_accounts(&ids)
    } else {
        ledger.remove_accounts(&ids)?
    };
    info!(
        accounts = ?ids,
        removed = counts.total(),
        dry_run,
        "cleanup"
    );
    Ok(CleanupReport {
        account_ids: ids,
        counts,
        dry_run,
    })
}

/// Start a new era, or preview what it would discard.
pub fn reset_session(ledger: &mut Ledger, dry_run: bool) -> Result<ResetReport> {
    let state = ledger.state();
    let mut report = ResetReport {
        previous_session_id: state.session_id.clone(),
        new_session_id: None,
        login_attempts: state.login_attempts.len(),
        processed: state.processed.len(),
    };
    if !dry_run {
        ledger.reset_session()?;
        report.new_session_id = Some(ledger.state().session_id.clone());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ledger_store::load_ledger;

    fn seeded(temp: &tempfile::TempDir) -> Ledger {
        let mut ledger = Ledger::open(&temp.path().join("ledger.json")).expect("open");
        ledger.mark_login_attempt("A", true).expect("login");
        ledger.mark_post_processed("A", "r1").expect("processed");
        ledger.mark_login_attempt("B", true).expect("login");
        ledger.mark_post_processed("B", "r1").expect("processed");
        ledger.set_current_account(Some("A")).expect("current");
        ledger
    }

    /// Verifies cleanup of one account removes all of its entries, clears the
    /// matching current account, and leaves the other account untouched.
    #[test]
    fn cleanup_is_surgical() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = seeded(&temp);
        let before = ledger.state().clone();

        let report = cleanup_accounts(&mut ledger, &["A".to_string()], false).expect("cleanup");

        assert_eq!(report.counts.login_attempts, 1);
        assert_eq!(report.counts.successful_logins, 1);
        assert_eq!(report.counts.processed, 1);
        assert!(report.counts.current_account_reset);
        let after = load_ledger(ledger.path()).expect("load");
        assert_eq!(after.session_id, before.session_id);
        assert_eq!(after.login_attempts, vec!["B"]);
        assert_eq!(after.successful_logins, vec!["B"]);
        assert!(after.has_processed("B", "r1"));
        assert!(!after.has_processed("A", "r1"));
        assert_eq!(after.current_account, None);
    }

    #[test]
    fn dry_run_cleanup_changes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = seeded(&temp);
        let on_disk = std::fs::read_to_string(ledger.path()).expect("read");

        let report =
            cleanup_accounts(&mut ledger, &["A".to_string(), " A ".to_string()], true).expect("preview");

        assert!(report.dry_run);
        assert_eq!(report.account_ids, vec!["A"]);
        assert_eq!(report.counts.total(), 4);
        assert!(ledger.state().was_attempted("A"));
        assert_eq!(std::fs::read_to_string(ledger.path()).expect("read"), on_disk);
    }

    #[test]
    fn cleanup_requires_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = seeded(&temp);

        let err = cleanup_accounts(&mut ledger, &[" ".to_string()], false).unwrap_err();

        assert!(err.to_string().contains("no account ids"));
    }

    #[test]
    fn reset_discards_everything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = seeded(&temp);

        let preview = reset_session(&mut ledger, true).expect("preview");
        assert_eq!(preview.new_session_id, None);
        assert_eq!(preview.login_attempts, 2);
        assert_eq!(preview.processed, 2);
        assert_eq!(ledger.state().processed.len(), 2);

        let report = reset_session(&mut ledger, false).expect("reset");
        assert!(report.new_session_id.is_some());
        assert_ne!(report.new_session_id, Some(report.previous_session_id.clone()));
        let after = load_ledger(ledger.path()).expect("load");
        assert!(after.login_attempts.is_empty());
        assert!(after.processed.is_empty());
        assert_eq!(after.current_account, None);
    }

    /// Verifies back-to-back resets each start a distinguishable era.
    #[test]
    fn rapid_resets_issue_distinct_session_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = seeded(&temp);
        let original = ledger.state().session_id.clone();

        let first = reset_session(&mut ledger, false).expect("reset");
        let second = reset_session(&mut ledger, false).expect("reset");

        let first_id = first.new_session_id.expect("first id");
        let second_id = second.new_session_id.expect("second id");
        assert_ne!(first_id, original);
        assert_ne!(second_id, first_id);
        assert_eq!(load_ledger(ledger.path()).expect("load").session_id, second_id);
    }
}
