//! Plain-text rendering for CLI output.

use std::fmt::Write;

use crate::core::ledger::{CleanupCounts, LedgerState};
use crate::core::scheduler::WorkPlan;
use crate::core::summary::RunSummary;
use crate::maintenance::{CleanupReport, ResetReport};
use crate::orchestrator::{RunStats, SessionEnd};

pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let login = &summary.login;
    let tasks = &summary.interactions;
    let _ = writeln!(out, "Session {}", summary.session_id);
    let _ = writeln!(
        out,
        "Logins: {}/{} attempted, {} successful, {} failed ({:.1}% success)",
        login.attempted,
        login.total,
        login.successful,
        login.failed,
        summary.login_success_rate()
    );
    if !login.pending.is_empty() {
        let _ = writeln!(out, "Pending logins: {}", login.pending.join(", "));
    }
    let _ = writeln!(
        out,
        "Interactions: {}/{} completed, {} remaining ({} accounts x {} resources)",
        tasks.completed_tasks,
        tasks.total_tasks,
        tasks.remaining_tasks,
        tasks.authenticated_accounts,
        tasks.resources
    );
    if !summary.successful_ids.is_empty() {
        let _ = writeln!(out, "Successful: {}", summary.successful_ids.join(", "));
    }
    if !summary.failed_ids.is_empty() {
        let _ = writeln!(out, "Failed: {}", summary.failed_ids.join(", "));
    }
    out
}

pub fn render_stats(stats: &RunStats) -> String {
    format!(
        "This run: {} logins ({} ok, {} failed), {} interactions ({} ok, {} failed, {} skipped), {} re-logins, {} errors\n",
        stats.logins_attempted,
        stats.logins_succeeded,
        stats.logins_failed,
        stats.interactions_attempted,
        stats.interactions_succeeded,
        stats.interactions_failed,
        stats.interactions_skipped,
        stats.relogins,
        stats.errors
    )
}

/// Closing report for `phaser run`: outcome line, this run's counters, and
/// the summary read from the saved ledger.
pub fn render_session_end(end: &SessionEnd) -> String {
    let mut out = String::new();
    if let Some(err) = &end.error {
        let _ = writeln!(out, "Run aborted: {err:#}");
    } else if end.interrupted {
        out.push_str("Run interrupted; saved progress is kept and the next run resumes it.\n");
    }
    if let Some(stats) = &end.stats {
        out.push_str(&render_stats(stats));
    }
    out.push_str(&render_summary(&end.summary));
    out
}

/// Full ledger dump for `phaser status`.
pub fn render_ledger(state: &LedgerState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session:         {}", state.session_id);
    let _ = writeln!(out, "Started:         {}", state.start_time.to_rfc3339());
    let _ = writeln!(out, "Last update:     {}", state.last_update.to_rfc3339());
    let _ = writeln!(
        out,
        "Current account: {}",
        state.current_account.as_deref().unwrap_or("-")
    );
    write_list(&mut out, "Login attempts", &state.login_attempts);
    write_list(&mut out, "Successful", &state.successful_logins);
    write_list(&mut out, "Failed", &state.failed_logins);
    let pairs: Vec<String> = state
        .processed
        .iter()
        .map(|pair| format!("{} -> {}", pair.account_id, pair.resource))
        .collect();
    write_list(&mut out, "Processed", &pairs);
    out
}

pub fn render_plan(plan: &WorkPlan) -> String {
    if plan.is_empty() {
        return "Nothing pending.\n".to_string();
    }
    let mut out = String::new();
    write_list(&mut out, "Pending logins", &plan.logins);
    let pairs: Vec<String> = plan
        .interactions
        .iter()
        .map(|(account, resource)| format!("{account} -> {resource}"))
        .collect();
    write_list(&mut out, "Pending interactions", &pairs);
    out
}

pub fn render_cleanup(report: &CleanupReport) -> String {
    let mut out = String::new();
    let verb = if report.dry_run { "Would remove" } else { "Removed" };
    let _ = writeln!(out, "{verb} accounts: {}", report.account_ids.join(", "));
    write_counts(&mut out, &report.counts);
    if report.counts.total() == 0 {
        out.push_str("No matching entries.\n");
    }
    out
}

pub fn render_reset(report: &ResetReport) -> String {
    match &report.new_session_id {
        Some(new_id) => format!(
            "Reset session {} -> {} ({} login attempts and {} processed pairs discarded)\n",
            report.previous_session_id, new_id, report.login_attempts, report.processed
        ),
        None => format!(
            "Would reset session {} ({} login attempts and {} processed pairs)\n",
            report.previous_session_id, report.login_attempts, report.processed
        ),
    }
}

fn write_counts(out: &mut String, counts: &CleanupCounts) {
    let _ = writeln!(out, "  login_attempts:    {}", counts.login_attempts);
    let _ = writeln!(out, "  successful_logins: {}", counts.successful_logins);
    let _ = writeln!(out, "  failed_logins:     {}", counts.failed_logins);
    let _ = writeln!(out, "  processed:         {}", counts.processed);
    let _ = writeln!(
        out,
        "  current_account:   {}",
        if counts.current_account_reset {
            "reset"
        } else {
            "unchanged"
        }
    );
}

fn write_list(out: &mut String, title: &str, items: &[String]) {
    let _ = writeln!(out, "{title} ({}):", items.len());
    for item in items {
        let _ = writeln!(out, "  {item}");
    }
}
