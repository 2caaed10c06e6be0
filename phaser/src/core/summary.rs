//! Progress summaries derived from the ledger and catalogs.

use crate::core::ledger::LedgerState;
use crate::core::scheduler::{pending_interactions, pending_logins};
use crate::core::types::{Account, Resource};

/// Login progress across the account catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStatus {
    pub total: usize,
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: Vec<String>,
}

/// Interaction progress for authenticated accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionStatus {
    pub authenticated_accounts: usize,
    pub resources: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub remaining_tasks: usize,
}

/// End-of-run report built from the ledger's current sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub session_id: String,
    pub login: LoginStatus,
    pub interactions: InteractionStatus,
    pub successful_ids: Vec<String>,
    pub failed_ids: Vec<String>,
}

impl RunSummary {
    /// Share of catalog accounts currently logged in, as a percentage.
    pub fn login_success_rate(&self) -> f64 {
        if self.login.total == 0 {
            return 0.0;
        }
        self.login.successful as f64 / self.login.total as f64 * 100.0
    }
}

/// Only accounts still present in the catalog are counted.
pub fn login_status(ledger: &LedgerState, accounts: &[Account]) -> LoginStatus {
    LoginStatus {
        total: accounts.len(),
        attempted: accounts.iter().filter(|a| ledger.was_attempted(&a.id)).count(),
        successful: accounts.iter().filter(|a| ledger.is_successful(&a.id)).count(),
        failed: accounts.iter().filter(|a| ledger.is_failed(&a.id)).count(),
        pending: pending_logins(ledger, accounts)
            .into_iter()
            .map(|account| account.id.clone())
            .collect(),
    }
}

pub fn interaction_status(
    ledger: &LedgerState,
    accounts: &[Account],
    resources: &[Resource],
) -> InteractionStatus {
    let authenticated = accounts
        .iter()
        .filter(|account| ledger.is_successful(&account.id))
        .count();
    let total_tasks = authenticated * resources.len();
    let remaining_tasks = pending_interactions(ledger, accounts, resources).len();
    InteractionStatus {
        authenticated_accounts: authenticated,
        resources: resources.len(),
        total_tasks,
        completed_tasks: total_tasks - remaining_tasks,
        remaining_tasks,
    }
}

pub fn summarize(ledger: &LedgerState, accounts: &[Account], resources: &[Resource]) -> RunSummary {
    RunSummary {
        session_id: ledger.session_id.clone(),
        login: login_status(ledger, accounts),
        interactions: interaction_status(ledger, accounts, resources),
        successful_ids: ledger.successful_logins.clone(),
        failed_ids: ledger.failed_logins.clone(),
    }
}
