//! Phase scheduling: derive pending work from the ledger and catalogs.
//!
//! Pending sets are recomputed on every pass and never cached, so re-running
//! against the same ledger and catalogs reproduces exactly the remaining work.

use std::collections::HashSet;

use crate::core::ledger::LedgerState;
use crate::core::types::{Account, Resource};

/// One (account, resource) pair awaiting interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInteraction<'a> {
    pub account: &'a Account,
    pub resource: &'a str,
}

/// Accounts never attempted in this era, in catalog order.
///
/// A failed login is terminal for the era: only a reset or a cleanup of that
/// account makes it pending again.
pub fn pending_logins<'a>(ledger: &LedgerState, accounts: &'a [Account]) -> Vec<&'a Account> {
    let attempted: HashSet<&str> = ledger.login_attempts.iter().map(String::as_str).collect();
    accounts
        .iter()
        .filter(|account| !attempted.contains(account.id.as_str()))
        .collect()
}

/// Successfully authenticated accounts × resources, minus completed pairs.
///
/// Ordered by account catalog order, then resource catalog order.
pub fn pending_interactions<'a>(
    ledger: &LedgerState,
    accounts: &'a [Account],
    resources: &'a [Resource],
) -> Vec<PendingInteraction<'a>> {
    let successful: HashSet<&str> = ledger
        .successful_logins
        .iter()
        .map(String::as_str)
        .collect();
    let processed: HashSet<(&str, &str)> = ledger
        .processed
        .iter()
        .map(|pair| (pair.account_id.as_str(), pair.resource.as_str()))
        .collect();

    let mut pending = Vec::new();
    for account in accounts {
        if !successful.contains(account.id.as_str()) {
            continue;
        }
        for resource in resources {
            if !processed.contains(&(account.id.as_str(), resource.as_str())) {
                pending.push(PendingInteraction {
                    account,
                    resource: resource.as_str(),
                });
            }
        }
    }
    pending
}

/// Owned snapshot of both pending sets, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPlan {
    pub logins: Vec<String>,
    pub interactions: Vec<(String, String)>,
}

impl WorkPlan {
    pub fn is_empty(&self) -> bool {
        self.logins.is_empty() && self.interactions.is_empty()
    }
}

pub fn work_plan(ledger: &LedgerState, accounts: &[Account], resources: &[Resource]) -> WorkPlan {
    WorkPlan {
        logins: pending_logins(ledger, accounts)
            .into_iter()
            .map(|account| account.id.clone())
            .collect(),
        interactions: pending_interactions(ledger, accounts, resources)
            .into_iter()
            .map(|task| (task.account.id.clone(), task.resource.to_string()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Credential;
    use chrono::Utc;

    fn accounts(ids: &[&str]) -> Vec<Account> {
        ids.iter()
            .map(|id| Account::new(*id, Credential::new("pw")))
            .collect()
    }

    fn resources(urls: &[&str]) -> Vec<Resource> {
        urls.iter().map(|url| url.to_string()).collect()
    }

    #[test]
    fn pending_logins_skip_any_attempted_account() {
        let mut ledger = LedgerState::fresh(Utc::now());
        ledger.record_login("a2", false);
        ledger.record_login("a3", true);
        let catalog = accounts(&["a1", "a2", "a3", "a4"]);

        let ids: Vec<&str> = pending_logins(&ledger, &catalog)
            .iter()
            .map(|account| account.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a1", "a4"]);
    }

    #[test]
    fn pending_interactions_require_successful_login() {
        let mut ledger = LedgerState::fresh(Utc::now());
        ledger.record_login("a1", true);
        ledger.record_login("a2", false);
        let catalog = accounts(&["a1", "a2", "a3"]);
        let urls = resources(&["r1", "r2"]);

        let pending = pending_interactions(&ledger, &catalog, &urls);

        assert_eq!(pending.len(), 2);
        for task in &pending {
            assert!(ledger.is_successful(&task.account.id));
        }
    }

    #[test]
    fn pending_interactions_exclude_processed_pairs() {
        let mut ledger = LedgerState::fresh(Utc::now());
        ledger.record_login("a1", true);
        ledger.record_processed("a1", "r1").expect("record");
        let catalog = accounts(&["a1"]);
        let urls = resources(&["r1", "r2"]);

        let plan = work_plan(&ledger, &catalog, &urls);
        assert_eq!(
            plan.interactions,
            vec![("a1".to_string(), "r2".to_string())]
        );
    }

    #[test]
    fn scheduling_has_no_side_effects() {
        let mut ledger = LedgerState::fresh(Utc::now());
        ledger.record_login("a1", true);
        ledger.record_login("a2", false);
        let snapshot = ledger.clone();
        let catalog = accounts(&["a1", "a2", "a3"]);
        let urls = resources(&["r1", "r2"]);

        let first = work_plan(&ledger, &catalog, &urls);
        let second = work_plan(&ledger, &catalog, &urls);

        assert_eq!(first, second);
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn interactions_follow_catalog_order() {
        let mut ledger = LedgerState::fresh(Utc::now());
        ledger.record_login("b", true);
        ledger.record_login("a", true);
        let catalog = accounts(&["a", "b"]);
        let urls = resources(&["r2", "r1"]);

        let plan = work_plan(&ledger, &catalog, &urls);
        let expected: Vec<(String, String)> = [("a", "r2"), ("a", "r1"), ("b", "r2"), ("b", "r1")]
            .iter()
            .map(|(a, r)| (a.to_string(), r.to_string()))
            .collect();
        assert_eq!(plan.interactions, expected);
    }

    #[test]
    fn two_runs_exhaust_the_work() {
        let catalog = accounts(&["a1", "a2"]);
        let urls = resources(&["r1"]);
        let mut ledger = LedgerState::fresh(Utc::now());

        // Run 1: a1 succeeds, a2 fails.
        ledger.record_login("a1", true);
        ledger.record_login("a2", false);
        let plan = work_plan(&ledger, &catalog, &urls);
        assert!(plan.logins.is_empty());
        assert_eq!(
            plan.interactions,
            vec![("a1".to_string(), "r1".to_string())]
        );
        ledger.record_processed("a1", "r1").expect("record");

        // Run 2: nothing left.
        let plan = work_plan(&ledger, &catalog, &urls);
        assert!(plan.is_empty());
        assert_eq!(ledger.processed.len(), 1);
    }
}
