//! Shared data model: accounts, resources, and attempt outcomes.
//!
//! These types define stable contracts between core components and the
//! protocols built on top of them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Secret credential for an account. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret. Only the login form should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// An account from the catalog. Unique by `id`, immutable during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub credential: Credential,
}

impl Account {
    pub fn new(id: impl Into<String>, credential: Credential) -> Self {
        Self {
            id: id.into(),
            credential,
        }
    }
}

/// Look up an account by id.
pub fn find_account<'a>(accounts: &'a [Account], id: &str) -> Option<&'a Account> {
    accounts.iter().find(|account| account.id == id)
}

/// A target resource (post URL). Unique within its catalog.
pub type Resource = String;

/// A completed (account, resource) interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessedPair {
    pub account_id: String,
    pub resource: String,
}

impl ProcessedPair {
    pub fn new(account_id: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            resource: resource.into(),
        }
    }
}

/// Final result of the authentication protocol for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Failed { reason: String },
}

impl LoginOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Which escalation policy challenge resolution uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// An operator is watching this login and can clear challenges by hand.
    Interactive,
    /// Re-login inside an unattended batch; any challenge fails the attempt.
    Silent,
}

/// Result of the two sub-actions for one (account, resource) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionOutcome {
    pub liked: bool,
    pub commented: bool,
}

impl InteractionOutcome {
    pub fn succeeded(&self) -> bool {
        self.liked || self.commented
    }

    pub fn describe(&self) -> &'static str {
        match (self.liked, self.commented) {
            (true, true) => "liked and commented",
            (true, false) => "liked",
            (false, true) => "commented",
            (false, false) => "no interaction",
        }
    }
}
