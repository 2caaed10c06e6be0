//! Two-phase run: log in every pending account, then work every pending pair.
//!
//! Execution is strictly sequential. Per-account and per-pair failures are
//! logged and the loop moves on; the ledger is written after every mutation
//! so an interrupted run resumes where it stopped. A raised [`StopSignal`]
//! ends the run before the next task starts.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{error, info, warn};

use crate::core::challenge::ChallengePatterns;
use crate::core::scheduler::{PendingInteraction, pending_interactions, pending_logins};
use crate::core::summary::{RunSummary, summarize};
use crate::core::types::{Account, InteractionOutcome, LoginMode, LoginOutcome, Resource};
use crate::exit_codes;
use crate::interaction::InteractionProtocol;
use crate::io::audit::{AuditAction, AuditLog, AuditRecord, AuditStatus};
use crate::io::catalog::{AccountCatalog, ResourceCatalog, credential_from_env};
use crate::io::clock::{Sleeper, StopSignal, ThreadSleeper};
use crate::io::config::{AutomationConfig, load_config};
use crate::io::console::{ConsoleOperator, Operator};
use crate::io::ledger_store::{Ledger, load_ledger};
use crate::io::paths::DataPaths;
use crate::io::profiles::{BrowserLauncher, ProfileStore, acquire};
use crate::login::LoginProtocol;
use crate::pacing::Pacer;

/// Counters for what one run actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub logins_attempted: usize,
    pub logins_succeeded: usize,
    pub logins_failed: usize,
    pub relogins: usize,
    pub interactions_attempted: usize,
    pub interactions_succeeded: usize,
    pub interactions_failed: usize,
    pub interactions_skipped: usize,
    /// Tasks aborted by an unexpected error (launch, navigation, persistence).
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub stats: RunStats,
    pub summary: RunSummary,
    /// The stop signal ended the run before all pending work was tried.
    pub interrupted: bool,
}

enum PairResult {
    Done(InteractionOutcome),
    ReloginFailed,
}

pub struct Orchestrator<L: BrowserLauncher, O: Operator> {
    config: AutomationConfig,
    patterns: ChallengePatterns,
    launcher: L,
    profiles: ProfileStore,
    operator: O,
    pacer: Pacer,
    audit: AuditLog,
    stop: StopSignal,
}

impl<L: BrowserLauncher, O: Operator> Orchestrator<L, O> {
    pub fn new(
        config: AutomationConfig,
        launcher: L,
        profiles: ProfileStore,
        operator: O,
        pacer: Pacer,
        audit: AuditLog,
    ) -> Result<Self> {
        config.validate()?;
        if config.site.landing_url.trim().is_empty() {
            bail!("site.landing_url must be set before running");
        }
        let patterns = config.challenge_patterns()?;
        Ok(Self {
            config,
            patterns,
            launcher,
            profiles,
            operator,
            pacer,
            audit,
            stop: StopSignal::default(),
        })
    }

    /// Check `stop` before every task and end the run once it is raised.
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Run both phases against the catalogs and report from the ledger.
    pub fn run(
        &self,
        ledger: &mut Ledger,
        accounts: &[Account],
        resources: &[Resource],
    ) -> Result<RunReport> {
        info!(
            session_id = %ledger.state().session_id,
            accounts = accounts.len(),
            resources = resources.len(),
            "run started"
        );
        let login = LoginProtocol::new(
            &self.config,
            &self.patterns,
            &self.operator,
            &self.pacer,
            &self.audit,
        );
        let interaction = InteractionProtocol::new(&self.config, &self.pacer, &self.audit);
        let mut stats = RunStats::default();

        self.login_phase(&login, ledger, accounts, &mut stats)?;
        if !self.stop.is_raised() {
            self.interaction_phase(&login, &interaction, ledger, accounts, resources, &mut stats)?;
        }

        let interrupted = self.stop.is_raised();
        if interrupted {
            warn!(
                current_account = ledger.state().current_account.as_deref(),
                "run interrupted; progress is saved"
            );
        } else {
            ledger.set_current_account(None)?;
        }
        let summary = summarize(ledger.state(), accounts, resources);
        info!(
            successful = summary.login.successful,
            failed = summary.login.failed,
            completed = summary.interactions.completed_tasks,
            remaining = summary.interactions.remaining_tasks,
            interrupted,
            "run finished"
        );
        Ok(RunReport {
            stats,
            summary,
            interrupted,
        })
    }

    fn login_phase(
        &self,
        login: &LoginProtocol<'_>,
        ledger: &mut Ledger,
        accounts: &[Account],
        stats: &mut RunStats,
    ) -> Result<()> {
        let pending = pending_logins(ledger.state(), accounts);
        info!(pending = pending.len(), "phase 1: logins");
        let delays = &self.config.delays;

        for (idx, account) in pending.iter().enumerate() {
            if self.stop.is_raised() {
                break;
            }
            ledger.set_current_account(Some(&account.id))?;
            stats.logins_attempted += 1;
            match self.login_account(login, ledger, account) {
                Ok(LoginOutcome::Success) => stats.logins_succeeded += 1,
                Ok(LoginOutcome::Failed { .. }) => stats.logins_failed += 1,
                Err(err) => {
                    stats.errors += 1;
                    self.report_error(&account.id, None, &err);
                }
            }
            if idx + 1 < pending.len() && !self.stop.is_raised() {
                let gap = self.pacer.pause(delays.login_gap_min, delays.login_gap_max);
                info!(secs = gap.as_secs(), "waiting before next login");
            }
        }
        Ok(())
    }

    fn login_account(
        &self,
        login: &LoginProtocol<'_>,
        ledger: &mut Ledger,
        account: &Account,
    ) -> Result<LoginOutcome> {
        let mut lease = acquire(&self.launcher, &self.profiles, &account.id, &self.config.browser)?;
        login.authenticate(&mut *lease, account, LoginMode::Interactive, ledger)
    }

    fn interaction_phase(
        &self,
        login: &LoginProtocol<'_>,
        interaction: &InteractionProtocol<'_>,
        ledger: &mut Ledger,
        accounts: &[Account],
        resources: &[Resource],
        stats: &mut RunStats,
    ) -> Result<()> {
        let pending = pending_interactions(ledger.state(), accounts, resources);
        info!(pending = pending.len(), "phase 2: interactions");
        let delays = &self.config.delays;
        let mut abandoned: HashSet<&str> = HashSet::new();

        for (idx, task) in pending.iter().enumerate() {
            if self.stop.is_raised() {
                break;
            }
            let account_id = task.account.id.as_str();
            if abandoned.contains(account_id) {
                stats.interactions_skipped += 1;
                continue;
            }
            ledger.set_current_account(Some(account_id))?;
            stats.interactions_attempted += 1;
            match self.interact_pair(login, interaction, ledger, task, stats) {
                Ok(PairResult::Done(outcome)) if outcome.succeeded() => {
                    stats.interactions_succeeded += 1;
                }
                Ok(PairResult::Done(_)) => stats.interactions_failed += 1,
                Ok(PairResult::ReloginFailed) => {
                    warn!(account = %account_id, "re-login failed; skipping remaining resources");
                    stats.interactions_skipped += 1;
                    abandoned.insert(account_id);
                }
                Err(err) => {
                    stats.errors += 1;
                    stats.interactions_failed += 1;
                    self.report_error(account_id, Some(task.resource), &err);
                }
            }
            if idx + 1 < pending.len() && !self.stop.is_raised() {
                let gap = self
                    .pacer
                    .pause(delays.interaction_gap_min, delays.interaction_gap_max);
                info!(secs = gap.as_secs(), "waiting before next resource");
            }
        }
        Ok(())
    }

    fn interact_pair(
        &self,
        login: &LoginProtocol<'_>,
        interaction: &InteractionProtocol<'_>,
        ledger: &mut Ledger,
        task: &PendingInteraction<'_>,
        stats: &mut RunStats,
    ) -> Result<PairResult> {
        let account = task.account;
        let mut lease = acquire(&self.launcher, &self.profiles, &account.id, &self.config.browser)?;
        if !login.is_authenticated(&mut *lease) {
            info!(account = %account.id, "session expired; re-authenticating silently");
            stats.relogins += 1;
            let outcome = login.authenticate(&mut *lease, account, LoginMode::Silent, ledger)?;
            if !outcome.is_success() {
                return Ok(PairResult::ReloginFailed);
            }
        }
        let outcome = interaction.interact(&mut *lease, &account.id, task.resource, ledger)?;
        Ok(PairResult::Done(outcome))
    }

    fn report_error(&self, account_id: &str, resource: Option<&str>, err: &anyhow::Error) {
        error!(account = %account_id, resource, error = %format!("{err:#}"), "task aborted");
        let mut record = AuditRecord::new(account_id, AuditAction::Browser, AuditStatus::Error)
            .details(format!("{err:#}"));
        if let Some(resource) = resource {
            record = record.resource(resource);
        }
        self.audit.record(&record);
    }
}

/// How a session ended. `summary` always reflects the last persisted ledger.
#[derive(Debug)]
pub struct SessionEnd {
    pub summary: RunSummary,
    pub stats: Option<RunStats>,
    pub error: Option<anyhow::Error>,
    pub interrupted: bool,
}

impl SessionEnd {
    /// Process exit status for a run that ended this way.
    pub fn exit_code(&self) -> i32 {
        if self.error.is_some() {
            exit_codes::ABORTED
        } else if self.interrupted {
            exit_codes::INTERRUPTED
        } else {
            exit_codes::OK
        }
    }
}

/// Load everything from the data directory and run one session.
///
/// Setup failures (bad config, catalogs, or ledger) are returned as errors. A
/// failure during the run is reported in [`SessionEnd::error`] alongside a
/// summary re-read from disk.
pub fn run_session<L: BrowserLauncher, O: Operator>(
    paths: &DataPaths,
    launcher: L,
    operator: O,
    sleeper: Arc<dyn Sleeper>,
    stop: StopSignal,
) -> Result<SessionEnd> {
    let config = load_config(&paths.config_path)?;
    let fallback = credential_from_env(&config.credentials.env_var);
    let accounts = AccountCatalog::load_or_seed(&paths.accounts_path)?.resolve(fallback.as_ref())?;
    let resources = ResourceCatalog::load_or_seed(&paths.resources_path)?
        .urls()
        .to_vec();
    if accounts.is_empty() {
        warn!(path = %paths.accounts_path.display(), "account catalog is empty");
    }
    if resources.is_empty() {
        warn!(path = %paths.resources_path.display(), "resource catalog is empty");
    }

    let orchestrator = Orchestrator::new(
        config,
        launcher,
        ProfileStore::new(&paths.profiles_dir),
        operator,
        Pacer::new(sleeper),
        AuditLog::new(&paths.audit_path),
    )?
    .with_stop(stop);
    let mut ledger = Ledger::open(&paths.ledger_path)?;

    match orchestrator.run(&mut ledger, &accounts, &resources) {
        Ok(report) => Ok(SessionEnd {
            summary: report.summary,
            stats: Some(report.stats),
            error: None,
            interrupted: report.interrupted,
        }),
        Err(err) => {
            error!(error = %format!("{err:#}"), "run aborted");
            let state = load_ledger(&paths.ledger_path)?;
            Ok(SessionEnd {
                summary: summarize(&state, &accounts, &resources),
                stats: None,
                error: Some(err),
                interrupted: false,
            })
        }
    }
}

/// Run one session with an operator at the terminal and real sleeps.
///
/// Raising `stop` ends the run before its next task; the returned summary is
/// still read from the saved ledger.
pub fn run_attended<L: BrowserLauncher>(
    paths: &DataPaths,
    launcher: L,
    stop: StopSignal,
) -> Result<SessionEnd> {
    let sleeper = Arc::new(ThreadSleeper::interruptible(stop.clone()));
    run_session(paths, launcher, ConsoleOperator, sleeper, stop)
}
