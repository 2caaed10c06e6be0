//! Challenge resolution: classify the surface state and clear it, or give up.
//!
//! Classification is the same in every context. What changes is escalation:
//! an interactive login blocks on the operator, a silent re-login fails fast so
//! an unattended batch never stalls.

use tracing::{info, warn};

use crate::core::challenge::{ChallengeKind, ChallengePatterns};
use crate::core::error::AutomationError;
use crate::core::types::LoginMode;
use crate::driver::Page;
use crate::io::audit::{AuditAction, AuditLog, AuditRecord, AuditStatus};
use crate::io::config::{SiteConfig, TimeoutConfig, secs};
use crate::io::console::Operator;
use crate::pacing::Pacer;

/// How a challenge check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing was blocking the flow.
    Clear,
    /// The operator cleared a challenge of this kind.
    Resolved(ChallengeKind),
}

pub struct ChallengeResolver<'a> {
    site: &'a SiteConfig,
    patterns: &'a ChallengePatterns,
    timeouts: &'a TimeoutConfig,
    operator: &'a dyn Operator,
    pacer: &'a Pacer,
    audit: &'a AuditLog,
}

impl<'a> ChallengeResolver<'a> {
    pub fn new(
        site: &'a SiteConfig,
        patterns: &'a ChallengePatterns,
        timeouts: &'a TimeoutConfig,
        operator: &'a dyn Operator,
        pacer: &'a Pacer,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            site,
            patterns,
            timeouts,
            operator,
            pacer,
            audit,
        }
    }

    /// Classify what the page is currently showing.
    pub fn detect<P: Page + ?Sized>(&self, page: &mut P) -> ChallengeKind {
        let url = page.current_url();
        let captcha = self.site.captcha_selector.as_str();
        let wait = secs(self.timeouts.captcha_wait);
        self.patterns.classify(&url, || {
            !captcha.is_empty() && page.is_visible(captcha, wait)
        })
    }

    /// Detect and, depending on `mode`, resolve a challenge.
    ///
    /// Returns `Err(SecurityChallenge)` when the operator skips or when any
    /// challenge appears in [`LoginMode::Silent`].
    pub fn resolve<P: Page + ?Sized>(
        &self,
        page: &mut P,
        account_id: &str,
        mode: LoginMode,
    ) -> Result<Resolution, AutomationError> {
        let kind = self.detect(page);
        if kind == ChallengeKind::None {
            return Ok(Resolution::Clear);
        }
        warn!(account = %account_id, challenge = %kind, ?mode, "security challenge detected");
        self.record(account_id, challenge_status(kind), format!("{kind} detected"));

        match mode {
            LoginMode::Silent => {
                self.record(
                    account_id,
                    AuditStatus::Failed,
                    format!("{kind} during unattended login"),
                );
                Err(AutomationError::SecurityChallenge(format!(
                    "{kind} during unattended login"
                )))
            }
            LoginMode::Interactive => {
                let resolved = match kind {
                    ChallengeKind::Checkpoint => self.await_checkpoint(page, account_id),
                    _ => self.prompt_once(kind, account_id),
                };
                match &resolved {
                    Ok(_) => {
                        info!(account = %account_id, challenge = %kind, "challenge resolved");
                        self.record(account_id, AuditStatus::Success, format!("{kind} resolved"));
                    }
                    Err(err) => {
                        self.record(account_id, AuditStatus::Skipped, err.to_string());
                    }
                }
                resolved
            }
        }
    }

    /// Block until the surface leaves the checkpoint or the operator skips.
    fn await_checkpoint<P: Page + ?Sized>(
        &self,
        page: &mut P,
        account_id: &str,
    ) -> Result<Resolution, AutomationError> {
        self.operator.notify(&format!(
            "[{account_id}] Security checkpoint. Complete it in the browser window."
        ));
        let poll = secs(self.timeouts.checkpoint_poll_interval);
        loop {
            let answer = self.ask("Type 'done' once cleared, or 'skip' to abandon this login:")?;
            if is_skip(&answer) {
                return Err(skipped(ChallengeKind::Checkpoint));
            }
            if !self.patterns.is_checkpoint(&page.current_url()) {
                return Ok(Resolution::Resolved(ChallengeKind::Checkpoint));
            }
            self.operator
                .notify("Still on the checkpoint page. Waiting before checking again.");
            self.pacer.sleep(poll);
        }
    }

    fn prompt_once(
        &self,
        kind: ChallengeKind,
        account_id: &str,
    ) -> Result<Resolution, AutomationError> {
        self.operator.notify(&format!(
            "[{account_id}] {kind} required. Solve it in the browser window."
        ));
        let answer = self.ask("Press Enter once solved, or type 'skip' to abandon this login:")?;
        if is_skip(&answer) {
            return Err(skipped(kind));
        }
        Ok(Resolution::Resolved(kind))
    }

    fn ask(&self, message: &str) -> Result<String, AutomationError> {
        self.operator.prompt(message).map_err(|err| {
            AutomationError::SecurityChallenge(format!("operator input unavailable: {err:#}"))
        })
    }

    fn record(&self, account_id: &str, status: AuditStatus, details: String) {
        self.audit.record(
            &AuditRecord::new(account_id, AuditAction::SecurityChallenge, status).details(details),
        );
    }
}

fn is_skip(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("skip")
}

fn skipped(kind: ChallengeKind) -> AutomationError {
    AutomationError::SecurityChallenge(format!("{kind} skipped by operator"))
}

pub(crate) fn challenge_status(kind: ChallengeKind) -> AuditStatus {
    match kind {
        ChallengeKind::None => AuditStatus::Success,
        ChallengeKind::Checkpoint => AuditStatus::Checkpoint,
        ChallengeKind::Captcha => AuditStatus::Captcha,
        ChallengeKind::TwoFactor => AuditStatus::TwoFactor,
    }
}
