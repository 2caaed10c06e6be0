//! Authentication protocol: the per-account login state machine.
//!
//! One pass through the machine is a single attempt handed to the
//! [`Backoff`] executor. Retryable failures (`LoginFailed`, `Transport`) come
//! back as `Err` and are retried; terminal failures (a challenge that cannot be
//! cleared in this context) come back as `Ok(LoginOutcome::Failed)` so the
//! executor returns at once. Only the final outcome reaches the ledger.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::challenge::ChallengePatterns;
use crate::core::error::AutomationError;
use crate::core::types::{Account, LoginMode, LoginOutcome};
use crate::driver::{ClickOptions, Page, first_visible};
use crate::io::audit::{AuditAction, AuditLog, AuditRecord, AuditStatus};
use crate::io::config::{AutomationConfig, secs};
use crate::io::console::Operator;
use crate::io::ledger_store::Ledger;
use crate::pacing::Pacer;
use crate::resolver::{ChallengeResolver, Resolution};
use crate::retry::Backoff;

/// States of one login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginState {
    Start,
    CheckAlreadyIn,
    ChallengeCheck,
    FormFill,
    Submit,
    AwaitResult,
}

pub struct LoginProtocol<'a> {
    config: &'a AutomationConfig,
    resolver: ChallengeResolver<'a>,
    backoff: Backoff,
    pacer: &'a Pacer,
    audit: &'a AuditLog,
}

impl<'a> LoginProtocol<'a> {
    pub fn new(
        config: &'a AutomationConfig,
        patterns: &'a ChallengePatterns,
        operator: &'a dyn Operator,
        pacer: &'a Pacer,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            config,
            resolver: ChallengeResolver::new(
                &config.site,
                patterns,
                &config.timeouts,
                operator,
                pacer,
                audit,
            ),
            backoff: Backoff::new(config.retry.max_attempts, config.base_delay()),
            pacer,
            audit,
        }
    }

    /// Log `account` in on `page` and record the outcome exactly once.
    ///
    /// Login failures are values, not errors. `Err` means the outcome could
    /// not be persisted.
    #[instrument(skip_all, fields(account = %account.id, ?mode))]
    pub fn authenticate<P: Page + ?Sized>(
        &self,
        page: &mut P,
        account: &Account,
        mode: LoginMode,
        ledger: &mut Ledger,
    ) -> Result<LoginOutcome> {
        let started = Instant::now();
        info!("login started");
        let outcome = self
            .backoff
            .execute(self.pacer, || self.attempt(&mut *page, account, mode))
            .unwrap_or_else(|err| LoginOutcome::failed(err.to_string()));

        ledger.mark_login_attempt(&account.id, outcome.is_success())?;

        let record = match &outcome {
            LoginOutcome::Success => {
                info!("login succeeded");
                AuditRecord::new(&account.id, AuditAction::Login, AuditStatus::Success)
                    .details(format!("{} login", mode_label(mode)))
            }
            LoginOutcome::Failed { reason } => {
                warn!(%reason, "login failed");
                AuditRecord::new(&account.id, AuditAction::Login, AuditStatus::Failed)
                    .details(reason.clone())
            }
        };
        self.audit.record(&record.duration(started.elapsed()));
        Ok(outcome)
    }

    /// Whether any authenticated indicator is visible.
    pub fn is_authenticated<P: Page + ?Sized>(&self, page: &mut P) -> bool {
        first_visible(
            page,
            &self.config.site.authenticated_selectors,
            secs(self.config.timeouts.auth_wait),
        )
        .is_some()
    }

    fn attempt<P: Page + ?Sized>(
        &self,
        page: &mut P,
        account: &Account,
        mode: LoginMode,
    ) -> Result<LoginOutcome, AutomationError> {
        let site = &self.config.site;
        let timeouts = &self.config.timeouts;
        let delays = &self.config.delays;
        let max_wait = secs(timeouts.login_max_wait);
        let poll = secs(timeouts.login_poll_interval);
        let mut waited = Duration::ZERO;
        let mut state = LoginState::Start;

        loop {
            debug!(?state, "login state");
            state = match state {
                LoginState::Start => {
                    page.navigate(&site.landing_url, secs(timeouts.page_load))?;
                    self.pacer.pause(delays.human_min, delays.human_max);
                    LoginState::CheckAlreadyIn
                }
                LoginState::CheckAlreadyIn => {
                    if self.is_authenticated(page) {
                        debug!("already authenticated");
                        return Ok(LoginOutcome::Success);
                    }
                    LoginState::ChallengeCheck
                }
                LoginState::ChallengeCheck => match self.check_challenge(page, account, mode)? {
                    Some(outcome) => return Ok(outcome),
                    None => LoginState::FormFill,
                },
                LoginState::FormFill => {
                    if !page.is_visible(&site.identity_input, secs(timeouts.element_wait)) {
                        return Err(AutomationError::LoginFailed("form not found".to_string()));
                    }
                    page.fill(&site.identity_input, &account.id)?;
                    self.pacer.pause(delays.human_min / 2.0, delays.human_max / 2.0);
                    page.fill(&site.credential_input, account.credential.expose())?;
                    self.pacer.pause(delays.human_min / 2.0, delays.human_max / 2.0);
                    LoginState::Submit
                }
                LoginState::Submit => {
                    page.click(&site.submit_button, ClickOptions::default())?;
                    self.pacer.pause(delays.human_min * 2.0, delays.human_max + 1.0);
                    if let Err(err) = page.wait_for_network_idle(secs(timeouts.page_load)) {
                        debug!(error = %err, "network did not settle; polling anyway");
                    }
                    LoginState::AwaitResult
                }
                LoginState::AwaitResult => {
                    if let Some(outcome) = self.check_challenge(page, account, mode)? {
                        return Ok(outcome);
                    }
                    if self.is_authenticated(page) {
                        return Ok(LoginOutcome::Success);
                    }
                    if !site.inline_error.is_empty()
                        && page.is_visible(&site.inline_error, Duration::ZERO)
                    {
                        let text = page.text_of(&site.inline_error).unwrap_or_default();
                        let text = text.trim();
                        return Err(AutomationError::LoginFailed(if text.is_empty() {
                            "login rejected".to_string()
                        } else {
                            text.to_string()
                        }));
                    }
                    if waited >= max_wait {
                        return Err(AutomationError::LoginFailed(format!(
                            "no result after {}s",
                            max_wait.as_secs()
                        )));
                    }
                    self.pacer.sleep(poll);
                    waited += poll;
                    LoginState::AwaitResult
                }
            };
        }
    }

    /// `Some(outcome)` ends the attempt; `None` continues to the form.
    ///
    /// A cleared challenge may have logged the session in, so it re-checks
    /// before continuing.
    fn check_challenge<P: Page + ?Sized>(
        &self,
        page: &mut P,
        account: &Account,
        mode: LoginMode,
    ) -> Result<Option<LoginOutcome>, AutomationError> {
        match self.resolver.resolve(page, &account.id, mode) {
            Ok(Resolution::Clear) => Ok(None),
            Ok(Resolution::Resolved(_)) => {
                let delays = &self.config.delays;
                self.pacer.pause(delays.human_min * 2.0, delays.human_max + 2.0);
                if self.is_authenticated(page) {
                    return Ok(Some(LoginOutcome::Success));
                }
                Ok(None)
            }
            Err(AutomationError::SecurityChallenge(reason)) => {
                Ok(Some(LoginOutcome::failed(format!("security challenge: {reason}"))))
            }
            Err(other) => Err(other),
        }
    }
}

fn mode_label(mode: LoginMode) -> &'static str {
    match mode {
        LoginMode::Interactive => "interactive",
        LoginMode::Silent => "silent",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Effect, ProtocolHarness, ScriptedPage, account};

    const LANDING: &str = "https://surface.test/login";

    fn login_page(h: &ProtocolHarness) -> crate::test_support::ScriptedPageBuilder {
        let site = &h.config.site;
        ScriptedPage::builder()
            .visible(&site.identity_input)
            .visible(&site.credential_input)
            .visible(&site.submit_button)
    }

    #[test]
    fn existing_session_short_circuits() {
        let h = ProtocolHarness::new(&[]);
        let mut ledger = h.open_ledger();
        let mut page = ScriptedPage::builder()
            .visible(&h.config.site.authenticated_selectors[0])
            .build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Interactive, &mut ledger)
            .expect("authenticate");

        assert_eq!(outcome, LoginOutcome::Success);
        assert_eq!(page.journal().entries(), vec![format!("navigate {LANDING}")]);
        assert!(ledger.state().is_successful("a1"));
    }

    #[test]
    fn form_submission_logs_in() {
        let h = ProtocolHarness::new(&[]);
        let mut ledger = h.open_ledger();
        let site = &h.config.site;
        let mut page = login_page(&h)
            .on_click(
                &site.submit_button,
                vec![Effect::Show(site.authenticated_selectors[1].clone())],
            )
            .build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Interactive, &mut ledger)
            .expect("authenticate");

        assert_eq!(outcome, LoginOutcome::Success);
        assert_eq!(page.field(&site.identity_input), Some("a1"));
        assert_eq!(page.field(&site.credential_input), Some("pw-a1"));
        assert_eq!(ledger.state().successful_logins, vec!["a1"]);
        let rows = h.audit_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["action"], "LOGIN");
        assert_eq!(rows[0]["status"], "SUCCESS");
    }

    /// Verifies an inline error is retried up to the attempt bound and then
    /// recorded once as a failure carrying the error text.
    #[test]
    fn inline_error_is_retried_then_recorded() {
        let h = ProtocolHarness::new(&[]);
        let mut ledger = h.open_ledger();
        let site = &h.config.site;
        let mut page = login_page(&h)
            .on_click(&site.submit_button, vec![Effect::Show(site.inline_error.clone())])
            .text(&site.inline_error, "Wrong password")
            .build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Interactive, &mut ledger)
            .expect("authenticate");

        assert_eq!(
            outcome,
            LoginOutcome::failed("login failed: Wrong password")
        );
        assert_eq!(page.journal().count("navigate "), 3);
        assert_eq!(ledger.state().failed_logins, vec!["a1"]);
        assert_eq!(ledger.state().login_attempts, vec!["a1"]);
        assert_eq!(h.audit_rows().len(), 1);
    }

    #[test]
    fn missing_form_fails_the_attempt() {
        let mut config = crate::test_support::test_config();
        config.retry.max_attempts = 1;
        let h = ProtocolHarness::with_config(config, &[]);
        let mut ledger = h.open_ledger();
        let mut page = ScriptedPage::builder().build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Interactive, &mut ledger)
            .expect("authenticate");

        assert_eq!(outcome, LoginOutcome::failed("login failed: form not found"));
    }

    /// Ensures a challenge during a silent login fails at once and is not retried.
    #[test]
    fn silent_challenge_is_not_retried() {
        let h = ProtocolHarness::new(&[]);
        let mut ledger = h.open_ledger();
        let mut page = login_page(&h)
            .on_navigate(LANDING, vec![Effect::GoTo("https://surface.test/checkpoint/9".to_string())])
            .build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Silent, &mut ledger)
            .expect("authenticate");

        assert!(!outcome.is_success());
        assert_eq!(page.journal().count("navigate "), 1);
        assert!(h.operator.prompts().is_empty());
        assert!(ledger.state().is_failed("a1"));
    }

    #[test]
    fn operator_skip_fails_without_retry() {
        let h = ProtocolHarness::new(&["skip"]);
        let mut ledger = h.open_ledger();
        let mut page = login_page(&h)
            .on_navigate(LANDING, vec![Effect::GoTo("https://surface.test/two_factor".to_string())])
            .build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Interactive, &mut ledger)
            .expect("authenticate");

        assert_eq!(
            outcome,
            LoginOutcome::failed("security challenge: 2FA skipped by operator")
        );
        assert_eq!(page.journal().count("navigate "), 1);
    }

    /// Verifies the result poll gives up after the maximum wait.
    #[test]
    fn unresolved_submit_times_out() {
        let mut config = crate::test_support::test_config();
        config.retry.max_attempts = 1;
        config.timeouts.login_max_wait = 6.0;
        config.timeouts.login_poll_interval = 3.0;
        let h = ProtocolHarness::with_config(config, &[]);
        let mut ledger = h.open_ledger();
        let mut page = login_page(&h).build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Interactive, &mut ledger)
            .expect("authenticate");

        assert_eq!(outcome, LoginOutcome::failed("login failed: no result after 6s"));
        let polls = h
            .sleeper
            .durations()
            .into_iter()
            .filter(|d| *d == Duration::from_secs(3))
            .count();
        assert!(polls >= 2);
    }

    #[test]
    fn transport_failure_is_retried() {
        let h = ProtocolHarness::new(&[]);
        let mut ledger = h.open_ledger();
        let mut page = ScriptedPage::builder()
            .visible(&h.config.site.authenticated_selectors[0])
            .fail_navigation(LANDING, 1)
            .build();

        let outcome = h
            .login()
            .authenticate(&mut page, &account("a1"), LoginMode::Interactive, &mut ledger)
            .expect("authenticate");

        assert_eq!(outcome, LoginOutcome::Success);
        assert_eq!(page.journal().count("navigate "), 2);
    }
}
