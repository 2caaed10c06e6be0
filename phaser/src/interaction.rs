//! Resource-interaction protocol: like and comment on one resource.
//!
//! The two sub-actions are retried independently and their failures are
//! swallowed into booleans. The pair counts as done if either one succeeds.

use std::time::{Duration, Instant};

use anyhow::Result;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, warn};

use crate::core::error::AutomationError;
use crate::core::types::InteractionOutcome;
use crate::driver::{ClickOptions, Page, Scope, first_visible};
use crate::io::audit::{AuditAction, AuditLog, AuditRecord, AuditStatus};
use crate::io::config::{AutomationConfig, secs};
use crate::io::ledger_store::Ledger;
use crate::pacing::Pacer;
use crate::retry::Backoff;

/// Interval between checks for a loading indicator inside the container.
const STABILITY_POLL: Duration = Duration::from_millis(500);

pub struct InteractionProtocol<'a> {
    config: &'a AutomationConfig,
    pacer: &'a Pacer,
    audit: &'a AuditLog,
}

impl<'a> InteractionProtocol<'a> {
    pub fn new(config: &'a AutomationConfig, pacer: &'a Pacer, audit: &'a AuditLog) -> Self {
        Self {
            config,
            pacer,
            audit,
        }
    }

    /// Interact with `resource` as `account_id` and record the pair if either
    /// sub-action succeeded.
    ///
    /// Navigation failures abort the pair with `InteractionFailed`; they are
    /// not retried and the pair stays pending.
    #[instrument(skip_all, fields(account = %account_id, resource = %resource))]
    pub fn interact<P: Page + ?Sized>(
        &self,
        page: &mut P,
        account_id: &str,
        resource: &str,
        ledger: &mut Ledger,
    ) -> Result<InteractionOutcome> {
        let started = Instant::now();
        let timeouts = &self.config.timeouts;

        if let Err(err) = page.navigate(resource, secs(timeouts.page_load)) {
            self.audit.record(
                &AuditRecord::new(account_id, AuditAction::PostInteraction, AuditStatus::Error)
                    .resource(resource)
                    .details(format!("navigation failed: {err}")),
            );
            return Err(
                AutomationError::InteractionFailed(format!("navigate {resource}: {err}")).into(),
            );
        }
        self.pacer.sleep(secs(self.config.delays.page_load));
        self.pacer
            .pause(self.config.delays.human_min, self.config.delays.human_max);

        let scope = self.locate_container(page);
        debug!(?scope, "interaction scope");

        let retry = &self.config.retry;
        let base = self.config.base_delay();

        let liked = Backoff::new(retry.like_attempts, base)
            .execute(self.pacer, || self.like(&mut *page, &scope))
            .is_ok();
        self.record_sub_action(account_id, resource, AuditAction::Like, liked);
        if liked {
            self.pacer
                .pause(self.config.delays.human_min, self.config.delays.human_max);
        }

        let commented = match self.pick_comment() {
            Some(text) => Backoff::new(retry.comment_attempts, base)
                .execute(self.pacer, || self.comment(&mut *page, &scope, &text))
                .is_ok(),
            None => false,
        };
        self.record_sub_action(account_id, resource, AuditAction::Comment, commented);

        let outcome = InteractionOutcome { liked, commented };
        let record = if outcome.succeeded() {
            ledger.mark_post_processed(account_id, resource)?;
            info!(result = outcome.describe(), "interaction recorded");
            AuditRecord::new(account_id, AuditAction::PostInteraction, AuditStatus::Success)
        } else {
            warn!("no sub-action succeeded; pair stays pending");
            AuditRecord::new(account_id, AuditAction::PostInteraction, AuditStatus::Failed)
        };
        self.audit.record(
            &record
                .resource(resource)
                .details(outcome.describe())
                .duration(started.elapsed()),
        );
        Ok(outcome)
    }

    /// Prefer a visible dialog; otherwise act on the whole surface.
    fn locate_container<P: Page + ?Sized>(&self, page: &mut P) -> Scope {
        let interaction = &self.config.interaction;
        let timeouts = &self.config.timeouts;
        let Some(container) = first_visible(
            page,
            &interaction.container_selectors,
            secs(timeouts.container_wait),
        ) else {
            return Scope::Surface;
        };

        let scope = Scope::Container(container);
        let loading = scope.select_all(&interaction.loading_selectors);
        let limit = secs(timeouts.stability_wait);
        let mut waited = Duration::ZERO;
        while waited < limit && first_visible(page, &loading, Duration::ZERO).is_some() {
            self.pacer.sleep(STABILITY_POLL);
            waited += STABILITY_POLL;
        }
        scope
    }

    fn like<P: Page + ?Sized>(&self, page: &mut P, scope: &Scope) -> Result<(), AutomationError> {
        let wait = secs(self.config.timeouts.control_wait);
        for selector in scope.select_all(&self.config.interaction.like_selectors) {
            if !page.is_visible(&selector, wait) {
                continue;
            }
            if let Err(err) = page.scroll_into_view(&selector) {
                debug!(%selector, error = %err, "scroll failed");
                continue;
            }
            let clicked = page
                .click(&selector, ClickOptions::default())
                .or_else(|_| page.click(&selector, ClickOptions { force: true }));
            match clicked {
                Ok(()) => {
                    debug!(%selector, "liked");
                    return Ok(());
                }
                Err(err) => debug!(%selector, error = %err, "like click failed"),
            }
        }
        Err(AutomationError::InteractionFailed(
            "no like control matched".to_string(),
        ))
    }

    fn comment<P: Page + ?Sized>(
        &self,
        page: &mut P,
        scope: &Scope,
        text: &str,
    ) -> Result<(), AutomationError> {
        let interaction = &self.config.interaction;
        let wait = secs(self.config.timeouts.control_wait);
        let Some(field) = first_visible(page, &scope.select_all(&interaction.comment_selectors), wait)
        else {
            return Err(AutomationError::InteractionFailed(
                "no comment field matched".to_string(),
            ));
        };

        page.click(&field, ClickOptions::default())?;
        page.fill(&field, "")?;
        let delays = &self.config.delays;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            page.type_text(&field, ch.encode_utf8(&mut buf))?;
            self.pacer.pause(delays.keystroke_min, delays.keystroke_max);
        }
        self.pacer.pause(delays.human_min / 2.0, delays.human_max / 2.0);

        if let Err(err) = page.press_key(&field, "Enter") {
            debug!(error = %err, "enter rejected; trying submit controls");
            let submit = first_visible(page, &scope.select_all(&interaction.submit_selectors), wait)
                .ok_or_else(|| {
                    AutomationError::InteractionFailed("comment typed but not submitted".to_string())
                })?;
            page.click(&submit, ClickOptions::default())?;
        }
        debug!(field = %field, "commented");
        Ok(())
    }

    fn pick_comment(&self) -> Option<String> {
        let variants: Vec<&String> = self
            .config
            .interaction
            .comment_variations
            .iter()
            .filter(|text| !text.trim().is_empty())
            .collect();
        variants
            .choose(&mut rand::thread_rng())
            .map(|text| text.to_string())
    }

    fn record_sub_action(&self, account_id: &str, resource: &str, action: AuditAction, ok: bool) {
        let status = if ok {
            AuditStatus::Success
        } else {
            AuditStatus::Failed
        };
        self.audit
            .record(&AuditRecord::new(account_id, action, status).resource(resource));
    }
}
