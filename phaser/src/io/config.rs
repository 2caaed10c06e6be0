//! Automation configuration stored under `<data>/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::challenge::ChallengePatterns;

/// Automation configuration (TOML).
///
/// Intended to be edited by humans. Missing sections and fields fall back to
/// defaults, so a partial file is always valid input to `load_config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutomationConfig {
    pub site: SiteConfig,
    pub delays: DelayConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub interaction: InteractionConfig,
    pub browser: BrowserConfig,
    pub credentials: CredentialConfig,
}

/// Where to log in and how to recognise each login state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    /// Landing surface opened at the start of every login. Required for runs.
    pub landing_url: String,
    /// Any one of these visible means the session is authenticated.
    pub authenticated_selectors: Vec<String>,
    pub identity_input: String,
    pub credential_input: String,
    pub submit_button: String,
    /// Inline error shown after a rejected submit.
    pub inline_error: String,
    pub captcha_selector: String,
    /// Regexes matched case-insensitively against the current URL.
    pub checkpoint_pattern: String,
    pub captcha_pattern: String,
    pub two_factor_pattern: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            landing_url: String::new(),
            authenticated_selectors: strings(&[
                "[data-session=\"authenticated\"]",
                "[aria-label=\"Account menu\"]",
            ]),
            identity_input: "input[name=\"email\"]".to_string(),
            credential_input: "input[name=\"pass\"]".to_string(),
            submit_button: "button[type=\"submit\"]".to_string(),
            inline_error: "div[role=\"alert\"]".to_string(),
            captcha_selector: "[role=\"img\"][aria-label*=\"captcha\" i]".to_string(),
            checkpoint_pattern: "checkpoint".to_string(),
            captcha_pattern: "captcha".to_string(),
            two_factor_pattern: "two_factor|2fa".to_string(),
        }
    }
}

/// Randomized pauses, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DelayConfig {
    /// Short human-like pause between steps of a protocol.
    pub human_min: f64,
    pub human_max: f64,
    pub page_load: f64,
    pub login_gap_min: f64,
    pub login_gap_max: f64,
    pub interaction_gap_min: f64,
    pub interaction_gap_max: f64,
    pub keystroke_min: f64,
    pub keystroke_max: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            human_min: 1.0,
            human_max: 3.0,
            page_load: 3.0,
            login_gap_min: 10.0,
            login_gap_max: 30.0,
            interaction_gap_min: 5.0,
            interaction_gap_max: 15.0,
            keystroke_min: 0.05,
            keystroke_max: 0.15,
        }
    }
}

/// Waits embedded in the protocols, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub login_max_wait: f64,
    pub login_poll_interval: f64,
    pub page_load: f64,
    /// Wait for the login form's identity input.
    pub element_wait: f64,
    /// Per-selector wait when checking for an authenticated session.
    pub auth_wait: f64,
    /// Wait for a captcha element to render before ruling one out.
    pub captcha_wait: f64,
    pub container_wait: f64,
    /// Per-selector wait for like, comment and submit controls.
    pub control_wait: f64,
    pub stability_wait: f64,
    pub checkpoint_poll_interval: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_max_wait: 120.0,
            login_poll_interval: 3.0,
            page_load: 30.0,
            element_wait: 10.0,
            auth_wait: 3.0,
            captcha_wait: 3.0,
            container_wait: 2.0,
            control_wait: 2.0,
            stability_wait: 5.0,
            checkpoint_poll_interval: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per login before the failure is recorded.
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub like_attempts: u32,
    pub comment_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2.0,
            like_attempts: 3,
            comment_attempts: 3,
        }
    }
}

/// Ranked selector lists for the resource-interaction protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InteractionConfig {
    pub container_selectors: Vec<String>,
    pub loading_selectors: Vec<String>,
    pub like_selectors: Vec<String>,
    pub comment_selectors: Vec<String>,
    pub submit_selectors: Vec<String>,
    pub comment_variations: Vec<String>,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            container_selectors: strings(&["[role=\"dialog\"]", "[aria-modal=\"true\"]"]),
            loading_selectors: strings(&[".loading", ".spinner", "[aria-label*=\"Loading\"]"]),
            like_selectors: strings(&[
                "[aria-label=\"Like\"][role=\"button\"]",
                "button[aria-label*=\"like\" i]",
            ]),
            comment_selectors: strings(&[
                "textarea[placeholder*=\"comment\" i]",
                "[placeholder*=\"comment\" i]",
                "div[contenteditable=\"true\"]",
            ]),
            submit_selectors: strings(&["button[type=\"submit\"]", "[aria-label*=\"Post\" i]"]),
            comment_variations: strings(&[
                "Nice post!",
                "Great content!",
                "Love this!",
                "Well said!",
            ]),
        }
    }
}

/// Passed through to the browser launcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialConfig {
    /// Environment variable consulted when a catalog entry has no credential.
    pub env_var: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: "PHASER_CREDENTIAL".to_string(),
        }
    }
}

impl AutomationConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("delays.human", self.delays.human_min, self.delays.human_max)?;
        check_range("delays.login_gap", self.delays.login_gap_min, self.delays.login_gap_max)?;
        check_range(
            "delays.interaction_gap",
            self.delays.interaction_gap_min,
            self.delays.interaction_gap_max,
        )?;
        check_range("delays.keystroke", self.delays.keystroke_min, self.delays.keystroke_max)?;
        check_non_negative("delays.page_load", self.delays.page_load)?;

        let t = &self.timeouts;
        for (name, value) in [
            ("timeouts.login_max_wait", t.login_max_wait),
            ("timeouts.login_poll_interval", t.login_poll_interval),
            ("timeouts.page_load", t.page_load),
            ("timeouts.checkpoint_poll_interval", t.checkpoint_poll_interval),
        ] {
            check_positive(name, value)?;
        }
        for (name, value) in [
            ("timeouts.element_wait", t.element_wait),
            ("timeouts.auth_wait", t.auth_wait),
            ("timeouts.captcha_wait", t.captcha_wait),
            ("timeouts.container_wait", t.container_wait),
            ("timeouts.control_wait", t.control_wait),
            ("timeouts.stability_wait", t.stability_wait),
        ] {
            check_non_negative(name, value)?;
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.retry.like_attempts == 0 || self.retry.comment_attempts == 0 {
            return Err(anyhow!("retry.like_attempts and retry.comment_attempts must be > 0"));
        }
        check_non_negative("retry.base_delay_secs", self.retry.base_delay_secs)?;

        if self.site.authenticated_selectors.is_empty() {
            return Err(anyhow!("site.authenticated_selectors must not be empty"));
        }
        let i = &self.interaction;
        if i.like_selectors.is_empty() && i.comment_selectors.is_empty() {
            return Err(anyhow!(
                "interaction.like_selectors and interaction.comment_selectors are both empty"
            ));
        }
        if i.comment_variations.iter().all(|text| text.trim().is_empty()) {
            return Err(anyhow!("interaction.comment_variations must contain a non-empty entry"));
        }
        if self.credentials.env_var.trim().is_empty() {
            return Err(anyhow!("credentials.env_var must not be empty"));
        }
        self.challenge_patterns()?;
        Ok(())
    }

    pub fn challenge_patterns(&self) -> Result<ChallengePatterns> {
        ChallengePatterns::new(
            &self.site.checkpoint_pattern,
            &self.site.captcha_pattern,
            &self.site.two_factor_pattern,
        )
        .context("compile challenge url patterns")
    }

    pub fn base_delay(&self) -> Duration {
        secs(self.retry.base_delay_secs)
    }
}

/// Convert a validated seconds value into a `Duration`.
pub fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!("{name} must be a finite, non-negative number"));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(anyhow!("{name} must be > 0"));
    }
    Ok(())
}

fn check_range(name: &str, min: f64, max: f64) -> Result<()> {
    check_non_negative(&format!("{name}_min"), min)?;
    check_non_negative(&format!("{name}_max"), max)?;
    if min > max {
        return Err(anyhow!("{name}_min must be <= {name}_max"));
    }
    Ok(())
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AutomationConfig::default()`.
pub fn load_config(path: &Path) -> Result<AutomationConfig> {
    if !path.exists() {
        let cfg = AutomationConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AutomationConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AutomationConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
