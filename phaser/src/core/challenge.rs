//! Classification of verification challenges from surface signals.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Interruption the surface is currently presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeKind {
    None,
    Checkpoint,
    Captcha,
    TwoFactor,
}

impl ChallengeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Checkpoint => "CHECKPOINT",
            Self::Captcha => "CAPTCHA",
            Self::TwoFactor => "2FA",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Case-insensitive URL patterns identifying each challenge.
#[derive(Debug, Clone)]
pub struct ChallengePatterns {
    checkpoint: Regex,
    captcha: Regex,
    two_factor: Regex,
}

impl ChallengePatterns {
    pub fn new(checkpoint: &str, captcha: &str, two_factor: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            checkpoint: compile(checkpoint)?,
            captcha: compile(captcha)?,
            two_factor: compile(two_factor)?,
        })
    }

    pub fn is_checkpoint(&self, url: &str) -> bool {
        self.checkpoint.is_match(url)
    }

    /// Classify the surface state. Precedence: checkpoint, captcha, two-factor.
    ///
    /// `captcha_visible` is only checked when the URL alone does not decide the
    /// outcome; each check is a driver round trip.
    pub fn classify(&self, url: &str, captcha_visible: impl FnOnce() -> bool) -> ChallengeKind {
        if self.checkpoint.is_match(url) {
            return ChallengeKind::Checkpoint;
        }
        if self.captcha.is_match(url) || captcha_visible() {
            return ChallengeKind::Captcha;
        }
        if self.two_factor.is_match(url) {
            return ChallengeKind::TwoFactor;
        }
        ChallengeKind::None
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}
