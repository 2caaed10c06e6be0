//! Failure taxonomy for network-facing attempts.

/// Failure raised by the page-automation driver (navigation, element access).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors produced by the authentication and interaction protocols.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutomationError {
    /// Form missing, inline error shown, or the result never settled.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// Operator skipped a challenge, or a challenge appeared during a silent login.
    #[error("security challenge: {0}")]
    SecurityChallenge(String),

    /// No selector candidate matched for a sub-action.
    #[error("interaction failed: {0}")]
    InteractionFailed(String),

    /// Navigation or network-level failure reported by the driver.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<DriverError> for AutomationError {
    fn from(err: DriverError) -> Self {
        Self::Transport(err.0)
    }
}
