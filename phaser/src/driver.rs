//! Page-automation capability consumed by the protocols.
//!
//! The crate never talks to a browser directly. An embedding application
//! implements [`Page`] over its automation library and hands pages out through
//! [`crate::io::profiles::BrowserLauncher`].

use std::time::Duration;

pub use crate::core::error::DriverError;

pub type DriverResult<T> = Result<T, DriverError>;

/// Options for [`Page::click`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    /// Click even if another element overlays the target.
    pub force: bool,
}

/// One open page bound to a browser profile.
///
/// Selectors are opaque to the crate; the only assumption is "first visible
/// match among a ranked list".
pub trait Page {
    fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()>;

    fn current_url(&mut self) -> String;

    /// Wait up to `timeout` for `selector` to be visible. Driver errors count
    /// as not visible.
    fn is_visible(&mut self, selector: &str, timeout: Duration) -> bool;

    fn text_of(&mut self, selector: &str) -> DriverResult<String>;

    fn click(&mut self, selector: &str, options: ClickOptions) -> DriverResult<()>;

    /// Replace the field's content with `text` in one step.
    fn fill(&mut self, selector: &str, text: &str) -> DriverResult<()>;

    /// Type `text` as keystrokes appended to the field.
    fn type_text(&mut self, selector: &str, text: &str) -> DriverResult<()>;

    fn press_key(&mut self, selector: &str, key: &str) -> DriverResult<()>;

    fn scroll_into_view(&mut self, selector: &str) -> DriverResult<()>;

    fn wait_for_network_idle(&mut self, timeout: Duration) -> DriverResult<()>;

    fn close(&mut self) -> DriverResult<()>;
}

/// First selector in `candidates` that becomes visible within `timeout`.
pub fn first_visible<P: Page + ?Sized>(
    page: &mut P,
    candidates: &[String],
    timeout: Duration,
) -> Option<String> {
    candidates
        .iter()
        .find(|selector| page.is_visible(selector, timeout))
        .cloned()
}

/// Where sub-action selectors are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Inside a located dialog or modal.
    Container(String),
    /// The whole page.
    Surface,
}

impl Scope {
    pub fn select(&self, selector: &str) -> String {
        match self {
            Self::Container(container) => format!("{container} {selector}"),
            Self::Surface => selector.to_string(),
        }
    }

    /// Apply the scope to a ranked list.
    pub fn select_all(&self, selectors: &[String]) -> Vec<String> {
        selectors.iter().map(|selector| self.select(selector)).collect()
    }
}
