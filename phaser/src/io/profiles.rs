//! Isolation policy: one durable browser profile per account.
//!
//! A profile directory is created on first use and reused on every later run so
//! sessions survive between runs. Pages are handed out as [`Lease`]s that close
//! on every exit path.

use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::driver::Page;
use crate::io::config::BrowserConfig;

/// Durable, account-scoped browser state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub account_id: String,
    pub dir: PathBuf,
}

/// Root of all profile directories (`.phaser/profiles/`).
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `account_id`, created if missing.
    pub fn profile_for(&self, account_id: &str) -> Result<Profile> {
        let dir = self.root.join(dir_name(account_id));
        fs::create_dir_all(&dir)
            .with_context(|| format!("create profile directory {}", dir.display()))?;
        Ok(Profile {
            account_id: account_id.to_string(),
            dir,
        })
    }
}

/// `profile_<id>` with every byte outside `[A-Za-z0-9.-]` written as `_XX`.
///
/// `_` is itself escaped, so distinct ids always get distinct directories.
fn dir_name(account_id: &str) -> String {
    let mut name = String::from("profile_");
    for byte in account_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-') {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("_{byte:02X}"));
        }
    }
    name
}

/// Opens a page on a persistent profile. Supplied by the embedding application.
pub trait BrowserLauncher {
    type Page: Page;

    fn launch(&self, profile: &Profile, browser: &BrowserConfig) -> Result<Self::Page>;
}

/// A page held exclusively for one task. Closed when dropped.
pub struct Lease<P: Page> {
    account_id: String,
    page: P,
}

impl<P: Page> Deref for Lease<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.page
    }
}

impl<P: Page> DerefMut for Lease<P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.page
    }
}

impl<P: Page> Drop for Lease<P> {
    fn drop(&mut self) {
        match self.page.close() {
            Ok(()) => debug!(account = %self.account_id, "profile released"),
            Err(err) => warn!(account = %self.account_id, error = %err, "failed to close page"),
        }
    }
}

/// Acquire the account's profile and open a page on it.
pub fn acquire<L: BrowserLauncher>(
    launcher: &L,
    store: &ProfileStore,
    account_id: &str,
    browser: &BrowserConfig,
) -> Result<Lease<L::Page>> {
    let profile = store.profile_for(account_id)?;
    debug!(account = %account_id, dir = %profile.dir.display(), "acquiring profile");
    let page = launcher
        .launch(&profile, browser)
        .with_context(|| format!("launch browser for {account_id}"))?;
    Ok(Lease {
        account_id: account_id.to_string(),
        page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedLauncher, ScriptedPage};

    #[test]
    fn profile_directory_is_stable_and_sanitized() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::new(temp.path());

        let first = store.profile_for("user@mail.test").expect("profile");
        let second = store.profile_for("user@mail.test").expect("profile");

        assert_eq!(first, second);
        assert!(first.dir.is_dir());
        assert!(first.dir.ends_with("profile_user_40mail.test"));
    }

    /// Ensures ids that only differ in escaped characters never share a profile.
    #[test]
    fn distinct_ids_get_distinct_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::new(temp.path());

        let at = store.profile_for("user@mail.test").expect("profile");
        let underscore = store.profile_for("user_mail.test").expect("profile");
        let space = store.profile_for("user mail.test").expect("profile");

        assert_ne!(at.dir, underscore.dir);
        assert_ne!(at.dir, space.dir);
        assert_ne!(underscore.dir, space.dir);
        assert!(underscore.dir.ends_with("profile_user_5Fmail.test"));
    }

    #[test]
    fn dir_name_escapes_path_separators() {
        assert_eq!(dir_name("../a"), "profile_.._2Fa");
        assert_eq!(dir_name("é"), "profile__C3_A9");
    }

    #[test]
    fn lease_closes_page_on_drop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::new(temp.path());
        let launcher = ScriptedLauncher::new(ScriptedPage::builder().build());
        let journal = launcher.journal();

        {
            let mut lease =
                acquire(&launcher, &store, "a1", &BrowserConfig::default()).expect("acquire");
            assert_eq!(lease.current_url(), "about:blank");
        }

        assert_eq!(journal.entries(), vec!["launch a1", "close"]);
    }

    #[test]
    fn launch_failure_is_reported_with_account() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::new(temp.path());
        let launcher = ScriptedLauncher::new(ScriptedPage::builder().build()).failing("a1");

        let err = acquire(&launcher, &store, "a1", &BrowserConfig::default())
            .err()
            .expect("launch should fail");

        assert!(err.to_string().contains("launch browser for a1"));
    }
}
