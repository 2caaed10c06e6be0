//! Scripted doubles and fixtures for protocol and orchestrator tests.
//!
//! Nothing here touches a real browser, console, or clock. Pages record every
//! side-effecting driver call in a shared [`Journal`] so tests can assert on
//! the exact sequence of actions.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::challenge::ChallengePatterns;
use crate::core::error::DriverError;
use crate::core::types::{Account, Credential};
use crate::driver::{ClickOptions, DriverResult, Page};
use crate::interaction::InteractionProtocol;
use crate::io::audit::AuditLog;
use crate::io::catalog::{AccountCatalog, AccountEntry, ResourceCatalog};
use crate::io::clock::Sleeper;
use crate::io::config::{AutomationConfig, BrowserConfig, write_config};
use crate::io::console::Operator;
use crate::io::ledger_store::Ledger;
use crate::io::paths::{DataPaths, InitOptions, init_data_dir};
use crate::io::profiles::{BrowserLauncher, Profile};
use crate::login::LoginProtocol;
use crate::pacing::Pacer;

/// Landing URL used by [`test_config`].
pub const TEST_LANDING_URL: &str = "https://surface.test/login";

/// Append-only record of driver calls, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().expect("journal lock").push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    /// Number of entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|existing| existing == entry)
    }
}

/// Page change triggered by a navigation or click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Show(String),
    Hide(String),
    GoTo(String),
}

/// In-memory page whose elements are plain selector strings.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    url: String,
    visible: HashSet<String>,
    texts: HashMap<String, String>,
    fields: HashMap<String, String>,
    on_navigate: HashMap<String, Vec<Effect>>,
    on_click: HashMap<String, Vec<Effect>>,
    navigation_failures: HashMap<String, u32>,
    redirect: Option<(u32, String)>,
    reject_keys: bool,
    visibility_checks: Vec<(String, Duration)>,
    journal: Journal,
}

impl ScriptedPage {
    pub fn builder() -> ScriptedPageBuilder {
        ScriptedPageBuilder {
            page: ScriptedPage {
                url: "about:blank".to_string(),
                visible: HashSet::new(),
                texts: HashMap::new(),
                fields: HashMap::new(),
                on_navigate: HashMap::new(),
                on_click: HashMap::new(),
                navigation_failures: HashMap::new(),
                redirect: None,
                reject_keys: false,
                visibility_checks: Vec::new(),
                journal: Journal::default(),
            },
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Every `is_visible` call as `(selector, timeout)`, oldest first.
    pub fn visibility_checks(&self) -> Vec<(String, Duration)> {
        self.visibility_checks.clone()
    }

    /// Current content of an input filled or typed into.
    pub fn field(&self, selector: &str) -> Option<&str> {
        self.fields.get(selector).map(String::as_str)
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Show(selector) => {
                    self.visible.insert(selector);
                }
                Effect::Hide(selector) => {
                    self.visible.remove(&selector);
                }
                Effect::GoTo(url) => self.url = url,
            }
        }
    }
}

pub struct ScriptedPageBuilder {
    page: ScriptedPage,
}

impl ScriptedPageBuilder {
    pub fn url(mut self, url: &str) -> Self {
        self.page.url = url.to_string();
        self
    }

    pub fn visible(mut self, selector: &str) -> Self {
        self.page.visible.insert(selector.to_string());
        self
    }

    pub fn text(mut self, selector: &str, text: &str) -> Self {
        self.page.texts.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn on_navigate(mut self, url: &str, effects: Vec<Effect>) -> Self {
        self.page.on_navigate.insert(url.to_string(), effects);
        self
    }

    pub fn on_click(mut self, selector: &str, effects: Vec<Effect>) -> Self {
        self.page.on_click.insert(selector.to_string(), effects);
        self
    }

    /// Fail the next `times` navigations to `url`.
    pub fn fail_navigation(mut self, url: &str, times: u32) -> Self {
        self.page.navigation_failures.insert(url.to_string(), times);
        self
    }

    /// Switch to `url` after `reads` more calls to `current_url`.
    pub fn redirect_after(mut self, reads: u32, url: &str) -> Self {
        self.page.redirect = Some((reads, url.to_string()));
        self
    }

    /// Make every `press_key` fail.
    pub fn reject_keys(mut self) -> Self {
        self.page.reject_keys = true;
        self
    }

    pub fn build(self) -> ScriptedPage {
        self.page
    }
}

impl Page for ScriptedPage {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.journal.push(format!("navigate {url}"));
        if let Some(remaining) = self.navigation_failures.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(DriverError::new(format!("net::ERR_CONNECTION_RESET at {url}")));
        }
        self.url = url.to_string();
        let effects = self.on_navigate.get(url).cloned().unwrap_or_default();
        self.apply(effects);
        Ok(())
    }

    fn current_url(&mut self) -> String {
        if let Some((reads, target)) = self.redirect.take() {
            if reads == 0 {
                self.url = target;
            } else {
                self.redirect = Some((reads - 1, target));
            }
        }
        self.url.clone()
    }

    fn is_visible(&mut self, selector: &str, timeout: Duration) -> bool {
        self.visibility_checks.push((selector.to_string(), timeout));
        self.visible.contains(selector)
    }

    fn text_of(&mut self, selector: &str) -> DriverResult<String> {
        self.texts
            .get(selector)
            .cloned()
            .ok_or_else(|| DriverError::new(format!("no text for {selector}")))
    }

    fn click(&mut self, selector: &str, options: ClickOptions) -> DriverResult<()> {
        if options.force {
            self.journal.push(format!("click {selector} (force)"));
        } else {
            self.journal.push(format!("click {selector}"));
        }
        if !self.visible.contains(selector) {
            return Err(DriverError::new(format!("element not visible: {selector}")));
        }
        let effects = self.on_click.get(selector).cloned().unwrap_or_default();
        self.apply(effects);
        Ok(())
    }

    fn fill(&mut self, selector: &str, text: &str) -> DriverResult<()> {
        self.journal.push(format!("fill {selector}"));
        self.fields.insert(selector.to_string(), text.to_string());
        Ok(())
    }

    fn type_text(&mut self, selector: &str, text: &str) -> DriverResult<()> {
        self.journal.push(format!("type {selector} {text}"));
        self.fields
            .entry(selector.to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    fn press_key(&mut self, selector: &str, key: &str) -> DriverResult<()> {
        self.journal.push(format!("press {selector} {key}"));
        if self.reject_keys {
            return Err(DriverError::new(format!("key {key} not accepted")));
        }
        Ok(())
    }

    fn scroll_into_view(&mut self, selector: &str) -> DriverResult<()> {
        self.journal.push(format!("scroll {selector}"));
        Ok(())
    }

    fn wait_for_network_idle(&mut self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.journal.push("close".to_string());
        Ok(())
    }
}

/// Launcher that hands out clones of scripted pages.
///
/// Pages scripted for an account are used in order; the last one repeats.
/// Accounts without a script get the default page.
pub struct ScriptedLauncher {
    default: ScriptedPage,
    scripts: RefCell<HashMap<String, VecDeque<ScriptedPage>>>,
    failing: HashSet<String>,
    journal: Journal,
}

impl ScriptedLauncher {
    pub fn new(default: ScriptedPage) -> Self {
        Self {
            default,
            scripts: RefCell::new(HashMap::new()),
            failing: HashSet::new(),
            journal: Journal::default(),
        }
    }

    pub fn script(self, account_id: &str, pages: Vec<ScriptedPage>) -> Self {
        self.scripts
            .borrow_mut()
            .insert(account_id.to_string(), pages.into());
        self
    }

    /// Every launch for `account_id` fails.
    pub fn failing(mut self, account_id: &str) -> Self {
        self.failing.insert(account_id.to_string());
        self
    }

    /// Journal shared by every page this launcher creates.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl BrowserLauncher for ScriptedLauncher {
    type Page = ScriptedPage;

    fn launch(&self, profile: &Profile, _browser: &BrowserConfig) -> Result<ScriptedPage> {
        self.journal.push(format!("launch {}", profile.account_id));
        if self.failing.contains(&profile.account_id) {
            return Err(anyhow!("browser exited during startup"));
        }
        let mut scripts = self.scripts.borrow_mut();
        let scripted = match scripts.get_mut(&profile.account_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        let mut page = scripted.unwrap_or_else(|| self.default.clone());
        page.journal = self.journal.clone();
        Ok(page)
    }
}

#[derive(Debug, Default)]
struct OperatorState {
    responses: VecDeque<String>,
    prompts: Vec<String>,
    notices: Vec<String>,
}

/// Operator that answers prompts from a fixed queue. Runs out ⇒ input closed.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    state: Rc<RefCell<OperatorState>>,
}

impl ScriptedOperator {
    pub fn new(responses: &[&str]) -> Self {
        let state = OperatorState {
            responses: responses.iter().map(|r| r.to_string()).collect(),
            ..OperatorState::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state.borrow().prompts.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.state.borrow().notices.clone()
    }
}

impl Operator for ScriptedOperator {
    fn notify(&self, message: &str) {
        self.state.borrow_mut().notices.push(message.to_string());
    }

    fn prompt(&self, message: &str) -> Result<String> {
        let mut state = self.state.borrow_mut();
        state.prompts.push(message.to_string());
        state
            .responses
            .pop_front()
            .ok_or_else(|| anyhow!("operator input closed"))
    }
}

/// Sleeper that records requested durations and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);

impl RecordingSleeper {
    pub fn durations(&self) -> Vec<Duration> {
        self.0.lock().expect("sleeper lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.durations().len()
    }

    pub fn total(&self) -> Duration {
        self.durations().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.lock().expect("sleeper lock").push(duration);
    }
}

/// Account `id` with credential `pw-<id>`.
pub fn account(id: &str) -> Account {
    Account::new(id, Credential::new(format!("pw-{id}")))
}

/// Default config pointed at [`TEST_LANDING_URL`].
pub fn test_config() -> AutomationConfig {
    let mut config = AutomationConfig::default();
    config.site.landing_url = TEST_LANDING_URL.to_string();
    config
}

/// Everything a protocol needs, backed by a temp directory.
pub struct ProtocolHarness {
    pub config: AutomationConfig,
    pub patterns: ChallengePatterns,
    pub operator: ScriptedOperator,
    pub sleeper: RecordingSleeper,
    pub pacer: Pacer,
    pub audit: AuditLog,
    pub temp: TempDir,
}

impl ProtocolHarness {
    pub fn new(responses: &[&str]) -> Self {
        Self::with_config(test_config(), responses)
    }

    pub fn with_config(config: AutomationConfig, responses: &[&str]) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let sleeper = RecordingSleeper::default();
        Self {
            patterns: config.challenge_patterns().expect("challenge patterns"),
            config,
            operator: ScriptedOperator::new(responses),
            pacer: Pacer::new(Arc::new(sleeper.clone())),
            sleeper,
            audit: AuditLog::new(temp.path().join("logs/activity_log.csv")),
            temp,
        }
    }

    pub fn login(&self) -> LoginProtocol<'_> {
        LoginProtocol::new(
            &self.config,
            &self.patterns,
            &self.operator,
            &self.pacer,
            &self.audit,
        )
    }

    pub fn interaction(&self) -> InteractionProtocol<'_> {
        InteractionProtocol::new(&self.config, &self.pacer, &self.audit)
    }

    pub fn open_ledger(&self) -> Ledger {
        Ledger::open(&self.temp.path().join("state/ledger.json")).expect("open ledger")
    }

    /// Activity trail rows as column-to-text maps, oldest first.
    pub fn audit_rows(&self) -> Vec<serde_json::Value> {
        read_audit_rows(self.audit.path())
    }
}

/// Initialized data directory in a temp dir, with a runnable config.
pub struct TestData {
    pub temp: TempDir,
    pub paths: DataPaths,
}

impl TestData {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_data_dir(temp.path(), &InitOptions { force: false }).expect("init");
        write_config(&paths.config_path, &test_config()).expect("write config");
        Self { temp, paths }
    }

    pub fn add_account(&self, id: &str) {
        let mut catalog = AccountCatalog::load_or_seed(&self.paths.accounts_path).expect("accounts");
        catalog
            .add(AccountEntry {
                id: id.to_string(),
                credential: Some(Credential::new(format!("pw-{id}"))),
            })
            .expect("add account");
    }

    pub fn add_resource(&self, url: &str) {
        let mut catalog =
            ResourceCatalog::load_or_seed(&self.paths.resources_path).expect("resources");
        catalog.add(url).expect("add resource");
    }

    pub fn audit_rows(&self) -> Vec<serde_json::Value> {
        read_audit_rows(&self.paths.audit_path)
    }
}

impl Default for TestData {
    fn default() -> Self {
        Self::new()
    }
}

fn read_audit_rows(path: &std::path::Path) -> Vec<serde_json::Value> {
    let Ok(mut reader) = csv::Reader::from_path(path) else {
        return Vec::new();
    };
    reader
        .deserialize::<HashMap<String, String>>()
        .map(|row| {
            let row = row.expect("audit row");
            serde_json::Value::Object(
                row.into_iter()
                    .map(|(column, value)| (column, serde_json::Value::String(value)))
                    .collect(),
            )
        })
        .collect()
}
