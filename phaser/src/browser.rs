//! Chromium backend over the DevTools protocol.
//!
//! Every launch starts its own Chromium process on the account's profile
//! directory. The protocol client is async; [`ChromiumPage`] blocks on a
//! runtime shared with its launcher so the synchronous protocols can drive it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::keys;
use chromiumoxide::{Browser, Page as CdpPage};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{ClickOptions, DriverError, DriverResult, Page};
use crate::exit_codes;
use crate::io::clock::StopSignal;
use crate::io::config::BrowserConfig;
use crate::io::profiles::{BrowserLauncher, Profile};

const HANDLER_ERROR_TOLERANCE: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches one Chromium per lease.
pub struct ChromiumLauncher {
    runtime: Arc<Runtime>,
}

impl ChromiumLauncher {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("start browser runtime")?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    /// Raise `stop` on the first Ctrl-C and exit on the second.
    ///
    /// The first interrupt lets the current task finish so the ledger and the
    /// closing summary stay consistent.
    pub fn watch_interrupts(&self, stop: StopSignal) {
        self.runtime.spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "cannot listen for interrupts");
                    return;
                }
                if stop.is_raised() {
                    warn!("second interrupt; exiting now");
                    std::process::exit(exit_codes::INTERRUPTED);
                }
                warn!("interrupt received; stopping after the current task (Ctrl-C again to exit now)");
                stop.raise();
            }
        });
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Page = ChromiumPage;

    fn launch(&self, profile: &Profile, config: &BrowserConfig) -> Result<ChromiumPage> {
        let mut builder = chromiumoxide::BrowserConfig::builder()
            .user_data_dir(&profile.dir)
            .window_size(config.viewport_width, config.viewport_height)
            .args(vec![
                "--no-first-run",
                "--no-default-browser-check",
                "--disable-blink-features=AutomationControlled",
            ]);
        if !config.headless {
            builder = builder.with_head();
        }
        let cdp_config = builder
            .build()
            .map_err(|err| anyhow!("browser config: {err}"))?;

        let account_id = profile.account_id.clone();
        let (browser, page, events) = self.runtime.block_on(async move {
            let (mut browser, mut handler) = Browser::launch(cdp_config)
                .await
                .context("launch chromium")?;
            let events = tokio::spawn(async move {
                let mut consecutive_errors = 0usize;
                while let Some(event) = handler.next().await {
                    match event {
                        Ok(()) => consecutive_errors = 0,
                        Err(err) => {
                            consecutive_errors += 1;
                            warn!(
                                account = %account_id,
                                error = %err,
                                consecutive_errors,
                                "chromium handler event error"
                            );
                            if consecutive_errors >= HANDLER_ERROR_TOLERANCE {
                                break;
                            }
                        }
                    }
                }
                debug!(account = %account_id, "chromium handler stopped");
            });
            match browser.new_page("about:blank").await {
                Ok(page) => Ok((browser, page, events)),
                Err(err) => {
                    let _ = browser.close().await;
                    events.abort();
                    Err(anyhow!(err).context("open page"))
                }
            }
        })?;
        info!(
            account = %profile.account_id,
            dir = %profile.dir.display(),
            headless = config.headless,
            "chromium launched"
        );
        Ok(ChromiumPage {
            runtime: Arc::clone(&self.runtime),
            browser: Some(browser),
            page: Some(page),
            events: Some(events),
        })
    }
}

/// A single tab in a launched Chromium.
pub struct ChromiumPage {
    runtime: Arc<Runtime>,
    browser: Option<Browser>,
    page: Option<CdpPage>,
    events: Option<JoinHandle<()>>,
}

impl ChromiumPage {
    fn page(&self) -> DriverResult<&CdpPage> {
        self.page
            .as_ref()
            .ok_or_else(|| DriverError::new("page is closed"))
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn eval<T: DeserializeOwned>(&self, script: String) -> DriverResult<T> {
        let page = self.page()?;
        self.block_on(async {
            page.evaluate(script)
                .await
                .map_err(driver_error)?
                .into_value::<T>()
                .map_err(driver_error)
        })
    }

    /// Run `body` against the first match of `selector`; `el` is bound in it.
    fn eval_on<T: DeserializeOwned>(&self, selector: &str, body: &str) -> DriverResult<Option<T>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return null; {body} }})()",
            js_string(selector)
        );
        self.eval(script)
    }

    fn require<T>(selector: &str, found: Option<T>) -> DriverResult<T> {
        found.ok_or_else(|| DriverError::new(format!("no element matches {selector}")))
    }

    fn poll_until(&self, timeout: Duration, mut ready: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if ready(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let nap = (deadline - now).min(POLL_INTERVAL);
            self.block_on(tokio::time::sleep(nap));
        }
    }
}

impl Page for ChromiumPage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()> {
        let page = self.page()?;
        let result = self.block_on(tokio::time::timeout(timeout, page.goto(url)));
        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(DriverError::new(format!("navigate to {url}: {err}"))),
            Err(_) => Err(DriverError::new(format!(
                "navigate to {url}: timed out after {}s",
                timeout.as_secs_f64()
            ))),
        }
    }

    fn current_url(&mut self) -> String {
        let Ok(page) = self.page() else {
            return String::new();
        };
        match self.block_on(page.url()) {
            Ok(Some(url)) => url,
            Ok(None) => String::new(),
            Err(err) => {
                debug!(error = %err, "current url unavailable");
                String::new()
            }
        }
    }

    fn is_visible(&mut self, selector: &str, timeout: Duration) -> bool {
        let body = "const style = getComputedStyle(el); const rect = el.getBoundingClientRect(); \
                    return style.visibility !== 'hidden' && style.display !== 'none' \
                    && rect.width > 0 && rect.height > 0;";
        self.poll_until(timeout, |this| {
            matches!(this.eval_on::<bool>(selector, body), Ok(Some(true)))
        })
    }

    fn text_of(&mut self, selector: &str) -> DriverResult<String> {
        let text = self.eval_on::<String>(selector, "return el.innerText || el.textContent || '';")?;
        Self::require(selector, text)
    }

    fn click(&mut self, selector: &str, options: ClickOptions) -> DriverResult<()> {
        if options.force {
            let clicked = self.eval_on::<bool>(selector, "el.click(); return true;")?;
            return Self::require(selector, clicked).map(|_| ());
        }
        let page = self.page()?;
        self.block_on(async {
            page.find_element(selector)
                .await
                .map_err(driver_error)?
                .click()
                .await
                .map_err(driver_error)?;
            Ok::<(), DriverError>(())
        })
    }

    fn fill(&mut self, selector: &str, text: &str) -> DriverResult<()> {
        let body = format!(
            "el.focus(); \
             if ('value' in el) {{ el.value = {0}; }} else {{ el.textContent = {0}; }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true;",
            js_string(text)
        );
        let filled = self.eval_on::<bool>(selector, &body)?;
        Self::require(selector, filled).map(|_| ())
    }

    fn type_text(&mut self, selector: &str, text: &str) -> DriverResult<()> {
        let focused = self.eval_on::<bool>(selector, "el.focus(); return true;")?;
        Self::require(selector, focused)?;
        let page = self.page()?;
        self.block_on(page.execute(InsertTextParams::new(text)))
            .map_err(driver_error)?;
        Ok(())
    }

    fn press_key(&mut self, selector: &str, key: &str) -> DriverResult<()> {
        let focused = self.eval_on::<bool>(selector, "el.focus(); return true;")?;
        Self::require(selector, focused)?;
        let definition = keys::get_key_definition(key)
            .ok_or_else(|| DriverError::new(format!("unsupported key {key}")))?;

        let mut command = DispatchKeyEventParams::builder()
            .key(definition.key)
            .code(definition.code)
            .windows_virtual_key_code(definition.key_code)
            .native_virtual_key_code(definition.key_code);
        let down_type = match definition.text {
            Some(text) => {
                command = command.text(text);
                DispatchKeyEventType::KeyDown
            }
            None if definition.key.len() == 1 => {
                command = command.text(definition.key);
                DispatchKeyEventType::KeyDown
            }
            None => DispatchKeyEventType::RawKeyDown,
        };
        let key_down = command
            .clone()
            .r#type(down_type)
            .build()
            .map_err(DriverError::new)?;
        let key_up = command
            .r#type(DispatchKeyEventType::KeyUp)
            .build()
            .map_err(DriverError::new)?;

        let page = self.page()?;
        self.block_on(async {
            page.execute(key_down).await.map_err(driver_error)?;
            page.execute(key_up).await.map_err(driver_error)?;
            Ok::<(), DriverError>(())
        })
    }

    fn scroll_into_view(&mut self, selector: &str) -> DriverResult<()> {
        let page = self.page()?;
        self.block_on(async {
            page.find_element(selector)
                .await
                .map_err(driver_error)?
                .scroll_into_view()
                .await
                .map_err(driver_error)?;
            Ok::<(), DriverError>(())
        })
    }

    fn wait_for_network_idle(&mut self, timeout: Duration) -> DriverResult<()> {
        let settled = self.poll_until(timeout, |this| {
            matches!(
                this.eval::<bool>("document.readyState === 'complete'".to_string()),
                Ok(true)
            )
        });
        if settled {
            Ok(())
        } else {
            Err(DriverError::new(format!(
                "page did not settle within {}s",
                timeout.as_secs_f64()
            )))
        }
    }

    fn close(&mut self) -> DriverResult<()> {
        let page = self.page.take();
        let browser = self.browser.take();
        let events = self.events.take();
        let result = self.runtime.block_on(async move {
            let mut failures = Vec::new();
            if let Some(page) = page {
                if let Err(err) = page.close().await {
                    failures.push(format!("close page: {err}"));
                }
            }
            if let Some(mut browser) = browser {
                if let Err(err) = browser.close().await {
                    failures.push(format!("close browser: {err}"));
                }
                if let Err(err) = browser.wait().await {
                    failures.push(format!("wait for browser exit: {err}"));
                }
            }
            failures
        });
        if let Some(events) = events {
            events.abort();
        }
        if result.is_empty() {
            Ok(())
        } else {
            Err(DriverError::new(result.join("; ")))
        }
    }
}

fn driver_error(err: impl std::fmt::Display) -> DriverError {
    DriverError::new(err.to_string())
}

/// `value` as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
