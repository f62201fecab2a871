use crate::browser::{BrowserSession, BrowsingContext, ElementHandle, Page};
use crate::config::{BrowserConfig, BrowserEngine};
use anyhow::{bail, Context as _, Result};
use headless_chrome::browser::context::Context;
use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// How long Chrome may sit without a command before the connection is dropped.
/// Must outlast the pause between suburbs.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Browser session backed by headless Chrome
pub struct ChromeSession {
    config: BrowserConfig,
    browser: OnceLock<Browser>,
    launch_lock: Mutex<()>,
}

impl ChromeSession {
    /// Create a session. Chrome is not started until the first context is opened.
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: OnceLock::new(),
            launch_lock: Mutex::new(()),
        }
    }

    /// Whether the browser process has been started.
    pub fn is_launched(&self) -> bool {
        self.browser.get().is_some()
    }

    fn browser(&self) -> Result<&Browser> {
        if let Some(browser) = self.browser.get() {
            return Ok(browser);
        }

        let _guard = self
            .launch_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Browser launch lock poisoned"))?;
        if let Some(browser) = self.browser.get() {
            return Ok(browser);
        }

        let browser = self.launch()?;
        Ok(self.browser.get_or_init(|| browser))
    }

    fn launch(&self) -> Result<Browser> {
        if self.config.engine != BrowserEngine::Chromium {
            bail!(
                "Browser engine '{}' is not supported: the DevTools backend only drives chromium",
                self.config.engine
            );
        }

        info!(headless = self.config.headless, "Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(self.config.headless)
            .ignore_certificate_errors(true)
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
            .args(vec![OsStr::new("--lang=en-AU")])
            .build()
            .context("Failed to build launch options")?;

        Browser::new(options).context("Failed to launch Chrome browser")
    }
}

impl BrowserSession for ChromeSession {
    fn open_context(&self) -> Result<Box<dyn BrowsingContext + '_>> {
        let browser = self.browser()?;
        let context = browser
            .new_context()
            .context("Failed to create browser context")?;
        debug!(context_id = %context.get_id(), "Opened browser context");

        Ok(Box::new(ChromeContext {
            context,
            slow_mo: self.config.slow_mo(),
            open_tabs: Mutex::new(Vec::new()),
        }))
    }
}

struct ChromeContext<'a> {
    context: Context<'a>,
    slow_mo: Duration,
    open_tabs: Mutex<Vec<Arc<Tab>>>,
}

impl BrowsingContext for ChromeContext<'_> {
    fn new_page(&self) -> Result<Box<dyn Page + '_>> {
        let tab = self.context.new_tab().context("Failed to open tab")?;
        self.open_tabs
            .lock()
            .map_err(|_| anyhow::anyhow!("Tab registry poisoned"))?
            .push(tab.clone());

        Ok(Box::new(ChromePage {
            tab,
            slow_mo: self.slow_mo,
            open_tabs: &self.open_tabs,
        }))
    }

    fn close(&self) -> Result<()> {
        let tabs: Vec<Arc<Tab>> = self
            .open_tabs
            .lock()
            .map_err(|_| anyhow::anyhow!("Tab registry poisoned"))?
            .drain(..)
            .collect();

        // Close every tab even if one of them fails; report the first failure.
        let mut first_error = None;
        for tab in tabs {
            if let Err(e) = tab.close(false) {
                first_error.get_or_insert(e);
            }
        }
        debug!(context_id = %self.context.get_id(), "Closed browser context");

        match first_error {
            Some(e) => Err(e.context("Failed to close tab")),
            None => Ok(()),
        }
    }
}

struct ChromePage<'a> {
    tab: Arc<Tab>,
    slow_mo: Duration,
    open_tabs: &'a Mutex<Vec<Arc<Tab>>>,
}

impl ChromePage<'_> {
    fn pace(&self) {
        if !self.slow_mo.is_zero() {
            thread::sleep(self.slow_mo);
        }
    }
}

impl Page for ChromePage<'_> {
    fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        self.pace();
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .with_context(|| format!("Failed to navigate to {url}"))?;
        self.tab
            .wait_until_navigated()
            .with_context(|| format!("Timed out loading {url}"))?;
        Ok(())
    }

    fn query_selector(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle + '_>>> {
        self.pace();
        match self.tab.find_element(selector) {
            Ok(element) => Ok(Some(Box::new(ChromeElement(element)))),
            Err(e) if e.is::<NoElementFound>() => Ok(None),
            Err(e) => Err(e.context(format!("Query '{selector}' failed"))),
        }
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle + '_>>> {
        self.pace();
        match self.tab.find_elements(selector) {
            Ok(elements) => Ok(elements
                .into_iter()
                .map(|element| Box::new(ChromeElement(element)) as Box<dyn ElementHandle + '_>)
                .collect()),
            Err(e) if e.is::<NoElementFound>() => Ok(Vec::new()),
            Err(e) => Err(e.context(format!("Query '{selector}' failed"))),
        }
    }

    fn close(&self) -> Result<()> {
        let mut open_tabs = self
            .open_tabs
            .lock()
            .map_err(|_| anyhow::anyhow!("Tab registry poisoned"))?;
        let Some(index) = open_tabs.iter().position(|t| Arc::ptr_eq(t, &self.tab)) else {
            return Ok(());
        };
        open_tabs.swap_remove(index);
        drop(open_tabs);

        self.tab.close(false).context("Failed to close tab")?;
        Ok(())
    }
}

struct ChromeElement<'a>(Element<'a>);

impl ElementHandle for ChromeElement<'_> {
    fn inner_text(&self) -> Result<String> {
        self.0.get_inner_text()
    }

    fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.0.get_attribute_value(name)
    }
}
