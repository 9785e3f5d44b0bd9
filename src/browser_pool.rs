//! Headless Chrome session for one collection run.
//!
//! A run owns exactly one browser and one primary tab (the map feed). The
//! CNPJ search happens in auxiliary tabs handed out as `ScopedTab` guards:
//! dropping the guard closes the tab and re-activates the primary tab, on
//! every exit path.

use anyhow::{anyhow, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BrowserConfig;

/// Extra Chrome flags; the automation flag makes Maps serve a degraded page.
const CHROME_ARGS: [&str; 3] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--lang=pt-BR",
];

/// Something that can open and close auxiliary tabs next to a primary one
pub trait TabHost {
    type Tab;

    fn open_tab(&self) -> Result<Self::Tab>;
    /// Runs on every auxiliary tab before it is handed out
    fn prepare_tab(&self, tab: &Self::Tab) -> Result<()>;
    fn close_tab(&self, tab: &Self::Tab) -> Result<()>;
    fn focus_primary(&self) -> Result<()>;
}

/// An auxiliary tab that is closed (and focus returned to the primary tab) on drop
pub struct ScopedTab<'a, H: TabHost> {
    host: &'a H,
    tab: H::Tab,
}

impl<'a, H: TabHost> ScopedTab<'a, H> {
    /// A tab that fails preparation is closed before the error is returned.
    pub fn open(host: &'a H) -> Result<Self> {
        let tab = host.open_tab()?;
        let scoped = Self { host, tab };
        host.prepare_tab(&scoped.tab)?;
        Ok(scoped)
    }
}

impl<H: TabHost> Deref for ScopedTab<'_, H> {
    type Target = H::Tab;

    fn deref(&self) -> &Self::Target {
        &self.tab
    }
}

impl<H: TabHost> Drop for ScopedTab<'_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.host.close_tab(&self.tab) {
            warn!("Failed to close auxiliary tab: {}", e);
        }
        if let Err(e) = self.host.focus_primary() {
            warn!("Failed to refocus primary tab: {}", e);
        }
    }
}

/// The browser instance and its primary tab
pub struct BrowserSession {
    browser: Browser,
    primary: Arc<Tab>,
    identity: TabIdentity,
}

/// User agent and language sent by every tab of the session
#[derive(Debug, Clone)]
struct TabIdentity {
    user_agent: String,
    accept_language: Option<String>,
}

impl TabIdentity {
    fn from_config(config: &BrowserConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: Some(config.accept_language.clone()).filter(|l| !l.is_empty()),
        }
    }

    fn apply(&self, tab: &Tab) -> Result<()> {
        tab.set_user_agent(&self.user_agent, self.accept_language.as_deref(), None)
            .map_err(|e| anyhow!("Failed to set user agent: {}", e))
    }
}

/// Running inside a container (Chrome's sandbox is unavailable there)
pub fn is_container() -> bool {
    std::env::var("CNPJFINDER_CONTAINER").is_ok() || Path::new("/.dockerenv").exists()
}

/// Chrome binary: `CHROME_PATH` env var, then the configured path.
/// None lets headless_chrome locate an installed Chrome/Chromium.
pub fn resolve_chrome_path(config: &BrowserConfig) -> Option<PathBuf> {
    std::env::var("CHROME_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| config.chrome_path())
}

impl BrowserSession {
    /// Launch Chrome and open the primary tab.
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let sandbox = !is_container();
        let chrome_path = resolve_chrome_path(config);
        debug!(
            "Launching Chrome (headless={}, sandbox={}, path={:?})",
            config.headless, sandbox, chrome_path
        );

        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(sandbox)
            .path(chrome_path)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(config.idle_timeout_secs))
            .args(CHROME_ARGS.iter().map(OsStr::new).collect())
            .build()
            .map_err(|e| anyhow!("Failed to build Chrome launch options: {}", e))?;

        let browser = Browser::new(options)
            .map_err(|e| anyhow!("Failed to launch headless Chrome: {}", e))?;

        let primary = browser
            .new_tab()
            .map_err(|e| anyhow!("Failed to create browser tab: {}", e))?;
        let identity = TabIdentity::from_config(config);
        identity.apply(&primary)?;

        Ok(Self {
            browser,
            primary,
            identity,
        })
    }

    pub fn primary(&self) -> &Arc<Tab> {
        &self.primary
    }

    /// Open an auxiliary tab for the duration of the returned guard.
    pub fn open_auxiliary_tab(&self) -> Result<ScopedTab<'_, Self>> {
        ScopedTab::open(self)
    }

    /// Close the primary tab and shut Chrome down.
    /// The process is killed even when closing the tab fails.
    pub fn release(self) -> Result<()> {
        let result = self
            .primary
            .close(true)
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to close browser tab: {}", e));
        drop(self.browser);
        result
    }
}

impl TabHost for BrowserSession {
    type Tab = Arc<Tab>;

    fn open_tab(&self) -> Result<Arc<Tab>> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| anyhow!("Failed to create auxiliary tab: {}", e))?;
        tab.activate()
            .map_err(|e| anyhow!("Failed to activate auxiliary tab: {}", e))?;
        Ok(tab)
    }

    fn prepare_tab(&self, tab: &Arc<Tab>) -> Result<()> {
        self.identity.apply(tab)
    }

    fn close_tab(&self, tab: &Arc<Tab>) -> Result<()> {
        tab.close(false)
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to close auxiliary tab: {}", e))
    }

    fn focus_primary(&self) -> Result<()> {
        self.primary
            .activate()
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to activate primary tab: {}", e))
    }
}
