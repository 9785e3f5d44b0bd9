//! Google Maps feed extraction
//!
//! The feed is virtualized: entries are re-rendered while scrolling, so no
//! element handle is kept between calls. Entries are identified by their
//! accessible label and re-located on every interaction.

use anyhow::{anyhow, Result};
use headless_chrome::Tab;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::browser_pool::BrowserSession;
use crate::config::MapsConfig;

/// Browser operations the collection loop needs from the map-search page
pub trait MapsSession {
    /// Navigate the primary view to a search URL
    fn open_search(&self, url: &str) -> Result<()>;

    /// Wait until the results feed is present
    fn wait_for_feed(&self, timeout: Duration) -> Result<()>;

    /// Names of every currently rendered feed entry, in feed order
    fn visible_entries(&self) -> Result<Vec<String>>;

    /// Click the entry with the given name so its detail panel loads
    fn activate_entry(&self, name: &str) -> Result<()>;

    /// Raw phone text of the open detail panel.
    /// `Ok(None)` when the phone field does not appear within `timeout`.
    fn read_phone(&self, timeout: Duration) -> Result<Option<String>>;

    /// Advance the feed scroll offset by `fraction` of its content height
    fn scroll_feed(&self, fraction: f64) -> Result<()>;

    /// Snapshot of the feed's rendered content
    fn feed_fingerprint(&self) -> Result<FeedFingerprint>;
}

/// Content height and entry count of the feed; equal fingerprints mean the
/// feed did not change between two observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct FeedFingerprint {
    pub content_height: u64,
    pub entry_count: usize,
}

/// `{base}/{category}+perto+de+{city}+{state}`, each component form-encoded
pub fn build_search_url(base_url: &str, category: &str, city: &str, state: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.trim().as_bytes()).collect::<String>();
    format!(
        "{}/{}+perto+de+{}+{}",
        base_url.trim_end_matches('/'),
        encode(category),
        encode(city),
        encode(state)
    )
}

/// Keep digits, parentheses, hyphens and spaces. None if nothing is left.
pub fn sanitize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '(' | ')' | '-' | ' '))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().any(|c| c.is_ascii_digit()) {
        Some(cleaned.to_string())
    } else {
        None
    }
}

/// `MapsSession` backed by the primary tab of a Chrome session
pub struct ChromeMaps<'a> {
    session: &'a BrowserSession,
    config: MapsConfig,
}

impl<'a> ChromeMaps<'a> {
    pub fn new(session: &'a BrowserSession, config: &MapsConfig) -> Self {
        Self {
            session,
            config: config.clone(),
        }
    }

    fn tab(&self) -> &Tab {
        self.session.primary()
    }

    fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let remote = self
            .tab()
            .evaluate(script, false)
            .map_err(|e| anyhow!("Script evaluation failed: {}", e))?;
        remote
            .value
            .ok_or_else(|| anyhow!("Script returned no value"))
    }

    fn js_string(value: &str) -> String {
        // JSON string literals are valid JS string literals
        serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
    }
}

impl MapsSession for ChromeMaps<'_> {
    fn open_search(&self, url: &str) -> Result<()> {
        debug!("Opening map search: {}", url);
        self.tab()
            .navigate_to(url)
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
        self.tab()
            .wait_until_navigated()
            .map_err(|e| anyhow!("Page failed to load for {}: {}", url, e))?;
        Ok(())
    }

    fn wait_for_feed(&self, timeout: Duration) -> Result<()> {
        self.tab()
            .wait_for_element_with_custom_timeout(&self.config.feed_selector, timeout)
            .map(|_| ())
            .map_err(|e| anyhow!("Feed '{}' not found: {}", self.config.feed_selector, e))
    }

    fn visible_entries(&self) -> Result<Vec<String>> {
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({sel}))\
             .map(e => e.getAttribute('aria-label'))\
             .filter(n => n && n.trim().length > 0))",
            sel = Self::js_string(&self.config.entry_selector)
        );
        let value = self.evaluate(&script)?;
        let json = value
            .as_str()
            .ok_or_else(|| anyhow!("Unexpected entry list value: {}", value))?;
        let names: Vec<String> = serde_json::from_str(json)?;
        Ok(names.into_iter().map(|n| n.trim().to_string()).collect())
    }

    fn activate_entry(&self, name: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const name = {name}; \
             const el = Array.from(document.querySelectorAll({sel})) \
               .find(e => (e.getAttribute('aria-label') || '').trim() === name); \
             if (!el) return false; \
             el.scrollIntoView({{block: 'center'}}); el.click(); return true; }})()",
            name = Self::js_string(name),
            sel = Self::js_string(&self.config.entry_selector)
        );
        match self.evaluate(&script)?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(anyhow!("Entry '{}' is no longer rendered", name)),
        }
    }

    fn read_phone(&self, timeout: Duration) -> Result<Option<String>> {
        let element = match self
            .tab()
            .wait_for_xpath_with_custom_timeout(&self.config.phone_xpath, timeout)
        {
            Ok(element) => element,
            Err(e) => {
                debug!("Phone field did not appear: {}", e);
                return Ok(None);
            }
        };

        let text = element
            .get_inner_text()
            .map_err(|e| anyhow!("Failed to read phone field: {}", e))?;
        Ok(Some(text.trim().to_string()))
    }

    fn scroll_feed(&self, fraction: f64) -> Result<()> {
        let script = format!(
            "(() => {{ const f = document.querySelector({sel}); \
             if (!f) return false; f.scrollTop += f.scrollHeight * {fraction}; return true; }})()",
            sel = Self::js_string(&self.config.feed_selector),
            fraction = fraction
        );
        match self.evaluate(&script)?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(anyhow!("Feed disappeared while scrolling")),
        }
    }

    fn feed_fingerprint(&self) -> Result<FeedFingerprint> {
        let script = format!(
            "JSON.stringify((() => {{ const f = document.querySelector({feed}); \
             return {{ content_height: f ? Math.round(f.scrollHeight) : 0, \
                       entry_count: document.querySelectorAll({entry}).length }}; }})())",
            feed = Self::js_string(&self.config.feed_selector),
            entry = Self::js_string(&self.config.entry_selector)
        );
        let value = self.evaluate(&script)?;
        let json = value
            .as_str()
            .ok_or_else(|| anyhow!("Unexpected fingerprint value: {}", value))?;
        Ok(serde_json::from_str(json)?)
    }
}
