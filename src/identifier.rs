//! CNPJ recovery from web search results
//!
//! Searches `CNPJ {business} {city}` in an auxiliary tab and takes the first
//! CNPJ-shaped substring from the result snippets. The first match wins, so
//! an unrelated company mentioned higher in the results can be picked up;
//! the check-digit validation only filters out malformed numbers.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::browser_pool::BrowserSession;
use crate::company::Cnpj;
use crate::config::SearchConfig;

/// 2 digits, optional `.`, 3 digits, optional `.`, 3 digits, optional `/`, 4 digits, `-`, 2 digits
static CNPJ_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{2}\.?\d{3}\.?\d{3}/?\d{4}-\d{2}").expect("CNPJ pattern is valid")
});

/// Anything that can find the CNPJ of a named business
pub trait IdentifierRecovery {
    fn recover(&self, business_name: &str, city: &str) -> Result<Option<Cnpj>>;
}

pub fn search_query(business_name: &str, city: &str) -> String {
    format!("CNPJ {} {}", business_name.trim(), city.trim())
}

pub fn search_url(base_url: &str, query: &str) -> Result<String> {
    let url = url::Url::parse_with_params(base_url, &[("q", query), ("hl", "pt-BR")])
        .map_err(|e| anyhow!("Invalid search URL '{}': {}", base_url, e))?;
    Ok(url.into())
}

/// First CNPJ-shaped match in `text`, normalized to 14 digits
pub fn find_cnpj(text: &str, validate_check_digits: bool) -> Option<Cnpj> {
    CNPJ_PATTERN
        .find_iter(text)
        .filter_map(|m| Cnpj::parse(m.as_str()))
        .find(|cnpj| !validate_check_digits || cnpj.has_valid_check_digits())
}

/// Scan snippets in order; the first one containing a match wins
pub fn first_cnpj_in_snippets<S: AsRef<str>>(snippets: &[S], validate_check_digits: bool) -> Option<Cnpj> {
    snippets
        .iter()
        .find_map(|s| find_cnpj(s.as_ref(), validate_check_digits))
}

/// Text of every `<span>` whose own text nodes contain `marker`, in document order.
pub fn extract_snippets(html: &str, marker: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("span") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter(|span| {
            span.children()
                .filter_map(|child| child.value().as_text())
                .any(|text| text.contains(marker))
        })
        .map(|span| span.text().collect::<String>())
        .collect()
}

/// `IdentifierRecovery` through a web search in an auxiliary Chrome tab
pub struct SearchRecovery<'a> {
    session: &'a BrowserSession,
    config: SearchConfig,
}

impl<'a> SearchRecovery<'a> {
    pub fn new(session: &'a BrowserSession, config: &SearchConfig) -> Self {
        Self {
            session,
            config: config.clone(),
        }
    }
}

impl IdentifierRecovery for SearchRecovery<'_> {
    fn recover(&self, business_name: &str, city: &str) -> Result<Option<Cnpj>> {
        let url = search_url(&self.config.base_url, &search_query(business_name, city))?;
        let tab = self.session.open_auxiliary_tab()?;

        tab.navigate_to(&url)
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
        tab.wait_until_navigated()
            .map_err(|e| anyhow!("Search page failed to load: {}", e))?;

        if let Err(e) = tab.wait_for_xpath_with_custom_timeout(
            &self.config.snippet_xpath,
            self.config.results_timeout(),
        ) {
            debug!("No CNPJ snippets for '{}': {}", business_name, e);
            return Ok(None);
        }

        let html = tab
            .get_content()
            .map_err(|e| anyhow!("Failed to read search results: {}", e))?;
        let snippets = extract_snippets(&html, &self.config.snippet_marker);
        debug!("{} CNPJ snippets for '{}'", snippets.len(), business_name);

        Ok(first_cnpj_in_snippets(&snippets, self.config.validate_check_digits))
    }
}
