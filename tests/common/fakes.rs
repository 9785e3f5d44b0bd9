//! In-memory stand-ins for the browser, search and registry seams

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cnpjfinder::company::{Cnpj, RegistryRecord};
use cnpjfinder::identifier::IdentifierRecovery;
use cnpjfinder::maps::{FeedFingerprint, MapsSession};
use cnpjfinder::registry::RegistryLookup;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_PHONE: &str = "(35) 3291-0000";

/// A virtual feed: every scroll step reveals the next page of entries until the last one.
pub struct FakeFeed {
    pages: Vec<Vec<String>>,
    page: Cell<usize>,
    phones: HashMap<String, Option<String>>,
    phone_failures: RefCell<HashMap<String, u32>>,
    broken_entries: HashSet<String>,
    pub feed_missing: bool,
    pub activated: RefCell<Vec<String>>,
    pub scroll_calls: Cell<u32>,
}

impl FakeFeed {
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| page.into_iter().map(String::from).collect())
                .collect(),
            page: Cell::new(0),
            phones: HashMap::new(),
            phone_failures: RefCell::new(HashMap::new()),
            broken_entries: HashSet::new(),
            feed_missing: false,
            activated: RefCell::new(Vec::new()),
            scroll_calls: Cell::new(0),
        }
    }

    /// The phone field of `name` never renders
    pub fn without_phone(mut self, name: &str) -> Self {
        self.phones.insert(name.to_string(), None);
        self
    }

    /// Reading the phone of `name` fails `times` times before succeeding
    pub fn with_flaky_phone(self, name: &str, times: u32) -> Self {
        self.phone_failures.borrow_mut().insert(name.to_string(), times);
        self
    }

    /// Clicking `name` always fails
    pub fn with_broken_entry(mut self, name: &str) -> Self {
        self.broken_entries.insert(name.to_string());
        self
    }

    fn current(&self) -> &[String] {
        self.pages
            .get(self.page.get())
            .map(|p| p.as_slice())
            .unwrap_or_default()
    }

    fn last_activated(&self) -> Option<String> {
        self.activated.borrow().last().cloned()
    }
}

impl MapsSession for FakeFeed {
    fn open_search(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    fn wait_for_feed(&self, _timeout: Duration) -> Result<()> {
        if self.feed_missing {
            Err(anyhow!("timed out waiting for div[role=\"feed\"]"))
        } else {
            Ok(())
        }
    }

    fn visible_entries(&self) -> Result<Vec<String>> {
        Ok(self.current().to_vec())
    }

    fn activate_entry(&self, name: &str) -> Result<()> {
        if self.broken_entries.contains(name) {
            return Err(anyhow!("element is not attached to the page document"));
        }
        self.activated.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn read_phone(&self, _timeout: Duration) -> Result<Option<String>> {
        let name = self.last_activated().unwrap_or_default();

        if let Some(remaining) = self.phone_failures.borrow_mut().get_mut(&name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("detail panel re-rendered"));
            }
        }

        Ok(self
            .phones
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Some(format!("\u{e0b0}\n{}", DEFAULT_PHONE))))
    }

    fn scroll_feed(&self, _fraction: f64) -> Result<()> {
        self.scroll_calls.set(self.scroll_calls.get() + 1);
        if self.page.get() + 1 < self.pages.len() {
            self.page.set(self.page.get() + 1);
        }
        Ok(())
    }

    fn feed_fingerprint(&self) -> Result<FeedFingerprint> {
        Ok(FeedFingerprint {
            content_height: 1000 * (self.page.get() as u64 + 1),
            entry_count: self.current().len(),
        })
    }
}

/// Search results keyed by business name; unknown names find nothing
#[derive(Default)]
pub struct FakeRecovery {
    results: HashMap<String, std::result::Result<String, String>>,
    pub queries: RefCell<Vec<String>>,
}

impl FakeRecovery {
    pub fn with(mut self, name: &str, cnpj: &str) -> Self {
        self.results.insert(name.to_string(), Ok(cnpj.to_string()));
        self
    }

    pub fn failing(mut self, name: &str, error: &str) -> Self {
        self.results.insert(name.to_string(), Err(error.to_string()));
        self
    }
}

impl IdentifierRecovery for FakeRecovery {
    fn recover(&self, business_name: &str, _city: &str) -> Result<Option<Cnpj>> {
        self.queries.borrow_mut().push(business_name.to_string());
        match self.results.get(business_name) {
            Some(Ok(cnpj)) => Ok(Cnpj::parse(cnpj)),
            Some(Err(e)) => Err(anyhow!(e.clone())),
            None => Ok(None),
        }
    }
}

/// Registry records keyed by CNPJ; unknown CNPJs are not found
#[derive(Default)]
pub struct FakeRegistry {
    records: HashMap<String, RegistryRecord>,
    pub lookups: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn with(mut self, cnpj: &str, status: &str, regime: &str) -> Self {
        self.records.insert(
            cnpj.to_string(),
            RegistryRecord {
                ownership: "FULANO DE TAL - Sócio-Administrador".to_string(),
                tax_regime: regime.to_string(),
                status: status.to_string(),
                regime_effective_date: "2020".to_string(),
            },
        );
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

#[async_trait]
impl RegistryLookup for FakeRegistry {
    async fn lookup(&self, cnpj: &Cnpj) -> RegistryRecord {
        self.lookups.lock().unwrap().push(cnpj.to_string());
        self.records
            .get(cnpj.as_str())
            .cloned()
            .unwrap_or_else(RegistryRecord::not_found)
    }
}
