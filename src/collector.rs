//! The collection loop
//!
//! Walks the map-search feed entry by entry, enriches each new entry with a
//! recovered CNPJ and its registry record, keeps the ones that pass the
//! filters and scrolls for more until the target is met or the feed stops
//! producing new content.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::company::{CollectedRecord, ListingCandidate, RejectReason, SearchParams};
use crate::config::{AppConfig, MapsConfig, ScrollConfig};
use crate::identifier::IdentifierRecovery;
use crate::logger::CollectionLogger;
use crate::maps::{build_search_url, sanitize_phone, FeedFingerprint, MapsSession};
use crate::rate_limit::RetryHelper;
use crate::registry::RegistryLookup;

/// Failures that end a run before anything could be collected
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Map search could not be opened ({url}): {reason}")]
    SearchFailed { url: String, reason: String },

    #[error("Results feed did not appear within {timeout_secs}s: {reason}")]
    FeedNotFound { timeout_secs: u64, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of records was collected
    TargetReached,
    /// Scrolling stopped producing new entries or content
    FeedExhausted,
    /// The scroll pass cap was hit
    ScrollLimit,
    /// Cancelled by the user (Ctrl-C)
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::FeedExhausted => write!(f, "no more results in the feed"),
            StopReason::ScrollLimit => write!(f, "scroll limit reached"),
            StopReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub entries_seen: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub rejected_by_reason: BTreeMap<&'static str, usize>,
    pub scroll_passes: u32,
}

#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub records: Vec<CollectedRecord>,
    pub stats: CollectionStats,
    pub stop_reason: StopReason,
}

impl CollectionOutcome {
    pub fn is_complete(&self) -> bool {
        self.stop_reason == StopReason::TargetReached
    }
}

/// Drives one collection run over a map session, an identifier source and a registry
pub struct Collector<'a, M, I, R> {
    maps: &'a M,
    recovery: &'a I,
    registry: &'a R,
    logger: &'a CollectionLogger,
    maps_config: MapsConfig,
    scroll_config: ScrollConfig,
    retry: RetryHelper,
    cancel: Arc<AtomicBool>,
}

impl<'a, M, I, R> Collector<'a, M, I, R>
where
    M: MapsSession,
    I: IdentifierRecovery,
    R: RegistryLookup,
{
    pub fn new(
        maps: &'a M,
        recovery: &'a I,
        registry: &'a R,
        logger: &'a CollectionLogger,
        config: &AppConfig,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            maps,
            recovery,
            registry,
            logger,
            maps_config: config.maps.clone(),
            scroll_config: config.scroll.clone(),
            retry: RetryHelper::new(&config.retry),
            cancel,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run the search until the target is met, the feed is exhausted or the run is cancelled.
    pub async fn run(&self, params: &SearchParams) -> Result<CollectionOutcome, CollectError> {
        let url = build_search_url(&self.maps_config.base_url, &params.category, &params.city, &params.state);

        self.maps.open_search(&url).map_err(|e| CollectError::SearchFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        self.maps
            .wait_for_feed(self.maps_config.feed_timeout())
            .map_err(|e| CollectError::FeedNotFound {
                timeout_secs: self.maps_config.feed_timeout_secs,
                reason: e.to_string(),
            })?;
        self.logger.log_feed_ready();

        let mut seen: HashSet<String> = HashSet::new();
        let mut records: Vec<CollectedRecord> = Vec::new();
        let mut stats = CollectionStats::default();
        let mut last_fingerprint: Option<FeedFingerprint> = None;
        let mut stalled_passes = 0u32;

        let stop_reason = 'run: loop {
            if records.len() >= params.target_count {
                break StopReason::TargetReached;
            }
            if self.is_cancelled() {
                break StopReason::Interrupted;
            }

            let entries = match self.maps.visible_entries() {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Failed to read feed entries: {}", e);
                    Vec::new()
                }
            };

            let mut fresh = 0usize;
            for name in entries {
                if self.is_cancelled() {
                    break 'run StopReason::Interrupted;
                }
                if !seen.insert(name.clone()) {
                    continue;
                }
                fresh += 1;
                stats.entries_seen += 1;
                self.logger.log_entry_seen(&name);
                self.logger.update_progress(&name).await;

                match self.process_entry(&name, params).await {
                    Ok(record) => {
                        records.push(record);
                        stats.accepted += 1;
                        let cnpj = &records[records.len() - 1].cnpj;
                        self.logger
                            .log_candidate_accepted(&name, cnpj, records.len(), params.target_count);
                        self.logger.advance_progress(1).await;

                        if records.len() >= params.target_count {
                            break 'run StopReason::TargetReached;
                        }
                    }
                    Err(reason) => {
                        stats.rejected += 1;
                        *stats.rejected_by_reason.entry(reason.kind()).or_insert(0) += 1;
                        self.logger.log_candidate_rejected(&name, &reason);
                    }
                }
            }

            let fingerprint = self.maps.feed_fingerprint().unwrap_or_else(|e| {
                warn!("Failed to read feed state: {}", e);
                FeedFingerprint::default()
            });
            if fresh == 0 && last_fingerprint == Some(fingerprint) {
                stalled_passes += 1;
                debug!("Feed unchanged ({} stalled passes)", stalled_passes);
            } else {
                stalled_passes = 0;
            }
            last_fingerprint = Some(fingerprint);

            if stalled_passes >= self.scroll_config.max_stalled_passes {
                break StopReason::FeedExhausted;
            }
            if stats.scroll_passes >= self.scroll_config.max_scroll_passes {
                break StopReason::ScrollLimit;
            }

            stats.scroll_passes += 1;
            self.logger.log_scroll_pass(stats.scroll_passes);
            self.scroll_pass().await;
        };

        self.logger.log_stop(&stop_reason.to_string());

        Ok(CollectionOutcome {
            records,
            stats,
            stop_reason,
        })
    }

    /// Extract, enrich and filter one feed entry
    async fn process_entry(&self, name: &str, params: &SearchParams) -> Result<CollectedRecord, RejectReason> {
        let maps = self.maps;

        self.retry
            .with_retry(|| async move { maps.activate_entry(name) })
            .await
            .map_err(|e| {
                debug!("Entry '{}' could not be activated: {}", name, e);
                RejectReason::EntryUnavailable
            })?;

        let timeout = self.maps_config.phone_timeout();
        let raw_phone = self
            .retry
            .with_retry(|| async move { maps.read_phone(timeout) })
            .await
            .map_err(|e| {
                debug!("Phone of '{}' could not be read: {}", name, e);
                RejectReason::PhoneUnavailable
            })?;

        let mut candidate = ListingCandidate {
            name: name.to_string(),
            phone: raw_phone.as_deref().and_then(sanitize_phone),
            cnpj: None,
        };
        if candidate.phone.is_none() && self.maps_config.require_phone {
            return Err(RejectReason::PhoneUnavailable);
        }

        candidate.cnpj = match self.recovery.recover(&candidate.name, &params.city) {
            Ok(cnpj) => cnpj,
            Err(e) => return Err(RejectReason::IdentifierLookupFailed(e.to_string())),
        };
        let Some(cnpj) = candidate.cnpj else {
            return Err(RejectReason::IdentifierNotFound);
        };

        let registry = self.registry.lookup(&cnpj).await;
        if !registry.is_active() {
            return Err(RejectReason::Inactive(registry.status));
        }
        if !params.regime_filter.matches(&registry.tax_regime) {
            return Err(RejectReason::RegimeMismatch(registry.tax_regime));
        }

        Ok(CollectedRecord::new(candidate.name, candidate.phone, cnpj, registry))
    }

    async fn scroll_pass(&self) {
        for _ in 0..self.scroll_config.steps_per_pass {
            if let Err(e) = self.maps.scroll_feed(self.scroll_config.step_fraction) {
                warn!("Feed scroll failed: {}", e);
            }
            tokio::time::sleep(self.scroll_config.settle_delay()).await;
        }
    }
}
