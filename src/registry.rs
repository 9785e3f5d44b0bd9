//! CNPJ registry lookups against BrasilAPI
//!
//! One GET per CNPJ. Failures never reach the caller: a non-success status,
//! a transport error that survives the retries, or a payload that does not
//! parse all produce a record whose fields are `NOT_FOUND`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::company::{Cnpj, RegistryRecord, NOT_FOUND};
use crate::config::{HttpConfig, RegistryConfig, RetryConfig};
use crate::rate_limit::{RetryHelper, SharedRateLimiter};

/// Label reported when the company opted into the simplified regime
pub const SIMPLES_NACIONAL: &str = "Simples Nacional";

/// Anything that can turn a CNPJ into registry data
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    async fn lookup(&self, cnpj: &Cnpj) -> RegistryRecord;
}

/// BrasilAPI `/cnpj/v1/{cnpj}` response (only the fields we use)
#[derive(Debug, Deserialize)]
struct CnpjResponse {
    #[serde(default)]
    qsa: Option<Vec<Partner>>,
    #[serde(default)]
    opcao_pelo_simples: Option<bool>,
    #[serde(default)]
    data_opcao_pelo_simples: Option<String>,
    #[serde(default)]
    regime_tributario: Option<Vec<RegimeEntry>>,
    #[serde(default)]
    descricao_situacao_cadastral: Option<String>,
}

/// One entry of the `qsa` (partners and administrators) list
#[derive(Debug, Clone, Deserialize)]
pub struct Partner {
    #[serde(default)]
    pub nome_socio: Option<String>,
    #[serde(default)]
    pub qualificacao_socio: Option<String>,
}

/// One year of the `regime_tributario` history
#[derive(Debug, Clone, Deserialize)]
pub struct RegimeEntry {
    #[serde(deserialize_with = "deserialize_year")]
    pub ano: String,
    pub forma_de_tributacao: String,
}

// BrasilAPI sends the year as a number, older payloads as a string
fn deserialize_year<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(s),
        other => Err(serde::de::Error::custom(format!("unexpected year value: {}", other))),
    }
}

/// `"{name} - {role}"` per partner, joined with `" | "`; empty list is `NOT_FOUND`
pub fn ownership_summary(partners: &[Partner]) -> String {
    if partners.is_empty() {
        return NOT_FOUND.to_string();
    }

    partners
        .iter()
        .map(|p| {
            format!(
                "{} - {}",
                p.nome_socio.as_deref().unwrap_or_default(),
                p.qualificacao_socio.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Current regime and the year it took effect, from a chronological history.
///
/// The current regime is the newest entry. Walking backward, the first entry
/// with a different label marks the boundary: the effective year is the entry
/// right after it. Without any boundary the oldest year is used.
pub fn resolve_regime(history: &[RegimeEntry]) -> (String, String) {
    let Some(newest) = history.last() else {
        return (NOT_FOUND.to_string(), NOT_FOUND.to_string());
    };
    let current = &newest.forma_de_tributacao;

    let effective = history
        .windows(2)
        .rev()
        .find(|pair| pair[0].forma_de_tributacao != *current)
        .map(|pair| pair[1].ano.clone())
        .unwrap_or_else(|| history[0].ano.clone());

    (current.clone(), effective)
}

/// Build a registry record from a BrasilAPI response body.
/// A body that is not the expected JSON yields `RegistryRecord::not_found()`.
pub fn parse_registry_record(body: &str) -> RegistryRecord {
    let response: CnpjResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            debug!("Malformed registry payload: {}", e);
            return RegistryRecord::not_found();
        }
    };

    let ownership = ownership_summary(response.qsa.as_deref().unwrap_or_default());

    let (tax_regime, regime_effective_date) = if response.opcao_pelo_simples.unwrap_or(false) {
        (
            SIMPLES_NACIONAL.to_string(),
            response
                .data_opcao_pelo_simples
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| NOT_FOUND.to_string()),
        )
    } else {
        resolve_regime(response.regime_tributario.as_deref().unwrap_or_default())
    };

    let status = response
        .descricao_situacao_cadastral
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NOT_FOUND.to_string());

    RegistryRecord {
        ownership,
        tax_regime,
        status,
        regime_effective_date,
    }
}

#[derive(Debug)]
enum FetchError {
    Transport(reqwest::Error),
    Status(StatusCode),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

/// HTTP client for the registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    limiter: SharedRateLimiter,
    retry: RetryHelper,
}

impl RegistryClient {
    pub fn new(http: &HttpConfig, registry: &RegistryConfig, retry: &RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(|e| anyhow!("Failed to build registry HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: registry.base_url.trim_end_matches('/').to_string(),
            limiter: SharedRateLimiter::new(registry.requests_per_second),
            retry: RetryHelper::new(retry),
        })
    }

    pub fn lookup_url(&self, cnpj: &Cnpj) -> String {
        format!("{}/{}", self.base_url, cnpj)
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.limiter.acquire().await;

        let response = self.client.get(url).send().await.map_err(FetchError::Transport)?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        response.text().await.map_err(FetchError::Transport)
    }
}

#[async_trait]
impl RegistryLookup for RegistryClient {
    async fn lookup(&self, cnpj: &Cnpj) -> RegistryRecord {
        let url = self.lookup_url(cnpj);
        debug!("Registry lookup: {}", url);

        match self
            .retry
            .with_retry_if(|| self.fetch_once(&url), FetchError::is_retryable)
            .await
        {
            Ok(body) => parse_registry_record(&body),
            Err(FetchError::Status(status)) => {
                debug!("Registry returned {} for {}", status, cnpj);
                RegistryRecord::not_found()
            }
            Err(FetchError::Transport(e)) => {
                warn!("Registry request failed for {}: {}", cnpj, e);
                RegistryRecord::not_found()
            }
        }
    }
}
