use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder written to every field the registry could not provide
pub const NOT_FOUND: &str = "Não encontrado";

/// Registration status reported by the registry for companies in good standing
pub const ACTIVE_STATUS: &str = "ATIVA";

/// A normalized CNPJ: exactly 14 ASCII digits, no separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cnpj(String);

impl Cnpj {
    /// Parse a CNPJ, stripping `.`, `/`, `-` and whitespace.
    /// Returns None unless exactly 14 digits remain.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut digits = String::with_capacity(14);
        for c in raw.chars() {
            match c {
                '0'..='9' => digits.push(c),
                '.' | '/' | '-' | ' ' => {}
                _ => return None,
            }
        }
        if digits.len() == 14 {
            Some(Cnpj(digits))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the two trailing check digits agree with the first twelve.
    /// Sequences of a single repeated digit are rejected.
    pub fn has_valid_check_digits(&self) -> bool {
        let digits: Vec<u32> = self.0.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.iter().all(|d| *d == digits[0]) {
            return false;
        }

        const W1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
        const W2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

        fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
            let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
            let rem = sum % 11;
            if rem < 2 { 0 } else { 11 - rem }
        }

        check_digit(&digits[..12], &W1) == digits[12] && check_digit(&digits[..13], &W2) == digits[13]
    }

    /// `XX.XXX.XXX/XXXX-XX` presentation
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!("{}.{}.{}/{}-{}", &d[0..2], &d[2..5], &d[5..8], &d[8..12], &d[12..14])
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cnpj {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cnpj::parse(&value).ok_or_else(|| format!("'{}' is not a 14-digit CNPJ", value))
    }
}

impl From<Cnpj> for String {
    fn from(value: Cnpj) -> Self {
        value.0
    }
}

/// Tax regime filter selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum RegimeFilter {
    /// Keep every regime
    #[default]
    #[value(alias = "todos")]
    All,
    /// Simples Nacional
    Simples,
    /// Lucro Presumido
    Presumido,
    /// Lucro Real
    Real,
}

impl RegimeFilter {
    /// Registry label of the regime, None for `All`
    pub fn label(&self) -> Option<&'static str> {
        match self {
            RegimeFilter::All => None,
            RegimeFilter::Simples => Some("Simples Nacional"),
            RegimeFilter::Presumido => Some("Lucro Presumido"),
            RegimeFilter::Real => Some("Lucro Real"),
        }
    }

    /// Case-insensitive comparison against a registry regime label
    pub fn matches(&self, regime: &str) -> bool {
        match self.label() {
            None => true,
            Some(label) => label.to_lowercase() == regime.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for RegimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label().unwrap_or("todos"))
    }
}

/// User-supplied parameters of one collection run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub city: String,
    pub state: String,
    pub category: String,
    pub target_count: usize,
    pub regime_filter: RegimeFilter,
}

/// A feed entry after extraction, before registry enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct ListingCandidate {
    pub name: String,
    pub phone: Option<String>,
    pub cnpj: Option<Cnpj>,
}

/// Registry data for one CNPJ. Missing data is `NOT_FOUND`, never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub ownership: String,
    pub tax_regime: String,
    pub status: String,
    pub regime_effective_date: String,
}

impl RegistryRecord {
    pub fn not_found() -> Self {
        Self {
            ownership: NOT_FOUND.to_string(),
            tax_regime: NOT_FOUND.to_string(),
            status: NOT_FOUND.to_string(),
            regime_effective_date: NOT_FOUND.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(ACTIVE_STATUS)
    }
}

/// A candidate that passed every filter, as exported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedRecord {
    pub name: String,
    pub phone: String,
    pub cnpj: Cnpj,
    pub ownership: String,
    pub tax_regime: String,
    pub regime_effective_date: String,
    pub status: String,
}

impl CollectedRecord {
    /// Column headers, in export order
    pub const HEADERS: [&'static str; 7] = [
        "Name",
        "Phone",
        "Tax ID",
        "Ownership",
        "Tax Regime",
        "Regime Effective Date",
        "Status",
    ];

    pub fn new(name: String, phone: Option<String>, cnpj: Cnpj, registry: RegistryRecord) -> Self {
        Self {
            name,
            phone: phone.unwrap_or_else(|| NOT_FOUND.to_string()),
            cnpj,
            ownership: registry.ownership,
            tax_regime: registry.tax_regime,
            regime_effective_date: registry.regime_effective_date,
            status: registry.status,
        }
    }

    /// Field values in the same order as `HEADERS`
    pub fn row(&self) -> [&str; 7] {
        [
            &self.name,
            &self.phone,
            self.cnpj.as_str(),
            &self.ownership,
            &self.tax_regime,
            &self.regime_effective_date,
            &self.status,
        ]
    }
}

/// Why a candidate was left out of the result set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The entry could not be activated (detail panel never loaded)
    EntryUnavailable,
    /// The detail panel never showed a phone field
    PhoneUnavailable,
    /// No CNPJ could be recovered from the web search
    IdentifierNotFound,
    /// CNPJ recovery failed with an error
    IdentifierLookupFailed(String),
    /// Registry status is not active
    Inactive(String),
    /// Registry regime does not match the selected filter
    RegimeMismatch(String),
}

impl RejectReason {
    /// Stable short key, used for summary counts
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::EntryUnavailable => "entry unavailable",
            RejectReason::PhoneUnavailable => "no phone",
            RejectReason::IdentifierNotFound => "CNPJ not found",
            RejectReason::IdentifierLookupFailed(_) => "CNPJ lookup error",
            RejectReason::Inactive(_) => "inactive",
            RejectReason::RegimeMismatch(_) => "regime mismatch",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::EntryUnavailable => write!(f, "entry could not be opened"),
            RejectReason::PhoneUnavailable => write!(f, "phone field not found"),
            RejectReason::IdentifierNotFound => write!(f, "CNPJ not found in search results"),
            RejectReason::IdentifierLookupFailed(e) => write!(f, "CNPJ search failed: {}", e),
            RejectReason::Inactive(status) => write!(f, "not active ({})", status),
            RejectReason::RegimeMismatch(regime) => write!(f, "regime '{}' does not match filter", regime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cnpj_parse_strips_separators() {
        let cnpj = Cnpj::parse("11.222.333/0001-81").unwrap();
        assert_eq!(cnpj.as_str(), "11222333000181");
        assert_eq!(cnpj.as_str().len(), 14);
    }

    #[test]
    fn test_cnpj_parse_rejects_wrong_length_and_letters() {
        assert!(Cnpj::parse("11.222.333/0001-8").is_none());
        assert!(Cnpj::parse("112223330001812").is_none());
        assert!(Cnpj::parse("11a22333000181").is_none());
        assert!(Cnpj::parse("").is_none());
    }

    #[test]
    fn test_cnpj_check_digits() {
        assert!(Cnpj::parse("11222333000181").unwrap().has_valid_check_digits());
        assert!(Cnpj::parse("11444777000161").unwrap().has_valid_check_digits());
        assert!(Cnpj::parse("00000000000191").unwrap().has_valid_check_digits());
        assert!(!Cnpj::parse("11222333000182").unwrap().has_valid_check_digits());
        assert!(!Cnpj::parse("11111111111111").unwrap().has_valid_check_digits());
    }

    #[test]
    fn test_cnpj_formatted() {
        let cnpj = Cnpj::parse("11222333000181").unwrap();
        assert_eq!(cnpj.formatted(), "11.222.333/0001-81");
    }

    #[test]
    fn test_cnpj_serde_roundtrip_uses_plain_digits() {
        let cnpj = Cnpj::parse("11.444.777/0001-61").unwrap();
        let json = serde_json::to_string(&cnpj).unwrap();
        assert_eq!(json, "\"11444777000161\"");
        assert!(serde_json::from_str::<Cnpj>("\"123\"").is_err());
    }

    #[test]
    fn test_regime_filter_matches_case_insensitively() {
        assert!(RegimeFilter::Presumido.matches("LUCRO PRESUMIDO"));
        assert!(RegimeFilter::Simples.matches("Simples Nacional"));
        assert!(!RegimeFilter::Real.matches("Lucro Presumido"));
        assert!(!RegimeFilter::Real.matches(NOT_FOUND));
        assert!(RegimeFilter::All.matches(NOT_FOUND));
    }

    #[test]
    fn test_registry_record_active_status() {
        let mut record = RegistryRecord::not_found();
        assert!(!record.is_active());
        record.status = "ATIVA".to_string();
        assert!(record.is_active());
        record.status = "ativa".to_string();
        assert!(record.is_active());
        record.status = "BAIXADA".to_string();
        assert!(!record.is_active());
    }

    #[test]
    fn test_collected_record_row_order_matches_headers() {
        let registry = RegistryRecord {
            ownership: "Maria - Sócio-Administrador".to_string(),
            tax_regime: "Simples Nacional".to_string(),
            status: "ATIVA".to_string(),
            regime_effective_date: "2018-01-01".to_string(),
        };
        let record = CollectedRecord::new(
            "Padaria Central".to_string(),
            None,
            Cnpj::parse("11222333000181").unwrap(),
            registry,
        );
        let row = record.row();
        assert_eq!(row.len(), CollectedRecord::HEADERS.len());
        assert_eq!(row[0], "Padaria Central");
        assert_eq!(row[1], NOT_FOUND);
        assert_eq!(row[2], "11222333000181");
        assert_eq!(row[4], "Simples Nacional");
        assert_eq!(row[6], "ATIVA");
    }
}
