pub mod browser_pool;
pub mod cli;
pub mod collector;
pub mod company;
pub mod config;
pub mod export;
pub mod identifier;
pub mod logger;
pub mod maps;
pub mod rate_limit;
pub mod registry;

pub use collector::{CollectError, CollectionOutcome, Collector, StopReason};
pub use company::{CollectedRecord, Cnpj, RegimeFilter, SearchParams};
