use std::env;
use std::time::Duration;

/// Runtime knobs for extraction, retrieval and the page cache.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub max_text_length: usize,
    pub context_max_length: usize,
    pub max_results_per_document: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_text_length: Self::DEFAULT_MAX_TEXT_LENGTH,
            context_max_length: Self::DEFAULT_CONTEXT_MAX_LENGTH,
            max_results_per_document: Self::DEFAULT_MAX_RESULTS_PER_DOCUMENT,
            cache_ttl_secs: Self::DEFAULT_CACHE_TTL_SECS,
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AppConfig {
    pub const DEFAULT_MAX_TEXT_LENGTH: usize = 50_000;
    pub const DEFAULT_CONTEXT_MAX_LENGTH: usize = 15_000;
    pub const DEFAULT_MAX_RESULTS_PER_DOCUMENT: usize = 5;
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;
    pub const DEFAULT_CACHE_CAPACITY: u64 = 256;

    const MAX_TEXT_LENGTH_VARS: [&'static str; 2] =
        ["FOLIO_MAX_TEXT_LENGTH", "MAX_TEXT_LENGTH"];
    const CONTEXT_MAX_LENGTH_VARS: [&'static str; 2] =
        ["FOLIO_CONTEXT_MAX_LENGTH", "CONTEXT_MAX_LENGTH"];
    const MAX_RESULTS_VARS: [&'static str; 1] = ["FOLIO_MAX_RESULTS_PER_DOCUMENT"];
    const CACHE_TTL_VARS: [&'static str; 2] = ["FOLIO_CACHE_TTL_SECS", "DOCUMENT_CACHE_TTL_SECS"];
    const CACHE_CAPACITY_VARS: [&'static str; 1] = ["FOLIO_CACHE_CAPACITY"];

    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let max_text_length = Self::read_parsed(&Self::MAX_TEXT_LENGTH_VARS)
            .unwrap_or(defaults.max_text_length);
        let context_max_length = Self::read_parsed(&Self::CONTEXT_MAX_LENGTH_VARS)
            .unwrap_or(defaults.context_max_length);
        let max_results_per_document = Self::read_parsed(&Self::MAX_RESULTS_VARS)
            .unwrap_or(defaults.max_results_per_document);
        let cache_ttl_secs =
            Self::read_parsed(&Self::CACHE_TTL_VARS).unwrap_or(defaults.cache_ttl_secs);
        let cache_capacity =
            Self::read_parsed(&Self::CACHE_CAPACITY_VARS).unwrap_or(defaults.cache_capacity);

        anyhow::ensure!(max_text_length > 0, "FOLIO_MAX_TEXT_LENGTH must be positive");
        anyhow::ensure!(
            context_max_length > 0,
            "FOLIO_CONTEXT_MAX_LENGTH must be positive"
        );

        Ok(Self {
            max_text_length,
            context_max_length,
            max_results_per_document,
            cache_ttl_secs,
            cache_capacity,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub(crate) fn read_env(candidates: &[&'static str]) -> Option<String> {
        candidates.iter().find_map(|key| env::var(key).ok())
    }

    fn read_parsed<T: std::str::FromStr>(candidates: &[&'static str]) -> Option<T> {
        Self::read_env(candidates).and_then(|value| value.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let config = AppConfig::default();
        assert_eq!(config.max_text_length, 50_000);
        assert_eq!(config.context_max_length, 15_000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(1800));
    }
}
