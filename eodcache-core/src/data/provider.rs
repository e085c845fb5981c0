//! Data provider trait and its error type.
//!
//! Providers only know how to fetch rows for a symbol and date range. The
//! archive sits above this trait and decides which ranges to ask for.

use crate::bar::Bar;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failures reported by a data provider.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Source of end-of-day rows.
pub trait DataProvider: Send + Sync {
    /// Source identifier this provider is registered under.
    fn name(&self) -> &str;

    /// Daily rows for `symbol` over `[start, end]`, any order.
    ///
    /// An empty vector means the provider had no rows for the range (weekend,
    /// holiday); it is not an error.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<Bar>, DataError>;
}

/// Providers keyed by source identifier.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn DataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `provider.name()`, replacing any provider with the same name.
    pub fn register(&mut self, provider: Box<dyn DataProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, source: &str) -> Option<&dyn DataProvider> {
        self.providers.get(source).map(|p| p.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl DataProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn fetch(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<Bar>, DataError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn registry_looks_up_by_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(Named("yahoo")));
        registry.register(Box::new(Named("mock")));

        assert_eq!(registry.get("yahoo").map(|p| p.name()), Some("yahoo"));
        assert!(registry.get("iex").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["mock", "yahoo"]);
    }
}
