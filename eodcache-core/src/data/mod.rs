//! Remote data providers

pub mod provider;
pub mod yahoo;

pub use provider::{DataError, DataProvider, ProviderRegistry};
pub use yahoo::{YahooProvider, YAHOO_SOURCE};
