//! Quote lookup against the upstream quote proxy.

pub mod fixed;
pub mod proxy;

use crate::models::QuoteResult;

pub use fixed::FixedQuotes;
pub use proxy::QuoteProxyClient;

/// Outcome of a single quote lookup, decided once at the fetch boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteLookup {
    Quote(QuoteResult),
    /// The proxy could not resolve the ticker
    InvalidSymbol,
    /// Transport failure, timeout, non-success status or unreadable body
    Unavailable,
}

impl QuoteLookup {
    pub fn into_quote(self) -> Option<QuoteResult> {
        match self {
            QuoteLookup::Quote(q) => Some(q),
            QuoteLookup::InvalidSymbol | QuoteLookup::Unavailable => None,
        }
    }
}

#[async_trait::async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Look up the latest quote for `symbol`. Never fails; failures are
    /// reported through [`QuoteLookup`].
    async fn fetch(&self, symbol: &str) -> QuoteLookup;
}
