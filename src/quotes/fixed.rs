//! In-memory quote source for tests and offline runs.

use crate::models::QuoteResult;
use crate::quotes::{QuoteFetcher, QuoteLookup};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct FixedQuotes {
    prices: HashMap<String, f64>,
    unavailable: HashSet<String>,
}

impl FixedQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.trim().to_uppercase(), price);
        self
    }

    /// Make lookups for `symbol` behave like an unreachable proxy.
    pub fn with_unavailable(mut self, symbol: &str) -> Self {
        self.unavailable.insert(symbol.trim().to_uppercase());
        self
    }
}

#[async_trait::async_trait]
impl QuoteFetcher for FixedQuotes {
    async fn fetch(&self, symbol: &str) -> QuoteLookup {
        let symbol = symbol.trim().to_uppercase();
        if self.unavailable.contains(&symbol) {
            return QuoteLookup::Unavailable;
        }
        match self.prices.get(&symbol) {
            Some(price) => QuoteLookup::Quote(QuoteResult {
                symbol,
                price: *price,
            }),
            None => QuoteLookup::InvalidSymbol,
        }
    }
}
