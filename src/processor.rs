//! Stock Processor
//!
//! One symbol's request cycle: quote lookup, record get-or-create under the
//! proxy's canonical spelling, then an optional like from the caller.

use crate::anonymizer::IpAnonymizer;
use crate::quotes::{QuoteFetcher, QuoteLookup};
use crate::store::{StockStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Price and like count for one resolved symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSnapshot {
    pub symbol: String,
    pub price: f64,
    pub likes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StockOutcome {
    Found(StockSnapshot),
    /// Unknown ticker or unreachable proxy; both look the same to callers
    InvalidSymbol,
}

#[derive(Clone)]
pub struct StockProcessor {
    quotes: Arc<dyn QuoteFetcher>,
    store: Arc<StockStore>,
    anonymizer: IpAnonymizer,
}

impl StockProcessor {
    pub fn new(
        quotes: Arc<dyn QuoteFetcher>,
        store: Arc<StockStore>,
        anonymizer: IpAnonymizer,
    ) -> Self {
        Self {
            quotes,
            store,
            anonymizer,
        }
    }

    pub fn store(&self) -> &Arc<StockStore> {
        &self.store
    }

    /// Resolve `symbol` and optionally count a like from `caller`.
    ///
    /// The like is only applied when `apply_like` is set and a caller address
    /// is known. Store failures are returned as errors; upstream failures are
    /// folded into [`StockOutcome::InvalidSymbol`].
    pub async fn process(
        &self,
        symbol: &str,
        apply_like: bool,
        caller: Option<&str>,
    ) -> Result<StockOutcome, StoreError> {
        let quote = match self.quotes.fetch(symbol).await {
            QuoteLookup::Quote(quote) => quote,
            QuoteLookup::InvalidSymbol => {
                debug!(symbol = %symbol, "Symbol rejected by quote proxy");
                return Ok(StockOutcome::InvalidSymbol);
            }
            QuoteLookup::Unavailable => {
                warn!(symbol = %symbol, "Quote proxy unavailable, reporting invalid symbol");
                return Ok(StockOutcome::InvalidSymbol);
            }
        };

        let mut record = self.store.get_or_create(&quote.symbol).await?;

        if apply_like {
            match caller {
                Some(address) => {
                    let token = self.anonymizer.hash(address);
                    record = self.store.apply_like(&record, &token).await?;
                }
                None => warn!(symbol = %record.symbol, "Like requested without a caller address"),
            }
        }

        Ok(StockOutcome::Found(StockSnapshot {
            symbol: record.symbol,
            price: quote.price,
            likes: record.likes,
        }))
    }
}
