//! Persistence for per-symbol like counters.

pub mod stock_store;

pub use stock_store::{StockStore, StoreError};
