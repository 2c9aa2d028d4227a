//! Stock Price Checker Library
//!
//! Latest stock quotes with an anonymized community like counter.
//! Exposes core modules for use by the binary and tests.

pub mod anonymizer;
pub mod api;
pub mod middleware;
pub mod models;
pub mod processor;
pub mod quotes;
pub mod store;
