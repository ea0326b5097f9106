// src/dex/mod.rs
//! DEX aggregator integrations backing the quote and transaction-build seams.

pub mod clients;

pub use clients::{JupiterClient, JupiterConfig};
