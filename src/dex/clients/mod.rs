// src/dex/clients/mod.rs
//! Aggregator client implementations.

pub mod jupiter;
pub mod jupiter_api;

pub use jupiter::{decode_swap_transaction, JupiterClient, JupiterConfig};
