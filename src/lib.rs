pub mod config;
pub mod dex;
pub mod error;
pub mod liquidity;
pub mod solana;
pub mod testing; // Mock capabilities for unit and integration tests
pub mod utils;
pub mod wallet;

// Re-export the main entry points
pub use error::{Result, SwapError};
pub use liquidity::{
    LiquidityLayer, PriorityFeeEstimator, QuoteCache, QuotePrefetcher, SwapConfig, SwapExecutor,
    SwapIntent, SwapOutcome,
};
