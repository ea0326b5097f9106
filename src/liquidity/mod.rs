//! Swap execution and route optimization
//!
//! Quote prefetching, multi-route scoring, priority fee estimation and the
//! optimistic executor that drives each order to a terminal state.

pub mod balance;
pub mod cache;
pub mod executor;
pub mod fees;
pub mod history;
pub mod layer;
pub mod order;
pub mod providers;
pub mod routes;
pub mod safety;
pub mod types;

pub use balance::{BalanceBook, BalanceDelta};
pub use cache::{CacheMetrics, PrefetchStatus, QuoteCache, QuoteCacheConfig, QuotePrefetcher};
pub use executor::{ExecutorConfig, OrderEvent, SwapConfig, SwapExecutor, SwapOutcome};
pub use fees::{FeeEstimatorConfig, PriorityFeeEstimator};
pub use history::{InMemoryOrderHistory, OrderHistory};
pub use layer::LiquidityLayer;
pub use order::{Order, OrderId, OrderStatus};
pub use providers::{
    FeeOracle, FeeSampleSource, ProviderChain, QuoteProvider, SafetyValidator, TransactionBuilder,
    TransactionSigner, TransactionSimulator, TransactionSubmitter,
};
pub use routes::{RouteAnalysis, RouteComparator, RouteComparison, RouteStrategy, ValidationReport};
pub use safety::BannedMintValidator;
pub use types::{
    ConfirmationStatus, FeeEstimate, FeeSource, PriorityLevel, Quote, QuoteRequest, RouteStep,
    RouteVariant, SafetyVerdict, SignedTransaction, SimulationReport, SwapIntent, SwapSide,
    SwapTransaction, TokenPair,
};
