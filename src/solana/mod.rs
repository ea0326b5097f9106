pub mod fee_oracle;
pub mod rpc;

// Re-export key components
pub use fee_oracle::{HeliusFeeOracle, HeliusFeeOracleConfig};
pub use rpc::SolanaRpcClient;
