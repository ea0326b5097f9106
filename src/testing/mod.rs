//! Testing infrastructure
//!
//! Mock implementations of every capability the swap pipeline consumes, so the
//! executor, caches and facade can be driven end to end in unit and
//! integration tests.

pub mod mock_providers;

pub use mock_providers::{
    sample_quote, ConfirmationScript, MockFeeOracle, MockFeeSampleSource, MockQuoteProvider,
    MockSafetyValidator, MockSigner, MockSimulator, MockSubmitter, MockTransactionBuilder,
    SimulationMode, SOL_MINT, USDC_MINT,
};
