//! Capabilities the swap pipeline consumes but does not implement.
//!
//! Every trait here is an async seam: the Jupiter and Solana RPC adapters
//! implement them in production, `crate::testing` implements them for tests.

use crate::{
    error::{Result, SwapError},
    liquidity::types::{
        ConfirmationStatus, FeeEstimate, PriorityLevel, Quote, QuoteRequest, SafetyVerdict,
        SignedTransaction, SimulationReport, SwapTransaction,
    },
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use log::{debug, warn};
use std::{sync::Arc, time::Duration};

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the provider answered but has no route.
    async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<Quote>>;
}

#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        owner: &str,
        fee: Option<&FeeEstimate>,
    ) -> Result<Option<SwapTransaction>>;
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Base58 address that pays for and signs the swap.
    fn owner(&self) -> String;

    async fn sign(&self, transaction: &SwapTransaction) -> Result<SignedTransaction>;
}

#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Returns the transaction signature.
    async fn submit(&self, transaction: &SignedTransaction) -> Result<String>;

    async fn confirmation_status(&self, signature: &str) -> Result<ConfirmationStatus>;
}

#[async_trait]
pub trait FeeSampleSource: Send + Sync {
    /// Recently observed prioritization fees in micro-lamports per CU. May be empty.
    async fn recent_fee_samples(&self) -> Result<Vec<u64>>;
}

#[async_trait]
pub trait SafetyValidator: Send + Sync {
    async fn validate(&self, mint: &str) -> Result<SafetyVerdict>;
}

#[async_trait]
pub trait TransactionSimulator: Send + Sync {
    /// `Err(SwapError::SimulationUnavailable)` when the dry run itself could not run.
    async fn simulate(&self, transaction: &SwapTransaction) -> Result<SimulationReport>;
}

#[async_trait]
pub trait FeeOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Suggested micro-lamports per CU for the given urgency.
    async fn priority_fee_estimate(&self, level: PriorityLevel) -> Result<f64>;
}

/// Ordered list of interchangeable providers, each call bounded by a timeout.
/// The first provider to produce a value wins; `Ok(None)` and errors fall
/// through to the next one.
pub struct ProviderChain<P: ?Sized> {
    providers: Vec<(String, Arc<P>)>,
    per_call_timeout: Duration,
}

impl<P: ?Sized + Send + Sync> ProviderChain<P> {
    pub fn new(per_call_timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            per_call_timeout,
        }
    }

    pub fn with_provider(mut self, label: impl Into<String>, provider: Arc<P>) -> Self {
        self.providers.push((label.into(), provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Try each provider in order. Returns `Ok(None)` when every provider
    /// answered without a value, the last error when none answered at all.
    pub async fn first_some<T, F>(&self, operation: &str, mut call: F) -> Result<Option<T>>
    where
        F: FnMut(Arc<P>) -> BoxFuture<'static, Result<Option<T>>>,
    {
        let mut last_error: Option<SwapError> = None;
        let mut answered = false;

        for (label, provider) in &self.providers {
            match tokio::time::timeout(self.per_call_timeout, call(Arc::clone(provider))).await {
                Ok(Ok(Some(value))) => {
                    debug!("[{}] provider '{}' answered", operation, label);
                    return Ok(Some(value));
                }
                Ok(Ok(None)) => {
                    debug!("[{}] provider '{}' had nothing", operation, label);
                    answered = true;
                }
                Ok(Err(e)) => {
                    warn!("[{}] provider '{}' failed: {}", operation, label, e);
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(
                        "[{}] provider '{}' timed out after {:?}",
                        operation, label, self.per_call_timeout
                    );
                    last_error = Some(SwapError::TimeoutError(format!(
                        "{} via {} exceeded {:?}",
                        operation, label, self.per_call_timeout
                    )));
                }
            }
        }

        match (answered, last_error) {
            (true, _) | (false, None) => Ok(None),
            (false, Some(e)) => Err(e),
        }
    }
}

#[async_trait]
impl QuoteProvider for ProviderChain<dyn QuoteProvider> {
    fn name(&self) -> &str {
        "provider-chain"
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<Quote>> {
        self.first_some("get_quote", |provider| {
            let request = request.clone();
            Box::pin(async move { provider.get_quote(&request).await })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liquidity::types::{RouteVariant, SwapIntent, SwapSide};
    use crate::testing::{sample_quote, MockQuoteProvider};

    fn request() -> QuoteRequest {
        SwapIntent::new("SOL", "USDC", 1_000_000, SwapSide::Acquire, 50)
            .quote_request(RouteVariant::Default)
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_second_provider() {
        let failing = Arc::new(MockQuoteProvider::failing("primary"));
        let working = Arc::new(MockQuoteProvider::returning(
            "backup",
            vec![sample_quote(150_000, 0.1, &["Orca"])],
        ));
        let chain: ProviderChain<dyn QuoteProvider> =
            ProviderChain::new(Duration::from_millis(200))
                .with_provider("primary", failing.clone() as Arc<dyn QuoteProvider>)
                .with_provider("backup", working.clone() as Arc<dyn QuoteProvider>);

        let quote = chain.get_quote(&request()).await.unwrap();
        assert_eq!(quote.map(|q| q.out_amount), Some(150_000));
        assert_eq!(failing.calls(), 1);
        assert_eq!(working.calls(), 1);
    }

    #[tokio::test]
    async fn test_chain_reports_none_when_providers_have_no_route() {
        let empty = Arc::new(MockQuoteProvider::returning("empty", vec![]));
        let failing = Arc::new(MockQuoteProvider::failing("flaky"));
        let chain: ProviderChain<dyn QuoteProvider> =
            ProviderChain::new(Duration::from_millis(200))
                .with_provider("empty", empty as Arc<dyn QuoteProvider>)
                .with_provider("flaky", failing as Arc<dyn QuoteProvider>);

        assert!(chain.get_quote(&request()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_times_out_slow_provider() {
        let slow = Arc::new(
            MockQuoteProvider::returning("slow", vec![sample_quote(1, 0.0, &["Orca"])])
                .with_latency(Duration::from_secs(5)),
        );
        let chain: ProviderChain<dyn QuoteProvider> =
            ProviderChain::new(Duration::from_millis(100))
                .with_provider("slow", slow as Arc<dyn QuoteProvider>);

        let err = chain.get_quote(&request()).await.unwrap_err();
        assert!(matches!(err, SwapError::TimeoutError(_)));
    }
}
