//! Liquidity layer facade
//!
//! Stateless entry point over the quote provider, route comparator, fee
//! estimator and executor. Holds no orders of its own.

use crate::{
    error::{Result, SwapError},
    liquidity::{
        executor::{SwapConfig, SwapExecutor, SwapOutcome},
        fees::PriorityFeeEstimator,
        providers::{QuoteProvider, TransactionBuilder, TransactionSigner, TransactionSubmitter},
        routes::{gather_route_variants, RouteComparator, RouteComparison, RouteStrategy},
        types::{PriorityLevel, Quote, RouteVariant, SwapIntent},
    },
};
use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};

pub struct LiquidityLayer {
    quote_provider: Arc<dyn QuoteProvider>,
    builder: Arc<dyn TransactionBuilder>,
    fee_estimator: Arc<PriorityFeeEstimator>,
    signer: Option<Arc<dyn TransactionSigner>>,
    submitter: Option<Arc<dyn TransactionSubmitter>>,
    executor: Option<Arc<SwapExecutor>>,
    comparator: RouteComparator,
    variant_timeout: Duration,
}

impl LiquidityLayer {
    pub fn new(
        quote_provider: Arc<dyn QuoteProvider>,
        builder: Arc<dyn TransactionBuilder>,
        fee_estimator: Arc<PriorityFeeEstimator>,
    ) -> Self {
        Self {
            quote_provider,
            builder,
            fee_estimator,
            signer: None,
            submitter: None,
            executor: None,
            comparator: RouteComparator::new(),
            variant_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn TransactionSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_executor(mut self, executor: Arc<SwapExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_variant_timeout(mut self, timeout: Duration) -> Self {
        self.variant_timeout = timeout;
        self
    }

    /// Single aggregator quote for the intent.
    pub async fn get_best_quote(&self, intent: &SwapIntent) -> Result<Option<Quote>> {
        intent.validate()?;
        self.quote_provider
            .get_quote(&intent.quote_request(RouteVariant::Default))
            .await
    }

    /// Quotes for every route variant, ranked under `strategy`.
    pub async fn compare_routes(
        &self,
        intent: &SwapIntent,
        strategy: RouteStrategy,
    ) -> Result<Vec<RouteComparison>> {
        intent.validate()?;
        let quotes = gather_route_variants(
            Arc::clone(&self.quote_provider),
            intent,
            &RouteVariant::ALL,
            self.variant_timeout,
        )
        .await;
        Ok(self.comparator.compare(&quotes, strategy))
    }

    /// Best route, from a full comparison or from the single default quote.
    pub async fn get_best_route(
        &self,
        intent: &SwapIntent,
        compare: bool,
        strategy: RouteStrategy,
    ) -> Result<Option<RouteComparison>> {
        if compare {
            return Ok(self.compare_routes(intent, strategy).await?.into_iter().next());
        }
        let quote = self.get_best_quote(intent).await?;
        Ok(quote.and_then(|q| self.comparator.best(std::slice::from_ref(&q), strategy)))
    }

    /// Full optimistic execution with route comparison forced on.
    pub async fn execute_with_best_route(
        &self,
        intent: SwapIntent,
        owner: &str,
        config: &SwapConfig,
    ) -> SwapOutcome {
        let config = SwapConfig {
            compare_routes: true,
            ..config.clone()
        };
        match &self.executor {
            Some(executor) => executor.execute_swap(intent, owner, &config).await,
            None => {
                warn!("No executor attached to the liquidity layer");
                SwapOutcome::rejected(
                    SwapError::ConfigError("executor not configured".to_string()),
                    tokio::time::Instant::now(),
                )
            }
        }
    }

    /// quote → fee → build → sign → submit. No order record, no optimistic
    /// balance, no confirmation wait. Returns the transaction signature.
    pub async fn quick_swap(&self, intent: &SwapIntent, level: PriorityLevel) -> Result<String> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| SwapError::ConfigError("wallet not connected".to_string()))?;
        let submitter = self
            .submitter
            .as_ref()
            .ok_or_else(|| SwapError::ConfigError("RPC connection not configured".to_string()))?;

        let quote = self.get_best_quote(intent).await?.ok_or_else(|| {
            SwapError::QuoteUnavailable(format!("no route for {}", intent.pair()))
        })?;
        let fee = self.fee_estimator.estimate(level, None, None).await;
        debug!(
            "⚡ Quick swap {} at {} µL/CU",
            intent.pair(),
            fee.micro_lamports_per_cu
        );

        let owner = signer.owner();
        let transaction = self
            .builder
            .build_swap_transaction(&quote, &owner, Some(&fee))
            .await?
            .ok_or_else(|| SwapError::BuildFailed("aggregator returned no transaction".to_string()))?;
        let signed = signer.sign(&transaction).await?;
        let signature = submitter.submit(&signed).await?;

        info!("📤 Quick swap submitted: {}", signature);
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        liquidity::{fees::FeeEstimatorConfig, types::SwapSide},
        testing::{
            sample_quote, ConfirmationScript, MockFeeSampleSource, MockQuoteProvider, MockSigner,
            MockSubmitter, MockTransactionBuilder, SOL_MINT, USDC_MINT,
        },
        utils::SystemClock,
    };

    fn layer(provider: Arc<MockQuoteProvider>) -> LiquidityLayer {
        let fees = Arc::new(PriorityFeeEstimator::new(
            Arc::new(MockFeeSampleSource::new(vec![])),
            FeeEstimatorConfig::default(),
            Arc::new(SystemClock),
        ));
        LiquidityLayer::new(provider, Arc::new(MockTransactionBuilder::new()), fees)
    }

    fn intent() -> SwapIntent {
        SwapIntent::new(SOL_MINT, USDC_MINT, 1_000_000, SwapSide::Acquire, 50)
    }

    #[tokio::test]
    async fn test_best_route_without_comparison_uses_single_quote() {
        let provider = Arc::new(MockQuoteProvider::returning(
            "mock",
            vec![sample_quote(150_000, 0.1, &["Orca"])],
        ));
        let layer = layer(provider.clone());

        let best = layer
            .get_best_route(&intent(), false, RouteStrategy::Balanced)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.rank, 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_quick_swap_requires_wallet() {
        let provider = Arc::new(MockQuoteProvider::returning(
            "mock",
            vec![sample_quote(150_000, 0.1, &["Orca"])],
        ));
        let err = layer(provider.clone())
            .quick_swap(&intent(), PriorityLevel::Low)
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::ConfigError(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_quick_swap_submits_without_bookkeeping() {
        let provider = Arc::new(MockQuoteProvider::returning(
            "mock",
            vec![sample_quote(150_000, 0.1, &["Orca"])],
        ));
        let submitter = Arc::new(MockSubmitter::new(ConfirmationScript::AlwaysPending));
        let layer = layer(provider)
            .with_signer(Arc::new(MockSigner::new("quick")))
            .with_submitter(submitter.clone());

        let signature = layer.quick_swap(&intent(), PriorityLevel::High).await.unwrap();
        assert_eq!(signature, "sig-quick-0");
        assert_eq!(submitter.submitted(), vec!["sig-quick-0".to_string()]);
        assert_eq!(submitter.polls_for("sig-quick-0"), 0);
    }
}
