use pretty_assertions::assert_eq;
use solana_liquidity_layer::{
    error::SwapError,
    liquidity::{
        ExecutorConfig, FeeEstimatorConfig, OrderEvent, OrderStatus, PriorityFeeEstimator,
        QuoteCache, RouteStrategy, RouteVariant, SwapConfig, SwapExecutor, SwapIntent,
        SwapOutcome, SwapSide,
    },
    testing::{
        sample_quote, ConfirmationScript, MockFeeSampleSource, MockQuoteProvider,
        MockSafetyValidator, MockSigner, MockSimulator, MockSubmitter, MockTransactionBuilder,
        SimulationMode, SOL_MINT, USDC_MINT,
    },
    utils::{ManualClock, SystemClock},
};
use std::{collections::HashSet, sync::Arc, time::Duration};

const OWNER: &str = "owner";

/// Mocks shared by an executor, kept around for assertions.
struct Rig {
    provider: Arc<MockQuoteProvider>,
    builder: Arc<MockTransactionBuilder>,
    submitter: Arc<MockSubmitter>,
}

impl Rig {
    fn new(provider: MockQuoteProvider, submitter: MockSubmitter) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            provider: Arc::new(provider),
            builder: Arc::new(MockTransactionBuilder::new()),
            submitter: Arc::new(submitter),
        }
    }

    fn executor(&self) -> SwapExecutor {
        let fees = Arc::new(PriorityFeeEstimator::new(
            Arc::new(MockFeeSampleSource::new(vec![1_000, 8_000, 12_000, 30_000])),
            FeeEstimatorConfig::default(),
            Arc::new(SystemClock),
        ));
        SwapExecutor::new(ExecutorConfig::default())
            .with_quote_provider(self.provider.clone())
            .with_transaction_builder(self.builder.clone())
            .with_signer(Arc::new(MockSigner::new(OWNER)))
            .with_submitter(self.submitter.clone())
            .with_fee_estimator(fees)
            .with_simulator(Arc::new(MockSimulator::new(SimulationMode::Succeed)))
            .with_safety_validator(Arc::new(MockSafetyValidator::allow_all()))
    }
}

fn orca_quote() -> MockQuoteProvider {
    MockQuoteProvider::returning("mock", vec![sample_quote(150_000, 0.2, &["Orca"])])
}

fn intent() -> SwapIntent {
    SwapIntent::new(SOL_MINT, USDC_MINT, 1_000_000, SwapSide::Acquire, 50)
}

fn quick() -> SwapConfig {
    SwapConfig {
        poll_interval_ms: 10,
        confirmation_timeout_ms: 2_000,
        ..SwapConfig::default()
    }
}

#[tokio::test]
async fn cache_miss_and_no_route_fails_without_building() {
    let rig = Rig::new(
        MockQuoteProvider::returning("empty", vec![]),
        MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)),
    );
    let executor = rig
        .executor()
        .with_quote_cache(Arc::new(QuoteCache::new(1_000, Arc::new(SystemClock))));
    executor.balances().set_confirmed(SOL_MINT, 3_000_000);

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, Some(OrderStatus::Failed));
    assert!(matches!(outcome.error, Some(SwapError::QuoteUnavailable(_))));
    assert!(outcome.message.contains("never at risk"));
    assert_eq!(rig.provider.calls(), 1);
    assert_eq!(rig.builder.calls(), 0);
    assert!(rig.submitter.submitted().is_empty());
    assert_eq!(executor.balances().display_balance(SOL_MINT), 3_000_000);
    assert_eq!(executor.balances().pending_count(), 0);

    let archived = executor.history().get(&outcome.order_id.unwrap()).unwrap();
    assert_eq!(archived.status, OrderStatus::Failed);
    assert!(archived.tx_signature.is_none());
}

#[tokio::test]
async fn flagged_output_token_is_rejected_before_build() {
    let rig = Rig::new(
        orca_quote(),
        MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)),
    );
    let executor = rig.executor().with_safety_validator(Arc::new(
        MockSafetyValidator::allow_all().flag(USDC_MINT, "mint authority not renounced"),
    ));

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    match outcome.error {
        Some(SwapError::SafetyRejected(reason)) => assert!(reason.contains("mint authority")),
        other => panic!("expected safety rejection, got {:?}", other),
    }
    assert_eq!(outcome.status, Some(OrderStatus::Failed));
    assert_eq!(rig.builder.calls(), 0);
    assert!(rig.submitter.submitted().is_empty());
    assert_eq!(executor.balances().display_balance(SOL_MINT), 0);
}

#[tokio::test(start_paused = true)]
async fn confirmation_timeout_is_ambiguous_and_flagged() {
    let rig = Rig::new(
        orca_quote(),
        MockSubmitter::new(ConfirmationScript::AlwaysPending),
    );
    let executor = rig.executor();
    let mut events = executor.subscribe();
    let config = SwapConfig {
        confirmation_timeout_ms: 5_000,
        poll_interval_ms: 500,
        ..SwapConfig::default()
    };

    let outcome = executor.execute_swap(intent(), OWNER, &config).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, Some(OrderStatus::Failed));
    assert!(outcome.needs_reconciliation);
    assert_eq!(outcome.tx_signature.as_deref(), Some("sig-owner-0"));
    match &outcome.error {
        Some(SwapError::ConfirmationTimeout { signature, waited_ms }) => {
            assert_eq!(signature, "sig-owner-0");
            assert_eq!(*waited_ms, 5_000);
        }
        other => panic!("expected confirmation timeout, got {:?}", other),
    }
    assert!(outcome.message.contains("may still land"));
    assert!(!outcome.message.contains("never at risk"));
    // one poll at t=0 plus one per interval
    assert!(rig.submitter.polls_for("sig-owner-0") <= 11);
    assert_eq!(executor.balances().display_balance(SOL_MINT), 0);

    let mut flagged = None;
    while let Ok(event) = events.try_recv() {
        if let OrderEvent::ReconciliationRequired { signature, .. } = event {
            flagged = Some(signature);
        }
    }
    assert_eq!(flagged.as_deref(), Some("sig-owner-0"));
    assert!(
        executor
            .history()
            .get(&outcome.order_id.unwrap())
            .unwrap()
            .needs_reconciliation
    );
}

#[tokio::test]
async fn landed_failure_is_distinct_from_timeout() {
    let rig = Rig::new(
        orca_quote(),
        MockSubmitter::new(ConfirmationScript::FailAfter(
            1,
            "custom program error: 0x1771".to_string(),
        )),
    );
    let executor = rig.executor();

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    match &outcome.error {
        Some(SwapError::OnChainError { signature, reason }) => {
            assert_eq!(signature, "sig-owner-0");
            assert!(reason.contains("0x1771"));
        }
        other => panic!("expected on-chain error, got {:?}", other),
    }
    assert!(!outcome.needs_reconciliation);
    assert!(outcome.message.contains("landed but failed"));
    assert_eq!(executor.balances().display_balance(SOL_MINT), 0);
}

#[tokio::test]
async fn rejected_submission_rolls_back() {
    let rig = Rig::new(orca_quote(), MockSubmitter::rejecting());
    let executor = rig.executor();

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    assert!(matches!(outcome.error, Some(SwapError::SubmissionFailed(_))));
    assert!(outcome.tx_signature.is_none());
    assert!(!outcome.needs_reconciliation);
    assert!(outcome.message.contains("never at risk"));
    assert_eq!(executor.balances().pending_count(), 0);
}

/// Pre-submission failures all end the same way: failed, rolled back, safe.
fn assert_failed_before_sending(outcome: &SwapOutcome, executor: &SwapExecutor) {
    assert_eq!(outcome.status, Some(OrderStatus::Failed));
    assert!(outcome.tx_signature.is_none());
    assert!(!outcome.needs_reconciliation);
    assert!(outcome.message.contains("never at risk"));
    assert_eq!(executor.balances().display_balance(SOL_MINT), 0);
    assert_eq!(executor.balances().pending_count(), 0);
}

#[tokio::test]
async fn builder_error_fails_before_signing() {
    let rig = Rig::new(orca_quote(), MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)));
    let executor = rig
        .executor()
        .with_transaction_builder(Arc::new(MockTransactionBuilder::failing()));

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    assert!(matches!(outcome.error, Some(SwapError::BuildFailed(_))));
    assert_failed_before_sending(&outcome, &executor);
    assert!(rig.submitter.submitted().is_empty());
}

#[tokio::test]
async fn builder_without_transaction_fails_before_signing() {
    let rig = Rig::new(orca_quote(), MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)));
    let executor = rig
        .executor()
        .with_transaction_builder(Arc::new(MockTransactionBuilder::without_route()));

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    match &outcome.error {
        Some(SwapError::BuildFailed(reason)) => assert!(reason.contains("no transaction")),
        other => panic!("expected build failure, got {:?}", other),
    }
    assert_failed_before_sending(&outcome, &executor);
    assert!(rig.submitter.submitted().is_empty());
}

#[tokio::test]
async fn signer_refusal_never_submits() {
    let rig = Rig::new(orca_quote(), MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)));
    let executor = rig.executor().with_signer(Arc::new(MockSigner::rejecting(OWNER)));

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    assert!(matches!(outcome.error, Some(SwapError::SigningFailed(_))));
    assert_failed_before_sending(&outcome, &executor);
    assert_eq!(rig.builder.calls(), 1);
    assert!(rig.submitter.submitted().is_empty());
}

#[tokio::test]
async fn quote_stale_after_refetch_is_expired() {
    // provider stamps quotes at t=0; the executor already lives at t=100s
    let rig = Rig::new(
        orca_quote().with_clock(Arc::new(ManualClock::new(0))),
        MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)),
    );
    let executor = rig.executor().with_clock(Arc::new(ManualClock::new(100_000)));

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    assert!(matches!(outcome.error, Some(SwapError::QuoteExpired(_))));
    assert_failed_before_sending(&outcome, &executor);
    assert_eq!(rig.provider.calls(), 2);
    assert_eq!(rig.builder.calls(), 0);
}

#[tokio::test]
async fn concurrent_orders_are_independent() {
    let rig = Rig::new(
        orca_quote(),
        MockSubmitter::new(ConfirmationScript::ConfirmAfter(1)),
    );
    let executor = Arc::new(rig.executor());
    let balances = executor.balances();
    balances.set_confirmed(SOL_MINT, 10_000_000);

    let tasks: Vec<_> = (0..5)
        .map(|_| executor.spawn_swap(intent(), OWNER.to_string(), quick()))
        .collect();
    let outcomes = futures::future::join_all(tasks).await;

    let mut ids = HashSet::new();
    let mut signatures = HashSet::new();
    for outcome in outcomes {
        let outcome = outcome.unwrap();
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.status, Some(OrderStatus::Filled));
        ids.insert(outcome.order_id.unwrap());
        signatures.insert(outcome.tx_signature.unwrap());
    }
    assert_eq!(ids.len(), 5);
    assert_eq!(signatures.len(), 5);
    assert_eq!(rig.submitter.submitted().len(), 5);
    assert_eq!(balances.confirmed_balance(SOL_MINT), 5_000_000);
    assert_eq!(balances.display_balance(SOL_MINT), 5_000_000);
    assert_eq!(balances.pending_count(), 0);
    assert!(executor.pending_order_ids().is_empty());
    assert_eq!(executor.history().recent(10).len(), 5);
}

#[tokio::test]
async fn fastest_strategy_takes_the_single_hop_route() {
    let provider = MockQuoteProvider::returning("mock", vec![])
        .with_variant(
            RouteVariant::Default,
            sample_quote(152_000, 0.3, &["Raydium", "Orca", "Meteora"]),
        )
        .with_variant(RouteVariant::DirectOnly, sample_quote(149_000, 0.2, &["Orca"]))
        .with_variant(
            RouteVariant::Compact,
            sample_quote(150_500, 0.25, &["Raydium", "Orca"]),
        );
    let rig = Rig::new(provider, MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)));
    let executor = rig.executor();

    let config = SwapConfig {
        compare_routes: true,
        strategy: RouteStrategy::Fastest,
        ..quick()
    };
    let outcome = executor.execute_swap(intent(), OWNER, &config).await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(rig.provider.calls(), 3);
    let used = outcome.quote.unwrap();
    assert_eq!(used.hop_count(), 1);
    assert_eq!(used.out_amount, 149_000);

    let config = SwapConfig {
        compare_routes: true,
        strategy: RouteStrategy::BestOutput,
        ..quick()
    };
    let outcome = executor.execute_swap(intent(), OWNER, &config).await;
    assert_eq!(outcome.quote.unwrap().out_amount, 152_000);
}

#[tokio::test]
async fn fresh_cached_quote_skips_the_provider() {
    let cache = Arc::new(QuoteCache::new(1_000, Arc::new(SystemClock)));
    cache.store(sample_quote(151_000, 0.1, &["Orca"]));

    let rig = Rig::new(
        MockQuoteProvider::returning("mock", vec![sample_quote(140_000, 0.1, &["Orca"])]),
        MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)),
    );
    let executor = rig.executor().with_quote_cache(cache.clone());

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.quote.unwrap().out_amount, 151_000);
    assert_eq!(rig.provider.calls(), 0);
    assert_eq!(cache.metrics().hits, 1);

    // opting out of the cache goes to the provider
    let config = SwapConfig {
        use_cached_quote: false,
        ..quick()
    };
    let outcome = executor.execute_swap(intent(), OWNER, &config).await;
    assert_eq!(outcome.quote.unwrap().out_amount, 140_000);
    assert_eq!(rig.provider.calls(), 1);
}

#[tokio::test]
async fn cached_quote_with_other_slippage_is_refetched() {
    let cache = Arc::new(QuoteCache::new(1_000, Arc::new(SystemClock)));
    cache.store(sample_quote(151_000, 0.1, &["Orca"]));

    let rig = Rig::new(orca_quote(), MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)));
    let executor = rig.executor().with_quote_cache(cache);

    let wide = SwapIntent::new(SOL_MINT, USDC_MINT, 1_000_000, SwapSide::Acquire, 300);
    let outcome = executor.execute_swap(wide, OWNER, &quick()).await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(rig.provider.calls(), 1);
    let used = outcome.quote.unwrap();
    assert_eq!(used.slippage_bps, 300);
    assert_eq!(used.out_amount, 150_000);
}

#[tokio::test]
async fn expired_cached_quote_is_not_used() {
    let clock = Arc::new(ManualClock::new(50_000));
    let cache = Arc::new(QuoteCache::new(1_000, clock.clone()));
    let mut stale = sample_quote(151_000, 0.1, &["Orca"]);
    stale.fetched_at_ms = 50_000;
    stale.expires_at_ms = 51_000;
    cache.store(stale);
    clock.advance(Duration::from_millis(1_500));

    let rig = Rig::new(
        MockQuoteProvider::returning("mock", vec![sample_quote(140_000, 0.1, &["Orca"])])
            .with_clock(clock.clone()),
        MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)),
    );
    let executor = rig.executor().with_quote_cache(cache.clone()).with_clock(clock);

    let outcome = executor.execute_swap(intent(), OWNER, &quick()).await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.quote.unwrap().out_amount, 140_000);
    assert_eq!(rig.provider.calls(), 1);
    assert_eq!(cache.metrics().expired, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_quote_never_submits() {
    let rig = Rig::new(
        MockQuoteProvider::returning("slow", vec![sample_quote(150_000, 0.2, &["Orca"])])
            .with_latency(Duration::from_secs(3)),
        MockSubmitter::new(ConfirmationScript::ConfirmAfter(0)),
    );
    let executor = Arc::new(rig.executor());
    let mut events = executor.subscribe();

    let task = executor.spawn_swap(intent(), OWNER.to_string(), quick());
    let order_id = match events.recv().await.unwrap() {
        OrderEvent::Created(order) => order.id,
        other => panic!("unexpected first event {:?}", other),
    };
    assert_eq!(executor.balances().display_balance(SOL_MINT), -1_000_000);

    assert!(executor.cancel_order(&order_id));
    let outcome = task.await.unwrap();

    assert_eq!(outcome.status, Some(OrderStatus::Cancelled));
    assert!(!outcome.needs_reconciliation);
    assert_eq!(rig.builder.calls(), 0);
    assert!(rig.submitter.submitted().is_empty());
    assert_eq!(executor.balances().display_balance(SOL_MINT), 0);
    assert!(!executor.cancel_order(&order_id));
}
