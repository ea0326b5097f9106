//! Optimistic swap executor
//!
//! Owns every in-flight order. The optimistic balance delta is applied before
//! any network call; whichever path removes the order from the in-flight map
//! (completion, failure or user cancel) owns its finalization, so the delta is
//! reverted or committed exactly once.
//!
//! Sequence per swap:
//! 1. order created `Pending`, delta applied
//! 2. quote from cache, route comparison or a single fresh request
//! 3. safety check on the output mint
//! 4. `Submitted`, priority fee estimated
//! 5. aggregator builds the transaction, optional simulation
//! 6. sign, submit, poll for confirmation
//! 7. `Filled` + commit, or `Failed` + revert

use crate::{
    error::{Result, SwapError},
    liquidity::{
        balance::BalanceBook,
        cache::QuoteCache,
        fees::PriorityFeeEstimator,
        history::{InMemoryOrderHistory, OrderHistory},
        order::{Order, OrderId, OrderStatus},
        providers::{
            QuoteProvider, SafetyValidator, TransactionBuilder, TransactionSigner,
            TransactionSimulator, TransactionSubmitter,
        },
        routes::{gather_route_variants, RouteComparator, RouteStrategy},
        types::{ConfirmationStatus, FeeEstimate, PriorityLevel, Quote, RouteVariant, SwapIntent},
    },
    utils::{Clock, SystemClock, Timer},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    sync::{Arc, RwLock},
    time::Duration,
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::Instant,
};

pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const EVENT_CHANNEL_CAPACITY: usize = 256;
/// Warn when a swap outlasts its confirmation timeout by more than this.
const SLOW_SWAP_MS: u64 = 3_000;

/// Per-swap knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    pub priority_level: PriorityLevel,
    /// Overrides the intent's slippage when set
    pub slippage_bps: Option<u16>,
    /// Request every route variant and pick the best under `strategy`
    pub compare_routes: bool,
    pub strategy: RouteStrategy,
    pub use_cached_quote: bool,
    pub simulate: bool,
    pub confirmation_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub compute_unit_limit: Option<u32>,
    pub max_fee_lamports: Option<u64>,
    /// Fixed micro-lamports per CU; skips the estimator
    pub fee_override_micro_lamports: Option<u64>,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            priority_level: PriorityLevel::Medium,
            slippage_bps: None,
            compare_routes: false,
            strategy: RouteStrategy::Balanced,
            use_cached_quote: true,
            simulate: true,
            confirmation_timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            compute_unit_limit: None,
            max_fee_lamports: None,
            fee_override_micro_lamports: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Bound on a single fresh quote request
    pub quote_timeout_ms: u64,
    /// Bound on each route variant request during comparison
    pub route_variant_timeout_ms: u64,
    pub history_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            quote_timeout_ms: 5_000,
            route_variant_timeout_ms: 2_000,
            history_capacity: crate::liquidity::history::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Broadcast after the order record has been updated.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    Created(Order),
    StatusChanged { order: Order, previous: OrderStatus },
    /// A transaction was sent but its fate is unknown locally
    ReconciliationRequired { order_id: OrderId, signature: String },
}

/// Result of one `execute_swap` call. Never an `Err`.
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub success: bool,
    /// `None` when the request was rejected before an order existed
    pub order_id: Option<OrderId>,
    pub status: Option<OrderStatus>,
    pub tx_signature: Option<String>,
    pub error: Option<SwapError>,
    pub message: String,
    pub quote: Option<Quote>,
    pub duration_ms: u64,
    pub needs_reconciliation: bool,
}

impl SwapOutcome {
    pub(crate) fn rejected(error: SwapError, started: Instant) -> Self {
        Self {
            success: false,
            order_id: None,
            status: None,
            tx_signature: None,
            message: error.user_message(),
            error: Some(error),
            quote: None,
            duration_ms: started.elapsed().as_millis() as u64,
            needs_reconciliation: false,
        }
    }
}

struct InFlightOrder {
    order: Order,
    cancel: watch::Sender<bool>,
}

/// Capabilities resolved once at the start of a swap.
struct Capabilities {
    quote_provider: Arc<dyn QuoteProvider>,
    builder: Arc<dyn TransactionBuilder>,
    signer: Arc<dyn TransactionSigner>,
    submitter: Arc<dyn TransactionSubmitter>,
    fee_estimator: Arc<PriorityFeeEstimator>,
    safety: Option<Arc<dyn SafetyValidator>>,
    simulator: Option<Arc<dyn TransactionSimulator>>,
}

pub struct SwapExecutor {
    quote_provider: Option<Arc<dyn QuoteProvider>>,
    builder: Option<Arc<dyn TransactionBuilder>>,
    signer: RwLock<Option<Arc<dyn TransactionSigner>>>,
    submitter: Option<Arc<dyn TransactionSubmitter>>,
    fee_estimator: Option<Arc<PriorityFeeEstimator>>,
    safety: Option<Arc<dyn SafetyValidator>>,
    simulator: Option<Arc<dyn TransactionSimulator>>,
    cache: Option<Arc<QuoteCache>>,
    comparator: RouteComparator,
    balances: Arc<BalanceBook>,
    history: Arc<dyn OrderHistory>,
    in_flight: DashMap<OrderId, InFlightOrder>,
    events: broadcast::Sender<OrderEvent>,
    clock: Arc<dyn Clock>,
    config: ExecutorConfig,
}

impl SwapExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let history = Arc::new(InMemoryOrderHistory::new(config.history_capacity));
        Self {
            quote_provider: None,
            builder: None,
            signer: RwLock::new(None),
            submitter: None,
            fee_estimator: None,
            safety: None,
            simulator: None,
            cache: None,
            comparator: RouteComparator::new(),
            balances: Arc::new(BalanceBook::new()),
            history,
            in_flight: DashMap::new(),
            events,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_quote_provider(mut self, provider: Arc<dyn QuoteProvider>) -> Self {
        self.quote_provider = Some(provider);
        self
    }

    pub fn with_transaction_builder(mut self, builder: Arc<dyn TransactionBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_signer(self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.connect_signer(signer);
        self
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn TransactionSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_fee_estimator(mut self, estimator: Arc<PriorityFeeEstimator>) -> Self {
        self.fee_estimator = Some(estimator);
        self
    }

    pub fn with_safety_validator(mut self, validator: Arc<dyn SafetyValidator>) -> Self {
        self.safety = Some(validator);
        self
    }

    pub fn with_simulator(mut self, simulator: Arc<dyn TransactionSimulator>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    pub fn with_quote_cache(mut self, cache: Arc<QuoteCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_balance_book(mut self, balances: Arc<BalanceBook>) -> Self {
        self.balances = balances;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn OrderHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn connect_signer(&self, signer: Arc<dyn TransactionSigner>) {
        if let Ok(mut slot) = self.signer.write() {
            info!("🔑 Signer connected: {}", signer.owner());
            *slot = Some(signer);
        }
    }

    pub fn disconnect_signer(&self) {
        if let Ok(mut slot) = self.signer.write() {
            *slot = None;
            info!("🔒 Signer disconnected");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }

    pub fn pending_order_ids(&self) -> Vec<OrderId> {
        self.in_flight.iter().map(|entry| *entry.key()).collect()
    }

    /// Snapshot of an in-flight order.
    pub fn order(&self, id: &OrderId) -> Option<Order> {
        self.in_flight.get(id).map(|entry| entry.order.clone())
    }

    pub fn balances(&self) -> Arc<BalanceBook> {
        Arc::clone(&self.balances)
    }

    pub fn history(&self) -> Arc<dyn OrderHistory> {
        Arc::clone(&self.history)
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms() as i64).unwrap_or_default()
    }

    fn emit(&self, event: OrderEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn capabilities(&self, owner: &str) -> Result<Capabilities> {
        let missing = |what: &str| SwapError::ConfigError(format!("{} not configured", what));

        if owner.trim().is_empty() {
            return Err(SwapError::ConfigError("wallet not connected".to_string()));
        }
        let signer = self
            .signer
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| SwapError::ConfigError("wallet not connected".to_string()))?;

        Ok(Capabilities {
            quote_provider: self.quote_provider.clone().ok_or_else(|| missing("quote provider"))?,
            builder: self.builder.clone().ok_or_else(|| missing("transaction builder"))?,
            signer,
            submitter: self.submitter.clone().ok_or_else(|| missing("RPC connection"))?,
            fee_estimator: self.fee_estimator.clone().ok_or_else(|| missing("fee estimator"))?,
            safety: self.safety.clone(),
            simulator: self.simulator.clone(),
        })
    }

    /// Run the swap on its own task.
    pub fn spawn_swap(
        self: &Arc<Self>,
        intent: SwapIntent,
        owner: String,
        config: SwapConfig,
    ) -> JoinHandle<SwapOutcome> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.execute_swap(intent, &owner, &config).await })
    }

    pub async fn execute_swap(&self, intent: SwapIntent, owner: &str, config: &SwapConfig) -> SwapOutcome {
        let started = Instant::now();

        let caps = match self.capabilities(owner) {
            Ok(caps) => caps,
            Err(e) => {
                warn!("❌ Swap rejected before order creation: {}", e);
                return SwapOutcome::rejected(e, started);
            }
        };
        let intent = match config.slippage_bps {
            Some(slippage_bps) => SwapIntent {
                slippage_bps,
                ..intent
            },
            None => intent,
        };
        if let Err(e) = intent.validate() {
            warn!("❌ Swap rejected before order creation: {}", e);
            return SwapOutcome::rejected(e, started);
        }

        // 1. order + optimistic delta before any network call
        let order_id = OrderId::new();
        let order = Order::new(order_id, intent.clone(), owner, self.now());
        let mut timer = Timer::start(&format!("swap {}", order_id));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.balances.apply(order_id, order.delta.clone());
        self.in_flight.insert(
            order_id,
            InFlightOrder {
                order: order.clone(),
                cancel: cancel_tx,
            },
        );
        info!(
            "🚀 Order {} created: {} {} of {}",
            order_id,
            intent.side,
            intent.amount,
            intent.pair()
        );
        self.emit(OrderEvent::Created(order));

        let result = self
            .run_pipeline(order_id, &intent, owner, config, &caps, &mut cancel_rx, &mut timer)
            .await;
        timer.finish_with_threshold(SLOW_SWAP_MS + config.confirmation_timeout_ms);
        self.finalize(order_id, result, started)
    }

    async fn run_pipeline(
        &self,
        order_id: OrderId,
        intent: &SwapIntent,
        owner: &str,
        config: &SwapConfig,
        caps: &Capabilities,
        cancel: &mut watch::Receiver<bool>,
        timer: &mut Timer,
    ) -> Result<String> {
        // 2. quote
        let quote = guarded(cancel, self.acquire_quote(intent, config, caps)).await?;
        timer.checkpoint("quote");
        self.update_order(order_id, |order| {
            order.quote = Some(quote.clone());
            Ok(())
        })?;

        // 3. safety
        match &caps.safety {
            Some(safety) => {
                let verdict = guarded(cancel, safety.validate(&intent.output_mint)).await?;
                if !verdict.safe {
                    return Err(SwapError::SafetyRejected(
                        verdict
                            .reason
                            .unwrap_or_else(|| "output token flagged as unsafe".to_string()),
                    ));
                }
            }
            None => debug!("No safety validator configured, skipping check"),
        }

        // 4. submitted + fee
        self.transition(order_id, OrderStatus::Submitted)?;
        let fee = match config.fee_override_micro_lamports {
            Some(rate) => FeeEstimate::manual(
                rate,
                config
                    .compute_unit_limit
                    .unwrap_or(caps.fee_estimator.config().default_compute_units),
                self.clock.now_ms(),
            ),
            None => {
                let estimate = caps.fee_estimator.estimate(
                    config.priority_level,
                    config.compute_unit_limit,
                    config.max_fee_lamports,
                );
                guarded(cancel, async { Ok(estimate.await) }).await?
            }
        };
        self.update_order(order_id, |order| {
            order.fee = Some(fee.clone());
            Ok(())
        })?;

        // 5. build, with one refetch if the quote went stale
        let quote = if quote.is_expired(self.clock.now_ms()) {
            warn!("⏰ Quote for order {} expired before build, refetching", order_id);
            let fresh = guarded(cancel, self.fresh_quote(intent, caps))
                .await
                .map_err(|e| match e {
                    SwapError::Cancelled(_) => e,
                    other => SwapError::QuoteExpired(other.to_string()),
                })?;
            if fresh.is_expired(self.clock.now_ms()) {
                return Err(SwapError::QuoteExpired(
                    "refetched quote was already stale".to_string(),
                ));
            }
            self.update_order(order_id, |order| {
                order.quote = Some(fresh.clone());
                Ok(())
            })?;
            fresh
        } else {
            quote
        };

        let transaction = guarded(cancel, caps.builder.build_swap_transaction(&quote, owner, Some(&fee)))
            .await
            .map_err(|e| match e {
                SwapError::Cancelled(_) | SwapError::BuildFailed(_) => e,
                other => SwapError::BuildFailed(other.to_string()),
            })?
            .ok_or_else(|| SwapError::BuildFailed("aggregator returned no transaction".to_string()))?;
        timer.checkpoint("build");

        if config.simulate {
            if let Some(simulator) = &caps.simulator {
                match guarded(cancel, simulator.simulate(&transaction)).await {
                    Ok(report) if !report.will_succeed => {
                        return Err(SwapError::SimulationFailed(
                            report
                                .error
                                .unwrap_or_else(|| "simulation predicted failure".to_string()),
                        ));
                    }
                    Ok(report) => debug!(
                        "🧪 Simulation passed ({} CU)",
                        report.units_consumed.unwrap_or_default()
                    ),
                    Err(e @ (SwapError::Cancelled(_) | SwapError::SimulationFailed(_))) => {
                        return Err(e)
                    }
                    Err(e) => warn!("⚠️  Simulation unavailable, continuing: {}", e),
                }
            }
        }

        // 6. sign + submit. Submission is not raced against cancel so a sent
        // transaction always has its signature recorded.
        let signed = guarded(cancel, caps.signer.sign(&transaction))
            .await
            .map_err(|e| match e {
                SwapError::Cancelled(_) | SwapError::SigningFailed(_) => e,
                other => SwapError::SigningFailed(other.to_string()),
            })?;
        let signature = caps.submitter.submit(&signed).await.map_err(|e| match e {
            SwapError::SubmissionFailed(_) => e,
            other => SwapError::SubmissionFailed(other.to_string()),
        })?;
        info!("📤 Order {} submitted: {}", order_id, signature);
        timer.checkpoint("submit");

        if self
            .update_order(order_id, |order| {
                order.tx_signature = Some(signature.clone());
                Ok(())
            })
            .is_err()
        {
            // Cancelled while the transaction was in flight to the node.
            warn!(
                "⚠️  Order {} was cancelled after {} was sent",
                order_id, signature
            );
            self.history.attach_late_signature(&order_id, &signature);
            self.emit(OrderEvent::ReconciliationRequired {
                order_id,
                signature: signature.clone(),
            });
            return Err(SwapError::CancelledAfterSubmission { signature });
        }

        self.await_confirmation(&signature, config, caps, cancel).await?;
        Ok(signature)
    }

    async fn acquire_quote(
        &self,
        intent: &SwapIntent,
        config: &SwapConfig,
        caps: &Capabilities,
    ) -> Result<Quote> {
        if config.use_cached_quote {
            if let Some(cache) = &self.cache {
                let now = self.clock.now_ms();
                match cache.get_cached_quote(&intent.pair(), Some(intent.amount)) {
                    Some(quote)
                        if quote.in_amount == intent.amount
                            && quote.slippage_bps == intent.slippage_bps
                            && !quote.is_expired(now) =>
                    {
                        info!(
                            "⚡ Using cached quote ({}ms left)",
                            quote.remaining_validity_ms(now)
                        );
                        return Ok(quote);
                    }
                    Some(_) => debug!("Cached quote unusable for this swap, fetching"),
                    None => debug!("No cached quote for {}", intent.pair()),
                }
            }
        }

        if config.compare_routes {
            let quotes = gather_route_variants(
                Arc::clone(&caps.quote_provider),
                intent,
                &RouteVariant::ALL,
                Duration::from_millis(self.config.route_variant_timeout_ms),
            )
            .await;
            return match self.comparator.best(&quotes, config.strategy) {
                Some(best) => {
                    info!(
                        "🏆 Selected route {} (score {:.1}, {} hops) under {}",
                        best.analysis.venues.join(" → "),
                        best.score,
                        best.analysis.hops,
                        config.strategy
                    );
                    Ok(best.quote)
                }
                None => Err(SwapError::QuoteUnavailable(format!(
                    "no route variant produced a quote for {}",
                    intent.pair()
                ))),
            };
        }

        self.fresh_quote(intent, caps).await
    }

    async fn fresh_quote(&self, intent: &SwapIntent, caps: &Capabilities) -> Result<Quote> {
        let request = intent.quote_request(RouteVariant::Default);
        let timeout = Duration::from_millis(self.config.quote_timeout_ms);
        match tokio::time::timeout(timeout, caps.quote_provider.get_quote(&request)).await {
            Ok(Ok(Some(quote))) => Ok(quote),
            Ok(Ok(None)) => Err(SwapError::QuoteUnavailable(format!(
                "{} has no route for {}",
                caps.quote_provider.name(),
                intent.pair()
            ))),
            Ok(Err(e)) => Err(SwapError::QuoteUnavailable(e.to_string())),
            Err(_) => Err(SwapError::QuoteUnavailable(format!(
                "quote request timed out after {:?}",
                timeout
            ))),
        }
    }

    /// Poll until a terminal status, an on-chain error or the deadline.
    /// Polling errors count as "still pending".
    async fn await_confirmation(
        &self,
        signature: &str,
        config: &SwapConfig,
        caps: &Capabilities,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let timeout = Duration::from_millis(config.confirmation_timeout_ms);
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        let deadline = Instant::now() + timeout;
        let mut polls: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let status = guarded(cancel, async {
                Ok(tokio::time::timeout(remaining, caps.submitter.confirmation_status(signature)).await)
            })
            .await?;
            polls += 1;

            match status {
                Ok(Ok(status)) if status.is_success() => {
                    info!("✅ {} confirmed after {} polls", signature, polls);
                    return Ok(());
                }
                Ok(Ok(ConfirmationStatus::Errored(reason))) => {
                    error!("💥 {} failed on-chain: {}", signature, reason);
                    return Err(SwapError::OnChainError {
                        signature: signature.to_string(),
                        reason,
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("Status poll for {} failed: {}", signature, e),
                Err(_) => debug!("Status poll for {} hit the deadline", signature),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "⏳ {} not confirmed within {:?} ({} polls)",
                    signature, timeout, polls
                );
                return Err(SwapError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            let nap = poll_interval.min(deadline - now);
            guarded(cancel, async {
                tokio::time::sleep(nap).await;
                Ok(())
            })
            .await?;
        }
    }

    /// Mutate the in-flight record. `Cancelled` when the order is no longer ours.
    fn update_order<F>(&self, order_id: OrderId, mutate: F) -> Result<Order>
    where
        F: FnOnce(&mut Order) -> Result<()>,
    {
        let mut entry = self
            .in_flight
            .get_mut(&order_id)
            .ok_or_else(|| SwapError::Cancelled(format!("order {} is no longer active", order_id)))?;
        mutate(&mut entry.order)?;
        Ok(entry.order.clone())
    }

    fn transition(&self, order_id: OrderId, next: OrderStatus) -> Result<()> {
        let at = self.now();
        let mut previous = next;
        let order = self.update_order(order_id, |order| {
            previous = order.status;
            order.transition(next, at)
        })?;
        debug!("Order {}: {} -> {}", order_id, previous, next);
        self.emit(OrderEvent::StatusChanged { order, previous });
        Ok(())
    }

    /// The single finalization routine. Runs its side effects only if this
    /// call is the one that removes the order from the in-flight map.
    fn finalize(&self, order_id: OrderId, result: Result<String>, started: Instant) -> SwapOutcome {
        let duration_ms = started.elapsed().as_millis() as u64;

        let Some((_, entry)) = self.in_flight.remove(&order_id) else {
            // Already finalized by cancel_order.
            let order = self.history.get(&order_id);
            let sent = match result {
                Err(SwapError::CancelledAfterSubmission { signature }) => Some(signature),
                _ => order.as_ref().and_then(|o| o.tx_signature.clone()),
            };
            let error = match sent.clone() {
                Some(signature) => SwapError::CancelledAfterSubmission { signature },
                None => SwapError::Cancelled("cancelled by user".to_string()),
            };
            return SwapOutcome {
                success: false,
                order_id: Some(order_id),
                status: Some(OrderStatus::Cancelled),
                tx_signature: sent,
                message: error.user_message(),
                needs_reconciliation: error.needs_reconciliation(),
                error: Some(error),
                quote: order.and_then(|o| o.quote),
                duration_ms,
            };
        };

        let mut order = entry.order;
        let previous = order.status;
        let at = self.now();

        let outcome = match result {
            Ok(signature) => {
                if let Err(e) = order.transition(OrderStatus::Filled, at) {
                    error!("Order {} could not be marked filled: {}", order_id, e);
                }
                self.balances.commit(&order_id);
                order.tx_signature = Some(signature.clone());
                info!("🎉 Order {} filled in {}ms", order_id, duration_ms);
                SwapOutcome {
                    success: true,
                    order_id: Some(order_id),
                    status: Some(order.status),
                    tx_signature: Some(signature),
                    error: None,
                    message: "Swap confirmed".to_string(),
                    quote: order.quote.clone(),
                    duration_ms,
                    needs_reconciliation: false,
                }
            }
            Err(e) => {
                if let Err(transition_error) = order.transition(OrderStatus::Failed, at) {
                    error!(
                        "Order {} could not be marked failed: {}",
                        order_id, transition_error
                    );
                }
                self.balances.revert(&order_id);
                order.error = Some(e.to_string());
                order.needs_reconciliation = e.needs_reconciliation();
                warn!(
                    "❌ Order {} failed ({:?}): {}",
                    order_id,
                    e.categorize(),
                    e
                );
                SwapOutcome {
                    success: false,
                    order_id: Some(order_id),
                    status: Some(order.status),
                    tx_signature: order.tx_signature.clone(),
                    message: e.user_message(),
                    needs_reconciliation: e.needs_reconciliation(),
                    error: Some(e),
                    quote: order.quote.clone(),
                    duration_ms,
                }
            }
        };

        self.history.record(order.clone());
        let reconcile = order
            .tx_signature
            .clone()
            .filter(|_| order.needs_reconciliation);
        self.emit(OrderEvent::StatusChanged { order, previous });
        if let Some(signature) = reconcile {
            self.emit(OrderEvent::ReconciliationRequired {
                order_id,
                signature,
            });
        }
        outcome
    }

    /// Cancel an in-flight order. `false` if it is unknown or already terminal.
    /// A transaction that was already sent is not retracted; the order is
    /// flagged for reconciliation instead.
    pub fn cancel_order(&self, order_id: &OrderId) -> bool {
        let Some((_, entry)) = self.in_flight.remove(order_id) else {
            debug!("Cancel ignored, order {} is not in flight", order_id);
            return false;
        };

        let mut order = entry.order;
        let previous = order.status;
        if let Err(e) = order.transition(OrderStatus::Cancelled, self.now()) {
            error!("Order {} could not be cancelled cleanly: {}", order_id, e);
        }
        self.balances.revert(order_id);
        order.error = Some("cancelled by user".to_string());
        order.needs_reconciliation = order.tx_signature.is_some();
        info!("🛑 Order {} cancelled (was {})", order_id, previous);

        self.history.record(order.clone());
        let _ = entry.cancel.send(true);

        let reconcile = order
            .tx_signature
            .clone()
            .filter(|_| order.needs_reconciliation);
        self.emit(OrderEvent::StatusChanged { order, previous });
        if let Some(signature) = reconcile {
            self.emit(OrderEvent::ReconciliationRequired {
                order_id: *order_id,
                signature,
            });
        }
        true
    }
}

/// Race `operation` against the order's cancel signal.
async fn guarded<T, F>(cancel: &mut watch::Receiver<bool>, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(SwapError::Cancelled("cancelled by user".to_string())),
        result = operation => result,
    }
}

/// Resolves once the flag is set or the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        liquidity::{fees::FeeEstimatorConfig, types::SwapSide},
        testing::{
            sample_quote, ConfirmationScript, MockFeeSampleSource, MockQuoteProvider,
            MockSafetyValidator, MockSigner, MockSimulator, MockSubmitter,
            MockTransactionBuilder, SimulationMode, SOL_MINT, USDC_MINT,
        },
    };
    use pretty_assertions::assert_eq;

    struct Harness {
        executor: Arc<SwapExecutor>,
        provider: Arc<MockQuoteProvider>,
        builder: Arc<MockTransactionBuilder>,
        submitter: Arc<MockSubmitter>,
    }

    fn harness(script: ConfirmationScript, simulation: SimulationMode) -> Harness {
        harness_with(MockSubmitter::new(script), simulation)
    }

    fn harness_with(submitter: MockSubmitter, simulation: SimulationMode) -> Harness {
        let provider = Arc::new(MockQuoteProvider::returning(
            "mock",
            vec![sample_quote(150_000, 0.2, &["Orca"])],
        ));
        let builder = Arc::new(MockTransactionBuilder::new());
        let submitter = Arc::new(submitter);
        let fees = Arc::new(PriorityFeeEstimator::new(
            Arc::new(MockFeeSampleSource::new(vec![5_000, 10_000, 20_000])),
            FeeEstimatorConfig::default(),
            Arc::new(SystemClock),
        ));
        let executor = SwapExecutor::new(ExecutorConfig::default())
            .with_quote_provider(provider.clone())
            .with_transaction_builder(builder.clone())
            .with_signer(Arc::new(MockSigner::new("owner")))
            .with_submitter(submitter.clone())
            .with_fee_estimator(fees)
            .with_safety_validator(Arc::new(MockSafetyValidator::allow_all()))
            .with_simulator(Arc::new(MockSimulator::new(simulation)));
        Harness {
            executor: Arc::new(executor),
            provider,
            builder,
            submitter,
        }
    }

    fn intent() -> SwapIntent {
        SwapIntent::new(SOL_MINT, USDC_MINT, 1_000_000, SwapSide::Acquire, 50)
    }

    fn fast_config() -> SwapConfig {
        SwapConfig {
            poll_interval_ms: 10,
            confirmation_timeout_ms: 1_000,
            ..SwapConfig::default()
        }
    }

    #[tokio::test]
    async fn test_successful_swap_commits_delta() {
        let h = harness(ConfirmationScript::ConfirmAfter(2), SimulationMode::Succeed);
        let balances = h.executor.balances();
        balances.set_confirmed(SOL_MINT, 5_000_000);

        let outcome = h.executor.execute_swap(intent(), "owner", &fast_config()).await;

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.status, Some(OrderStatus::Filled));
        assert_eq!(outcome.tx_signature.as_deref(), Some("sig-owner-0"));
        assert_eq!(balances.confirmed_balance(SOL_MINT), 4_000_000);
        assert_eq!(balances.display_balance(SOL_MINT), 4_000_000);
        assert!(h.executor.pending_order_ids().is_empty());
        assert_eq!(h.submitter.polls_for("sig-owner-0"), 3);

        let archived = h.executor.history().get(&outcome.order_id.unwrap()).unwrap();
        assert_eq!(archived.status, OrderStatus::Filled);
        assert!(archived.fee.is_some());
    }

    #[tokio::test]
    async fn test_missing_wallet_creates_no_order() {
        let h = harness(ConfirmationScript::ConfirmAfter(0), SimulationMode::Succeed);
        h.executor.disconnect_signer();

        let outcome = h.executor.execute_swap(intent(), "owner", &fast_config()).await;
        assert!(!outcome.success);
        assert!(outcome.order_id.is_none());
        assert!(matches!(outcome.error, Some(SwapError::ConfigError(_))));
        assert_eq!(h.provider.calls(), 0);
        assert!(h.executor.history().recent(10).is_empty());
    }

    #[tokio::test]
    async fn test_predicted_failure_is_terminal() {
        let h = harness(
            ConfirmationScript::ConfirmAfter(0),
            SimulationMode::Revert("slippage tolerance exceeded".to_string()),
        );
        let outcome = h.executor.execute_swap(intent(), "owner", &fast_config()).await;

        assert!(matches!(outcome.error, Some(SwapError::SimulationFailed(_))));
        assert_eq!(outcome.status, Some(OrderStatus::Failed));
        assert!(h.submitter.submitted().is_empty());
        assert!(outcome.message.contains("never at risk"));
        assert_eq!(h.executor.balances().display_balance(SOL_MINT), 0);
    }

    #[tokio::test]
    async fn test_simulator_error_is_terminal() {
        let h = harness(
            ConfirmationScript::ConfirmAfter(0),
            SimulationMode::Reject("insufficient funds for rent".to_string()),
        );
        let outcome = h.executor.execute_swap(intent(), "owner", &fast_config()).await;

        assert!(matches!(outcome.error, Some(SwapError::SimulationFailed(_))));
        assert_eq!(outcome.status, Some(OrderStatus::Failed));
        assert!(h.submitter.submitted().is_empty());
        assert_eq!(h.executor.balances().display_balance(SOL_MINT), 0);
    }

    #[tokio::test]
    async fn test_unavailable_simulation_does_not_block() {
        let h = harness(ConfirmationScript::ConfirmAfter(0), SimulationMode::Unavailable);
        let outcome = h.executor.execute_swap(intent(), "owner", &fast_config()).await;
        assert!(outcome.success, "{}", outcome.message);
    }

    #[tokio::test]
    async fn test_fee_override_skips_estimator() {
        let h = harness(ConfirmationScript::ConfirmAfter(0), SimulationMode::Succeed);
        let config = SwapConfig {
            fee_override_micro_lamports: Some(42_000),
            compute_unit_limit: Some(300_000),
            ..fast_config()
        };
        h.executor.execute_swap(intent(), "owner", &config).await;

        let fee = h.builder.last_fee().unwrap();
        assert_eq!(fee.micro_lamports_per_cu, 42_000);
        assert_eq!(fee.compute_units, 300_000);
        assert_eq!(fee.total_fee_lamports, 12_600);
    }

    #[tokio::test]
    async fn test_events_follow_record_updates() {
        let h = harness(ConfirmationScript::ConfirmAfter(0), SimulationMode::Succeed);
        let mut events = h.executor.subscribe();

        let outcome = h.executor.execute_swap(intent(), "owner", &fast_config()).await;
        assert!(outcome.success);

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                OrderEvent::Created(order) => statuses.push(order.status),
                OrderEvent::StatusChanged { order, .. } => statuses.push(order.status),
                OrderEvent::ReconciliationRequired { .. } => panic!("unexpected reconciliation"),
            }
        }
        assert_eq!(
            statuses,
            vec![OrderStatus::Pending, OrderStatus::Submitted, OrderStatus::Filled]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_polling() {
        let h = harness(ConfirmationScript::AlwaysPending, SimulationMode::Succeed);
        let balances = h.executor.balances();
        let mut events = h.executor.subscribe();

        let task = h
            .executor
            .spawn_swap(intent(), "owner".to_string(), SwapConfig::default());

        // wait until the order has been submitted
        let order_id = loop {
            if let Ok(OrderEvent::StatusChanged { order, .. }) = events.recv().await {
                if order.status == OrderStatus::Submitted {
                    break order.id;
                }
            }
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(balances.display_balance(SOL_MINT), -1_000_000);

        assert!(h.executor.cancel_order(&order_id));
        assert!(!h.executor.cancel_order(&order_id));

        let outcome = task.await.unwrap();
        assert_eq!(outcome.status, Some(OrderStatus::Cancelled));
        assert!(matches!(
            outcome.error,
            Some(SwapError::CancelledAfterSubmission { .. })
        ));
        assert!(outcome.needs_reconciliation);
        assert_eq!(balances.display_balance(SOL_MINT), 0);
        assert_eq!(
            h.executor.history().get(&order_id).unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_submission_keeps_the_signature() {
        let h = harness_with(
            MockSubmitter::new(ConfirmationScript::ConfirmAfter(0))
                .with_latency(Duration::from_millis(500)),
            SimulationMode::Succeed,
        );
        let mut events = h.executor.subscribe();

        let task = h
            .executor
            .spawn_swap(intent(), "owner".to_string(), fast_config());
        let order_id = loop {
            if let Ok(OrderEvent::StatusChanged { order, .. }) = events.recv().await {
                if order.status == OrderStatus::Submitted {
                    break order.id;
                }
            }
        };
        // submit call is now in flight
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(h.executor.cancel_order(&order_id));

        let outcome = task.await.unwrap();
        assert_eq!(h.submitter.submitted(), vec!["sig-owner-0".to_string()]);
        assert_eq!(outcome.status, Some(OrderStatus::Cancelled));
        assert_eq!(outcome.tx_signature.as_deref(), Some("sig-owner-0"));
        assert!(outcome.needs_reconciliation);
        assert!(!outcome.message.contains("never at risk"));
        assert!(outcome.message.contains("sig-owner-0"));

        let archived = h.executor.history().get(&order_id).unwrap();
        assert_eq!(archived.status, OrderStatus::Cancelled);
        assert_eq!(archived.tx_signature.as_deref(), Some("sig-owner-0"));
        assert!(archived.needs_reconciliation);
        assert_eq!(h.executor.balances().display_balance(SOL_MINT), 0);

        let mut flagged = false;
        while let Ok(event) = events.try_recv() {
            if let OrderEvent::ReconciliationRequired { signature, .. } = event {
                flagged = signature == "sig-owner-0";
            }
        }
        assert!(flagged);
    }
}
