//! Scriptable in-memory capabilities for exercising the swap pipeline
//! without a network.

use crate::{
    error::{Result, SwapError},
    liquidity::providers::{
        FeeOracle, FeeSampleSource, QuoteProvider, SafetyValidator, TransactionBuilder,
        TransactionSigner, TransactionSimulator, TransactionSubmitter,
    },
    liquidity::types::{
        ConfirmationStatus, FeeEstimate, PriorityLevel, Quote, QuoteRequest, RouteStep,
        RouteVariant, SafetyVerdict, SignedTransaction, SimulationReport, SwapTransaction,
        DEFAULT_QUOTE_VALIDITY_MS,
    },
    utils::{Clock, SystemClock},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// SOL→USDC quote for 1_000_000 lamports, stamped with the system clock.
pub fn sample_quote(out_amount: u64, price_impact_pct: f64, venues: &[&str]) -> Quote {
    let now = SystemClock.now_ms();
    Quote {
        input_mint: SOL_MINT.to_string(),
        output_mint: USDC_MINT.to_string(),
        in_amount: 1_000_000,
        out_amount,
        min_out_amount: out_amount - out_amount / 200,
        slippage_bps: 50,
        price_impact_pct,
        route: venues
            .iter()
            .enumerate()
            .map(|(i, venue)| RouteStep {
                venue: venue.to_string(),
                amm_key: Some(format!("{}-amm-{}", venue.to_lowercase(), i)),
                in_amount: None,
                out_amount: None,
                percent: Some(100),
            })
            .collect(),
        fetched_at_ms: now,
        expires_at_ms: now + DEFAULT_QUOTE_VALIDITY_MS,
        raw: None,
    }
}

pub struct MockQuoteProvider {
    name: String,
    quotes: Vec<Quote>,
    by_variant: HashMap<RouteVariant, Quote>,
    failing: AtomicBool,
    latency: Option<Duration>,
    calls: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl MockQuoteProvider {
    /// Cycles through `quotes`; an empty list answers `Ok(None)`.
    pub fn returning(name: &str, quotes: Vec<Quote>) -> Self {
        Self {
            name: name.to_string(),
            quotes,
            by_variant: HashMap::new(),
            failing: AtomicBool::new(false),
            latency: None,
            calls: AtomicUsize::new(0),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn failing(name: &str) -> Self {
        let provider = Self::returning(name, vec![]);
        provider.failing.store(true, Ordering::SeqCst);
        provider
    }

    pub fn with_variant(mut self, variant: RouteVariant, quote: Quote) -> Self {
        self.by_variant.insert(variant, quote);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn stamp(&self, mut quote: Quote, request: &QuoteRequest) -> Quote {
        let now = self.clock.now_ms();
        quote.input_mint = request.input_mint.clone();
        quote.output_mint = request.output_mint.clone();
        quote.in_amount = request.amount;
        quote.slippage_bps = request.slippage_bps;
        quote.fetched_at_ms = now;
        quote.expires_at_ms = now + DEFAULT_QUOTE_VALIDITY_MS;
        quote
    }
}

#[async_trait]
impl QuoteProvider for MockQuoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<Quote>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SwapError::NetworkError(format!("{} unreachable", self.name)));
        }
        if let Some(quote) = self.by_variant.get(&request.variant) {
            return Ok(Some(self.stamp(quote.clone(), request)));
        }
        if self.quotes.is_empty() {
            return Ok(None);
        }
        let quote = self.quotes[call % self.quotes.len()].clone();
        Ok(Some(self.stamp(quote, request)))
    }
}

#[derive(Default)]
pub struct MockTransactionBuilder {
    fail: bool,
    returns_none: bool,
    last_fee: Mutex<Option<FeeEstimate>>,
    calls: AtomicUsize,
}

impl MockTransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn without_route() -> Self {
        Self {
            returns_none: true,
            ..Self::default()
        }
    }

    pub fn last_fee(&self) -> Option<FeeEstimate> {
        self.last_fee.lock().ok().and_then(|fee| fee.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionBuilder for MockTransactionBuilder {
    async fn build_swap_transaction(
        &self,
        _quote: &Quote,
        _owner: &str,
        fee: Option<&FeeEstimate>,
    ) -> Result<Option<SwapTransaction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_fee.lock() {
            *last = fee.cloned();
        }
        if self.fail {
            return Err(SwapError::JupiterApiError("swap endpoint returned 500".to_string()));
        }
        if self.returns_none {
            return Ok(None);
        }
        Ok(Some(SwapTransaction {
            encoded: "bW9jay10cmFuc2FjdGlvbg==".to_string(),
            last_valid_block_height: Some(250_000_000),
            compute_unit_limit: fee.map(|f| f.compute_units),
            prioritization_fee_lamports: fee.map(|f| f.total_fee_lamports),
        }))
    }
}

pub struct MockSigner {
    owner: String,
    fail: bool,
    counter: AtomicUsize,
}

impl MockSigner {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            fail: false,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(owner: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(owner)
        }
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn owner(&self) -> String {
        self.owner.clone()
    }

    async fn sign(&self, _transaction: &SwapTransaction) -> Result<SignedTransaction> {
        if self.fail {
            return Err(SwapError::SigningFailed("user rejected the request".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SignedTransaction {
            signature: format!("sig-{}-{}", self.owner, n),
            wire: vec![n as u8],
        })
    }
}

/// How the mock network reports on a submitted transaction.
#[derive(Debug, Clone)]
pub enum ConfirmationScript {
    /// `Pending` for `n` polls, then `Confirmed`
    ConfirmAfter(usize),
    /// Never reaches a terminal status
    AlwaysPending,
    /// `Pending` for `n` polls, then `Errored(reason)`
    FailAfter(usize, String),
}

pub struct MockSubmitter {
    script: ConfirmationScript,
    reject_submission: bool,
    latency: Option<Duration>,
    submitted: Mutex<Vec<String>>,
    polls: Mutex<HashMap<String, usize>>,
}

impl MockSubmitter {
    pub fn new(script: ConfirmationScript) -> Self {
        Self {
            script,
            reject_submission: false,
            latency: None,
            submitted: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject_submission: true,
            ..Self::new(ConfirmationScript::AlwaysPending)
        }
    }

    /// Hold every submit call for `latency` before the node "accepts" it.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn polls_for(&self, signature: &str) -> usize {
        self.polls
            .lock()
            .ok()
            .and_then(|p| p.get(signature).copied())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TransactionSubmitter for MockSubmitter {
    async fn submit(&self, transaction: &SignedTransaction) -> Result<String> {
        if self.reject_submission {
            return Err(SwapError::SubmissionFailed("blockhash not found".to_string()));
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(transaction.signature.clone());
        }
        Ok(transaction.signature.clone())
    }

    async fn confirmation_status(&self, signature: &str) -> Result<ConfirmationStatus> {
        let seen = {
            let mut polls = self
                .polls
                .lock()
                .map_err(|_| SwapError::RpcError("poisoned".to_string()))?;
            let count = polls.entry(signature.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        Ok(match &self.script {
            ConfirmationScript::AlwaysPending => ConfirmationStatus::Pending,
            ConfirmationScript::ConfirmAfter(n) if seen > *n => ConfirmationStatus::Confirmed,
            ConfirmationScript::FailAfter(n, reason) if seen > *n => {
                ConfirmationStatus::Errored(reason.clone())
            }
            _ => ConfirmationStatus::Pending,
        })
    }
}

#[derive(Debug, Clone)]
pub enum SimulationMode {
    Succeed,
    Revert(String),
    /// Simulator itself reports the failure as an error
    Reject(String),
    Unavailable,
}

pub struct MockSimulator {
    mode: SimulationMode,
    calls: AtomicUsize,
}

impl MockSimulator {
    pub fn new(mode: SimulationMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSimulator for MockSimulator {
    async fn simulate(&self, _transaction: &SwapTransaction) -> Result<SimulationReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            SimulationMode::Succeed => Ok(SimulationReport {
                will_succeed: true,
                units_consumed: Some(180_000),
                error: None,
                logs: vec![],
            }),
            SimulationMode::Revert(reason) => Ok(SimulationReport {
                will_succeed: false,
                units_consumed: Some(40_000),
                error: Some(reason.clone()),
                logs: vec![],
            }),
            SimulationMode::Reject(reason) => Err(SwapError::SimulationFailed(reason.clone())),
            SimulationMode::Unavailable => Err(SwapError::SimulationUnavailable(
                "simulation endpoint offline".to_string(),
            )),
        }
    }
}

#[derive(Default)]
pub struct MockSafetyValidator {
    flagged: HashMap<String, String>,
}

impl MockSafetyValidator {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn flag(mut self, mint: &str, reason: &str) -> Self {
        self.flagged.insert(mint.to_string(), reason.to_string());
        self
    }
}

#[async_trait]
impl SafetyValidator for MockSafetyValidator {
    async fn validate(&self, mint: &str) -> Result<SafetyVerdict> {
        Ok(match self.flagged.get(mint) {
            Some(reason) => SafetyVerdict::unsafe_because(reason.clone()),
            None => SafetyVerdict::safe(),
        })
    }
}

#[derive(Default)]
pub struct MockFeeSampleSource {
    samples: Mutex<Vec<u64>>,
    fail: AtomicBool,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFeeSampleSource {
    pub fn new(samples: Vec<u64>) -> Self {
        Self {
            samples: Mutex::new(samples),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_samples(&self, samples: Vec<u64>) {
        if let Ok(mut current) = self.samples.lock() {
            *current = samples;
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeeSampleSource for MockFeeSampleSource {
    async fn recent_fee_samples(&self) -> Result<Vec<u64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SwapError::RpcError("getRecentPrioritizationFees failed".to_string()));
        }
        Ok(self.samples.lock().map(|s| s.clone()).unwrap_or_default())
    }
}

pub struct MockFeeOracle {
    value: Option<f64>,
}

impl MockFeeOracle {
    pub fn answering(micro_lamports_per_cu: f64) -> Self {
        Self {
            value: Some(micro_lamports_per_cu),
        }
    }

    pub fn broken() -> Self {
        Self { value: None }
    }
}

#[async_trait]
impl FeeOracle for MockFeeOracle {
    fn name(&self) -> &str {
        "mock-oracle"
    }

    async fn priority_fee_estimate(&self, _level: PriorityLevel) -> Result<f64> {
        self.value
            .ok_or_else(|| SwapError::NetworkError("oracle offline".to_string()))
    }
}
