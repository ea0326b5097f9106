//! Priority fee estimation
//!
//! Percentile-based compute unit price over recently observed network fees,
//! with a short-lived sample cache shared by every caller. Concurrent callers
//! arriving while a fetch is outstanding await that same fetch.

use crate::{
    error::{Result, SwapError},
    liquidity::{
        providers::{FeeOracle, FeeSampleSource},
        types::{FeeEstimate, FeeSource, PriorityLevel},
    },
    utils::Clock,
};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};
use tokio::task::JoinHandle;

pub const MICRO_LAMPORTS_PER_LAMPORT: u64 = 1_000_000;

pub const DEFAULT_RATE_MICRO_LAMPORTS: u64 = 10_000;
pub const MIN_RATE_MICRO_LAMPORTS: u64 = 1_000;
pub const MAX_RATE_MICRO_LAMPORTS: u64 = 2_000_000;
pub const DEFAULT_COMPUTE_UNITS: u32 = 200_000;
/// Per-transaction compute budget limit
pub const MAX_COMPUTE_UNITS: u32 = 1_400_000;
/// 0.005 SOL
pub const DEFAULT_MAX_FEE_LAMPORTS: u64 = 5_000_000;
pub const DEFAULT_SAMPLE_TTL_MS: u64 = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeEstimatorConfig {
    pub sample_ttl_ms: u64,
    pub default_rate: u64,
    pub min_rate: u64,
    pub max_rate: u64,
    pub default_compute_units: u32,
    pub max_fee_lamports: u64,
    pub oracle_timeout_ms: u64,
}

impl Default for FeeEstimatorConfig {
    fn default() -> Self {
        Self {
            sample_ttl_ms: DEFAULT_SAMPLE_TTL_MS,
            default_rate: DEFAULT_RATE_MICRO_LAMPORTS,
            min_rate: MIN_RATE_MICRO_LAMPORTS,
            max_rate: MAX_RATE_MICRO_LAMPORTS,
            default_compute_units: DEFAULT_COMPUTE_UNITS,
            max_fee_lamports: DEFAULT_MAX_FEE_LAMPORTS,
            oracle_timeout_ms: 2_000,
        }
    }
}

type SampleFetch = Shared<BoxFuture<'static, Result<Arc<Vec<u64>>>>>;

#[derive(Default)]
struct SampleState {
    /// Sorted ascending, with the time they were fetched
    cached: Option<(Arc<Vec<u64>>, u64)>,
    inflight: Option<SampleFetch>,
    /// Bumped on invalidation so late fetches from an old connection are discarded
    generation: u64,
}

pub struct PriorityFeeEstimator {
    source: RwLock<Arc<dyn FeeSampleSource>>,
    oracle: Option<Arc<dyn FeeOracle>>,
    config: FeeEstimatorConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SampleState>>,
}

impl PriorityFeeEstimator {
    pub fn new(
        source: Arc<dyn FeeSampleSource>,
        config: FeeEstimatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "💸 Priority fee estimator ready (rate {}-{} µL/CU, ceiling {} lamports)",
            config.min_rate, config.max_rate, config.max_fee_lamports
        );
        Self {
            source: RwLock::new(source),
            oracle: None,
            config,
            clock,
            state: Arc::new(Mutex::new(SampleState::default())),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn FeeOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &FeeEstimatorConfig {
        &self.config
    }

    /// Point the estimator at a new connection. Cached samples are dropped.
    pub fn replace_source(&self, source: Arc<dyn FeeSampleSource>) {
        if let Ok(mut current) = self.source.write() {
            *current = source;
        }
        self.invalidate();
        info!("🔌 Fee sample source replaced, cache invalidated");
    }

    pub fn invalidate(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.cached = None;
            state.inflight = None;
            state.generation = state.generation.wrapping_add(1);
        }
    }

    /// Sorted recent samples, from cache when fresh.
    pub async fn samples(&self) -> Result<Arc<Vec<u64>>> {
        self.fetch_samples(false).await
    }

    /// Fetch regardless of cache age, still joining any outstanding fetch.
    pub async fn refresh(&self) -> Result<Arc<Vec<u64>>> {
        self.fetch_samples(true).await
    }

    async fn fetch_samples(&self, force: bool) -> Result<Arc<Vec<u64>>> {
        let fetch = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| SwapError::RpcError("fee sample cache poisoned".to_string()))?;

            if !force {
                if let Some((samples, fetched_at)) = &state.cached {
                    if self.clock.now_ms().saturating_sub(*fetched_at) < self.config.sample_ttl_ms {
                        return Ok(Arc::clone(samples));
                    }
                }
            }

            if let Some(fetch) = state.inflight.clone() {
                fetch
            } else {
                let fetch = self.start_fetch(state.generation);
                state.inflight = Some(fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    fn start_fetch(&self, generation: u64) -> SampleFetch {
        let source = self
            .source
            .read()
            .map(|s| Arc::clone(&s))
            .ok();
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);

        async move {
            let source = source
                .ok_or_else(|| SwapError::RpcError("fee sample source unavailable".to_string()))?;
            let result = source.recent_fee_samples().await.map(|mut samples| {
                samples.sort_unstable();
                Arc::new(samples)
            });

            if let Ok(mut state) = state.lock() {
                if state.generation == generation {
                    if let Ok(samples) = &result {
                        state.cached = Some((Arc::clone(samples), clock.now_ms()));
                    }
                    state.inflight = None;
                }
            }
            match &result {
                Ok(samples) => debug!("📊 Fetched {} prioritization fee samples", samples.len()),
                Err(e) => warn!("⚠️  Prioritization fee fetch failed: {}", e),
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Stale samples from a previous fetch, if any.
    fn last_known_samples(&self) -> Option<Arc<Vec<u64>>> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.cached.as_ref().map(|(s, _)| Arc::clone(s)))
    }

    /// Fee for `level`. Never fails: with no usable samples the default rate applies.
    pub async fn estimate(
        &self,
        level: PriorityLevel,
        compute_units: Option<u32>,
        max_fee_lamports: Option<u64>,
    ) -> FeeEstimate {
        let samples = match self.samples().await {
            Ok(samples) => samples,
            Err(_) => self.last_known_samples().unwrap_or_default(),
        };
        let estimate = compute_estimate(
            &samples,
            level,
            compute_units.unwrap_or(self.config.default_compute_units),
            max_fee_lamports.unwrap_or(self.config.max_fee_lamports),
            &self.config,
            self.clock.now_ms(),
        );
        debug!(
            "💸 {} priority: {} µL/CU, {} lamports total (p{} of {} samples, {:?})",
            level,
            estimate.micro_lamports_per_cu,
            estimate.total_fee_lamports,
            estimate.percentile,
            estimate.sample_size,
            estimate.source
        );
        estimate
    }

    /// One estimate per level, sharing a single sample fetch.
    pub async fn estimate_all(
        &self,
        compute_units: Option<u32>,
        max_fee_lamports: Option<u64>,
    ) -> Vec<FeeEstimate> {
        let mut estimates = Vec::with_capacity(PriorityLevel::ALL.len());
        for level in PriorityLevel::ALL {
            estimates.push(self.estimate(level, compute_units, max_fee_lamports).await);
        }
        estimates
    }

    /// Secondary path through the external oracle. Best effort: `None` on any failure.
    pub async fn estimate_via_oracle(
        &self,
        level: PriorityLevel,
        compute_units: Option<u32>,
        max_fee_lamports: Option<u64>,
    ) -> Option<FeeEstimate> {
        let oracle = self.oracle.as_ref()?;
        let timeout = Duration::from_millis(self.config.oracle_timeout_ms);

        let suggested = match tokio::time::timeout(timeout, oracle.priority_fee_estimate(level)).await
        {
            Ok(Ok(value)) if value.is_finite() && value >= 0.0 => value,
            Ok(Ok(value)) => {
                debug!("{} returned unusable fee {}", oracle.name(), value);
                return None;
            }
            Ok(Err(e)) => {
                debug!("{} fee estimate failed: {}", oracle.name(), e);
                return None;
            }
            Err(_) => {
                debug!("{} fee estimate timed out", oracle.name());
                return None;
            }
        };

        let compute_units = compute_units.unwrap_or(self.config.default_compute_units);
        let ceiling = max_fee_lamports.unwrap_or(self.config.max_fee_lamports);
        let rate = (suggested.ceil() as u64).clamp(self.config.min_rate, self.config.max_rate);
        let fit = apply_ceiling(rate, compute_units, ceiling, self.config.min_rate);

        Some(FeeEstimate {
            level,
            micro_lamports_per_cu: fit.rate,
            total_fee_lamports: fit.total,
            compute_units,
            percentile: level.percentile(),
            sample_size: 0,
            source: FeeSource::Oracle,
            computed_at_ms: self.clock.now_ms(),
            ceiling_infeasible: fit.infeasible,
        })
    }

    /// Periodically refresh samples so swaps rarely wait on the RPC.
    pub fn spawn_background_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let estimator = Arc::clone(self);
        info!("🔄 Fee sample refresh every {:?}", every);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = estimator.refresh().await {
                    debug!("Background fee refresh failed: {}", e);
                }
            }
        })
    }
}

/// Pure estimate over `sorted_samples` (ascending).
pub fn compute_estimate(
    sorted_samples: &[u64],
    level: PriorityLevel,
    compute_units: u32,
    max_fee_lamports: u64,
    config: &FeeEstimatorConfig,
    now_ms: u64,
) -> FeeEstimate {
    let percentile = level.percentile();
    let (raw_rate, source) = match percentile_value(sorted_samples, percentile) {
        Some(value) => (value, FeeSource::Samples),
        None => (config.default_rate, FeeSource::Default),
    };

    let rate = raw_rate.clamp(config.min_rate, config.max_rate);
    let fit = apply_ceiling(rate, compute_units, max_fee_lamports, config.min_rate);

    FeeEstimate {
        level,
        micro_lamports_per_cu: fit.rate,
        total_fee_lamports: fit.total,
        compute_units,
        percentile,
        sample_size: sorted_samples.len(),
        source,
        computed_at_ms: now_ms,
        ceiling_infeasible: fit.infeasible,
    }
}

/// Smallest lamport ceiling that `min_rate` fits under at the full compute budget.
pub fn min_feasible_ceiling(min_rate: u64) -> u64 {
    total_lamports(min_rate, MAX_COMPUTE_UNITS)
}

/// Element at `floor(n * p / 100)`, capped at the last index.
pub fn percentile_value(sorted_samples: &[u64], percentile: u8) -> Option<u64> {
    if sorted_samples.is_empty() {
        return None;
    }
    let n = sorted_samples.len();
    let index = (n * percentile as usize / 100).min(n - 1);
    Some(sorted_samples[index])
}

struct CeilingFit {
    rate: u64,
    total: u64,
    infeasible: bool,
}

/// Lamports for `rate` over `compute_units`, rounded up.
fn total_lamports(rate: u64, compute_units: u32) -> u64 {
    (rate as u128 * compute_units as u128)
        .div_ceil(MICRO_LAMPORTS_PER_LAMPORT as u128)
        .min(u64::MAX as u128) as u64
}

/// When the total for `rate` exceeds `ceiling` the rate is lowered to fit,
/// but never under `min_rate`. A ceiling that `min_rate` cannot meet is
/// reported as infeasible and the total is charged at `min_rate`.
fn apply_ceiling(rate: u64, compute_units: u32, ceiling: u64, min_rate: u64) -> CeilingFit {
    let total = total_lamports(rate, compute_units);
    if compute_units == 0 || total <= ceiling {
        return CeilingFit {
            rate,
            total,
            infeasible: false,
        };
    }
    let capped_rate =
        (ceiling as u128 * MICRO_LAMPORTS_PER_LAMPORT as u128 / compute_units as u128) as u64;
    if capped_rate >= min_rate {
        return CeilingFit {
            rate: capped_rate,
            total: total_lamports(capped_rate, compute_units),
            infeasible: false,
        };
    }
    warn!(
        "⚠️  Fee ceiling {} lamports is below the minimum rate for {} CU, charging {}",
        ceiling,
        compute_units,
        total_lamports(min_rate, compute_units)
    );
    CeilingFit {
        rate: min_rate,
        total: total_lamports(min_rate, compute_units),
        infeasible: true,
    }
}
