//! Quote cache and background prefetcher.
//!
//! The prefetcher keeps a fresh answer to "what would this trade yield right
//! now" so execution never waits on aggregator latency. Reads are synchronous;
//! entries expire on their own whether or not the loop is still running.

use crate::{
    liquidity::{
        providers::QuoteProvider,
        types::{Quote, RouteVariant, TokenPair, DEFAULT_QUOTE_VALIDITY_MS},
    },
    utils::{short_mint, Clock},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};

pub const MIN_PREFETCH_INTERVAL_MS: u64 = 300;
pub const MAX_PREFETCH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_PREFETCH_INTERVAL_MS: u64 = 400;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteCacheConfig {
    /// Prefetch cadence, clamped to [300, 1000] ms
    pub prefetch_interval_ms: u64,
    /// Validity window stamped on every cached entry
    pub quote_ttl_ms: u64,
    /// Consecutive failures before the prefetch interval is doubled
    pub failure_threshold: u32,
}

impl Default for QuoteCacheConfig {
    fn default() -> Self {
        Self {
            prefetch_interval_ms: DEFAULT_PREFETCH_INTERVAL_MS,
            quote_ttl_ms: DEFAULT_QUOTE_VALIDITY_MS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl QuoteCacheConfig {
    pub fn clamped_interval(&self) -> Duration {
        Duration::from_millis(
            self.prefetch_interval_ms
                .clamp(MIN_PREFETCH_INTERVAL_MS, MAX_PREFETCH_INTERVAL_MS),
        )
    }
}

/// Amount-specific entries and pair-wide (last amount wins) entries live side by side.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct QuoteCacheKey {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: Option<u64>,
}

impl QuoteCacheKey {
    pub fn for_amount(pair: &TokenPair, amount: u64) -> Self {
        Self {
            input_mint: pair.input_mint.clone(),
            output_mint: pair.output_mint.clone(),
            amount: Some(amount),
        }
    }

    pub fn for_pair(pair: &TokenPair) -> Self {
        Self {
            input_mint: pair.input_mint.clone(),
            output_mint: pair.output_mint.clone(),
            amount: None,
        }
    }
}

impl fmt::Display for QuoteCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.amount {
            Some(amount) => write!(
                f,
                "{}→{}:{}",
                short_mint(&self.input_mint),
                short_mint(&self.output_mint),
                amount
            ),
            None => write!(
                f,
                "{}→{}:*",
                short_mint(&self.input_mint),
                short_mint(&self.output_mint)
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    expires_at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub stores: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Process-wide quote store. Injected wherever quotes are read so tests can
/// own their instance and clock.
pub struct QuoteCache {
    entries: RwLock<HashMap<QuoteCacheKey, CachedQuote>>,
    metrics: Mutex<CacheMetrics>,
    current_tx: watch::Sender<Option<Quote>>,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl QuoteCache {
    pub fn new(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        info!("🗄️  Initializing quote cache (TTL: {}ms)", ttl_ms);
        let (current_tx, _) = watch::channel(None);
        Self {
            entries: RwLock::new(HashMap::new()),
            metrics: Mutex::new(CacheMetrics::default()),
            current_tx,
            ttl_ms,
            clock,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Store under both the amount key and the pair key, expiring `ttl` after fetch.
    pub fn store(&self, quote: Quote) {
        let pair = quote.pair();
        let expires_at_ms = quote.fetched_at_ms.saturating_add(self.ttl_ms);
        let entry = CachedQuote {
            quote: quote.clone(),
            expires_at_ms,
        };

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(QuoteCacheKey::for_amount(&pair, quote.in_amount), entry.clone());
            entries.insert(QuoteCacheKey::for_pair(&pair), entry);
            // Expired entries are dropped lazily here so the map cannot grow unbounded.
            let now = self.clock.now_ms();
            entries.retain(|_, cached| cached.expires_at_ms > now);
        }
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.stores += 1;
        }
        debug!(
            "💾 Cached quote {} in={} out={} (expires in {}ms)",
            pair,
            quote.in_amount,
            quote.out_amount,
            expires_at_ms.saturating_sub(self.clock.now_ms())
        );
    }

    /// Amount entry if fresh, else pair entry if fresh, else `None`. Never
    /// touches the network.
    pub fn get_cached_quote(&self, pair: &TokenPair, amount: Option<u64>) -> Option<Quote> {
        let now = self.clock.now_ms();
        let mut keys = Vec::with_capacity(2);
        if let Some(amount) = amount {
            keys.push(QuoteCacheKey::for_amount(pair, amount));
        }
        keys.push(QuoteCacheKey::for_pair(pair));

        let mut saw_expired = false;
        let found = {
            let entries = self.entries.read().ok()?;
            keys.iter().find_map(|key| match entries.get(key) {
                Some(cached) if cached.expires_at_ms > now => {
                    debug!("🎯 Cache HIT for {}", key);
                    Some(cached.quote.clone())
                }
                Some(_) => {
                    saw_expired = true;
                    None
                }
                None => None,
            })
        };

        if let Ok(mut metrics) = self.metrics.lock() {
            if found.is_some() {
                metrics.hits += 1;
            } else {
                metrics.misses += 1;
                if saw_expired {
                    metrics.expired += 1;
                }
            }
        }
        if found.is_none() {
            debug!("📡 Cache MISS for {}", pair);
        }
        found
    }

    /// Latest prefetched quote regardless of key. May be expired; callers check.
    pub fn current_quote(&self) -> Option<Quote> {
        self.current_tx.borrow().clone()
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Option<Quote>> {
        self.current_tx.subscribe()
    }

    fn publish_current(&self, quote: Quote) {
        self.current_tx.send_replace(Some(quote));
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let removed = entries.len();
            entries.clear();
            warn!("🧹 Cleared quote cache ({} entries removed)", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// Snapshot of the prefetch loop, errors included. The loop never panics or
/// propagates failures; this is the only place they surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchStatus {
    pub running: bool,
    pub pair: Option<TokenPair>,
    pub amount: u64,
    pub consecutive_failures: u32,
    pub total_fetches: u64,
    pub last_error: Option<String>,
    pub last_success_ms: Option<u64>,
    pub current_interval_ms: u64,
}

#[derive(Debug, Clone)]
struct PrefetchTarget {
    pair: TokenPair,
    amount: u64,
    slippage_bps: u16,
}

/// Drives one recurring quote fetch and feeds [`QuoteCache`].
pub struct QuotePrefetcher {
    provider: Arc<dyn QuoteProvider>,
    cache: Arc<QuoteCache>,
    config: QuoteCacheConfig,
    handle: Mutex<Option<JoinHandle<()>>>,
    status: Arc<RwLock<PrefetchStatus>>,
}

impl QuotePrefetcher {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        cache: Arc<QuoteCache>,
        config: QuoteCacheConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            config,
            handle: Mutex::new(None),
            status: Arc::new(RwLock::new(PrefetchStatus::default())),
        }
    }

    pub fn cache(&self) -> Arc<QuoteCache> {
        Arc::clone(&self.cache)
    }

    /// Replace any running loop with one for `pair`/`amount`. The first fetch
    /// is issued immediately.
    pub fn start(&self, pair: TokenPair, amount: u64, slippage_bps: u16) {
        self.stop();

        let base_interval = self.config.clamped_interval();
        info!(
            "🔁 Starting quote prefetch for {} amount={} every {:?}",
            pair, amount, base_interval
        );
        if let Ok(mut status) = self.status.write() {
            *status = PrefetchStatus {
                running: true,
                pair: Some(pair.clone()),
                amount,
                current_interval_ms: base_interval.as_millis() as u64,
                ..PrefetchStatus::default()
            };
        }

        let target = PrefetchTarget {
            pair,
            amount,
            slippage_bps,
        };
        let task = tokio::spawn(prefetch_loop(
            Arc::clone(&self.provider),
            Arc::clone(&self.cache),
            Arc::clone(&self.status),
            target,
            base_interval,
            self.config.failure_threshold,
        ));

        if let Ok(mut handle) = self.handle.lock() {
            *handle = Some(task);
        }
    }

    /// Cancel the schedule. Cached entries are kept until they expire.
    pub fn stop(&self) {
        let previous = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(task) = previous {
            task.abort();
            info!("⏹️  Quote prefetch stopped");
        }
        if let Ok(mut status) = self.status.write() {
            status.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.status.read().map(|s| s.running).unwrap_or(false)
    }

    pub fn status(&self) -> PrefetchStatus {
        self.status.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Drop for QuotePrefetcher {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(task) = handle.take() {
                task.abort();
            }
        }
    }
}

async fn prefetch_loop(
    provider: Arc<dyn QuoteProvider>,
    cache: Arc<QuoteCache>,
    status: Arc<RwLock<PrefetchStatus>>,
    target: PrefetchTarget,
    base_interval: Duration,
    failure_threshold: u32,
) {
    let request = crate::liquidity::types::QuoteRequest {
        input_mint: target.pair.input_mint.clone(),
        output_mint: target.pair.output_mint.clone(),
        amount: target.amount,
        slippage_bps: target.slippage_bps,
        variant: RouteVariant::Default,
    };
    let mut consecutive_failures: u32 = 0;

    loop {
        let outcome = provider.get_quote(&request).await;
        let error = match outcome {
            Ok(Some(quote)) => {
                cache.store(quote.clone());
                cache.publish_current(quote);
                consecutive_failures = 0;
                None
            }
            Ok(None) => Some(format!("{} returned no route", provider.name())),
            Err(e) => Some(e.to_string()),
        };

        if let Some(ref message) = error {
            consecutive_failures = consecutive_failures.saturating_add(1);
            debug!(
                "Prefetch failure #{} for {}: {}",
                consecutive_failures, target.pair, message
            );
        }

        let interval = if consecutive_failures >= failure_threshold {
            if consecutive_failures == failure_threshold {
                warn!(
                    "🐢 {} consecutive prefetch failures for {}, backing off to {:?}",
                    consecutive_failures,
                    target.pair,
                    base_interval * 2
                );
            }
            base_interval * 2
        } else {
            base_interval
        };

        if let Ok(mut s) = status.write() {
            s.total_fetches += 1;
            s.consecutive_failures = consecutive_failures;
            s.current_interval_ms = interval.as_millis() as u64;
            match error {
                Some(message) => s.last_error = Some(message),
                None => {
                    s.last_error = None;
                    s.last_success_ms = Some(cache.clock.now_ms());
                }
            }
        }

        tokio::time::sleep(interval).await;
    }
}
