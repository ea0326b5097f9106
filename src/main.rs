// src/main.rs
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use solana_liquidity_layer::{
    config::{load_config, Config},
    dex::{JupiterClient, JupiterConfig},
    liquidity::{
        BannedMintValidator, ExecutorConfig, FeeEstimatorConfig, LiquidityLayer, OrderEvent,
        PriorityFeeEstimator, PriorityLevel, ProviderChain, QuoteCache, QuoteCacheConfig,
        QuotePrefetcher, QuoteProvider, RouteStrategy, SwapConfig, SwapExecutor, SwapIntent,
        SwapSide, TokenPair, TransactionSigner,
    },
    solana::{HeliusFeeOracle, SolanaRpcClient},
    utils::{setup_logging, SystemClock},
    wallet::KeypairSigner,
};
use std::{sync::Arc, time::Duration};

/// Optimistic Solana swap executor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a quote, optionally prefetching it for a while
    Quote {
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: String,
        /// Input amount in the smallest unit of the input mint
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        slippage_bps: Option<u16>,
        /// Compare every route variant instead of taking the aggregator default
        #[arg(long)]
        compare: bool,
        #[arg(long)]
        strategy: Option<RouteStrategy>,
        /// Keep the prefetcher running this many seconds and report cache stats
        #[arg(long, default_value_t = 0)]
        watch_secs: u64,
    },
    /// Estimate the priority fee
    Fee {
        #[arg(long)]
        level: Option<PriorityLevel>,
        #[arg(long)]
        compute_units: Option<u32>,
        /// Print every level
        #[arg(long)]
        all: bool,
    },
    /// Execute a swap with the configured keypair
    Swap {
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: String,
        #[arg(long)]
        amount: u64,
        #[arg(long, value_enum, default_value_t = Side::Acquire)]
        side: Side,
        #[arg(long)]
        slippage_bps: Option<u16>,
        #[arg(long)]
        level: Option<PriorityLevel>,
        #[arg(long)]
        compare: bool,
        #[arg(long)]
        strategy: Option<RouteStrategy>,
        /// Keypair file, defaults to TRADER_WALLET_KEYPAIR_PATH
        #[arg(long)]
        keypair: Option<String>,
        #[arg(long)]
        no_simulate: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Acquire,
    Dispose,
}

impl From<Side> for SwapSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Acquire => SwapSide::Acquire,
            Side::Dispose => SwapSide::Dispose,
        }
    }
}

/// Shared adapters wired from configuration.
struct Services {
    jupiter: Arc<JupiterClient>,
    /// Every quote the binary asks for goes through this chain
    quotes: Arc<dyn QuoteProvider>,
    rpc: Arc<SolanaRpcClient>,
    fees: Arc<PriorityFeeEstimator>,
}

impl Services {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let jupiter = Arc::new(JupiterClient::new(JupiterConfig::from(config))?);
        let mut chain = ProviderChain::<dyn QuoteProvider>::new(Duration::from_millis(
            config.jupiter_timeout_ms,
        ))
        .with_provider("jupiter", jupiter.clone());
        if let Some(fallback) = config.jupiter_fallback_config() {
            info!("🔀 Fallback quote endpoint: {}", fallback.api_base);
            chain = chain.with_provider("jupiter-fallback", Arc::new(JupiterClient::new(fallback)?));
        }
        let rpc = Arc::new(SolanaRpcClient::new(
            &config.rpc_url,
            config.rpc_url_backup.clone().unwrap_or_default(),
            config.rpc_max_retries.unwrap_or(3),
            Duration::from_millis(config.rpc_retry_delay_ms.unwrap_or(500)),
        ));

        let mut fees = PriorityFeeEstimator::new(
            rpc.clone(),
            FeeEstimatorConfig::from(config),
            Arc::new(SystemClock),
        );
        if let Some(oracle_config) = config.fee_oracle_config() {
            fees = fees.with_oracle(Arc::new(HeliusFeeOracle::new(oracle_config)?));
        }

        Ok(Self {
            jupiter,
            quotes: Arc::new(chain),
            rpc,
            fees: Arc::new(fees),
        })
    }

    fn layer(&self) -> LiquidityLayer {
        LiquidityLayer::new(self.quotes.clone(), self.jupiter.clone(), self.fees.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config().context("loading configuration")?;
    setup_logging(&config.log_level).context("initializing logging")?;
    info!("🚀 Solana liquidity layer starting...");
    config.validate_and_log();

    let services = Services::new(&config)?;

    match cli.command {
        Command::Quote {
            input,
            output,
            amount,
            slippage_bps,
            compare,
            strategy,
            watch_secs,
        } => {
            let slippage = slippage_bps.unwrap_or(config.default_slippage_bps);
            let intent = SwapIntent::new(&input, &output, amount, SwapSide::Acquire, slippage);
            let strategy = strategy.unwrap_or(config.route_strategy);

            match services.layer().get_best_route(&intent, compare, strategy).await? {
                Some(best) => {
                    info!(
                        "🏆 Best route ({}): {} out, {:.3}% impact, {} hop(s) via {}",
                        strategy,
                        best.quote.out_amount,
                        best.quote.price_impact_pct,
                        best.analysis.hops,
                        best.analysis.venues.join(" → ")
                    );
                    println!("{}", serde_json::to_string_pretty(&best.analysis)?);
                }
                None => warn!("🚫 No route for {}", intent.pair()),
            }

            if watch_secs > 0 {
                let cache_config = QuoteCacheConfig::from(config.as_ref());
                let cache = Arc::new(QuoteCache::new(cache_config.quote_ttl_ms, Arc::new(SystemClock)));
                let prefetcher = QuotePrefetcher::new(services.quotes.clone(), cache.clone(), cache_config);
                prefetcher.start(TokenPair::new(&input, &output), amount, slippage);
                tokio::time::sleep(Duration::from_secs(watch_secs)).await;
                prefetcher.stop();

                let status = prefetcher.status();
                let metrics = cache.metrics();
                info!(
                    "📊 Prefetch: {} fetches, {} consecutive failures, interval {}ms, hit rate {:.1}%",
                    status.total_fetches,
                    status.consecutive_failures,
                    status.current_interval_ms,
                    metrics.hit_rate() * 100.0
                );
                if let Some(quote) = cache.current_quote() {
                    println!("{}", serde_json::to_string_pretty(&quote)?);
                }
            }
        }

        Command::Fee {
            level,
            compute_units,
            all,
        } => {
            let estimates = if all {
                services.fees.estimate_all(compute_units, None).await
            } else {
                let level = level.unwrap_or(config.default_priority_level);
                let mut estimates = vec![services.fees.estimate(level, compute_units, None).await];
                if let Some(oracle) = services.fees.estimate_via_oracle(level, compute_units, None).await {
                    estimates.push(oracle);
                }
                estimates
            };
            for estimate in estimates {
                println!("{}", serde_json::to_string(&estimate)?);
            }
        }

        Command::Swap {
            input,
            output,
            amount,
            side,
            slippage_bps,
            level,
            compare,
            strategy,
            keypair,
            no_simulate,
        } => {
            let keypair_path = keypair.unwrap_or_else(|| config.trader_wallet_keypair_path.clone());
            let signer = Arc::new(KeypairSigner::from_file(&keypair_path)?);
            let owner = signer.owner();

            let slippage = slippage_bps.unwrap_or(config.default_slippage_bps);
            let fee_refresh = services
                .fees
                .spawn_background_refresh(Duration::from_millis(config.fee_sample_ttl_ms.max(1)));

            // Keep a quote for this exact swap warm while the wallet and fees are prepared.
            let cache_config = QuoteCacheConfig::from(config.as_ref());
            let cache = Arc::new(QuoteCache::new(cache_config.quote_ttl_ms, Arc::new(SystemClock)));
            let prefetcher = QuotePrefetcher::new(services.quotes.clone(), cache.clone(), cache_config);
            let mut current = cache.subscribe_current();
            prefetcher.start(TokenPair::new(&input, &output), amount, slippage);

            let executor = Arc::new(
                SwapExecutor::new(ExecutorConfig::from(config.as_ref()))
                    .with_quote_provider(services.quotes.clone())
                    .with_transaction_builder(services.jupiter.clone())
                    .with_submitter(services.rpc.clone())
                    .with_simulator(services.rpc.clone())
                    .with_fee_estimator(services.fees.clone())
                    .with_safety_validator(Arc::new(BannedMintValidator::load_from_file(
                        config.banned_mints_path.as_deref(),
                    )))
                    .with_quote_cache(cache.clone())
                    .with_signer(signer),
            );

            let mut events = executor.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        OrderEvent::Created(order) => info!("🆕 Order {} created", order.id),
                        OrderEvent::StatusChanged { order, previous } => {
                            info!("🔄 Order {}: {} → {}", order.id, previous, order.status)
                        }
                        OrderEvent::ReconciliationRequired { order_id, signature } => warn!(
                            "⚠️ Order {} needs reconciliation, check {}",
                            order_id, signature
                        ),
                    }
                }
            });

            let mut swap_config = SwapConfig::from(config.as_ref());
            swap_config.slippage_bps = slippage_bps;
            swap_config.compare_routes |= compare;
            swap_config.simulate &= !no_simulate;
            if let Some(level) = level {
                swap_config.priority_level = level;
            }
            if let Some(strategy) = strategy {
                swap_config.strategy = strategy;
            }

            if swap_config.use_cached_quote && !swap_config.compare_routes {
                let first_quote = Duration::from_millis(config.quote_timeout_ms);
                if !matches!(
                    tokio::time::timeout(first_quote, current.changed()).await,
                    Ok(Ok(()))
                ) {
                    warn!("⏳ No prefetched quote within {:?}, fetching on demand", first_quote);
                }
            }

            let intent = SwapIntent::new(&input, &output, amount, side.into(), slippage);
            let outcome = executor.execute_swap(intent, &owner, &swap_config).await;
            prefetcher.stop();
            fee_refresh.abort();

            if outcome.success {
                info!(
                    "✅ Swap filled in {}ms: {}",
                    outcome.duration_ms,
                    outcome.tx_signature.as_deref().unwrap_or("-")
                );
            } else {
                warn!("❌ {}", outcome.message);
            }
            println!(
                "{}",
                serde_json::json!({
                    "success": outcome.success,
                    "order_id": outcome.order_id.map(|id| id.to_string()),
                    "status": outcome.status.map(|s| s.to_string()),
                    "tx_signature": outcome.tx_signature,
                    "message": outcome.message,
                    "duration_ms": outcome.duration_ms,
                    "needs_reconciliation": outcome.needs_reconciliation,
                })
            );
            if !outcome.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
