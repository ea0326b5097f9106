use crate::{
    dex::clients::jupiter::{
        JupiterConfig, JUPITER_API_BASE, JUPITER_REQUESTS_PER_SECOND, JUPITER_REQUEST_TIMEOUT_MS,
    },
    error::SwapError,
    liquidity::{
        cache::{QuoteCacheConfig, DEFAULT_FAILURE_THRESHOLD, DEFAULT_PREFETCH_INTERVAL_MS},
        executor::{ExecutorConfig, SwapConfig},
        fees::{
            min_feasible_ceiling, FeeEstimatorConfig, DEFAULT_COMPUTE_UNITS,
            DEFAULT_MAX_FEE_LAMPORTS, DEFAULT_RATE_MICRO_LAMPORTS, DEFAULT_SAMPLE_TTL_MS,
            MAX_COMPUTE_UNITS, MAX_RATE_MICRO_LAMPORTS, MIN_RATE_MICRO_LAMPORTS,
        },
        history::DEFAULT_HISTORY_CAPACITY,
        routes::RouteStrategy,
        types::{PriorityLevel, DEFAULT_QUOTE_VALIDITY_MS, MAX_SLIPPAGE_BPS},
    },
    solana::fee_oracle::HeliusFeeOracleConfig,
};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub rpc_url: String,
    pub rpc_url_backup: Option<Vec<String>>,
    pub rpc_max_retries: Option<usize>,
    pub rpc_retry_delay_ms: Option<u64>,
    pub trader_wallet_keypair_path: String,
    pub helius_api_key: Option<String>,
    pub banned_mints_path: Option<String>,

    pub jupiter_api_url: String,
    /// Second Jupiter-compatible endpoint tried when the primary has no answer
    pub jupiter_fallback_api_url: Option<String>,
    pub jupiter_timeout_ms: u64,
    pub jupiter_requests_per_second: u32,

    pub quote_prefetch_interval_ms: u64,
    pub quote_ttl_ms: u64,
    pub prefetch_failure_threshold: u32,
    pub quote_timeout_ms: u64,
    pub route_variant_timeout_ms: u64,

    pub fee_sample_ttl_ms: u64,
    pub default_priority_fee_micro_lamports: u64,
    pub min_priority_fee_micro_lamports: u64,
    pub max_priority_fee_micro_lamports: u64,
    pub default_compute_units: u32,
    pub max_priority_fee_lamports: u64,
    pub fee_oracle_timeout_ms: u64,

    pub default_priority_level: PriorityLevel,
    pub default_slippage_bps: u16,
    pub compare_routes: bool,
    pub route_strategy: RouteStrategy,
    pub use_cached_quotes: bool,
    pub simulate_transactions: bool,
    pub confirmation_timeout_ms: u64,
    pub confirmation_poll_interval_ms: u64,
    pub order_history_capacity: usize,
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source. Unset or unparsable values take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = &lookup;
        Config {
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            rpc_url: lookup("RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8899".to_string()),
            rpc_url_backup: lookup("RPC_URL_BACKUP").map(|s| {
                s.split(',')
                    .map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty())
                    .collect()
            }),
            rpc_max_retries: lookup("RPC_MAX_RETRIES").and_then(|v| v.parse().ok()),
            rpc_retry_delay_ms: lookup("RPC_RETRY_DELAY_MS").and_then(|v| v.parse().ok()),
            trader_wallet_keypair_path: lookup("TRADER_WALLET_KEYPAIR_PATH")
                .unwrap_or_else(|| ".config/solana/id.json".to_string()),
            helius_api_key: lookup("HELIUS_API_KEY").filter(|k| !k.trim().is_empty()),
            banned_mints_path: lookup("BANNED_MINTS_PATH"),

            jupiter_api_url: lookup("JUPITER_API_URL")
                .unwrap_or_else(|| JUPITER_API_BASE.to_string()),
            jupiter_fallback_api_url: lookup("JUPITER_FALLBACK_API_URL")
                .filter(|url| !url.trim().is_empty()),
            jupiter_timeout_ms: parsed(lookup, "JUPITER_TIMEOUT_MS", JUPITER_REQUEST_TIMEOUT_MS),
            jupiter_requests_per_second: parsed(
                lookup,
                "JUPITER_REQUESTS_PER_SECOND",
                JUPITER_REQUESTS_PER_SECOND,
            ),

            quote_prefetch_interval_ms: parsed(
                lookup,
                "QUOTE_PREFETCH_INTERVAL_MS",
                DEFAULT_PREFETCH_INTERVAL_MS,
            ),
            quote_ttl_ms: parsed(lookup, "QUOTE_TTL_MS", DEFAULT_QUOTE_VALIDITY_MS),
            prefetch_failure_threshold: parsed(
                lookup,
                "PREFETCH_FAILURE_THRESHOLD",
                DEFAULT_FAILURE_THRESHOLD,
            ),
            quote_timeout_ms: parsed(lookup, "QUOTE_TIMEOUT_MS", 5_000),
            route_variant_timeout_ms: parsed(lookup, "ROUTE_VARIANT_TIMEOUT_MS", 2_000),

            fee_sample_ttl_ms: parsed(lookup, "FEE_SAMPLE_TTL_MS", DEFAULT_SAMPLE_TTL_MS),
            default_priority_fee_micro_lamports: parsed(
                lookup,
                "DEFAULT_PRIORITY_FEE_MICRO_LAMPORTS",
                DEFAULT_RATE_MICRO_LAMPORTS,
            ),
            min_priority_fee_micro_lamports: parsed(
                lookup,
                "MIN_PRIORITY_FEE_MICRO_LAMPORTS",
                MIN_RATE_MICRO_LAMPORTS,
            ),
            max_priority_fee_micro_lamports: parsed(
                lookup,
                "MAX_PRIORITY_FEE_MICRO_LAMPORTS",
                MAX_RATE_MICRO_LAMPORTS,
            ),
            default_compute_units: parsed(lookup, "DEFAULT_COMPUTE_UNITS", DEFAULT_COMPUTE_UNITS),
            max_priority_fee_lamports: parsed(
                lookup,
                "MAX_PRIORITY_FEE_LAMPORTS",
                DEFAULT_MAX_FEE_LAMPORTS,
            ),
            fee_oracle_timeout_ms: parsed(lookup, "FEE_ORACLE_TIMEOUT_MS", 2_000),

            default_priority_level: parsed(lookup, "DEFAULT_PRIORITY_LEVEL", PriorityLevel::Medium),
            default_slippage_bps: parsed(lookup, "DEFAULT_SLIPPAGE_BPS", 50),
            compare_routes: parsed(lookup, "COMPARE_ROUTES", false),
            route_strategy: parsed(lookup, "ROUTE_STRATEGY", RouteStrategy::Balanced),
            use_cached_quotes: parsed(lookup, "USE_CACHED_QUOTES", true),
            simulate_transactions: parsed(lookup, "SIMULATE_TRANSACTIONS", true),
            confirmation_timeout_ms: parsed(lookup, "CONFIRMATION_TIMEOUT_MS", 60_000),
            confirmation_poll_interval_ms: parsed(lookup, "CONFIRMATION_POLL_INTERVAL_MS", 500),
            order_history_capacity: parsed(
                lookup,
                "ORDER_HISTORY_CAPACITY",
                DEFAULT_HISTORY_CAPACITY,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), SwapError> {
        if self.rpc_url.trim().is_empty() {
            return Err(SwapError::ConfigError("RPC_URL cannot be empty".to_string()));
        }
        if self.jupiter_api_url.trim().is_empty() {
            return Err(SwapError::ConfigError(
                "JUPITER_API_URL cannot be empty".to_string(),
            ));
        }
        if self.min_priority_fee_micro_lamports > self.max_priority_fee_micro_lamports {
            return Err(SwapError::ConfigError(format!(
                "priority fee floor {} exceeds ceiling {}",
                self.min_priority_fee_micro_lamports, self.max_priority_fee_micro_lamports
            )));
        }
        let floor = min_feasible_ceiling(self.min_priority_fee_micro_lamports);
        if self.max_priority_fee_lamports < floor {
            return Err(SwapError::ConfigError(format!(
                "MAX_PRIORITY_FEE_LAMPORTS {} cannot cover the minimum rate over {} CU ({} lamports)",
                self.max_priority_fee_lamports, MAX_COMPUTE_UNITS, floor
            )));
        }
        if self.default_slippage_bps > MAX_SLIPPAGE_BPS {
            return Err(SwapError::ConfigError(format!(
                "DEFAULT_SLIPPAGE_BPS {} exceeds {}",
                self.default_slippage_bps, MAX_SLIPPAGE_BPS
            )));
        }
        if self.confirmation_poll_interval_ms == 0 {
            return Err(SwapError::ConfigError(
                "CONFIRMATION_POLL_INTERVAL_MS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_and_log(&self) {
        log::info!("Application Configuration Loaded: {:?}", self.redacted());
        if let Err(e) = self.validate() {
            log::error!("{}", e);
        }
    }

    fn redacted(&self) -> Config {
        Config {
            helius_api_key: self.helius_api_key.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }

    /// Same client settings pointed at the fallback endpoint, if one is set.
    pub fn jupiter_fallback_config(&self) -> Option<JupiterConfig> {
        self.jupiter_fallback_api_url.as_ref().map(|url| JupiterConfig {
            api_base: url.clone(),
            ..JupiterConfig::from(self)
        })
    }

    pub fn fee_oracle_config(&self) -> Option<HeliusFeeOracleConfig> {
        self.helius_api_key.as_ref().map(|key| HeliusFeeOracleConfig {
            timeout_ms: self.fee_oracle_timeout_ms,
            ..HeliusFeeOracleConfig::new(key.clone())
        })
    }
}

impl From<&Config> for QuoteCacheConfig {
    fn from(config: &Config) -> Self {
        QuoteCacheConfig {
            prefetch_interval_ms: config.quote_prefetch_interval_ms,
            quote_ttl_ms: config.quote_ttl_ms,
            failure_threshold: config.prefetch_failure_threshold,
        }
    }
}

impl From<&Config> for FeeEstimatorConfig {
    fn from(config: &Config) -> Self {
        FeeEstimatorConfig {
            sample_ttl_ms: config.fee_sample_ttl_ms,
            default_rate: config.default_priority_fee_micro_lamports,
            min_rate: config.min_priority_fee_micro_lamports,
            max_rate: config.max_priority_fee_micro_lamports,
            default_compute_units: config.default_compute_units,
            max_fee_lamports: config.max_priority_fee_lamports,
            oracle_timeout_ms: config.fee_oracle_timeout_ms,
        }
    }
}

impl From<&Config> for ExecutorConfig {
    fn from(config: &Config) -> Self {
        ExecutorConfig {
            quote_timeout_ms: config.quote_timeout_ms,
            route_variant_timeout_ms: config.route_variant_timeout_ms,
            history_capacity: config.order_history_capacity,
        }
    }
}

impl From<&Config> for SwapConfig {
    fn from(config: &Config) -> Self {
        SwapConfig {
            priority_level: config.default_priority_level,
            compare_routes: config.compare_routes,
            strategy: config.route_strategy,
            use_cached_quote: config.use_cached_quotes,
            simulate: config.simulate_transactions,
            confirmation_timeout_ms: config.confirmation_timeout_ms,
            poll_interval_ms: config.confirmation_poll_interval_ms,
            max_fee_lamports: Some(config.max_priority_fee_lamports),
            ..SwapConfig::default()
        }
    }
}

impl From<&Config> for JupiterConfig {
    fn from(config: &Config) -> Self {
        JupiterConfig {
            api_base: config.jupiter_api_url.clone(),
            timeout_ms: config.jupiter_timeout_ms,
            requests_per_second: config.jupiter_requests_per_second,
            quote_validity_ms: config.quote_ttl_ms,
            ..JupiterConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config_from(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.quote_prefetch_interval_ms, 400);
        assert_eq!(config.default_priority_level, PriorityLevel::Medium);
        assert_eq!(config.route_strategy, RouteStrategy::Balanced);
        assert!(config.fee_oracle_config().is_none());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_from(&[
            ("QUOTE_PREFETCH_INTERVAL_MS", "750"),
            ("DEFAULT_PRIORITY_LEVEL", "turbo"),
            ("ROUTE_STRATEGY", "lowest_impact"),
            ("COMPARE_ROUTES", "true"),
            ("QUOTE_TTL_MS", "not-a-number"),
            ("RPC_URL_BACKUP", "http://a, ,http://b"),
            ("HELIUS_API_KEY", "secret"),
        ]);

        assert_eq!(config.quote_prefetch_interval_ms, 750);
        assert_eq!(config.default_priority_level, PriorityLevel::Turbo);
        assert_eq!(config.route_strategy, RouteStrategy::LowestImpact);
        assert!(config.compare_routes);
        assert_eq!(config.quote_ttl_ms, DEFAULT_QUOTE_VALIDITY_MS);
        assert_eq!(
            config.rpc_url_backup,
            Some(vec!["http://a".to_string(), "http://b".to_string()])
        );
        assert_eq!(config.fee_oracle_config().unwrap().api_key, "secret");
        assert!(config.jupiter_fallback_config().is_none());
        assert_eq!(config.redacted().helius_api_key.as_deref(), Some("***"));
    }

    #[test]
    fn test_inverted_fee_bounds_rejected() {
        let config = config_from(&[
            ("MIN_PRIORITY_FEE_MICRO_LAMPORTS", "5000"),
            ("MAX_PRIORITY_FEE_MICRO_LAMPORTS", "100"),
        ]);
        assert!(matches!(config.validate(), Err(SwapError::ConfigError(_))));
    }

    #[test]
    fn test_fee_ceiling_below_minimum_rate_rejected() {
        // 1_000 µL/CU over 1.4M CU needs 1_400 lamports
        let config = config_from(&[("MAX_PRIORITY_FEE_LAMPORTS", "1399")]);
        assert!(matches!(config.validate(), Err(SwapError::ConfigError(_))));

        let config = config_from(&[("MAX_PRIORITY_FEE_LAMPORTS", "1400")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_component_configs_follow_settings() {
        let config = config_from(&[
            ("CONFIRMATION_TIMEOUT_MS", "30000"),
            ("SIMULATE_TRANSACTIONS", "false"),
            ("FEE_SAMPLE_TTL_MS", "2500"),
            ("JUPITER_FALLBACK_API_URL", "https://backup.example/swap/v1"),
        ]);

        let swap = SwapConfig::from(&config);
        assert_eq!(swap.confirmation_timeout_ms, 30_000);
        assert!(!swap.simulate);

        let fees = FeeEstimatorConfig::from(&config);
        assert_eq!(fees.sample_ttl_ms, 2_500);

        let cache = QuoteCacheConfig::from(&config);
        assert_eq!(cache.prefetch_interval_ms, 400);

        let jupiter = JupiterConfig::from(&config);
        assert_eq!(jupiter.quote_validity_ms, config.quote_ttl_ms);
        let fallback = config.jupiter_fallback_config().unwrap();
        assert_eq!(fallback.api_base, "https://backup.example/swap/v1");
        assert_eq!(fallback.timeout_ms, jupiter.timeout_ms);
    }
}
