//! Jupiter V6 aggregator client.
//!
//! Implements [`QuoteProvider`] over `GET /quote` and [`TransactionBuilder`]
//! over `POST /swap`.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use solana_sdk::transaction::VersionedTransaction;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    dex::clients::jupiter_api::{
        JupiterErrorResponse, QuoteRequest as WireQuoteRequest, QuoteResponse, SwapRequest,
        SwapResponse,
    },
    error::{Result, RetryPolicy, SwapError},
    liquidity::{
        providers::{QuoteProvider, TransactionBuilder},
        types::{FeeEstimate, Quote, QuoteRequest, SwapTransaction, DEFAULT_QUOTE_VALIDITY_MS},
    },
    utils::{short_mint, Clock, SystemClock},
};

/// Jupiter API v6 endpoints
pub const JUPITER_API_BASE: &str = "https://quote-api.jup.ag/v6";
const JUPITER_QUOTE_ENDPOINT: &str = "quote";
const JUPITER_SWAP_ENDPOINT: &str = "swap";

/// Jupiter API rate limits (conservative)
pub const JUPITER_REQUESTS_PER_SECOND: u32 = 10;
pub const JUPITER_REQUEST_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_base: String,
    pub timeout_ms: u64,
    pub requests_per_second: u32,
    pub quote_validity_ms: u64,
    pub wrap_and_unwrap_sol: bool,
    pub retry: RetryPolicy,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base: JUPITER_API_BASE.to_string(),
            timeout_ms: JUPITER_REQUEST_TIMEOUT_MS,
            requests_per_second: JUPITER_REQUESTS_PER_SECOND,
            quote_validity_ms: DEFAULT_QUOTE_VALIDITY_MS,
            wrap_and_unwrap_sol: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Rate limiter for Jupiter API calls
struct RateLimiter {
    last_request: Option<Instant>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(requests_per_second: u32) -> Self {
        Self {
            last_request: None,
            min_interval: Duration::from_millis(1000 / requests_per_second.max(1) as u64),
        }
    }

    async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

/// Jupiter aggregator client for quotes and swap transactions
pub struct JupiterClient {
    client: Client,
    config: JupiterConfig,
    rate_limiter: Arc<tokio::sync::Mutex<RateLimiter>>,
    clock: Arc<dyn Clock>,
}

impl JupiterClient {
    pub fn new(config: JupiterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent("SolanaLiquidityLayer/0.1")
            .build()
            .map_err(|e| SwapError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(tokio::sync::Mutex::new(RateLimiter::new(
                config.requests_per_second,
            ))),
            config,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &JupiterConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// One `/quote` round trip. `Ok(None)` when Jupiter reports no route.
    pub async fn fetch_quote(&self, request: &WireQuoteRequest) -> Result<Option<QuoteResponse>> {
        self.rate_limiter.lock().await.wait_if_needed().await;

        let url = self.endpoint(JUPITER_QUOTE_ENDPOINT);
        debug!(
            "🔍 Requesting Jupiter quote: {} {} -> {} (direct: {:?}, max accounts: {:?})",
            request.amount,
            short_mint(&request.input_mint),
            short_mint(&request.output_mint),
            request.only_direct_routes,
            request.max_accounts
        );

        let response = self.client.get(&url).query(request).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("⚠️ Jupiter rate limit hit on /quote");
            return Err(SwapError::JupiterRateLimitError);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(api_error) = serde_json::from_str::<JupiterErrorResponse>(&text) {
                if api_error.is_no_route() {
                    debug!("🚫 Jupiter has no route: {}", api_error.error);
                    return Ok(None);
                }
            }
            return Err(SwapError::JupiterApiError(format!("{}: {}", status, text)));
        }

        let quote: QuoteResponse = response.json().await.map_err(|e| {
            SwapError::ParseError(format!("Failed to parse Jupiter quote response: {}", e))
        })?;
        if quote.route_plan.is_empty() {
            return Ok(None);
        }

        debug!(
            "✅ Jupiter quote received: {} -> {} (impact: {}, {} hop(s))",
            quote.in_amount,
            quote.out_amount,
            quote.price_impact_pct,
            quote.route_plan.len()
        );
        Ok(Some(quote))
    }

    /// One `/swap` round trip for a previously fetched quote payload.
    pub async fn fetch_swap_transaction(&self, request: &SwapRequest) -> Result<SwapResponse> {
        self.rate_limiter.lock().await.wait_if_needed().await;

        let url = self.endpoint(JUPITER_SWAP_ENDPOINT);
        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("⚠️ Jupiter rate limit hit on /swap");
            return Err(SwapError::JupiterRateLimitError);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SwapError::BuildFailed(format!(
                "Jupiter swap API error {}: {}",
                status, text
            )));
        }

        response.json().await.map_err(|e| {
            SwapError::ParseError(format!("Failed to parse Jupiter swap response: {}", e))
        })
    }

    fn swap_request(
        &self,
        quote: &Quote,
        owner: &str,
        fee: Option<&FeeEstimate>,
    ) -> Result<SwapRequest> {
        let quote_response = quote.raw.clone().ok_or_else(|| {
            SwapError::BuildFailed("quote carries no aggregator payload".to_string())
        })?;
        Ok(SwapRequest {
            user_public_key: owner.to_string(),
            quote_response,
            wrap_and_unwrap_sol: Some(self.config.wrap_and_unwrap_sol),
            use_shared_accounts: Some(true),
            dynamic_compute_unit_limit: Some(true),
            compute_unit_price_micro_lamports: fee.map(|f| f.micro_lamports_per_cu),
            as_legacy_transaction: Some(false),
        })
    }
}

/// Decode the base64 `/swap` payload into a versioned transaction.
pub fn decode_swap_transaction(encoded: &str) -> Result<VersionedTransaction> {
    let bytes = general_purpose::STANDARD.decode(encoded)?;
    Ok(bincode::deserialize(&bytes)?)
}

#[async_trait]
impl QuoteProvider for JupiterClient {
    fn name(&self) -> &str {
        "jupiter"
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<Quote>> {
        let wire = WireQuoteRequest::from_domain(request);
        let response = self
            .config
            .retry
            .execute(|| self.fetch_quote(&wire))
            .await?;

        match response {
            Some(response) => {
                let now = self.clock.now_ms();
                Ok(Some(response.into_quote(now, self.config.quote_validity_ms)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TransactionBuilder for JupiterClient {
    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        owner: &str,
        fee: Option<&FeeEstimate>,
    ) -> Result<Option<SwapTransaction>> {
        let request = self.swap_request(quote, owner, fee)?;
        let response = self
            .config
            .retry
            .execute(|| self.fetch_swap_transaction(&request))
            .await?;

        if let Some(simulation_error) = &response.simulation_error {
            warn!("⚠️ Jupiter reported a simulation error: {}", simulation_error);
        }
        if response.swap_transaction.is_empty() {
            return Ok(None);
        }

        info!(
            "🧱 Swap transaction built for {} (CU limit: {:?}, priority: {:?} lamports)",
            quote.pair(),
            response.compute_unit_limit,
            response.prioritization_fee_lamports
        );
        Ok(Some(SwapTransaction {
            encoded: response.swap_transaction,
            last_valid_block_height: response.last_valid_block_height,
            compute_unit_limit: response.compute_unit_limit,
            prioritization_fee_lamports: response.prioritization_fee_lamports,
        }))
    }
}
