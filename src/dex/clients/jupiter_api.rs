//! Jupiter API V6 Data Structures
//!
//! Request and response structures for the Jupiter V6 `/quote` and `/swap`
//! endpoints, plus conversion of a quote response into the domain [`Quote`].

use crate::{
    error::{Result, SwapError},
    liquidity::types::{Quote, RouteStep, RouteVariant},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request structure for Jupiter V6 /quote endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Input token mint address
    #[serde(rename = "inputMint")]
    pub input_mint: String,

    /// Output token mint address
    #[serde(rename = "outputMint")]
    pub output_mint: String,

    /// Amount of input token (in smallest unit)
    pub amount: u64,

    /// Slippage tolerance in basis points (e.g., 100 = 1%)
    #[serde(rename = "slippageBps")]
    pub slippage_bps: u16,

    /// Only use direct routes (optional)
    #[serde(rename = "onlyDirectRoutes", skip_serializing_if = "Option::is_none")]
    pub only_direct_routes: Option<bool>,

    /// Exclude specific DEXs (optional, comma separated on the wire)
    #[serde(rename = "excludeDexes", skip_serializing_if = "Option::is_none")]
    pub exclude_dexes: Option<String>,

    /// Maximum number of accounts (optional)
    #[serde(rename = "maxAccounts", skip_serializing_if = "Option::is_none")]
    pub max_accounts: Option<u16>,
}

impl QuoteRequest {
    pub fn from_domain(request: &crate::liquidity::types::QuoteRequest) -> Self {
        Self {
            input_mint: request.input_mint.clone(),
            output_mint: request.output_mint.clone(),
            amount: request.amount,
            slippage_bps: request.slippage_bps,
            only_direct_routes: Some(request.variant.only_direct_routes()),
            exclude_dexes: None,
            max_accounts: match request.variant {
                RouteVariant::Default => None,
                other => Some(other.max_accounts()),
            },
        }
    }
}

/// Response structure for Jupiter V6 /quote endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    #[serde(rename = "inputMint")]
    pub input_mint: String,

    #[serde(rename = "inAmount")]
    pub in_amount: String,

    #[serde(rename = "outputMint")]
    pub output_mint: String,

    /// Output amount (estimated)
    #[serde(rename = "outAmount")]
    pub out_amount: String,

    /// Minimum output after slippage for ExactIn swaps
    #[serde(rename = "otherAmountThreshold")]
    pub other_amount_threshold: String,

    #[serde(rename = "swapMode", default)]
    pub swap_mode: Option<String>,

    #[serde(rename = "slippageBps")]
    pub slippage_bps: u16,

    #[serde(rename = "platformFee", skip_serializing_if = "Option::is_none", default)]
    pub platform_fee: Option<PlatformFee>,

    /// Price impact as a decimal fraction ("0.0012" = 0.12%)
    #[serde(rename = "priceImpactPct")]
    pub price_impact_pct: String,

    #[serde(rename = "routePlan")]
    pub route_plan: Vec<RoutePlan>,

    #[serde(rename = "contextSlot", default)]
    pub context_slot: Option<u64>,

    #[serde(rename = "timeTaken", default)]
    pub time_taken: Option<f64>,
}

impl QuoteResponse {
    /// Domain quote valid for `validity_ms` from `now_ms`. The raw response is
    /// kept so the same payload can be sent back to `/swap`.
    pub fn into_quote(self, now_ms: u64, validity_ms: u64) -> Result<Quote> {
        let in_amount = parse_amount("inAmount", &self.in_amount)?;
        let out_amount = parse_amount("outAmount", &self.out_amount)?;
        let min_out_amount = parse_amount("otherAmountThreshold", &self.other_amount_threshold)?;
        let impact_fraction: f64 = self.price_impact_pct.trim().parse().map_err(|e| {
            SwapError::ParseError(format!(
                "priceImpactPct '{}' is not a number: {}",
                self.price_impact_pct, e
            ))
        })?;

        let route = self
            .route_plan
            .iter()
            .map(|plan| RouteStep {
                venue: plan.swap_info.label.clone(),
                amm_key: Some(plan.swap_info.amm_key.clone()),
                in_amount: plan.swap_info.in_amount.parse().ok(),
                out_amount: plan.swap_info.out_amount.parse().ok(),
                percent: Some(plan.percent),
            })
            .collect();
        let raw = serde_json::to_value(&self)?;

        Ok(Quote {
            input_mint: self.input_mint,
            output_mint: self.output_mint,
            in_amount,
            out_amount,
            min_out_amount,
            slippage_bps: self.slippage_bps,
            price_impact_pct: impact_fraction * 100.0,
            route,
            fetched_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(validity_ms),
            raw: Some(raw),
        })
    }
}

fn parse_amount(field: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| SwapError::ParseError(format!("{} '{}' is not an integer: {}", field, value, e)))
}

/// Route plan step in Jupiter quote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    #[serde(rename = "swapInfo")]
    pub swap_info: SwapInfo,

    /// Percentage of amount for this route
    pub percent: u8,
}

/// Swap information within route plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapInfo {
    #[serde(rename = "ammKey")]
    pub amm_key: String,

    /// Label/name of the DEX
    #[serde(default)]
    pub label: String,

    #[serde(rename = "inputMint")]
    pub input_mint: String,

    #[serde(rename = "outputMint")]
    pub output_mint: String,

    #[serde(rename = "inAmount")]
    pub in_amount: String,

    #[serde(rename = "outAmount")]
    pub out_amount: String,

    #[serde(rename = "feeAmount", default)]
    pub fee_amount: String,

    #[serde(rename = "feeMint", default)]
    pub fee_mint: String,
}

/// Platform fee information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformFee {
    pub amount: String,

    #[serde(rename = "feeBps")]
    pub fee_bps: u16,
}

/// Request structure for Jupiter V6 /swap endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    #[serde(rename = "userPublicKey")]
    pub user_public_key: String,

    /// Quote response from /quote endpoint, passed back verbatim
    #[serde(rename = "quoteResponse")]
    pub quote_response: serde_json::Value,

    #[serde(rename = "wrapAndUnwrapSol", skip_serializing_if = "Option::is_none")]
    pub wrap_and_unwrap_sol: Option<bool>,

    #[serde(rename = "useSharedAccounts", skip_serializing_if = "Option::is_none")]
    pub use_shared_accounts: Option<bool>,

    #[serde(rename = "dynamicComputeUnitLimit", skip_serializing_if = "Option::is_none")]
    pub dynamic_compute_unit_limit: Option<bool>,

    #[serde(
        rename = "computeUnitPriceMicroLamports",
        skip_serializing_if = "Option::is_none"
    )]
    pub compute_unit_price_micro_lamports: Option<u64>,

    #[serde(
        rename = "asLegacyTransaction",
        skip_serializing_if = "Option::is_none"
    )]
    pub as_legacy_transaction: Option<bool>,
}

/// Response structure for Jupiter V6 /swap endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResponse {
    /// Base64 encoded versioned transaction
    #[serde(rename = "swapTransaction")]
    pub swap_transaction: String,

    #[serde(rename = "lastValidBlockHeight", default)]
    pub last_valid_block_height: Option<u64>,

    #[serde(rename = "prioritizationFeeLamports", default)]
    pub prioritization_fee_lamports: Option<u64>,

    #[serde(rename = "computeUnitLimit", default)]
    pub compute_unit_limit: Option<u32>,

    #[serde(rename = "simulationError", default)]
    pub simulation_error: Option<serde_json::Value>,
}

/// Jupiter API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterErrorResponse {
    #[serde(default)]
    pub error: String,

    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,

    #[serde(default)]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

impl JupiterErrorResponse {
    /// Jupiter answers 400 with one of these codes when the pair simply has no route.
    pub fn is_no_route(&self) -> bool {
        let code = self.error_code.as_deref().unwrap_or_default();
        matches!(
            code,
            "COULD_NOT_FIND_ANY_ROUTE" | "NO_ROUTES_FOUND" | "TOKEN_NOT_TRADABLE"
        ) || self.error.contains("Could not find any route")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;

    const QUOTE_JSON: &str = r#"{
        "inputMint": "So11111111111111111111111111111111111111112",
        "inAmount": "1000000",
        "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        "outAmount": "150123",
        "otherAmountThreshold": "149372",
        "swapMode": "ExactIn",
        "slippageBps": 50,
        "platformFee": null,
        "priceImpactPct": "0.0012",
        "routePlan": [
            {
                "swapInfo": {
                    "ammKey": "7qbRF6YsyGuLUVs6Y1q64bdVrfe4ZcUUz1JRdoVNUJnm",
                    "label": "Raydium",
                    "inputMint": "So11111111111111111111111111111111111111112",
                    "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                    "inAmount": "1000000",
                    "outAmount": "150123",
                    "feeAmount": "250",
                    "feeMint": "So11111111111111111111111111111111111111112"
                },
                "percent": 100
            }
        ],
        "contextSlot": 283000000,
        "timeTaken": 0.0123
    }"#;

    #[test]
    fn test_quote_response_into_domain_quote() {
        let response: QuoteResponse = serde_json::from_str(QUOTE_JSON).unwrap();
        let quote = response.into_quote(10_000, 1_000).unwrap();

        assert_eq!(quote.in_amount, 1_000_000);
        assert_eq!(quote.out_amount, 150_123);
        assert_eq!(quote.min_out_amount, 149_372);
        assert_approx_eq!(quote.price_impact_pct, 0.12);
        assert_eq!(quote.hop_count(), 1);
        assert_eq!(quote.route[0].venue, "Raydium");
        assert_eq!(quote.route[0].out_amount, Some(150_123));
        assert_eq!(quote.expires_at_ms, 11_000);
        assert_eq!(quote.raw.unwrap()["outAmount"], "150123");
    }

    #[test]
    fn test_bad_amount_is_a_parse_error() {
        let mut response: QuoteResponse = serde_json::from_str(QUOTE_JSON).unwrap();
        response.out_amount = "lots".to_string();
        assert!(matches!(
            response.into_quote(0, 1_000),
            Err(SwapError::ParseError(_))
        ));
    }

    #[test]
    fn test_request_carries_variant_knobs() {
        let domain = crate::liquidity::types::QuoteRequest {
            input_mint: "A".to_string(),
            output_mint: "B".to_string(),
            amount: 5,
            slippage_bps: 50,
            variant: RouteVariant::Compact,
        };
        let wire = QuoteRequest::from_domain(&domain);
        assert_eq!(wire.only_direct_routes, Some(false));
        assert_eq!(wire.max_accounts, Some(20));

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["maxAccounts"], 20);
        assert!(json.get("excludeDexes").is_none());
    }

    #[test]
    fn test_no_route_error_detection() {
        let err: JupiterErrorResponse = serde_json::from_str(
            r#"{"error":"Could not find any route","errorCode":"COULD_NOT_FIND_ANY_ROUTE"}"#,
        )
        .unwrap();
        assert!(err.is_no_route());

        let other: JupiterErrorResponse =
            serde_json::from_str(r#"{"error":"Invalid mint","errorCode":"INVALID_MINT"}"#).unwrap();
        assert!(!other.is_no_route());
    }
}
