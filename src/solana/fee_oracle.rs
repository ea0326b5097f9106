// src/solana/fee_oracle.rs
//! Helius `getPriorityFeeEstimate` JSON-RPC, used as the secondary fee path.

use crate::{
    error::{Result, SwapError},
    liquidity::{providers::FeeOracle, types::PriorityLevel},
};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HELIUS_RPC_BASE: &str = "https://mainnet.helius-rpc.com";

/// Jupiter V6 program; fees are estimated for transactions that write to it.
pub const JUPITER_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

#[derive(Debug, Clone)]
pub struct HeliusFeeOracleConfig {
    pub api_key: String,
    pub rpc_base: String,
    pub account_keys: Vec<String>,
    pub timeout_ms: u64,
}

impl HeliusFeeOracleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            rpc_base: HELIUS_RPC_BASE.to_string(),
            account_keys: vec![JUPITER_PROGRAM_ID.to_string()],
            timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'static str,
    params: [PriorityFeeParams<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PriorityFeeParams<'a> {
    #[serde(rename = "accountKeys")]
    account_keys: &'a [String],
    options: PriorityFeeOptions,
}

#[derive(Debug, Serialize)]
struct PriorityFeeOptions {
    #[serde(rename = "priorityLevel")]
    priority_level: &'static str,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<PriorityFeeResult>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct PriorityFeeResult {
    #[serde(rename = "priorityFeeEstimate")]
    priority_fee_estimate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn helius_level(level: PriorityLevel) -> &'static str {
    match level {
        PriorityLevel::Low => "Low",
        PriorityLevel::Medium => "Medium",
        PriorityLevel::High => "High",
        PriorityLevel::Turbo => "VeryHigh",
    }
}

fn parse_estimate(body: &str) -> Result<f64> {
    let response: JsonRpcResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(SwapError::RpcError(format!(
            "getPriorityFeeEstimate error {}: {}",
            error.code, error.message
        )));
    }
    response
        .result
        .and_then(|r| r.priority_fee_estimate)
        .ok_or_else(|| SwapError::ParseError("response carries no priorityFeeEstimate".to_string()))
}

pub struct HeliusFeeOracle {
    client: Client,
    config: HeliusFeeOracleConfig,
}

impl HeliusFeeOracle {
    pub fn new(config: HeliusFeeOracleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SwapError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/?api-key={}",
            self.config.rpc_base.trim_end_matches('/'),
            self.config.api_key
        )
    }

    fn request_body(&self, level: PriorityLevel) -> JsonRpcRequest<'_> {
        JsonRpcRequest {
            jsonrpc: "2.0",
            id: "priority-fee",
            method: "getPriorityFeeEstimate",
            params: [PriorityFeeParams {
                account_keys: &self.config.account_keys,
                options: PriorityFeeOptions {
                    priority_level: helius_level(level),
                },
            }],
        }
    }
}

#[async_trait]
impl FeeOracle for HeliusFeeOracle {
    fn name(&self) -> &str {
        "helius"
    }

    async fn priority_fee_estimate(&self, level: PriorityLevel) -> Result<f64> {
        let response = self
            .client
            .post(self.url())
            .json(&self.request_body(level))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SwapError::RpcError(format!("Helius {}: {}", status, body)));
        }

        let estimate = parse_estimate(&body)?;
        debug!("🔮 Helius {} priority fee: {} µL/CU", helius_level(level), estimate);
        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_request_body_shape() {
        let oracle = HeliusFeeOracle::new(HeliusFeeOracleConfig::new("key")).unwrap();
        let json = serde_json::to_value(oracle.request_body(PriorityLevel::Turbo)).unwrap();

        assert_eq!(json["method"], "getPriorityFeeEstimate");
        assert_eq!(json["params"][0]["options"]["priorityLevel"], "VeryHigh");
        assert_eq!(json["params"][0]["accountKeys"][0], JUPITER_PROGRAM_ID);
        assert_eq!(oracle.url(), "https://mainnet.helius-rpc.com/?api-key=key");
    }

    #[test]
    fn test_parse_estimate() {
        let estimate =
            parse_estimate(r#"{"jsonrpc":"2.0","id":"1","result":{"priorityFeeEstimate":12345.5}}"#)
                .unwrap();
        assert_approx_eq!(estimate, 12345.5);

        let err = parse_estimate(
            r#"{"jsonrpc":"2.0","id":"1","error":{"code":-32602,"message":"bad params"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SwapError::RpcError(_)));

        assert!(parse_estimate(r#"{"jsonrpc":"2.0","id":"1","result":{}}"#).is_err());
    }
}
