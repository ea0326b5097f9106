//! Value types shared by the quote, routing, fee and execution layers.

use crate::error::{Result, SwapError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Validity window applied to a freshly fetched quote.
pub const DEFAULT_QUOTE_VALIDITY_MS: u64 = 1_000;

/// Slippage above this many basis points is legal but suspicious.
pub const HIGH_SLIPPAGE_BPS: u16 = 1_000;

pub const MAX_SLIPPAGE_BPS: u16 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapSide {
    /// Spend the input mint to acquire the output mint
    Acquire,
    /// Dispose of a held input mint
    Dispose,
}

impl fmt::Display for SwapSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapSide::Acquire => write!(f, "acquire"),
            SwapSide::Dispose => write!(f, "dispose"),
        }
    }
}

/// Input/output mint pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub input_mint: String,
    pub output_mint: String,
}

impl TokenPair {
    pub fn new(input_mint: impl Into<String>, output_mint: impl Into<String>) -> Self {
        Self {
            input_mint: input_mint.into(),
            output_mint: output_mint.into(),
        }
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}→{}",
            crate::utils::short_mint(&self.input_mint),
            crate::utils::short_mint(&self.output_mint)
        )
    }
}

/// Immutable swap request created by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapIntent {
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in the smallest unit of `input_mint`
    pub amount: u64,
    pub side: SwapSide,
    pub slippage_bps: u16,
}

impl SwapIntent {
    pub fn new(
        input_mint: impl Into<String>,
        output_mint: impl Into<String>,
        amount: u64,
        side: SwapSide,
        slippage_bps: u16,
    ) -> Self {
        Self {
            input_mint: input_mint.into(),
            output_mint: output_mint.into(),
            amount,
            side,
            slippage_bps,
        }
    }

    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.input_mint.clone(), self.output_mint.clone())
    }

    pub fn quote_request(&self, variant: RouteVariant) -> QuoteRequest {
        QuoteRequest {
            input_mint: self.input_mint.clone(),
            output_mint: self.output_mint.clone(),
            amount: self.amount,
            slippage_bps: self.slippage_bps,
            variant,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_mint.trim().is_empty() || self.output_mint.trim().is_empty() {
            return Err(SwapError::InvalidInput("mint addresses are required".to_string()));
        }
        if self.input_mint == self.output_mint {
            return Err(SwapError::InvalidInput(
                "input and output mint are the same".to_string(),
            ));
        }
        if self.amount == 0 {
            return Err(SwapError::InvalidInput("amount must be positive".to_string()));
        }
        if self.slippage_bps > MAX_SLIPPAGE_BPS {
            return Err(SwapError::InvalidInput(format!(
                "slippage {}bps exceeds {}bps",
                self.slippage_bps, MAX_SLIPPAGE_BPS
            )));
        }
        Ok(())
    }
}

/// Knobs used to coax different routes out of the aggregator for the same trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteVariant {
    /// Aggregator's own choice
    Default,
    /// Single-venue routes only
    DirectOnly,
    /// Multi-hop allowed but with a small account budget
    Compact,
}

impl RouteVariant {
    pub const ALL: [RouteVariant; 3] = [
        RouteVariant::Default,
        RouteVariant::DirectOnly,
        RouteVariant::Compact,
    ];

    pub fn only_direct_routes(&self) -> bool {
        matches!(self, RouteVariant::DirectOnly)
    }

    pub fn max_accounts(&self) -> u16 {
        match self {
            RouteVariant::Default => 64,
            RouteVariant::DirectOnly => 32,
            RouteVariant::Compact => 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u16,
    pub variant: RouteVariant,
}

/// One venue-level leg of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub venue: String,
    pub amm_key: Option<String>,
    pub in_amount: Option<u64>,
    pub out_amount: Option<u64>,
    pub percent: Option<u8>,
}

impl RouteStep {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            amm_key: None,
            in_amount: None,
            out_amount: None,
            percent: None,
        }
    }
}

/// A proposed exchange. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output after slippage
    pub min_out_amount: u64,
    pub slippage_bps: u16,
    /// Percentage, e.g. `0.35` means 0.35%
    pub price_impact_pct: f64,
    pub route: Vec<RouteStep>,
    pub fetched_at_ms: u64,
    pub expires_at_ms: u64,
    /// Original aggregator payload, needed to request the swap transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl Quote {
    pub fn hop_count(&self) -> usize {
        self.route.len()
    }

    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.input_mint.clone(), self.output_mint.clone())
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn remaining_validity_ms(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms)
    }

    /// Output units per input unit, zero when the input is zero.
    pub fn output_ratio(&self) -> f64 {
        if self.in_amount == 0 {
            0.0
        } else {
            self.out_amount as f64 / self.in_amount as f64
        }
    }

    /// Joined AMM keys (or venue labels) identifying the path taken.
    pub fn route_signature(&self) -> String {
        self.route
            .iter()
            .map(|step| step.amm_key.clone().unwrap_or_else(|| step.venue.clone()))
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Turbo,
}

impl PriorityLevel {
    pub const ALL: [PriorityLevel; 4] = [
        PriorityLevel::Low,
        PriorityLevel::Medium,
        PriorityLevel::High,
        PriorityLevel::Turbo,
    ];

    pub fn percentile(&self) -> u8 {
        match self {
            PriorityLevel::Low => 25,
            PriorityLevel::Medium => 50,
            PriorityLevel::High => 75,
            PriorityLevel::Turbo => 90,
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PriorityLevel::Low => "low",
            PriorityLevel::Medium => "medium",
            PriorityLevel::High => "high",
            PriorityLevel::Turbo => "turbo",
        };
        f.write_str(name)
    }
}

impl FromStr for PriorityLevel {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(PriorityLevel::Low),
            "medium" => Ok(PriorityLevel::Medium),
            "high" => Ok(PriorityLevel::High),
            "turbo" => Ok(PriorityLevel::Turbo),
            other => Err(SwapError::InvalidInput(format!(
                "unknown priority level '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeSource {
    /// Percentile over recent network samples
    Samples,
    /// No samples were available
    Default,
    /// External fee oracle
    Oracle,
    /// Caller-supplied override
    Override,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub level: PriorityLevel,
    pub micro_lamports_per_cu: u64,
    pub total_fee_lamports: u64,
    pub compute_units: u32,
    pub percentile: u8,
    pub sample_size: usize,
    pub source: FeeSource,
    pub computed_at_ms: u64,
    /// The lamport ceiling could not be met at the minimum rate; the total exceeds it
    #[serde(default)]
    pub ceiling_infeasible: bool,
}

impl FeeEstimate {
    /// Fixed rate supplied by the caller; bypasses the estimator.
    pub fn manual(micro_lamports_per_cu: u64, compute_units: u32, now_ms: u64) -> Self {
        let total = (micro_lamports_per_cu as u128 * compute_units as u128)
            .div_ceil(crate::liquidity::fees::MICRO_LAMPORTS_PER_LAMPORT as u128);
        Self {
            level: PriorityLevel::Medium,
            micro_lamports_per_cu,
            total_fee_lamports: total.min(u64::MAX as u128) as u64,
            compute_units,
            percentile: 0,
            sample_size: 0,
            source: FeeSource::Override,
            computed_at_ms: now_ms,
            ceiling_infeasible: false,
        }
    }
}

/// Aggregator-built, unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTransaction {
    /// base64 wire bytes
    pub encoded: String,
    pub last_valid_block_height: Option<u64>,
    pub compute_unit_limit: Option<u32>,
    pub prioritization_fee_lamports: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// base58 first signature, used as the transaction reference
    pub signature: String,
    /// bincode-serialized versioned transaction
    pub wire: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Finalized,
    Errored(String),
}

impl ConfirmationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ConfirmationStatus::Confirmed | ConfirmationStatus::Finalized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub reason: Option<String>,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    pub fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulationReport {
    pub will_succeed: bool,
    pub units_consumed: Option<u64>,
    pub error: Option<String>,
    pub logs: Vec<String>,
}
