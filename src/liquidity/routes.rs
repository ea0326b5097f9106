//! Multi-route comparison
//!
//! Scores alternative quotes for the same trade under a selectable strategy
//! and ranks them. Route alternatives are coaxed out of the aggregator by
//! issuing the same request with different routing knobs in parallel.

use crate::{
    error::{Result, SwapError},
    liquidity::{
        providers::QuoteProvider,
        types::{Quote, RouteVariant, SwapIntent, HIGH_SLIPPAGE_BPS},
    },
};
use futures::future::join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, str::FromStr, sync::Arc, time::Duration};

/// Base compute units of a swap transaction before any hop.
pub const BASE_COMPUTE_UNITS: u64 = 100_000;
/// Additional compute units consumed per route hop.
pub const COMPUTE_UNITS_PER_HOP: u64 = 80_000;

/// Price impact (percent) at which the impact sub-score reaches zero.
const IMPACT_ZERO_SCORE_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteStrategy {
    BestOutput,
    LowestImpact,
    BestLiquidity,
    LowestFees,
    Fastest,
    #[default]
    Balanced,
}

impl RouteStrategy {
    pub const ALL: [RouteStrategy; 6] = [
        RouteStrategy::BestOutput,
        RouteStrategy::LowestImpact,
        RouteStrategy::BestLiquidity,
        RouteStrategy::LowestFees,
        RouteStrategy::Fastest,
        RouteStrategy::Balanced,
    ];
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteStrategy::BestOutput => "best-output",
            RouteStrategy::LowestImpact => "lowest-impact",
            RouteStrategy::BestLiquidity => "best-liquidity",
            RouteStrategy::LowestFees => "lowest-fees",
            RouteStrategy::Fastest => "fastest",
            RouteStrategy::Balanced => "balanced",
        };
        f.write_str(name)
    }
}

impl FromStr for RouteStrategy {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        RouteStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.to_string() == normalized)
            .ok_or_else(|| SwapError::InvalidInput(format!("unknown route strategy '{}'", s)))
    }
}

/// Derived facts about one quote. Lives for a single comparison call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteAnalysis {
    pub hops: usize,
    pub venues: Vec<String>,
    pub price_impact_pct: f64,
    pub out_amount: u64,
    pub output_ratio: f64,
    /// Output relative to the best candidate in the same comparison, in [0, 1]
    pub output_efficiency: f64,
    /// Output placed between the worst (0) and best (1) candidate of the comparison
    pub output_spread: f64,
    pub estimated_compute_units: u64,
    pub complexity_score: f64,
    pub impact_score: f64,
    pub liquidity_score: f64,
    pub advantages: Vec<String>,
    pub disadvantages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteComparison {
    pub quote: Quote,
    pub analysis: RouteAnalysis,
    pub score: f64,
    /// 1-based position after sorting by score
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteComparator;

impl RouteComparator {
    pub fn new() -> Self {
        Self
    }

    /// Standalone analysis; output efficiency and spread are 1.0 for any nonzero output.
    pub fn analyze(&self, quote: &Quote) -> RouteAnalysis {
        let relative = if quote.out_amount > 0 { 1.0 } else { 0.0 };
        Self::analyze_relative(quote, relative, relative)
    }

    fn analyze_relative(quote: &Quote, output_efficiency: f64, output_spread: f64) -> RouteAnalysis {
        let hops = quote.hop_count();

        let mut venues: Vec<String> = Vec::new();
        for step in &quote.route {
            if !venues.contains(&step.venue) {
                venues.push(step.venue.clone());
            }
        }

        let complexity_score = clamp_unit(1.0 - hops.saturating_sub(1) as f64 * 0.25);
        let impact_score =
            clamp_unit(1.0 - quote.price_impact_pct.max(0.0) / IMPACT_ZERO_SCORE_PCT);
        let output_term = if quote.out_amount > 0 { 1.0 } else { 0.0 };
        let liquidity_score = clamp_unit((complexity_score + impact_score + output_term) / 3.0);

        let mut advantages = Vec::new();
        let mut disadvantages = Vec::new();

        if hops == 1 {
            advantages.push("Direct route".to_string());
        } else if hops >= 3 {
            disadvantages.push(format!("Complex multi-hop route ({} hops)", hops));
        }
        if quote.price_impact_pct < 0.1 {
            advantages.push("Minimal price impact".to_string());
        } else if quote.price_impact_pct > 1.0 {
            disadvantages.push(format!("High price impact ({:.2}%)", quote.price_impact_pct));
        }
        if liquidity_score >= 0.8 {
            advantages.push("Deep liquidity".to_string());
        } else if liquidity_score < 0.4 {
            disadvantages.push("Thin liquidity".to_string());
        }
        if quote.out_amount == 0 {
            disadvantages.push("No output".to_string());
        }

        RouteAnalysis {
            hops,
            venues,
            price_impact_pct: quote.price_impact_pct,
            out_amount: quote.out_amount,
            output_ratio: quote.output_ratio(),
            output_efficiency: clamp_unit(output_efficiency),
            output_spread: clamp_unit(output_spread),
            estimated_compute_units: BASE_COMPUTE_UNITS
                + COMPUTE_UNITS_PER_HOP * hops.max(1) as u64,
            complexity_score,
            impact_score,
            liquidity_score,
            advantages,
            disadvantages,
        }
    }

    /// Strategy base score plus advantage/disadvantage adjustments, in [0, 100].
    pub fn score(&self, analysis: &RouteAnalysis, strategy: RouteStrategy) -> f64 {
        let extra_hops = analysis.hops.saturating_sub(1) as f64;
        let impact = analysis.price_impact_pct.max(0.0);

        let base = match strategy {
            RouteStrategy::BestOutput => analysis.output_spread * 100.0,
            RouteStrategy::LowestImpact => 100.0 - impact * 20.0,
            RouteStrategy::BestLiquidity => analysis.liquidity_score * 100.0,
            RouteStrategy::LowestFees => 100.0 - extra_hops * 20.0,
            RouteStrategy::Fastest => 100.0 - extra_hops * 30.0 - impact * 5.0,
            // Weights sum to 110; kept as-is, the final clamp absorbs the excess.
            RouteStrategy::Balanced => {
                analysis.output_efficiency * 40.0
                    + analysis.impact_score * 30.0
                    + analysis.complexity_score * 20.0
                    + analysis.liquidity_score * 20.0
            }
        };

        let adjusted = base + analysis.advantages.len() as f64 * 5.0
            - analysis.disadvantages.len() as f64 * 10.0;
        adjusted.clamp(0.0, 100.0)
    }

    /// Analyze, score and rank. Ties keep their input order.
    pub fn compare(&self, quotes: &[Quote], strategy: RouteStrategy) -> Vec<RouteComparison> {
        let best_out = quotes.iter().map(|q| q.out_amount).max().unwrap_or(0);
        let worst_out = quotes.iter().map(|q| q.out_amount).min().unwrap_or(0);

        let mut comparisons: Vec<RouteComparison> = quotes
            .iter()
            .map(|quote| {
                let efficiency = if best_out == 0 {
                    0.0
                } else {
                    quote.out_amount as f64 / best_out as f64
                };
                let spread = if best_out == worst_out {
                    if quote.out_amount > 0 { 1.0 } else { 0.0 }
                } else {
                    (quote.out_amount - worst_out) as f64 / (best_out - worst_out) as f64
                };
                let analysis = Self::analyze_relative(quote, efficiency, spread);
                let score = self.score(&analysis, strategy);
                RouteComparison {
                    quote: quote.clone(),
                    analysis,
                    score,
                    rank: 0,
                }
            })
            .collect();

        // sort_by is stable
        comparisons.sort_by(|a, b| b.score.total_cmp(&a.score));
        for (i, comparison) in comparisons.iter_mut().enumerate() {
            comparison.rank = i + 1;
        }

        if let Some(best) = comparisons.first() {
            debug!(
                "🏆 {} strategy: best of {} routes scores {:.1} via {}",
                strategy,
                comparisons.len(),
                best.score,
                best.analysis.venues.join(" → ")
            );
        }
        comparisons
    }

    pub fn best(&self, quotes: &[Quote], strategy: RouteStrategy) -> Option<RouteComparison> {
        self.compare(quotes, strategy).into_iter().next()
    }

    /// Structural checks on a quote. Never panics.
    pub fn validate(&self, quote: &Quote) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if quote.input_mint.trim().is_empty() {
            errors.push("Missing input mint".to_string());
        }
        if quote.output_mint.trim().is_empty() {
            errors.push("Missing output mint".to_string());
        }
        if quote.in_amount == 0 {
            errors.push("Input amount is zero".to_string());
        }
        if quote.out_amount == 0 {
            errors.push("Output amount is zero".to_string());
        }
        if quote.route.is_empty() {
            errors.push("Route has no steps".to_string());
        }
        if quote.slippage_bps > HIGH_SLIPPAGE_BPS {
            warnings.push(format!(
                "High slippage tolerance ({:.2}%)",
                quote.slippage_bps as f64 / 100.0
            ));
        }
        if quote.price_impact_pct > IMPACT_ZERO_SCORE_PCT {
            warnings.push(format!("Very high price impact ({:.2}%)", quote.price_impact_pct));
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Request `intent` under each routing variant in parallel and keep one quote
/// per distinct route. Variants that fail, time out or have no route are skipped.
pub async fn gather_route_variants(
    provider: Arc<dyn QuoteProvider>,
    intent: &SwapIntent,
    variants: &[RouteVariant],
    per_variant_timeout: Duration,
) -> Vec<Quote> {
    let requests = variants.iter().map(|variant| {
        let provider = Arc::clone(&provider);
        let request = intent.quote_request(*variant);
        async move {
            match tokio::time::timeout(per_variant_timeout, provider.get_quote(&request)).await {
                Ok(Ok(quote)) => quote,
                Ok(Err(e)) => {
                    debug!("Route variant {:?} failed: {}", request.variant, e);
                    None
                }
                Err(_) => {
                    debug!("Route variant {:?} timed out", request.variant);
                    None
                }
            }
        }
    });

    let quotes: Vec<Quote> = join_all(requests).await.into_iter().flatten().collect();
    let discovered = quotes.len();
    let unique = deduplicate_routes(quotes);

    info!(
        "📍 Discovered {} routes for {} ({} unique)",
        discovered,
        intent.pair(),
        unique.len()
    );
    unique
}

/// First quote per route signature wins.
pub fn deduplicate_routes(quotes: Vec<Quote>) -> Vec<Quote> {
    let mut seen = HashSet::new();
    quotes
        .into_iter()
        .filter(|quote| seen.insert(quote.route_signature()))
        .collect()
}
