use log::{info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error)]
pub enum SwapError {
    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// RPC/Solana network errors
    #[error("RPC Error: {0}")]
    RpcError(String),

    /// Jupiter API specific errors
    #[error("Jupiter API Error: {0}")]
    JupiterApiError(String),

    /// Jupiter rate limiting error
    #[error("Jupiter API rate limit exceeded")]
    JupiterRateLimitError,

    /// Timeout errors for operations
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Parsing errors for quote / transaction payloads
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Executor or client is missing something it needs
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Invalid input parameters
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// No usable quote from cache or provider
    #[error("Quote Unavailable: {0}")]
    QuoteUnavailable(String),

    /// Quote validity window passed before it could be used
    #[error("Quote Expired: {0}")]
    QuoteExpired(String),

    /// Safety validator flagged the output asset
    #[error("Safety Rejected: {0}")]
    SafetyRejected(String),

    /// Aggregator could not produce a swap transaction
    #[error("Build Failed: {0}")]
    BuildFailed(String),

    /// Signer refused or failed
    #[error("Signing Failed: {0}")]
    SigningFailed(String),

    /// Dry-run predicted the transaction would revert
    #[error("Simulation Failed: {0}")]
    SimulationFailed(String),

    /// Dry-run endpoint could not be reached; never terminal
    #[error("Simulation Unavailable: {0}")]
    SimulationUnavailable(String),

    /// Network rejected the signed transaction
    #[error("Submission Failed: {0}")]
    SubmissionFailed(String),

    /// Transaction was sent but no terminal status arrived in time
    #[error("Confirmation timeout after {waited_ms}ms for {signature}")]
    ConfirmationTimeout { signature: String, waited_ms: u64 },

    /// Transaction landed and failed
    #[error("On-chain Error for {signature}: {reason}")]
    OnChainError { signature: String, reason: String },

    /// User cancelled the order
    #[error("Order Cancelled: {0}")]
    Cancelled(String),

    /// Cancelled while the submit call was in flight; the transaction went out
    #[error("Order Cancelled after sending {signature}")]
    CancelledAfterSubmission { signature: String },

    /// Illegal order state transition
    #[error("Invalid Transition: {0}")]
    InvalidTransition(String),
}

impl From<serde_json::Error> for SwapError {
    fn from(err: serde_json::Error) -> Self {
        SwapError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<anyhow::Error> for SwapError {
    fn from(err: anyhow::Error) -> Self {
        SwapError::ConfigError(format!("Anyhow error: {}", err))
    }
}

impl From<reqwest::Error> for SwapError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SwapError::TimeoutError(err.to_string())
        } else {
            SwapError::NetworkError(err.to_string())
        }
    }
}

impl From<solana_client::client_error::ClientError> for SwapError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        SwapError::RpcError(format!("Solana client error: {}", err))
    }
}

impl From<base64::DecodeError> for SwapError {
    fn from(err: base64::DecodeError) -> Self {
        SwapError::ParseError(format!("base64 decode error: {}", err))
    }
}

impl From<bincode::Error> for SwapError {
    fn from(err: bincode::Error) -> Self {
        SwapError::ParseError(format!("transaction decode error: {}", err))
    }
}

impl SwapError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            SwapError::NetworkError(_) => true,
            SwapError::RpcError(_) => true,
            SwapError::JupiterApiError(_) => true,
            SwapError::JupiterRateLimitError => true,
            SwapError::TimeoutError(_) => true,
            SwapError::ParseError(_) => false,
            SwapError::ConfigError(_) => false,
            SwapError::InvalidInput(_) => false,
            SwapError::QuoteUnavailable(_) => true,
            SwapError::QuoteExpired(_) => true,
            SwapError::SafetyRejected(_) => false,
            SwapError::BuildFailed(_) => true,
            SwapError::SigningFailed(_) => false,
            SwapError::SimulationFailed(_) => false,
            SwapError::SimulationUnavailable(_) => true,
            SwapError::SubmissionFailed(msg) => {
                !msg.contains("signature") && !msg.contains("insufficient")
            }
            // May still land; resubmitting risks a double fill.
            SwapError::ConfirmationTimeout { .. } => false,
            SwapError::OnChainError { .. } => false,
            SwapError::Cancelled(_) => false,
            SwapError::CancelledAfterSubmission { .. } => false,
            SwapError::InvalidTransition(_) => false,
        }
    }

    /// Determines if operation should be retried immediately
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && matches!(
                self,
                SwapError::NetworkError(_)
                    | SwapError::RpcError(_)
                    | SwapError::TimeoutError(_)
                    | SwapError::JupiterRateLimitError
            )
    }

    /// Categorizes error for logging and the order record
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            SwapError::NetworkError(_)
            | SwapError::RpcError(_)
            | SwapError::JupiterApiError(_)
            | SwapError::JupiterRateLimitError
            | SwapError::TimeoutError(_) => ErrorCategory::Network,
            SwapError::ParseError(_) => ErrorCategory::Data,
            SwapError::ConfigError(_) | SwapError::InvalidInput(_) => ErrorCategory::Configuration,
            SwapError::QuoteUnavailable(_) | SwapError::QuoteExpired(_) => ErrorCategory::Quote,
            SwapError::SafetyRejected(_) => ErrorCategory::Safety,
            SwapError::BuildFailed(_)
            | SwapError::SigningFailed(_)
            | SwapError::SimulationFailed(_)
            | SwapError::SimulationUnavailable(_) => ErrorCategory::Preparation,
            SwapError::SubmissionFailed(_) => ErrorCategory::Submission,
            SwapError::ConfirmationTimeout { .. } | SwapError::CancelledAfterSubmission { .. } => {
                ErrorCategory::Ambiguous
            }
            SwapError::OnChainError { .. } => ErrorCategory::OnChain,
            SwapError::Cancelled(_) => ErrorCategory::Cancelled,
            SwapError::InvalidTransition(_) => ErrorCategory::Critical,
        }
    }

    /// Whether a signed transaction may have reached the network.
    pub fn funds_at_risk(&self) -> bool {
        matches!(
            self.categorize(),
            ErrorCategory::Ambiguous | ErrorCategory::OnChain
        )
    }

    /// Outcome cannot be known locally; a later status check is required.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            SwapError::ConfirmationTimeout { .. } | SwapError::CancelledAfterSubmission { .. }
        )
    }

    /// Actionable, user-facing wording. Pre-submission failures and the
    /// ambiguous timeout must never read the same.
    pub fn user_message(&self) -> String {
        match self {
            SwapError::ConfirmationTimeout {
                signature,
                waited_ms,
            } => format!(
                "A transaction was sent but did not confirm within {}s. It may still land; check signature {} before retrying.",
                waited_ms / 1000,
                signature
            ),
            SwapError::OnChainError { signature, reason } => format!(
                "The transaction landed but failed on-chain ({}). Signature: {}",
                reason, signature
            ),
            SwapError::SubmissionFailed(reason) => format!(
                "The network rejected the transaction ({}). Your funds were never at risk.",
                reason
            ),
            SwapError::Cancelled(reason) => format!("Swap cancelled: {}", reason),
            SwapError::CancelledAfterSubmission { signature } => format!(
                "Swap cancelled, but its transaction was already sent and may still land; check signature {} before retrying.",
                signature
            ),
            SwapError::SafetyRejected(reason) => format!(
                "Swap blocked by safety check: {}. Your funds were never at risk.",
                reason
            ),
            other => format!("Swap failed: {}. Your funds were never at risk.", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    Quote,
    Safety,
    Preparation,
    Submission,
    Ambiguous,
    OnChain,
    Cancelled,
    Critical,
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Calculate delay for a given attempt (exponential backoff)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u128.saturating_pow(attempt - 1);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64)
    }

    /// Execute operation with retry logic
    pub async fn execute<F, T, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                sleep(self.delay_for_attempt(attempt)).await;
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) if !e.should_retry() => {
                    warn!("Non-retryable error on attempt {}: {}", attempt + 1, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attempt {} failed: {} (retrying...)", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SwapError::NetworkError("retry policy allows zero attempts".to_string())
        }))
    }
}

pub type Result<T> = std::result::Result<T, SwapError>;
