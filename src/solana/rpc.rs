// src/solana/rpc.rs
use crate::{
    dex::clients::jupiter::decode_swap_transaction,
    error::{Result, SwapError},
    liquidity::{
        providers::{FeeSampleSource, TransactionSimulator, TransactionSubmitter},
        types::{ConfirmationStatus, SignedTransaction, SimulationReport, SwapTransaction},
    },
};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::Rng;
use solana_client::{
    client_error::ClientError,
    nonblocking::rpc_client::RpcClient as NonBlockingRpcClient,
    rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{TransactionConfirmationStatus, TransactionStatus};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const DEFAULT_COMMITMENT: CommitmentConfig = CommitmentConfig::confirmed();

/// Provides high-availability RPC with retries/fallbacks.
pub struct SolanaRpcClient {
    pub primary_client: Arc<NonBlockingRpcClient>,
    pub fallback_clients: Vec<Arc<NonBlockingRpcClient>>,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl SolanaRpcClient {
    pub fn new(
        primary_endpoint: &str,
        fallback_endpoints: Vec<String>,
        max_retries: usize,
        retry_delay: Duration,
    ) -> Self {
        let primary_client = Arc::new(NonBlockingRpcClient::new_with_commitment(
            primary_endpoint.to_string(),
            DEFAULT_COMMITMENT,
        ));

        let fallback_clients = fallback_endpoints
            .iter()
            .map(|url| {
                Arc::new(NonBlockingRpcClient::new_with_commitment(
                    url.clone(),
                    DEFAULT_COMMITMENT,
                ))
            })
            .collect();

        Self {
            primary_client,
            fallback_clients,
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    async fn execute_with_retry_and_fallback<F, Fut, T>(
        &self,
        operation_name: &str,
        mut rpc_call_fn: F,
    ) -> std::result::Result<T, ClientError>
    where
        F: FnMut(Arc<NonBlockingRpcClient>) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, ClientError>> + Send,
        T: Send,
    {
        let mut last_error: Option<ClientError> = None;

        for attempt in 0..self.max_retries {
            match rpc_call_fn(Arc::clone(&self.primary_client)).await {
                Ok(result) => {
                    debug!("[RPC HA - {}] Primary client succeeded on attempt {}", operation_name, attempt + 1);
                    return Ok(result);
                }
                Err(e) => {
                    warn!("[RPC HA - {}] Primary client attempt {}/{} failed: {}", operation_name, attempt + 1, self.max_retries, e);
                    last_error = Some(e);
                    if attempt < self.max_retries - 1 {
                        let mut delay_ms = self.retry_delay.as_millis() as u64;
                        if delay_ms > 0 {
                            let jitter_val = rand::thread_rng().gen_range(0..(delay_ms / 4).max(1));
                            delay_ms += jitter_val;
                        }
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
        }

        for (i, fallback_client) in self.fallback_clients.iter().enumerate() {
            debug!("[RPC HA - {}] Attempting with fallback client #{}", operation_name, i + 1);
            match rpc_call_fn(Arc::clone(fallback_client)).await {
                Ok(result) => {
                    info!("[RPC HA - {}] Fallback client #{} succeeded.", operation_name, i + 1);
                    return Ok(result);
                }
                Err(e) => {
                    warn!("[RPC HA - {}] Fallback client #{} failed: {}", operation_name, i + 1, e);
                    last_error = Some(e);
                }
            }
        }

        error!("[RPC HA - {}] All RPC attempts failed.", operation_name);
        Err(last_error.unwrap_or_else(|| {
            ClientError::from(solana_client::client_error::ClientErrorKind::Custom(format!(
                "{}: no RPC client attempted",
                operation_name
            )))
        }))
    }

    pub async fn get_recent_prioritization_fees(&self) -> Result<Vec<u64>> {
        let fees = self
            .execute_with_retry_and_fallback(
                "get_recent_prioritization_fees",
                |client: Arc<NonBlockingRpcClient>| async move {
                    client.get_recent_prioritization_fees(&[]).await
                },
            )
            .await?;
        Ok(fees
            .into_iter()
            .map(|fee_info| fee_info.prioritization_fee)
            .collect())
    }
}

/// Collapse an RPC signature status into the executor's view of it.
/// Processed is not yet a fill; an unknown signature is still pending.
pub fn confirmation_from_status(status: Option<&TransactionStatus>) -> ConfirmationStatus {
    let Some(status) = status else {
        return ConfirmationStatus::Pending;
    };
    if let Some(err) = &status.err {
        return ConfirmationStatus::Errored(err.to_string());
    }
    match &status.confirmation_status {
        Some(TransactionConfirmationStatus::Finalized) => ConfirmationStatus::Finalized,
        Some(TransactionConfirmationStatus::Confirmed) => ConfirmationStatus::Confirmed,
        Some(TransactionConfirmationStatus::Processed) => ConfirmationStatus::Pending,
        // Older nodes leave the field empty; `confirmations: None` means rooted.
        None if status.confirmations.is_none() => ConfirmationStatus::Finalized,
        None => ConfirmationStatus::Pending,
    }
}

#[async_trait]
impl FeeSampleSource for SolanaRpcClient {
    async fn recent_fee_samples(&self) -> Result<Vec<u64>> {
        self.get_recent_prioritization_fees().await
    }
}

#[async_trait]
impl TransactionSubmitter for SolanaRpcClient {
    async fn submit(&self, transaction: &SignedTransaction) -> Result<String> {
        let versioned: VersionedTransaction = bincode::deserialize(&transaction.wire)?;
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(3),
            ..RpcSendTransactionConfig::default()
        };

        let signature = self
            .execute_with_retry_and_fallback("send_transaction", |client| {
                let versioned = versioned.clone();
                let config = config.clone();
                async move { client.send_transaction_with_config(&versioned, config).await }
            })
            .await
            .map_err(|e| SwapError::SubmissionFailed(e.to_string()))?;

        info!("📤 Transaction sent: {}", signature);
        Ok(signature.to_string())
    }

    async fn confirmation_status(&self, signature: &str) -> Result<ConfirmationStatus> {
        let signature = Signature::from_str(signature).map_err(|e| {
            SwapError::InvalidInput(format!("invalid signature '{}': {}", signature, e))
        })?;
        let response = self
            .execute_with_retry_and_fallback("get_signature_statuses", |client| async move {
                client.get_signature_statuses(&[signature]).await
            })
            .await?;

        Ok(confirmation_from_status(
            response.value.first().and_then(|status| status.as_ref()),
        ))
    }
}

#[async_trait]
impl TransactionSimulator for SolanaRpcClient {
    async fn simulate(&self, transaction: &SwapTransaction) -> Result<SimulationReport> {
        let versioned = decode_swap_transaction(&transaction.encoded)?;
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(DEFAULT_COMMITMENT),
            ..RpcSimulateTransactionConfig::default()
        };

        let response = self
            .primary_client
            .simulate_transaction_with_config(&versioned, config)
            .await
            .map_err(|e| SwapError::SimulationUnavailable(e.to_string()))?;
        let result = response.value;

        debug!(
            "🧪 Simulation: err={:?}, units={:?}",
            result.err, result.units_consumed
        );
        Ok(SimulationReport {
            will_succeed: result.err.is_none(),
            units_consumed: result.units_consumed,
            error: result.err.map(|e| e.to_string()),
            logs: result.logs.unwrap_or_default(),
        })
    }
}
