//! Wallet Management Module
//!
//! Local keypair signer for aggregator-built versioned transactions.

use crate::{
    dex::clients::jupiter::decode_swap_transaction,
    error::{Result, SwapError},
    liquidity::{
        providers::TransactionSigner,
        types::{SignedTransaction, SwapTransaction},
    },
    utils::load_keypair,
};
use async_trait::async_trait;
use log::{debug, info};
use solana_sdk::{
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};

/// Signs swaps with a keypair held in memory.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let keypair = load_keypair(path)?;
        info!("🔑 Signer ready for {}", keypair.pubkey());
        Ok(Self::new(keypair))
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn owner(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    async fn sign(&self, transaction: &SwapTransaction) -> Result<SignedTransaction> {
        let unsigned = decode_swap_transaction(&transaction.encoded)?;

        let fee_payer = unsigned.message.static_account_keys().first().copied();
        if fee_payer != Some(self.keypair.pubkey()) {
            return Err(SwapError::SigningFailed(format!(
                "transaction fee payer {:?} is not {}",
                fee_payer,
                self.keypair.pubkey()
            )));
        }

        let signed = VersionedTransaction::try_new(unsigned.message, &[&self.keypair])
            .map_err(|e| SwapError::SigningFailed(e.to_string()))?;
        let signature = signed
            .signatures
            .first()
            .map(|s| s.to_string())
            .ok_or_else(|| SwapError::SigningFailed("no signature produced".to_string()))?;
        let wire = bincode::serialize(&signed)?;

        debug!("✍️ Signed swap transaction {}", signature);
        Ok(SignedTransaction { signature, wire })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose, Engine as _};
    use solana_sdk::{
        message::{Message, VersionedMessage},
        pubkey::Pubkey,
        signature::Signature,
    };

    fn unsigned_for(payer: &Pubkey) -> SwapTransaction {
        let transaction = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(Message::new(&[], Some(payer))),
        };
        SwapTransaction {
            encoded: general_purpose::STANDARD.encode(bincode::serialize(&transaction).unwrap()),
            last_valid_block_height: None,
            compute_unit_limit: None,
            prioritization_fee_lamports: None,
        }
    }

    #[tokio::test]
    async fn test_signs_transaction_for_own_key() {
        let signer = KeypairSigner::new(Keypair::new());
        let owner = signer.keypair.pubkey();

        let signed = signer.sign(&unsigned_for(&owner)).await.unwrap();
        let decoded: VersionedTransaction = bincode::deserialize(&signed.wire).unwrap();

        assert_eq!(decoded.signatures[0].to_string(), signed.signature);
        assert_ne!(decoded.signatures[0], Signature::default());
        assert!(decoded.verify_with_results().iter().all(|ok| *ok));
        assert_eq!(signer.owner(), owner.to_string());
    }

    #[tokio::test]
    async fn test_refuses_foreign_fee_payer() {
        let signer = KeypairSigner::new(Keypair::new());
        let err = signer
            .sign(&unsigned_for(&Pubkey::new_unique()))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::SigningFailed(_)));
    }

    #[test]
    fn test_missing_keypair_file() {
        assert!(KeypairSigner::from_file("/definitely/not/here.json").is_err());
    }
}
