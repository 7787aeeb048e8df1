//! Relay submitter: sign a batch transaction and hand it to the relayer.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use metabatch_batch::BatchTransaction;
use metabatch_session::Signer;
use metabatch_tx::{RelayRequest, RelayService, SignedTransactionWire};
use metabatch_types::{parse_hash, MetabatchError, Result, SubmissionReceipt};

/// Submitter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Upper bound on the relay round-trip. Signing is not bounded: it waits
    /// for the user.
    pub timeout_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

/// A batch transaction with the signer's signature attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBatchTransaction {
    transaction: BatchTransaction,
    signature: Bytes,
}

impl SignedBatchTransaction {
    pub fn transaction(&self) -> &BatchTransaction {
        &self.transaction
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    pub fn to_request(&self) -> RelayRequest {
        let tx = &self.transaction;
        RelayRequest {
            signed_transaction: SignedTransactionWire {
                chain_id: tx.chain_id(),
                account: tx.account().address,
                nonce: tx.account().nonce,
                version: tx.account().version.clone(),
                deployed: tx.account().deployed,
                gas_limit: tx.gas_limit(),
                batch_calls: tx.batch().calls().to_vec(),
                fee_token: tx.quote().token_address(),
                fee_payment: tx.quote().raw_payment().to_string(),
                signing_hash: tx.signing_hash(),
                signature: self.signature.clone(),
            },
        }
    }
}

/// Signs batch transactions and submits them to the relayer that quoted them.
pub struct Submitter {
    relay: Arc<dyn RelayService>,
    timeout: Duration,
}

impl Submitter {
    pub fn new(relay: Arc<dyn RelayService>, config: &SubmitConfig) -> Self {
        Self {
            relay,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Ask the signer for a signature over `tx` and relay it.
    ///
    /// Nothing reaches the relayer unless the signer approved. The returned
    /// receipt is `Pending`; inclusion is tracked separately.
    pub async fn submit(&self, tx: BatchTransaction, signer: &dyn Signer) -> Result<SubmissionReceipt> {
        let signed = self.sign(tx, signer).await?;
        self.relay_signed(&signed).await
    }

    /// Signing half of `submit`.
    pub async fn sign(&self, tx: BatchTransaction, signer: &dyn Signer) -> Result<SignedBatchTransaction> {
        let network = signer
            .get_network()
            .await
            .map_err(|e| MetabatchError::SigningRejected(format!("signer unavailable: {}", e)))?;
        if network.chain_id != tx.chain_id() {
            return Err(MetabatchError::SigningRejected(format!(
                "signer is on chain {}, transaction targets chain {}",
                network.chain_id,
                tx.chain_id()
            )));
        }

        let signature = signer
            .sign_transaction(&tx.signing_payload())
            .await
            .map_err(|e| match e {
                MetabatchError::SigningRejected(_) => e,
                other => MetabatchError::SigningRejected(other.to_string()),
            })?;

        Ok(SignedBatchTransaction { transaction: tx, signature })
    }

    /// Relay half of `submit`. A payload the relayer rejected must not be
    /// sent again; build a new transaction from a fresh quote instead.
    pub async fn relay_signed(&self, signed: &SignedBatchTransaction) -> Result<SubmissionReceipt> {
        let request = signed.to_request();
        let outcome = tokio::time::timeout(self.timeout, self.relay.relay(&request))
            .await
            .map_err(|_| {
                MetabatchError::SubmissionNetwork(format!(
                    "relay request timed out after {} ms",
                    self.timeout.as_millis()
                ))
            })?;

        let hash_hex = match outcome {
            Ok(hash) => hash,
            Err(e) => {
                warn!(signing_hash = %signed.transaction().signing_hash(), error = %e, "relay failed");
                return Err(match e {
                    MetabatchError::Network(msg) => MetabatchError::SubmissionNetwork(msg),
                    other => other,
                });
            }
        };

        let transaction_hash = parse_hash(&hash_hex).map_err(|_| {
            warn!(signing_hash = %signed.transaction().signing_hash(), hash = %hash_hex, "unreadable transaction hash");
            MetabatchError::SubmissionUnconfirmed(format!(
                "relayer returned malformed transaction hash {:?}",
                hash_hex
            ))
        })?;

        info!(%transaction_hash, "batch transaction relayed");
        Ok(SubmissionReceipt::pending(transaction_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use metabatch_batch::{BuilderConfig, TransactionBuilder};
    use metabatch_quote::{Negotiator, NegotiatorConfig, QuoteBook};
    use metabatch_session::memory::MemorySigner;
    use metabatch_tx::memory::MemoryRelay;
    use metabatch_tx::{QuoteRequest, WireQuote};
    use metabatch_types::{chain, keccak256, AccountState, BatchIntent, CallDescriptor, Hex, ReceiptStatus};

    /// Accepts every payload but answers with a hash that is not 32 bytes.
    struct GarbledHashRelay;

    #[async_trait]
    impl RelayService for GarbledHashRelay {
        async fn quote(&self, _request: &QuoteRequest) -> Result<Vec<WireQuote>> {
            Ok(Vec::new())
        }

        async fn relay(&self, _request: &RelayRequest) -> Result<Hex> {
            Ok("0x1234".to_string())
        }
    }

    fn account() -> AccountState {
        AccountState::new(Address::repeat_byte(0x5a), U256::ZERO, true, "1.0.1")
    }

    async fn built() -> BatchTransaction {
        let relay = Arc::new(MemoryRelay::single_quote("USDC", Address::repeat_byte(0xc0), 6, "500000"));
        let book = Arc::new(QuoteBook::new());
        let negotiator = Negotiator::new(relay, Arc::clone(&book), &NegotiatorConfig::default());
        let batch = BatchIntent::new(vec![CallDescriptor::new(Address::repeat_byte(0x11), vec![0x01])]).unwrap();
        let quotes = negotiator.negotiate(chain::BNB_TESTNET, &batch, &account()).await.unwrap();
        TransactionBuilder::new(book, &BuilderConfig::default())
            .build(&batch, &quotes[0], &account())
            .unwrap()
    }

    #[tokio::test]
    async fn test_sign_then_relay() {
        let relay = Arc::new(MemoryRelay::default());
        let signer = MemorySigner::new(Address::repeat_byte(0x5a), chain::BNB_TESTNET);
        let submitter = Submitter::new(relay.clone(), &SubmitConfig::default());

        let signed = submitter.sign(built().await, &signer).await.unwrap();
        let receipt = submitter.relay_signed(&signed).await.unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Pending);
        assert_eq!(receipt.transaction_hash(), keccak256(signed.signature()));
        assert_eq!(relay.relay_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_network_never_signs() {
        let relay = Arc::new(MemoryRelay::default());
        let signer = MemorySigner::new(Address::repeat_byte(0x5a), chain::POLYGON_MAINNET);
        let submitter = Submitter::new(relay.clone(), &SubmitConfig::default());

        let err = submitter.submit(built().await, &signer).await.unwrap_err();
        assert!(matches!(err, MetabatchError::SigningRejected(_)));
        assert_eq!(signer.sign_requests(), 0);
        assert!(relay.relay_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_hash_is_unconfirmed() {
        let signer = MemorySigner::new(Address::repeat_byte(0x5a), chain::BNB_TESTNET);
        let submitter = Submitter::new(Arc::new(GarbledHashRelay), &SubmitConfig::default());

        let err = submitter.submit(built().await, &signer).await.unwrap_err();
        assert!(matches!(err, MetabatchError::SubmissionUnconfirmed(_)));
        assert!(!err.requires_restart());
        assert!(!err.retryable());
    }
}
