//! Batch transaction builder.
//!
//! Combines a batch, a fee quote and the account's nonce/version into the
//! object the signer signs. Pure assembly: the quote book is consulted to
//! make sure the quote really prices this batch, nothing goes over the wire.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolStruct};
use serde::{Deserialize, Serialize};
use tracing::debug;

use metabatch_quote::{FeeQuote, QuoteBook};
use metabatch_types::{keccak256, AccountState, BatchIntent, Result, SigningPayload};

/// Gas limit attached to relayed batches unless configured otherwise.
pub const DEFAULT_GAS_LIMIT: u64 = 0x1E8480;

sol! {
    /// The struct whose hash the account signs.
    struct MetabatchTransaction {
        uint256 chainId;
        address account;
        uint256 nonce;
        bytes32 version;
        bytes32 batch;
        address feeToken;
        uint256 feePayment;
        uint256 gasLimit;
        bool deployed;
    }
}

/// Builder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub gas_limit: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self { gas_limit: DEFAULT_GAS_LIMIT }
    }
}

/// A batch bound to a fee quote and account state, ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTransaction {
    batch: BatchIntent,
    quote: FeeQuote,
    account: AccountState,
    chain_id: u64,
    gas_limit: u64,
    signing_hash: B256,
}

impl BatchTransaction {
    pub fn batch(&self) -> &BatchIntent {
        &self.batch
    }

    pub fn quote(&self) -> &FeeQuote {
        &self.quote
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn signing_hash(&self) -> B256 {
        self.signing_hash
    }

    pub fn signing_payload(&self) -> SigningPayload {
        SigningPayload {
            chain_id: self.chain_id,
            account: self.account.address,
            hash: self.signing_hash,
        }
    }
}

/// Builds `BatchTransaction`s against the quotes recorded in a `QuoteBook`.
pub struct TransactionBuilder {
    book: Arc<QuoteBook>,
    gas_limit: u64,
}

impl TransactionBuilder {
    pub fn new(book: Arc<QuoteBook>, config: &BuilderConfig) -> Self {
        Self { book, gas_limit: config.gas_limit }
    }

    /// Bind `batch` to `quote` for `account`.
    ///
    /// Fails with `QuoteMismatch` unless `quote` is one of the quotes from
    /// the most recent negotiation of this exact batch, and with
    /// `StaleAccountState` if the account moved since that negotiation.
    pub fn build(
        &self,
        batch: &BatchIntent,
        quote: &FeeQuote,
        account: &AccountState,
    ) -> Result<BatchTransaction> {
        let negotiation = self.book.verify(batch, quote, account)?;

        let signing_hash = signing_hash(
            negotiation.chain_id,
            account,
            batch.digest(),
            quote.token_address(),
            quote.raw_payment(),
            self.gas_limit,
        );
        debug!(digest = %batch.digest(), %signing_hash, token = quote.token_symbol(), "batch transaction built");

        Ok(BatchTransaction {
            batch: batch.clone(),
            quote: quote.clone(),
            account: account.clone(),
            chain_id: negotiation.chain_id,
            gas_limit: self.gas_limit,
            signing_hash,
        })
    }
}

/// keccak256(typeHash || abi.encode(fields))
fn signing_hash(
    chain_id: u64,
    account: &AccountState,
    batch_digest: B256,
    fee_token: Address,
    fee_payment: U256,
    gas_limit: u64,
) -> B256 {
    MetabatchTransaction {
        chainId: U256::from(chain_id),
        account: account.address,
        nonce: account.nonce,
        version: keccak256(account.version.as_bytes()),
        batch: batch_digest,
        feeToken: fee_token,
        feePayment: fee_payment,
        gasLimit: U256::from(gas_limit),
        deployed: account.deployed,
    }
    .eip712_hash_struct()
}
