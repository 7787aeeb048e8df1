//! Relayer wire types and the relay service boundary.
//!
//! - Quote request: batch calls + account state -> fee quotes per token
//! - Relay request: signed batch transaction -> transaction hash
//! - Status lookup for relayed transactions

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use metabatch_types::{AccountState, BatchIntent, CallDescriptor, Hex, ReceiptStatus, Result};

pub mod memory;
pub mod relayer_client;

/// Fee quote request for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub chain_id: u64,
    pub account: Address,
    pub account_state: WireAccountState,
    pub batch_calls: Vec<CallDescriptor>,
}

/// Account state as sent to the relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAccountState {
    pub nonce: U256,
    pub deployed: bool,
    pub version: String,
}

impl QuoteRequest {
    pub fn new(chain_id: u64, batch: &BatchIntent, account: &AccountState) -> Self {
        Self {
            chain_id,
            account: account.address,
            account_state: WireAccountState {
                nonce: account.nonce,
                deployed: account.deployed,
                version: account.version.clone(),
            },
            batch_calls: batch.calls().to_vec(),
        }
    }
}

/// One token the relayer accepts as fee payment, as returned on the wire.
///
/// `payment` is an integer in the token's smallest unit, encoded as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQuote {
    #[serde(alias = "symbol")]
    pub token_symbol: String,
    #[serde(alias = "address")]
    pub token_address: Address,
    #[serde(alias = "decimal")]
    pub decimals: u8,
    pub payment: String,
}

/// Signed batch transaction as submitted to the relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransactionWire {
    pub chain_id: u64,
    pub account: Address,
    pub nonce: U256,
    pub version: String,
    pub deployed: bool,
    pub gas_limit: u64,
    pub batch_calls: Vec<CallDescriptor>,
    pub fee_token: Address,
    pub fee_payment: String,
    pub signing_hash: B256,
    pub signature: Bytes,
}

/// Relay request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub signed_transaction: SignedTransactionWire,
}

/// Relay acceptance body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySubmitResponse {
    pub transaction_hash: Hex,
}

/// A relayer that prices and submits batch transactions.
///
/// Implementations classify their own failures: quote calls return
/// `Network`, `StaleAccountState`, `QuoteRejected` or `MalformedQuote`;
/// relay calls return `SubmissionNetwork` or `RelayRejected`.
#[async_trait]
pub trait RelayService: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Vec<WireQuote>>;

    async fn relay(&self, request: &RelayRequest) -> Result<Hex>;

    /// Relayer-side view of a relayed transaction, if it has one.
    async fn transaction_status(&self, _transaction_hash: B256) -> Result<Option<ReceiptStatus>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_request_shape() {
        let call = CallDescriptor::new(Address::repeat_byte(0x11), vec![0x09, 0x5e]);
        let batch = BatchIntent::new(vec![call]).unwrap();
        let account = AccountState::new(Address::repeat_byte(0x22), U256::from(3u8), false, "1.0.1");

        let json = serde_json::to_value(QuoteRequest::new(97, &batch, &account)).unwrap();
        assert_eq!(json["chainId"], 97);
        assert_eq!(json["accountState"]["deployed"], false);
        assert_eq!(json["batchCalls"].as_array().unwrap().len(), 1);
        assert_eq!(json["batchCalls"][0]["data"], "0x095e");
    }

    #[test]
    fn test_wire_quote_accepts_short_field_names() {
        let body = r#"{
            "symbol": "USDC",
            "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "decimal": 6,
            "payment": "500000"
        }"#;
        let quote: WireQuote = serde_json::from_str(body).unwrap();
        assert_eq!(quote.token_symbol, "USDC");
        assert_eq!(quote.decimals, 6);
        assert_eq!(quote.payment, "500000");
    }
}
