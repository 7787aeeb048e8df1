//! In-memory relay service (for testing and ephemeral use).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

use metabatch_types::{bytes_to_hex, keccak256, Hex, MetabatchError, ReceiptStatus, Result};

use crate::{QuoteRequest, RelayRequest, RelayService, WireQuote};

/// Scripted failure for the next calls to a `MemoryRelay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFailure {
    /// Request never reaches the relayer.
    Unreachable,
    /// Relayer refuses the request.
    Rejected,
    /// Relayer reports the account state out of date (quotes only).
    StaleAccount,
}

/// Relay service that answers from scripted state.
///
/// Quotes are returned as configured. Relayed transactions get a
/// transaction hash of keccak256(signature) and start out pending.
pub struct MemoryRelay {
    quotes: Mutex<Vec<WireQuote>>,
    quote_failure: Mutex<Option<RelayFailure>>,
    relay_failure: Mutex<Option<RelayFailure>>,
    delay: Mutex<Option<Duration>>,
    quote_requests: Mutex<Vec<QuoteRequest>>,
    relay_requests: Mutex<Vec<RelayRequest>>,
    statuses: Mutex<HashMap<B256, ReceiptStatus>>,
}

impl MemoryRelay {
    pub fn new(quotes: Vec<WireQuote>) -> Self {
        Self {
            quotes: Mutex::new(quotes),
            quote_failure: Mutex::new(None),
            relay_failure: Mutex::new(None),
            delay: Mutex::new(None),
            quote_requests: Mutex::new(Vec::new()),
            relay_requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// A relay quoting a single token.
    pub fn single_quote(symbol: &str, token: Address, decimals: u8, payment: &str) -> Self {
        Self::new(vec![WireQuote {
            token_symbol: symbol.to_string(),
            token_address: token,
            decimals,
            payment: payment.to_string(),
        }])
    }

    pub fn set_quotes(&self, quotes: Vec<WireQuote>) {
        *self.quotes.lock().unwrap() = quotes;
    }

    pub fn fail_quotes(&self, failure: Option<RelayFailure>) {
        *self.quote_failure.lock().unwrap() = failure;
    }

    pub fn fail_relay(&self, failure: Option<RelayFailure>) {
        *self.relay_failure.lock().unwrap() = failure;
    }

    /// Delay every response, to exercise caller timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_status(&self, transaction_hash: B256, status: ReceiptStatus) {
        self.statuses.lock().unwrap().insert(transaction_hash, status);
    }

    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.quote_requests.lock().unwrap().clone()
    }

    pub fn relay_requests(&self) -> Vec<RelayRequest> {
        self.relay_requests.lock().unwrap().clone()
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl RelayService for MemoryRelay {
    async fn quote(&self, request: &QuoteRequest) -> Result<Vec<WireQuote>> {
        self.quote_requests.lock().unwrap().push(request.clone());
        self.wait().await;

        let failure = *self.quote_failure.lock().unwrap();
        match failure {
            Some(RelayFailure::Unreachable) => Err(MetabatchError::Network("connection refused".into())),
            Some(RelayFailure::Rejected) => Err(MetabatchError::QuoteRejected("batch not sponsorable".into())),
            Some(RelayFailure::StaleAccount) => Err(MetabatchError::StaleAccountState(format!(
                "nonce {} is behind",
                request.account_state.nonce
            ))),
            None => Ok(self.quotes.lock().unwrap().clone()),
        }
    }

    async fn relay(&self, request: &RelayRequest) -> Result<Hex> {
        self.relay_requests.lock().unwrap().push(request.clone());
        self.wait().await;

        let failure = *self.relay_failure.lock().unwrap();
        match failure {
            Some(RelayFailure::Unreachable) => {
                Err(MetabatchError::SubmissionNetwork("connection reset".into()))
            }
            Some(RelayFailure::Rejected) | Some(RelayFailure::StaleAccount) => {
                Err(MetabatchError::RelayRejected("quote expired".into()))
            }
            None => {
                let hash = keccak256(&request.signed_transaction.signature);
                self.statuses
                    .lock()
                    .unwrap()
                    .entry(hash)
                    .or_insert(ReceiptStatus::Pending);
                Ok(bytes_to_hex(hash.as_slice()))
            }
        }
    }

    async fn transaction_status(&self, transaction_hash: B256) -> Result<Option<ReceiptStatus>> {
        Ok(self.statuses.lock().unwrap().get(&transaction_hash).copied())
    }
}
