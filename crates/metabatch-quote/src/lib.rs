//! Fee quote negotiation with the relayer.
//!
//! - Send the batch and account state to the relayer
//! - Turn each `{symbol, decimals, payment}` answer into a `FeeQuote`
//! - Record the result so only the latest quotes for a batch can be built

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use metabatch_tx::{QuoteRequest, RelayService, WireQuote};
use metabatch_types::{AccountState, BatchIntent, MetabatchError, Result};

pub mod book;
pub mod display;

pub use book::{Negotiation, QuoteBook};
pub use display::{display_amount, DisplayAmount, DISPLAY_DECIMALS};

/// A relayer's offer to sponsor one specific batch for a payment in one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    token_symbol: String,
    token_address: Address,
    decimals: u8,
    raw_payment: U256,
    computed_display_amount: DisplayAmount,
    batch_digest: B256,
    negotiation_id: u64,
}

impl FeeQuote {
    fn from_wire(wire: &WireQuote, batch_digest: B256, negotiation_id: u64) -> Result<Self> {
        let payment = wire.payment.trim();
        if payment.is_empty() || !payment.chars().all(|c| c.is_ascii_digit()) {
            return Err(MetabatchError::MalformedQuote(format!(
                "payment {:?} for {} is not an integer",
                wire.payment, wire.token_symbol
            )));
        }
        let raw_payment = U256::from_str_radix(payment, 10).map_err(|e| {
            MetabatchError::MalformedQuote(format!("payment for {}: {}", wire.token_symbol, e))
        })?;

        Ok(Self {
            token_symbol: wire.token_symbol.clone(),
            token_address: wire.token_address,
            decimals: wire.decimals,
            raw_payment,
            computed_display_amount: display_amount(raw_payment, wire.decimals),
            batch_digest,
            negotiation_id,
        })
    }

    pub fn token_symbol(&self) -> &str {
        &self.token_symbol
    }

    pub fn token_address(&self) -> Address {
        self.token_address
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Payment in the token's smallest unit. This is what gets signed.
    pub fn raw_payment(&self) -> U256 {
        self.raw_payment
    }

    pub fn display_amount(&self) -> DisplayAmount {
        self.computed_display_amount
    }

    /// Digest of the batch this quote prices.
    pub fn batch_digest(&self) -> B256 {
        self.batch_digest
    }

    pub fn negotiation_id(&self) -> u64 {
        self.negotiation_id
    }
}

/// Negotiator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiatorConfig {
    /// Upper bound on one quote round-trip.
    pub timeout_ms: u64,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

/// Asks the relayer what it charges to sponsor a batch.
pub struct Negotiator {
    relay: Arc<dyn RelayService>,
    book: Arc<QuoteBook>,
    timeout: Duration,
}

impl Negotiator {
    pub fn new(relay: Arc<dyn RelayService>, book: Arc<QuoteBook>, config: &NegotiatorConfig) -> Self {
        Self {
            relay,
            book,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn book(&self) -> &Arc<QuoteBook> {
        &self.book
    }

    /// Fetch fee quotes for `batch` from the relayer.
    ///
    /// Quotes come back in the order the relayer sent them. On success they
    /// replace any earlier quotes for the same batch. Any other answer from
    /// the relayer (refusal, stale account, malformed or empty quotes) drops
    /// earlier quotes; only a network failure or timeout leaves them.
    pub async fn negotiate(
        &self,
        chain_id: u64,
        batch: &BatchIntent,
        account: &AccountState,
    ) -> Result<Vec<FeeQuote>> {
        let digest = batch.digest();
        let request = QuoteRequest::new(chain_id, batch, account);
        debug!(%digest, calls = batch.len(), account = %account.address, "negotiating fee quotes");

        let answer = match tokio::time::timeout(self.timeout, self.relay.quote(&request)).await {
            Ok(answer) => answer,
            Err(_) => {
                warn!(%digest, timeout_ms = self.timeout.as_millis() as u64, "quote request timed out");
                return Err(MetabatchError::Network(format!(
                    "quote request timed out after {} ms",
                    self.timeout.as_millis()
                )));
            }
        };

        let wire_quotes = match answer {
            Ok(quotes) => quotes,
            Err(e) => {
                if !matches!(e, MetabatchError::Network(_)) {
                    self.book.forget(&digest);
                }
                warn!(%digest, error = %e, "quote request failed");
                return Err(e);
            }
        };

        if wire_quotes.is_empty() {
            self.book.forget(&digest);
            info!(%digest, "relayer offered no fee quotes");
            return Err(MetabatchError::NoQuotesAvailable);
        }

        let id = self.book.next_id();
        let quotes = match wire_quotes
            .iter()
            .map(|w| FeeQuote::from_wire(w, digest, id))
            .collect::<Result<Vec<_>>>()
        {
            Ok(quotes) => quotes,
            Err(e) => {
                self.book.forget(&digest);
                warn!(%digest, error = %e, "relayer sent a malformed quote");
                return Err(e);
            }
        };

        self.book.record(Negotiation {
            id,
            chain_id,
            batch_digest: digest,
            account: account.clone(),
            quotes: quotes.clone(),
        });

        info!(%digest, negotiation = id, quotes = quotes.len(), "fee quotes received");
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metabatch_tx::memory::{MemoryRelay, RelayFailure};
    use metabatch_types::CallDescriptor;

    fn usdc() -> Address {
        Address::repeat_byte(0xc0)
    }

    fn account() -> AccountState {
        AccountState::new(Address::repeat_byte(0xaa), U256::ZERO, false, "1.0.1")
    }

    fn batch(calls: u8) -> BatchIntent {
        let calls = (0..calls)
            .map(|i| CallDescriptor::new(Address::repeat_byte(i + 1), vec![i]))
            .collect();
        BatchIntent::new(calls).unwrap()
    }

    fn wire(symbol: &str, decimals: u8, payment: &str) -> WireQuote {
        WireQuote {
            token_symbol: symbol.into(),
            token_address: Address::repeat_byte(symbol.len() as u8),
            decimals,
            payment: payment.into(),
        }
    }

    fn negotiator(relay: Arc<MemoryRelay>, timeout_ms: u64) -> Negotiator {
        Negotiator::new(relay, Arc::new(QuoteBook::new()), &NegotiatorConfig { timeout_ms })
    }

    #[tokio::test]
    async fn test_quotes_keep_relayer_order() {
        let relay = Arc::new(MemoryRelay::new(vec![
            wire("WETH", 18, "120000000000000"),
            wire("USDC", 6, "500000"),
            wire("DAI", 18, "510000000000000000"),
        ]));
        let negotiator = negotiator(Arc::clone(&relay), 1_000);

        let quotes = negotiator.negotiate(97, &batch(2), &account()).await.unwrap();
        let symbols: Vec<&str> = quotes.iter().map(|q| q.token_symbol()).collect();
        assert_eq!(symbols, ["WETH", "USDC", "DAI"]);
        assert_eq!(quotes[1].display_amount().to_string(), "0.50000000");
        assert_eq!(quotes[2].display_amount().to_string(), "0.51000000");
        assert_eq!(quotes[1].raw_payment(), U256::from(500_000u64));

        let sent = relay.quote_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].batch_calls.len(), 2);
        assert!(!sent[0].account_state.deployed);
    }

    #[tokio::test]
    async fn test_single_usdc_quote() {
        let relay = Arc::new(MemoryRelay::single_quote("USDC", usdc(), 6, "500000"));
        let negotiator = negotiator(relay, 1_000);
        let b = batch(2);

        let quotes = negotiator.negotiate(97, &b, &account()).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].token_address(), usdc());
        assert_eq!(quotes[0].batch_digest(), b.digest());

        let recorded = negotiator.book().latest(&b.digest()).unwrap();
        assert_eq!(recorded.quotes, quotes);
    }

    #[tokio::test]
    async fn test_empty_answer_is_no_quotes() {
        let relay = Arc::new(MemoryRelay::default());
        let negotiator = negotiator(relay, 1_000);
        let err = negotiator.negotiate(97, &batch(1), &account()).await.unwrap_err();
        assert!(matches!(err, MetabatchError::NoQuotesAvailable));
    }

    #[tokio::test]
    async fn test_failures_propagate_unchanged() {
        let relay = Arc::new(MemoryRelay::single_quote("USDC", usdc(), 6, "1"));
        let negotiator = negotiator(Arc::clone(&relay), 1_000);
        let b = batch(1);
        negotiator.negotiate(97, &b, &account()).await.unwrap();

        relay.fail_quotes(Some(RelayFailure::Unreachable));
        let err = negotiator.negotiate(97, &b, &account()).await.unwrap_err();
        assert!(matches!(err, MetabatchError::Network(_)));
        assert!(negotiator.book().latest(&b.digest()).is_some());

        relay.fail_quotes(Some(RelayFailure::StaleAccount));
        let err = negotiator.negotiate(97, &b, &account()).await.unwrap_err();
        assert!(matches!(err, MetabatchError::StaleAccountState(_)));
        assert!(negotiator.book().latest(&b.digest()).is_none());
    }

    #[tokio::test]
    async fn test_refused_renegotiation_drops_old_quotes() {
        let relay = Arc::new(MemoryRelay::single_quote("USDC", usdc(), 6, "500000"));
        let negotiator = negotiator(Arc::clone(&relay), 1_000);
        let b = batch(2);

        let old = negotiator.negotiate(97, &b, &account()).await.unwrap();
        relay.fail_quotes(Some(RelayFailure::Rejected));
        let err = negotiator.negotiate(97, &b, &account()).await.unwrap_err();
        assert!(matches!(err, MetabatchError::QuoteRejected(_)));
        assert!(negotiator.book().latest(&b.digest()).is_none());
        assert!(matches!(
            negotiator.book().verify(&b, &old[0], &account()),
            Err(MetabatchError::QuoteMismatch(_))
        ));

        relay.fail_quotes(None);
        let old = negotiator.negotiate(97, &b, &account()).await.unwrap();
        relay.set_quotes(vec![wire("USDC", 6, "oops")]);
        let err = negotiator.negotiate(97, &b, &account()).await.unwrap_err();
        assert!(matches!(err, MetabatchError::MalformedQuote(_)));
        assert!(matches!(
            negotiator.book().verify(&b, &old[0], &account()),
            Err(MetabatchError::QuoteMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_payment() {
        let relay = Arc::new(MemoryRelay::new(vec![wire("USDC", 6, "0.5")]));
        let negotiator = negotiator(relay, 1_000);
        let err = negotiator.negotiate(97, &batch(1), &account()).await.unwrap_err();
        assert!(matches!(err, MetabatchError::MalformedQuote(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let relay = Arc::new(MemoryRelay::single_quote("USDC", usdc(), 6, "1"));
        relay.set_delay(Some(Duration::from_millis(500)));
        let negotiator = negotiator(relay, 20);
        let err = negotiator.negotiate(97, &batch(1), &account()).await.unwrap_err();
        assert!(matches!(err, MetabatchError::Network(_)));
    }

    #[tokio::test]
    async fn test_book_rejects_superseded_and_foreign_quotes() {
        let relay = Arc::new(MemoryRelay::single_quote("USDC", usdc(), 6, "500000"));
        let negotiator = negotiator(Arc::clone(&relay), 1_000);
        let a = batch(2);
        let b = batch(3);

        let first = negotiator.negotiate(97, &a, &account()).await.unwrap();
        assert!(negotiator.book().verify(&a, &first[0], &account()).is_ok());

        // same token, different price, for another batch
        relay.set_quotes(vec![WireQuote {
            token_symbol: "USDC".into(),
            token_address: usdc(),
            decimals: 6,
            payment: "700000".into(),
        }]);
        let other = negotiator.negotiate(97, &b, &account()).await.unwrap();
        let err = negotiator.book().verify(&a, &other[0], &account()).unwrap_err();
        assert!(matches!(err, MetabatchError::QuoteMismatch(_)));

        // re-negotiating batch a supersedes the first round
        let second = negotiator.negotiate(97, &a, &account()).await.unwrap();
        let err = negotiator.book().verify(&a, &first[0], &account()).unwrap_err();
        assert!(matches!(err, MetabatchError::QuoteMismatch(_)));
        assert!(negotiator.book().verify(&a, &second[0], &account()).is_ok());

        let mut moved = account();
        moved.nonce = U256::from(1u8);
        let err = negotiator.book().verify(&a, &second[0], &moved).unwrap_err();
        assert!(matches!(err, MetabatchError::StaleAccountState(_)));

        let mut stranger = account();
        stranger.address = Address::repeat_byte(0xbb);
        let err = negotiator.book().verify(&a, &second[0], &stranger).unwrap_err();
        assert!(matches!(err, MetabatchError::QuoteMismatch(_)));
    }
}
