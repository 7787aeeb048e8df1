//! Ephemeral record of the most recent negotiation per batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use alloy_primitives::B256;

use metabatch_types::{AccountState, BatchIntent, MetabatchError, Result};

use crate::FeeQuote;

/// The outcome of one successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub id: u64,
    pub chain_id: u64,
    pub batch_digest: B256,
    pub account: AccountState,
    pub quotes: Vec<FeeQuote>,
}

/// Most recent negotiation for each batch digest, kept in memory only.
///
/// Recording a new negotiation for a digest replaces the previous one, so
/// quotes from earlier rounds stop validating.
pub struct QuoteBook {
    next_id: AtomicU64,
    latest: Mutex<HashMap<B256, Negotiation>>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            latest: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn record(&self, negotiation: Negotiation) {
        let mut latest = self.latest.lock().unwrap();
        latest.insert(negotiation.batch_digest, negotiation);
    }

    /// Drop whatever was negotiated for this digest.
    pub fn forget(&self, batch_digest: &B256) {
        self.latest.lock().unwrap().remove(batch_digest);
    }

    pub fn clear(&self) {
        self.latest.lock().unwrap().clear();
    }

    pub fn latest(&self, batch_digest: &B256) -> Option<Negotiation> {
        self.latest.lock().unwrap().get(batch_digest).cloned()
    }

    /// Check that `quote` was offered by the latest negotiation of exactly
    /// this batch, for this account at its negotiated state.
    pub fn verify(
        &self,
        batch: &BatchIntent,
        quote: &FeeQuote,
        account: &AccountState,
    ) -> Result<Negotiation> {
        if quote.batch_digest() != batch.digest() {
            return Err(MetabatchError::QuoteMismatch(format!(
                "quote was computed for batch {}, not {}",
                quote.batch_digest(),
                batch.digest()
            )));
        }

        let negotiation = self.latest(&batch.digest()).ok_or_else(|| {
            MetabatchError::QuoteMismatch(format!("batch {} has not been negotiated", batch.digest()))
        })?;

        if negotiation.id != quote.negotiation_id() {
            return Err(MetabatchError::QuoteMismatch(format!(
                "quote from negotiation {} was superseded by negotiation {}",
                quote.negotiation_id(),
                negotiation.id
            )));
        }
        if !negotiation.quotes.contains(quote) {
            return Err(MetabatchError::QuoteMismatch(format!(
                "{} {} was not offered for this batch",
                quote.display_amount(),
                quote.token_symbol()
            )));
        }
        if negotiation.account.address != account.address {
            return Err(MetabatchError::QuoteMismatch(format!(
                "batch was negotiated for account {}, not {}",
                negotiation.account.address, account.address
            )));
        }
        if negotiation.account.nonce != account.nonce
            || negotiation.account.deployed != account.deployed
            || negotiation.account.version != account.version
        {
            return Err(MetabatchError::StaleAccountState(format!(
                "negotiated at nonce {} (deployed: {}), account now at nonce {} (deployed: {})",
                negotiation.account.nonce, negotiation.account.deployed, account.nonce, account.deployed
            )));
        }

        Ok(negotiation)
    }
}

impl Default for QuoteBook {
    fn default() -> Self {
        Self::new()
    }
}
