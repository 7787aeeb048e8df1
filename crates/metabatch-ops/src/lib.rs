//! End-to-end batch orchestration: compose, negotiate, build, sign, submit.
//!
//! `BatchFlow` owns one batch lifecycle and enforces its ordering: quotes
//! are only fetched for the calls currently composed, a transaction is only
//! built from the latest quotes, and only a built transaction is signed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use metabatch_abi::{encode_call, CallIntent, ContractInterface};
use metabatch_batch::{BatchAssembler, BatchTransaction, BuilderConfig, TransactionBuilder};
use metabatch_quote::{FeeQuote, Negotiator, NegotiatorConfig, QuoteBook};
use metabatch_session::SignerSession;
use metabatch_tx::RelayService;
use metabatch_types::{
    AccountState, BatchIntent, CallDescriptor, MetabatchError, ReceiptStatus, Result, SubmissionReceipt,
};

pub mod inclusion;
pub mod lifecycle;
pub mod memory;
pub mod notice;
pub mod submit;

pub use inclusion::{InclusionWatcher, JsonRpcChain, ReceiptSource, RelayerStatus, WatchConfig, WatchHandle};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use notice::Notice;
pub use submit::{SignedBatchTransaction, SubmitConfig, Submitter};

/// Configuration for every stage of a batch flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default)]
    pub negotiator: NegotiatorConfig,
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub submit: SubmitConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// One batch, from the first call to the relayer's receipt.
pub struct BatchFlow {
    lifecycle: Lifecycle,
    calls: Vec<CallDescriptor>,
    batch: Option<BatchIntent>,
    quotes: Vec<FeeQuote>,
    transaction: Option<BatchTransaction>,
    receipt: Option<SubmissionReceipt>,
    negotiator: Negotiator,
    builder: TransactionBuilder,
    submitter: Submitter,
}

impl BatchFlow {
    /// A flow that quotes and submits through `relay`. Quotes recorded by
    /// this flow are private to it.
    pub fn new(relay: Arc<dyn RelayService>, config: &FlowConfig) -> Self {
        let book = Arc::new(QuoteBook::new());
        Self {
            lifecycle: Lifecycle::new(),
            calls: Vec::new(),
            batch: None,
            quotes: Vec::new(),
            transaction: None,
            receipt: None,
            negotiator: Negotiator::new(Arc::clone(&relay), Arc::clone(&book), &config.negotiator),
            builder: TransactionBuilder::new(book, &config.builder),
            submitter: Submitter::new(relay, &config.submit),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn calls(&self) -> &[CallDescriptor] {
        &self.calls
    }

    /// Quotes from the latest negotiation, in relayer order.
    pub fn quotes(&self) -> &[FeeQuote] {
        &self.quotes
    }

    pub fn transaction(&self) -> Option<&BatchTransaction> {
        self.transaction.as_ref()
    }

    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    /// Drop everything derived from the current call set and return to `Composing`.
    fn invalidate(&mut self) -> Result<()> {
        self.lifecycle.reset()?;
        if self.batch.is_some() || self.transaction.is_some() {
            debug!("call set changed; discarding quotes and built transaction");
        }
        self.batch = None;
        self.quotes.clear();
        self.transaction = None;
        Ok(())
    }

    /// Append a call. Any negotiated or built state is discarded.
    pub fn add_call(&mut self, session: &SignerSession, call: CallDescriptor) -> Result<()> {
        session.active()?;
        self.invalidate()?;
        self.calls.push(call);
        Ok(())
    }

    /// Encode and append a call intent.
    pub fn add_intent(
        &mut self,
        session: &SignerSession,
        interface: &ContractInterface,
        intent: &CallIntent,
    ) -> Result<()> {
        let call = encode_call(interface, intent)?;
        self.add_call(session, call)
    }

    /// Abandon the batch. Only possible before it has been relayed.
    pub fn abandon(&mut self) -> Result<()> {
        self.invalidate()?;
        self.calls.clear();
        Ok(())
    }

    /// Freeze the composed calls and ask the relayer for fee quotes.
    ///
    /// Calling this again re-negotiates from scratch.
    pub async fn negotiate(&mut self, session: &SignerSession, account: &AccountState) -> Result<&[FeeQuote]> {
        let chain_id = session.active()?.chain_id();
        self.invalidate()?;

        let batch = self
            .calls
            .iter()
            .cloned()
            .fold(BatchAssembler::new(session)?, BatchAssembler::append)
            .build()?;

        let quotes = self.negotiator.negotiate(chain_id, &batch, account).await?;
        self.lifecycle.advance(LifecycleState::Negotiated)?;
        self.batch = Some(batch);
        self.quotes = quotes;
        Ok(&self.quotes)
    }

    /// Bind the composed calls to `quote`.
    ///
    /// The quote is checked against the calls as they are now, so a quote
    /// fetched before the last `add_call` is rejected with `QuoteMismatch`.
    pub fn build(&mut self, quote: &FeeQuote, account: &AccountState) -> Result<&BatchTransaction> {
        let batch = match &self.batch {
            Some(batch) => batch.clone(),
            None => BatchIntent::new(self.calls.clone())?,
        };
        let tx = self.builder.build(&batch, quote, account)?;
        // picking another quote from the same negotiation replaces the build
        if self.state() != LifecycleState::Built {
            self.lifecycle.advance(LifecycleState::Built)?;
        }
        Ok(&*self.transaction.insert(tx))
    }

    /// Build with the quote at `index` of the latest negotiation.
    pub fn select_quote(&mut self, index: usize, account: &AccountState) -> Result<&BatchTransaction> {
        let quote = self.quotes.get(index).cloned().ok_or_else(|| {
            MetabatchError::QuoteMismatch(format!(
                "no quote at index {} ({} offered)",
                index,
                self.quotes.len()
            ))
        })?;
        self.build(&quote, account)
    }

    /// Sign the built transaction with the session's signer and relay it.
    ///
    /// On failure the flow stays in `Signing` and the signed payload is
    /// dropped. `negotiate`, `add_call` or `abandon` start a new round.
    pub async fn submit(&mut self, session: &SignerSession) -> Result<SubmissionReceipt> {
        let tx = self.transaction.clone().ok_or_else(|| MetabatchError::InvalidTransition {
            from: self.state().to_string(),
            to: LifecycleState::Signing.to_string(),
        })?;
        self.lifecycle.advance(LifecycleState::Signing)?;

        let signer = session
            .active()
            .map_err(|_| MetabatchError::SigningRejected("no signer connected".into()))?
            .signer();

        let receipt = self.submitter.submit(tx, signer.as_ref()).await?;
        self.lifecycle.advance(LifecycleState::Submitted)?;
        self.receipt = Some(receipt.clone());
        info!(transaction_hash = %receipt.transaction_hash(), "batch submitted");
        Ok(receipt)
    }

    /// Start watching the submitted transaction in the background.
    pub fn watch(&self, watcher: &InclusionWatcher) -> Result<WatchHandle> {
        let receipt = self.receipt.clone().ok_or_else(|| MetabatchError::InvalidTransition {
            from: self.state().to_string(),
            to: "watching".to_string(),
        })?;
        Ok(watcher.spawn(receipt))
    }

    /// Record the settled receipt reported by the inclusion watch.
    pub fn settle(&mut self, receipt: SubmissionReceipt) -> Result<()> {
        let next = match receipt.status() {
            ReceiptStatus::Mined => LifecycleState::Mined,
            ReceiptStatus::Failed => LifecycleState::Failed,
            ReceiptStatus::Pending => {
                return Err(MetabatchError::InvalidTransition {
                    from: self.state().to_string(),
                    to: ReceiptStatus::Pending.to_string(),
                })
            }
        };
        let current = self.receipt.as_ref().map(|r| r.transaction_hash());
        if current != Some(receipt.transaction_hash()) {
            return Err(MetabatchError::Other(format!(
                "receipt {} does not belong to this batch",
                receipt.transaction_hash()
            )));
        }
        self.lifecycle.advance(next)?;
        self.receipt = Some(receipt);
        Ok(())
    }
}
