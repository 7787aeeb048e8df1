//! Batch assembly: collect calls into one ordered batch intent.
//!
//! - Requires an active signer session
//! - Calls keep insertion order; duplicate targets are allowed
//! - `build` refuses an empty batch

use metabatch_abi::{encode_call, CallIntent, ContractInterface};
use metabatch_session::SignerSession;
use metabatch_types::{BatchIntent, CallDescriptor, Result};

pub mod builder;

pub use builder::{BatchTransaction, BuilderConfig, TransactionBuilder};

/// Collects calls for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchAssembler {
    calls: Vec<CallDescriptor>,
}

impl BatchAssembler {
    /// Start a batch. Fails with `NoSession` when no signer is connected.
    pub fn new(session: &SignerSession) -> Result<Self> {
        session.active()?;
        Ok(Self { calls: Vec::new() })
    }

    /// Reopen a finished batch to change its calls. The result is a new
    /// batch with its own digest; quotes for the old one do not carry over.
    pub fn reopen(session: &SignerSession, batch: BatchIntent) -> Result<Self> {
        session.active()?;
        Ok(Self { calls: batch.into_calls() })
    }

    pub fn append(mut self, call: CallDescriptor) -> Self {
        self.calls.push(call);
        self
    }

    /// Encode `intent` against `interface` and append it.
    pub fn append_intent(self, interface: &ContractInterface, intent: &CallIntent) -> Result<Self> {
        let call = encode_call(interface, intent)?;
        Ok(self.append(call))
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn build(self) -> Result<BatchIntent> {
        BatchIntent::new(self.calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use metabatch_session::memory::MemorySigner;
    use metabatch_types::{chain, MetabatchError};
    use std::sync::Arc;

    async fn connected() -> SignerSession {
        let mut session = SignerSession::new(None);
        let signer = Arc::new(MemorySigner::new(Address::repeat_byte(0xaa), chain::BNB_TESTNET));
        session.connect(signer).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_build_preserves_insertion_order() {
        let session = connected().await;
        let appended: Vec<CallDescriptor> = (0u8..16)
            .map(|i| CallDescriptor::new(Address::repeat_byte(i % 3), vec![i, i]))
            .collect();

        let mut assembler = BatchAssembler::new(&session).unwrap();
        for call in &appended {
            assembler = assembler.append(call.clone());
        }
        let batch = assembler.build().unwrap();

        assert_eq!(batch.len(), appended.len());
        for (i, call) in appended.iter().enumerate() {
            assert_eq!(&batch.calls()[i], call);
        }
    }

    #[tokio::test]
    async fn test_empty_build_fails() {
        let session = connected().await;
        let err = BatchAssembler::new(&session).unwrap().build().unwrap_err();
        assert!(matches!(err, MetabatchError::EmptyBatch));
    }

    #[test]
    fn test_requires_session() {
        let session = SignerSession::new(None);
        assert!(matches!(BatchAssembler::new(&session), Err(MetabatchError::NoSession)));
    }

    #[tokio::test]
    async fn test_append_intent_and_reopen() {
        let session = connected().await;
        let iface = ContractInterface::parse(&["function approve(address spender, uint256 amount)"]).unwrap();
        let token = Address::repeat_byte(0xc0);
        let intent = CallIntent::new(token, "approve", &["0x000000000000000000000000000000000000dEaD", "1000000"]);

        let batch = BatchAssembler::new(&session)
            .unwrap()
            .append_intent(&iface, &intent)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(batch.calls()[0].to(), token);

        let bad = CallIntent::new(token, "approve", &["0x000000000000000000000000000000000000dEaD", "lots"]);
        assert!(matches!(
            BatchAssembler::new(&session).unwrap().append_intent(&iface, &bad),
            Err(MetabatchError::Encoding(_))
        ));

        let first_digest = batch.digest();
        let grown = BatchAssembler::reopen(&session, batch)
            .unwrap()
            .append(CallDescriptor::new(token, vec![0x01]))
            .build()
            .unwrap();
        assert_eq!(grown.len(), 2);
        assert_ne!(grown.digest(), first_digest);
    }
}
