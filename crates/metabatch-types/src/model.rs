//! Shared data model: call descriptors, batch intents, account state, receipts.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{keccak256, MetabatchError, Result};

/// A single contract call: target, calldata and optional native value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDescriptor {
    to: Address,
    data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<U256>,
}

impl CallDescriptor {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self { to, data: data.into(), value: None }
    }

    pub fn with_value(to: Address, data: impl Into<Bytes>, value: U256) -> Self {
        Self { to, data: data.into(), value: Some(value) }
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn value(&self) -> Option<U256> {
        self.value
    }
}

/// An ordered, non-empty sequence of calls executed atomically.
///
/// The digest commits to every call in order and is what fee quotes are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchIntent {
    calls: Vec<CallDescriptor>,
    digest: B256,
}

impl BatchIntent {
    pub fn new(calls: Vec<CallDescriptor>) -> Result<Self> {
        if calls.is_empty() {
            return Err(MetabatchError::EmptyBatch);
        }
        let digest = batch_digest(&calls);
        Ok(Self { calls, digest })
    }

    pub fn calls(&self) -> &[CallDescriptor] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn digest(&self) -> B256 {
        self.digest
    }

    pub fn into_calls(self) -> Vec<CallDescriptor> {
        self.calls
    }
}

/// keccak256( for each call: to(20) || value(32) || keccak256(data)(32) )
fn batch_digest(calls: &[CallDescriptor]) -> B256 {
    let mut buf = Vec::with_capacity(calls.len() * 84);
    for call in calls {
        buf.extend_from_slice(call.to.as_slice());
        buf.extend_from_slice(&call.value.unwrap_or_default().to_be_bytes::<32>());
        buf.extend_from_slice(keccak256(&call.data).as_slice());
    }
    keccak256(&buf)
}

/// On-chain state of the smart account a batch is priced and signed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub address: Address,
    pub nonce: U256,
    /// Whether the account contract exists yet. Undeployed accounts are
    /// deployed by the relayer as part of the first batch.
    pub deployed: bool,
    pub version: String,
}

impl AccountState {
    pub fn new(address: Address, nonce: U256, deployed: bool, version: &str) -> Self {
        Self { address, nonce, deployed, version: version.to_string() }
    }
}

/// What a signer is asked to sign for one batch transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningPayload {
    pub chain_id: u64,
    pub account: Address,
    pub hash: B256,
}

/// Status of a relayed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Pending,
    Mined,
    Failed,
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptStatus::Pending => f.write_str("pending"),
            ReceiptStatus::Mined => f.write_str("mined"),
            ReceiptStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Result of a relayer accepting a signed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    transaction_hash: B256,
    status: ReceiptStatus,
}

impl SubmissionReceipt {
    pub fn pending(transaction_hash: B256) -> Self {
        Self { transaction_hash, status: ReceiptStatus::Pending }
    }

    pub fn transaction_hash(&self) -> B256 {
        self.transaction_hash
    }

    pub fn status(&self) -> ReceiptStatus {
        self.status
    }

    /// Move a pending receipt to its final status. Only the inclusion watch
    /// calls this; settled receipts never change again.
    pub fn settle(self, status: ReceiptStatus) -> Result<Self> {
        if self.status != ReceiptStatus::Pending || status == ReceiptStatus::Pending {
            return Err(MetabatchError::InvalidTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        Ok(Self { transaction_hash: self.transaction_hash, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::from(bytes)
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(BatchIntent::new(vec![]), Err(MetabatchError::EmptyBatch)));
    }

    #[test]
    fn test_digest_depends_on_order() {
        let a = CallDescriptor::new(addr(1), vec![0x01]);
        let b = CallDescriptor::new(addr(2), vec![0x02]);

        let ab = BatchIntent::new(vec![a.clone(), b.clone()]).unwrap();
        let ba = BatchIntent::new(vec![b.clone(), a.clone()]).unwrap();
        let ab_again = BatchIntent::new(vec![a, b]).unwrap();

        assert_ne!(ab.digest(), ba.digest());
        assert_eq!(ab.digest(), ab_again.digest());
    }

    #[test]
    fn test_duplicate_targets_allowed() {
        let a = CallDescriptor::new(addr(1), vec![0x01]);
        let batch = BatchIntent::new(vec![a.clone(), a]).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_call_descriptor_json_omits_missing_value() {
        let call = CallDescriptor::new(addr(1), vec![0xab]);
        let json = serde_json::to_value(&call).unwrap();
        assert!(json.get("value").is_none());
        assert_eq!(json["data"], "0xab");
    }

    #[test]
    fn test_receipt_settles_once() {
        let receipt = SubmissionReceipt::pending(B256::repeat_byte(0x11));
        let mined = receipt.clone().settle(ReceiptStatus::Mined).unwrap();
        assert_eq!(mined.status(), ReceiptStatus::Mined);
        assert_eq!(mined.transaction_hash(), receipt.transaction_hash());

        assert!(mined.settle(ReceiptStatus::Failed).is_err());
        assert!(receipt.settle(ReceiptStatus::Pending).is_err());
    }
}
