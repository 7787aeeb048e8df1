//! In-memory signer (for testing and ephemeral use).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;

use metabatch_types::{keccak256, MetabatchError, Result, SigningPayload};

use crate::{Network, Signer};

/// Signer that approves or declines every request without user interaction.
///
/// Signatures are deterministic: keccak256(address || hash) || hash-derived
/// tail, 65 bytes. They only need to be stable, not valid ECDSA.
pub struct MemorySigner {
    address: Address,
    chain_id: u64,
    decline: AtomicBool,
    sign_requests: AtomicUsize,
}

impl MemorySigner {
    pub fn new(address: Address, chain_id: u64) -> Self {
        Self {
            address,
            chain_id,
            decline: AtomicBool::new(false),
            sign_requests: AtomicUsize::new(0),
        }
    }

    /// A signer whose user declines every request.
    pub fn declining(address: Address, chain_id: u64) -> Self {
        let signer = Self::new(address, chain_id);
        signer.set_decline(true);
        signer
    }

    pub fn set_decline(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }

    pub fn sign_requests(&self) -> usize {
        self.sign_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for MemorySigner {
    async fn get_address(&self) -> Result<Address> {
        Ok(self.address)
    }

    async fn sign_transaction(&self, payload: &SigningPayload) -> Result<Bytes> {
        self.sign_requests.fetch_add(1, Ordering::SeqCst);
        if self.decline.load(Ordering::SeqCst) {
            return Err(MetabatchError::SigningRejected("user declined the request".into()));
        }
        if payload.account != self.address {
            return Err(MetabatchError::SigningRejected(format!(
                "signer controls {}, payload is for {}",
                self.address, payload.account
            )));
        }

        let mut preimage = self.address.to_vec();
        preimage.extend_from_slice(payload.hash.as_slice());
        let mut sig = keccak256(&preimage).to_vec();
        sig.extend_from_slice(keccak256(payload.hash.as_slice()).as_slice());
        sig.push(27);
        Ok(Bytes::from(sig))
    }

    async fn get_network(&self) -> Result<Network> {
        Ok(Network { chain_id: self.chain_id })
    }
}
