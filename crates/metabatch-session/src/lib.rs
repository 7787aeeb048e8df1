//! Signer session: the authenticated signer, its account and chain.
//!
//! The session is a single-owner cell. It is filled by `connect` when the
//! external login flow hands over a signer, cleared by `disconnect`, and is
//! the only place the rest of the SDK asks for a signer.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use metabatch_types::{chain, MetabatchError, Result, SigningPayload};

pub mod memory;

/// Network the signer is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub chain_id: u64,
}

/// Signing capability supplied by the external smart-account layer.
///
/// `get_address` returns the smart account address the signer controls.
/// `sign_transaction` may suspend while the user confirms on a device; a
/// declined request returns `SigningRejected`.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn get_address(&self) -> Result<Address>;
    async fn sign_transaction(&self, payload: &SigningPayload) -> Result<Bytes>;
    async fn get_network(&self) -> Result<Network>;
}

/// Session lifecycle event for progress reporting.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connecting,
    Connected { address: Address, chain_id: u64 },
    Disconnected,
    Errored { message: String },
}

/// Callback type for session events.
pub type SessionEventHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// An established session.
#[derive(Clone)]
pub struct ActiveSession {
    signer: Arc<dyn Signer>,
    account_address: Address,
    chain_id: u64,
}

impl ActiveSession {
    pub fn signer(&self) -> Arc<dyn Signer> {
        Arc::clone(&self.signer)
    }

    pub fn account_address(&self) -> Address {
        self.account_address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl std::fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSession")
            .field("account_address", &self.account_address)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Holds the current signer, if any.
#[derive(Default)]
pub struct SignerSession {
    active: Option<ActiveSession>,
    on_event: Option<SessionEventHandler>,
}

impl SignerSession {
    pub fn new(on_event: Option<SessionEventHandler>) -> Self {
        Self { active: None, on_event }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(ref handler) = self.on_event {
            handler(event);
        }
    }

    /// Adopt a signer handed over by the login flow.
    ///
    /// Resolves the account address and network up front; a signer on a
    /// chain outside `chain::SUPPORTED_CHAINS` is refused and the previous
    /// session, if any, is left untouched.
    pub async fn connect(&mut self, signer: Arc<dyn Signer>) -> Result<&ActiveSession> {
        self.emit(SessionEvent::Connecting);

        let resolved: Result<(Address, u64)> = async {
            let account_address = signer.get_address().await?;
            let network = signer.get_network().await?;
            if !chain::is_supported(network.chain_id) {
                return Err(MetabatchError::UnsupportedChain(network.chain_id));
            }
            Ok((account_address, network.chain_id))
        }
        .await;

        let (account_address, chain_id) = match resolved {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "signer session connect failed");
                self.emit(SessionEvent::Errored { message: e.to_string() });
                return Err(e);
            }
        };

        info!(%account_address, chain_id, "signer session connected");
        self.emit(SessionEvent::Connected { address: account_address, chain_id });

        Ok(self.active.insert(ActiveSession { signer, account_address, chain_id }))
    }

    /// Drop the current signer. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if self.active.take().is_some() {
            info!("signer session disconnected");
            self.emit(SessionEvent::Disconnected);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// The active session, or `NoSession`.
    pub fn active(&self) -> Result<&ActiveSession> {
        self.active.as_ref().ok_or(MetabatchError::NoSession)
    }
}
