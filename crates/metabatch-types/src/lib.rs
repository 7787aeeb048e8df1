use alloy_primitives::{Address, B256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod chain;
pub mod model;

pub use model::{
    AccountState, BatchIntent, CallDescriptor, ReceiptStatus, SigningPayload, SubmissionReceipt,
};

/// 0x-prefixed hex string (e.g. "0x1234...").
pub type Hex = String;

/// Metabatch SDK error types.
#[derive(Debug, Error)]
pub enum MetabatchError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("batch contains no calls")]
    EmptyBatch,

    #[error("no active signer session")]
    NoSession,

    #[error("unsupported chain id {0}")]
    UnsupportedChain(u64),

    #[error("relayer unreachable: {0}")]
    Network(String),

    #[error("relayer returned no fee quotes for this batch")]
    NoQuotesAvailable,

    #[error("malformed fee quote: {0}")]
    MalformedQuote(String),

    #[error("relayer rejected quote request: {0}")]
    QuoteRejected(String),

    #[error("account state is stale: {0}")]
    StaleAccountState(String),

    #[error("fee quote does not belong to this batch: {0}")]
    QuoteMismatch(String),

    #[error("signing rejected: {0}")]
    SigningRejected(String),

    #[error("relayer rejected transaction: {0}")]
    RelayRejected(String),

    #[error("submission failed: {0}")]
    SubmissionNetwork(String),

    /// The relayer answered with success but no usable transaction hash.
    /// The payload may be in flight; do not rebuild and resubmit.
    #[error("relayer accepted the transaction but acceptance is unconfirmed: {0}")]
    SubmissionUnconfirmed(String),

    #[error("inclusion watch failed: {0}")]
    Watch(String),

    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MetabatchError>;

/// The stage of a batch lifecycle an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Session,
    Encode,
    Negotiate,
    Build,
    Sign,
    Submit,
    Watch,
    Lifecycle,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Session => "session",
            Stage::Encode => "encode",
            Stage::Negotiate => "negotiate",
            Stage::Build => "build",
            Stage::Sign => "sign",
            Stage::Submit => "submit",
            Stage::Watch => "watch",
            Stage::Lifecycle => "lifecycle",
        };
        f.write_str(name)
    }
}

impl MetabatchError {
    /// Stage that produced this error.
    pub fn stage(&self) -> Stage {
        use MetabatchError::*;
        match self {
            InvalidHex(_) | InvalidAddress(_) | Encoding(_) | EmptyBatch => Stage::Encode,
            NoSession | UnsupportedChain(_) => Stage::Session,
            Network(_) | NoQuotesAvailable | MalformedQuote(_) | QuoteRejected(_)
            | StaleAccountState(_) => Stage::Negotiate,
            QuoteMismatch(_) => Stage::Build,
            SigningRejected(_) => Stage::Sign,
            RelayRejected(_) | SubmissionNetwork(_) | SubmissionUnconfirmed(_) => Stage::Submit,
            Watch(_) => Stage::Watch,
            InvalidTransition { .. } | Other(_) => Stage::Lifecycle,
        }
    }

    /// Whether the only way forward is a fresh lifecycle starting at `Composing`.
    ///
    /// Encoding and negotiation failures leave the composed batch intact; the
    /// caller fixes the input or negotiates again. Anything that fails after
    /// the lifecycle has advanced past negotiation invalidates cached state.
    pub fn requires_restart(&self) -> bool {
        use MetabatchError::*;
        matches!(
            self,
            StaleAccountState(_)
                | QuoteMismatch(_)
                | SigningRejected(_)
                | RelayRejected(_)
                | SubmissionNetwork(_)
                | InvalidTransition { .. }
        )
    }

    /// Transient failures the caller may retry. Nothing in this SDK retries on its own.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            MetabatchError::Network(_) | MetabatchError::SubmissionNetwork(_) | MetabatchError::Watch(_)
        )
    }
}

/// Parse a hex string (with or without 0x prefix) to bytes.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| MetabatchError::InvalidHex(e.to_string()))
}

/// Convert bytes to a 0x-prefixed hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> Hex {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a 0x-prefixed 20-byte address.
pub fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s.trim()).map_err(|e| MetabatchError::InvalidAddress(format!("{}: {}", s, e)))
}

/// Parse a 0x-prefixed 32-byte hash.
pub fn parse_hash(s: &str) -> Result<B256> {
    let bytes = hex_to_bytes(s.trim())?;
    if bytes.len() != 32 {
        return Err(MetabatchError::InvalidHex(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> B256 {
    alloy_primitives::keccak256(data)
}
