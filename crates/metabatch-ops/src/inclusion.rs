//! Inclusion watch: follow a relayed transaction until it is mined or fails.
//!
//! Runs detached from `submit`. Status comes from a `ReceiptSource`: the
//! chain over JSON-RPC, or the relayer's own status endpoint.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use metabatch_tx::RelayService;
use metabatch_types::{bytes_to_hex, MetabatchError, ReceiptStatus, Result, SubmissionReceipt};

/// Where the watcher learns about a transaction's fate.
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// `None` while the source has nothing to report yet.
    async fn receipt_status(&self, transaction_hash: B256) -> Result<Option<ReceiptStatus>>;
}

/// Watch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub poll_ms: u64,
    pub max_attempts: u32,
    pub request_timeout_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_ms: 3_000,
            max_attempts: 100,
            request_timeout_ms: 20_000,
        }
    }
}

/// Chain RPC source: `eth_getTransactionReceipt`.
pub struct JsonRpcChain {
    rpc_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcReceipt>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcReceipt {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl JsonRpcChain {
    pub fn new(rpc_url: &str, config: &WatchConfig) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(config.request_timeout_ms))
                .build()
                .unwrap_or_default(),
        }
    }
}

/// Receipt `status` field: 0x1 success, 0x0 reverted.
fn status_from_receipt(receipt: &RpcReceipt) -> Option<ReceiptStatus> {
    match receipt.status.as_deref() {
        Some("0x1") => Some(ReceiptStatus::Mined),
        Some("0x0") => Some(ReceiptStatus::Failed),
        _ => None,
    }
}

#[async_trait]
impl ReceiptSource for JsonRpcChain {
    async fn receipt_status(&self, transaction_hash: B256) -> Result<Option<ReceiptStatus>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [bytes_to_hex(transaction_hash.as_slice())],
        });

        let resp = self.client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MetabatchError::Watch(format!("rpc request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(MetabatchError::Watch(format!("rpc returned status {}", resp.status())));
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| MetabatchError::Watch(format!("failed to parse rpc response: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(MetabatchError::Watch(format!("rpc error {}: {}", err.code, err.message)));
        }
        Ok(parsed.result.as_ref().and_then(status_from_receipt))
    }
}

/// Relayer status source.
pub struct RelayerStatus {
    relay: Arc<dyn RelayService>,
}

impl RelayerStatus {
    pub fn new(relay: Arc<dyn RelayService>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl ReceiptSource for RelayerStatus {
    async fn receipt_status(&self, transaction_hash: B256) -> Result<Option<ReceiptStatus>> {
        self.relay.transaction_status(transaction_hash).await
    }
}

/// Handle to a detached watch task.
pub struct WatchHandle {
    status: watch::Receiver<ReceiptStatus>,
    task: JoinHandle<Result<SubmissionReceipt>>,
}

impl WatchHandle {
    /// Latest known status.
    pub fn status(&self) -> ReceiptStatus {
        *self.status.borrow()
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReceiptStatus> {
        self.status.clone()
    }

    /// Wait for the watch to finish.
    pub async fn wait(self) -> Result<SubmissionReceipt> {
        self.task
            .await
            .map_err(|e| MetabatchError::Watch(format!("watch task aborted: {}", e)))?
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Polls a `ReceiptSource` until a receipt settles.
#[derive(Clone)]
pub struct InclusionWatcher {
    source: Arc<dyn ReceiptSource>,
    poll: Duration,
    max_attempts: u32,
}

impl InclusionWatcher {
    pub fn new(source: Arc<dyn ReceiptSource>, config: &WatchConfig) -> Self {
        Self {
            source,
            poll: Duration::from_millis(config.poll_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Poll until the transaction is mined or failed. Source errors count
    /// as an attempt and are logged, not returned.
    pub async fn watch(&self, receipt: SubmissionReceipt) -> Result<SubmissionReceipt> {
        self.watch_with(receipt, |_| {}).await
    }

    async fn watch_with<F>(&self, receipt: SubmissionReceipt, on_status: F) -> Result<SubmissionReceipt>
    where
        F: Fn(ReceiptStatus),
    {
        if receipt.status() != ReceiptStatus::Pending {
            return Ok(receipt);
        }
        let hash = receipt.transaction_hash();

        for attempt in 0..self.max_attempts {
            match self.source.receipt_status(hash).await {
                Ok(Some(status)) if status != ReceiptStatus::Pending => {
                    info!(transaction_hash = %hash, %status, "transaction settled");
                    on_status(status);
                    return receipt.settle(status);
                }
                Ok(_) => debug!(transaction_hash = %hash, attempt, "transaction still pending"),
                Err(e) => warn!(transaction_hash = %hash, attempt, error = %e, "receipt lookup failed"),
            }
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.poll).await;
            }
        }

        Err(MetabatchError::Watch(format!(
            "transaction {} not settled after {} attempts",
            hash, self.max_attempts
        )))
    }

    /// Watch in a background task; `submit` callers never wait on this.
    pub fn spawn(&self, receipt: SubmissionReceipt) -> WatchHandle {
        let (tx, rx) = watch::channel(receipt.status());
        let watcher = self.clone();
        let task = tokio::spawn(async move {
            watcher
                .watch_with(receipt, move |status| {
                    let _ = tx.send(status);
                })
                .await
        });
        WatchHandle { status: rx, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChain;

    fn fast() -> WatchConfig {
        WatchConfig { poll_ms: 1, max_attempts: 5, request_timeout_ms: 1_000 }
    }

    #[tokio::test]
    async fn test_pending_then_mined() {
        let hash = B256::repeat_byte(0x42);
        let chain = Arc::new(MemoryChain::new());
        chain.script(hash, vec![None, Some(ReceiptStatus::Pending), Some(ReceiptStatus::Mined)]);

        let watcher = InclusionWatcher::new(chain.clone(), &fast());
        let settled = watcher.watch(SubmissionReceipt::pending(hash)).await.unwrap();
        assert_eq!(settled.status(), ReceiptStatus::Mined);
        assert_eq!(chain.polls(), 3);
    }

    #[tokio::test]
    async fn test_spawned_watch_reports_failure() {
        let hash = B256::repeat_byte(0x43);
        let chain = Arc::new(MemoryChain::new());
        chain.script(hash, vec![None, Some(ReceiptStatus::Failed)]);

        let handle = InclusionWatcher::new(chain, &fast()).spawn(SubmissionReceipt::pending(hash));
        let mut updates = handle.subscribe();
        let settled = handle.wait().await.unwrap();
        assert_eq!(settled.status(), ReceiptStatus::Failed);
        assert_eq!(*updates.borrow_and_update(), ReceiptStatus::Failed);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let chain = Arc::new(MemoryChain::new());
        let watcher = InclusionWatcher::new(chain.clone(), &fast());
        let err = watcher.watch(SubmissionReceipt::pending(B256::ZERO)).await.unwrap_err();
        assert!(matches!(err, MetabatchError::Watch(_)));
        assert_eq!(chain.polls(), 5);
    }

    #[test]
    fn test_receipt_status_field() {
        let mined = RpcReceipt { status: Some("0x1".into()) };
        let reverted = RpcReceipt { status: Some("0x0".into()) };
        let legacy = RpcReceipt { status: None };
        assert_eq!(status_from_receipt(&mined), Some(ReceiptStatus::Mined));
        assert_eq!(status_from_receipt(&reverted), Some(ReceiptStatus::Failed));
        assert_eq!(status_from_receipt(&legacy), None);

        let body = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let parsed: RpcResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.result.is_none() && parsed.error.is_none());
    }
}
