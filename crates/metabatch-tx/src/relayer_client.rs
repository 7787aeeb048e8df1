//! HTTP client for the relayer service.
//!
//! Endpoints:
//! - POST /api/v1/quote
//! - POST /api/v1/relay
//! - GET /api/v1/status?txhash=<transaction_hash>

use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use metabatch_types::{bytes_to_hex, Hex, MetabatchError, ReceiptStatus, Result};

use crate::{QuoteRequest, RelayRequest, RelayService, RelaySubmitResponse, WireQuote};

/// Body `code` the relayer uses when account nonce or deployment state is out of date.
pub const STALE_ACCOUNT_STATE_CODE: i32 = 409;

/// Relayer API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerResponse<T> {
    pub code: Option<i32>,
    pub message: Option<String>,
    pub user_message: Option<String>,
    pub data: Option<T>,
}

/// Relayer client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl RelayerConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

/// Relayer client for quoting and submitting batch transactions.
pub struct RelayerClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RelayerClient {
    pub fn new(config: &RelayerConfig) -> Self {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Poll the relayer for the state of a relayed transaction.
    ///
    /// GET /api/v1/status?txhash=<transaction_hash>
    pub async fn get_status(&self, transaction_hash: B256) -> Result<Option<ReceiptStatus>> {
        let url = format!(
            "{}?txhash={}",
            self.url("/api/v1/status"),
            bytes_to_hex(transaction_hash.as_slice())
        );

        let resp = self.client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MetabatchError::Watch(format!("relayer status request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let body: RelayerResponse<StatusBody> = resp
            .json()
            .await
            .map_err(|e| MetabatchError::Watch(format!("failed to parse relayer status: {}", e)))?;

        Ok(body.data.and_then(|d| parse_status(&d.status)))
    }
}

fn parse_status(status: &str) -> Option<ReceiptStatus> {
    match status.to_ascii_lowercase().as_str() {
        "pending" => Some(ReceiptStatus::Pending),
        "mined" | "success" | "confirmed" => Some(ReceiptStatus::Mined),
        "failed" | "reverted" | "dropped" => Some(ReceiptStatus::Failed),
        _ => None,
    }
}

/// Map a non-success quote response to an error.
pub fn classify_quote_failure(status: StatusCode, body: &str) -> MetabatchError {
    let parsed: Option<RelayerResponse<serde_json::Value>> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|r| r.code);
    let message = parsed
        .as_ref()
        .and_then(|r| r.message.clone())
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::CONFLICT || code == Some(STALE_ACCOUNT_STATE_CODE) {
        return MetabatchError::StaleAccountState(message);
    }
    if status.is_server_error() {
        return MetabatchError::Network(format!("relayer returned status {}: {}", status, message));
    }
    MetabatchError::QuoteRejected(format!("status {}: {}", status, message))
}

/// Map a non-success relay response to an error.
pub fn classify_relay_failure(status: StatusCode, body: &str) -> MetabatchError {
    let message = serde_json::from_str::<RelayerResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|r| r.user_message.or(r.message))
        .unwrap_or_else(|| body.to_string());

    if status.is_server_error() {
        return MetabatchError::SubmissionNetwork(format!(
            "relayer returned status {}: {}",
            status, message
        ));
    }
    MetabatchError::RelayRejected(format!("status {}: {}", status, message))
}

/// Quotes from a successful quote response. An empty list is a real answer;
/// a missing `data` field is not.
pub fn parse_quote_body(body: &str) -> Result<Vec<WireQuote>> {
    let envelope: RelayerResponse<Vec<WireQuote>> = serde_json::from_str(body)
        .map_err(|e| MetabatchError::MalformedQuote(format!("failed to parse relayer response: {}", e)))?;
    envelope
        .data
        .ok_or_else(|| MetabatchError::MalformedQuote("relayer response has no data".into()))
}

/// Transaction hash from a successful relay response. The relayer already
/// took the payload, so anything unreadable here is unconfirmed, not rejected.
pub fn parse_relay_body(body: &str) -> Result<Hex> {
    let envelope: RelayerResponse<RelaySubmitResponse> = serde_json::from_str(body).map_err(|e| {
        MetabatchError::SubmissionUnconfirmed(format!("failed to parse relayer response: {}", e))
    })?;
    envelope
        .data
        .map(|d| d.transaction_hash)
        .ok_or_else(|| MetabatchError::SubmissionUnconfirmed("relayer accepted without a transaction hash".into()))
}

#[async_trait]
impl RelayService for RelayerClient {
    /// POST /api/v1/quote
    async fn quote(&self, request: &QuoteRequest) -> Result<Vec<WireQuote>> {
        debug!(calls = request.batch_calls.len(), account = %request.account, "requesting fee quotes");

        let resp = self.client
            .post(self.url("/api/v1/quote"))
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MetabatchError::Network(format!("relayer request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_quote_failure(status, &body));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| MetabatchError::Network(format!("failed to read relayer response: {}", e)))?;
        parse_quote_body(&body)
    }

    /// POST /api/v1/relay
    async fn relay(&self, request: &RelayRequest) -> Result<Hex> {
        let resp = self.client
            .post(self.url("/api/v1/relay"))
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MetabatchError::SubmissionNetwork(format!("relayer request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_relay_failure(status, &body));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| MetabatchError::SubmissionUnconfirmed(format!("failed to read relayer response: {}", e)))?;
        parse_relay_body(&body)
    }

    async fn transaction_status(&self, transaction_hash: B256) -> Result<Option<ReceiptStatus>> {
        self.get_status(transaction_hash).await
    }
}
