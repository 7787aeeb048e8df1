//! In-memory receipt source (for testing and ephemeral use).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy_primitives::B256;
use async_trait::async_trait;

use metabatch_types::{ReceiptStatus, Result};

use crate::inclusion::ReceiptSource;

/// Answers receipt lookups from scripted sequences. Each poll consumes one
/// entry; the last entry repeats.
pub struct MemoryChain {
    scripts: Mutex<HashMap<B256, VecDeque<Option<ReceiptStatus>>>>,
    polls: AtomicUsize,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, transaction_hash: B256, statuses: Vec<Option<ReceiptStatus>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(transaction_hash, statuses.into_iter().collect());
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReceiptSource for MemoryChain {
    async fn receipt_status(&self, transaction_hash: B256) -> Result<Option<ReceiptStatus>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(&transaction_hash) else {
            return Ok(None);
        };
        let next = if script.len() > 1 { script.pop_front().flatten() } else { script.front().copied().flatten() };
        Ok(next)
    }
}
