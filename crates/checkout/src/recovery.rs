//! Local recovery records.
//!
//! Written when a payment succeeded at the gateway but the ledger could not
//! record it. Records are append-only and only read by support tooling.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{MerchantTransactionId, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors that can occur when persisting recovery records.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Recovery store unavailable: {0}")]
    Unavailable(String),
}

/// Everything support needs to reconcile a payment by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub order_id: OrderId,
    pub merchant_transaction_id: MerchantTransactionId,
    pub payment_id: String,
    pub amount: Money,
    /// Raw gateway payload of the successful payment.
    pub raw_payment: Option<serde_json::Value>,
    pub ledger_error: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only store for recovery records.
#[async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn persist(&self, record: &RecoveryRecord) -> Result<(), RecoveryError>;
}

/// Appends records as JSON lines to a local file.
#[derive(Debug, Clone)]
pub struct FileRecoveryStore {
    path: PathBuf,
}

impl FileRecoveryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecoveryStore for FileRecoveryStore {
    async fn persist(&self, record: &RecoveryRecord) -> Result<(), RecoveryError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// In-memory recovery store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecoveryStore {
    records: Arc<Mutex<Vec<RecoveryRecord>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryRecoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail on persist.
    pub fn set_fail_on_persist(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Records persisted so far.
    pub fn records(&self) -> Vec<RecoveryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RecoveryStore for InMemoryRecoveryStore {
    async fn persist(&self, record: &RecoveryRecord) -> Result<(), RecoveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RecoveryError::Unavailable("device storage full".to_string()));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payment_id: &str) -> RecoveryRecord {
        RecoveryRecord {
            order_id: OrderId::new(),
            merchant_transaction_id: MerchantTransactionId::new("TXN1"),
            payment_id: payment_id.to_string(),
            amount: Money::from_minor(18000),
            raw_payment: Some(serde_json::json!({"state": "COMPLETED"})),
            ledger_error: "Ledger unavailable: timeout".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_file_store_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecoveryStore::new(dir.path().join("recovery").join("records.jsonl"));

        let first = record("PAY-1");
        let second = record("PAY-2");
        store.persist(&first).await.unwrap();
        store.persist(&second).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let lines: Vec<RecoveryRecord> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![first, second]);
    }

    #[tokio::test]
    async fn test_in_memory_store_failure() {
        let store = InMemoryRecoveryStore::new();
        store.set_fail_on_persist(true);
        assert!(store.persist(&record("PAY-1")).await.is_err());
        assert!(store.records().is_empty());
    }
}
