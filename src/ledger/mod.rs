//! Ledger gateway client.
//!
//! A `LedgerGateway` hands out one `LedgerSession` per operation. Sessions
//! are never pooled: the orchestrator acquires, runs its transactions and
//! releases by value, so a session cannot be released twice.

pub mod http;
pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::HealthRecord;

pub use http::HttpLedgerGateway;
pub use memory::{LedgerCall, MemoryLedger};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Cannot connect to ledger network: {0}")]
    Connection(String),

    #[error("Transaction {transaction} failed: {reason}")]
    Transaction { transaction: String, reason: String },

    #[error("Ledger call {operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Malformed ledger result: {0}")]
    MalformedResult(String),
}

/// Named chaincode operations exposed by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transaction {
    CreateHealthRecord,
    QueryHealthRecord,
    QueryAllHealthRecords,
    UpdateHealthRecord,
    DeleteHealthRecord,
}

impl Transaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateHealthRecord => "CreateHealthRecord",
            Self::QueryHealthRecord => "QueryHealthRecord",
            Self::QueryAllHealthRecords => "QueryAllHealthRecords",
            Self::UpdateHealthRecord => "UpdateHealthRecord",
            Self::DeleteHealthRecord => "DeleteHealthRecord",
        }
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens authenticated sessions to the ledger network.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn LedgerSession>, LedgerError>;
}

/// One exclusive ledger session. All arguments travel as strings.
#[async_trait]
pub trait LedgerSession: Send + Sync {
    /// Submit a state-changing transaction.
    async fn submit(&self, tx: Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError>;

    /// Evaluate a read-only transaction.
    async fn evaluate(&self, tx: Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError>;

    /// Disconnect. Implementations log and swallow failures.
    async fn release(self: Box<Self>);
}

/// Run one ledger call under a deadline.
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

/// Decode a single-record query result. An empty body or JSON `null`
/// means the record does not exist.
pub fn parse_record(raw: &[u8]) -> Result<Option<HealthRecord>, LedgerError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| LedgerError::MalformedResult(e.to_string()))?
        .trim();
    if text.is_empty() || text == "null" {
        return Ok(None);
    }
    serde_json::from_str::<Option<HealthRecord>>(text)
        .map_err(|e| LedgerError::MalformedResult(e.to_string()))
}

/// Decode a record listing. An empty body is an empty listing.
pub fn parse_records(raw: &[u8]) -> Result<Vec<HealthRecord>, LedgerError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| LedgerError::MalformedResult(e.to_string()))?
        .trim();
    if text.is_empty() || text == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).map_err(|e| LedgerError::MalformedResult(e.to_string()))
}
