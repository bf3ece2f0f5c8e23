//! In-process ledger for development and tests.
//!
//! Mirrors the chaincode's presence rules (create needs absence, update and
//! delete need presence), records every call in order and can be told to
//! fail or stall specific transactions.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{LedgerError, LedgerGateway, LedgerSession, Transaction};
use crate::models::HealthRecord;

/// One observed interaction with the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Acquire,
    Submit { tx: Transaction, args: Vec<String> },
    Evaluate { tx: Transaction, args: Vec<String> },
    Release,
}

#[derive(Default)]
struct LedgerState {
    records: BTreeMap<String, HealthRecord>,
    calls: Vec<LedgerCall>,
    refuse_connections: bool,
    failing: HashSet<Transaction>,
    stalled: HashSet<Transaction>,
}

/// Cloneable handle; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the call log.
    pub fn insert(&self, record: HealthRecord) {
        self.lock().records.insert(record.patient_id.clone(), record);
    }

    pub fn get(&self, patient_id: &str) -> Option<HealthRecord> {
        self.lock().records.get(patient_id).cloned()
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&LedgerCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn releases(&self) -> usize {
        self.count(|c| *c == LedgerCall::Release)
    }

    pub fn submits(&self, tx: Transaction) -> Vec<Vec<String>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                LedgerCall::Submit { tx: t, args } if *t == tx => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    pub fn fail_transaction(&self, tx: Transaction) {
        self.lock().failing.insert(tx);
    }

    /// Make a transaction hang forever, for timeout tests.
    pub fn stall_transaction(&self, tx: Transaction) {
        self.lock().stalled.insert(tx);
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // A panicking test thread must not hide the log from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn acquire(&self) -> Result<Box<dyn LedgerSession>, LedgerError> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(LedgerError::Connection("identity user1 not found in wallet".into()));
        }
        state.calls.push(LedgerCall::Acquire);
        Ok(Box::new(MemorySession {
            ledger: self.clone(),
        }))
    }
}

struct MemorySession {
    ledger: MemoryLedger,
}

impl MemorySession {
    async fn run(
        &self,
        tx: Transaction,
        args: &[String],
        submit: bool,
    ) -> Result<Vec<u8>, LedgerError> {
        let args = args.to_vec();
        let stalled = {
            let mut state = self.ledger.lock();
            state.calls.push(if submit {
                LedgerCall::Submit { tx, args: args.clone() }
            } else {
                LedgerCall::Evaluate { tx, args: args.clone() }
            });
            if state.failing.contains(&tx) {
                return Err(LedgerError::Transaction {
                    transaction: tx.to_string(),
                    reason: "endorsement failure".into(),
                });
            }
            state.stalled.contains(&tx)
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.ledger.lock();
        apply(&mut state.records, tx, &args)
    }
}

fn arg(args: &[String], index: usize) -> String {
    args.get(index).cloned().unwrap_or_default()
}

fn apply(
    records: &mut BTreeMap<String, HealthRecord>,
    tx: Transaction,
    args: &[String],
) -> Result<Vec<u8>, LedgerError> {
    let rejected = |reason: String| LedgerError::Transaction {
        transaction: tx.to_string(),
        reason,
    };
    let patient_id = arg(args, 0);

    match tx {
        Transaction::CreateHealthRecord => {
            if records.contains_key(&patient_id) {
                return Err(rejected(format!("record {patient_id} already exists")));
            }
            let record = HealthRecord {
                patient_id: patient_id.clone(),
                name: arg(args, 1),
                age: arg(args, 2),
                gender: arg(args, 3),
                email: arg(args, 4),
                phone_number: arg(args, 5),
                diagnosis: arg(args, 6),
                treatment_plan: arg(args, 7),
                symptoms: arg(args, 8),
                medications: arg(args, 9),
                allergies: arg(args, 10),
                doctor_name: arg(args, 11),
                doctor_id: arg(args, 12),
            };
            records.insert(patient_id, record);
            Ok(Vec::new())
        }
        Transaction::QueryHealthRecord => match records.get(&patient_id) {
            Some(record) => encode(record),
            None => Ok(Vec::new()),
        },
        Transaction::QueryAllHealthRecords => {
            let all: Vec<&HealthRecord> = records.values().collect();
            encode(&all)
        }
        Transaction::UpdateHealthRecord => {
            let record = records
                .get_mut(&patient_id)
                .ok_or_else(|| rejected(format!("record {patient_id} does not exist")))?;
            record.diagnosis = arg(args, 1);
            record.treatment_plan = arg(args, 2);
            record.symptoms = arg(args, 3);
            record.medications = arg(args, 4);
            record.allergies = arg(args, 5);
            record.doctor_name = arg(args, 6);
            record.doctor_id = arg(args, 7);
            Ok(Vec::new())
        }
        Transaction::DeleteHealthRecord => records
            .remove(&patient_id)
            .map(|_| Vec::new())
            .ok_or_else(|| rejected(format!("record {patient_id} does not exist"))),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(value).map_err(|e| LedgerError::MalformedResult(e.to_string()))
}

#[async_trait]
impl LedgerSession for MemorySession {
    async fn submit(&self, tx: Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.run(tx, args, true).await
    }

    async fn evaluate(&self, tx: Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.run(tx, args, false).await
    }

    async fn release(self: Box<Self>) {
        self.ledger.lock().calls.push(LedgerCall::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::parse_record;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn create_then_query_roundtrip() {
        let ledger = MemoryLedger::new();
        let session = ledger.acquire().await.unwrap();
        let mut create = vec![String::new(); 13];
        create[0] = "P1".into();
        create[1] = "Ravi".into();
        session
            .submit(Transaction::CreateHealthRecord, &create)
            .await
            .unwrap();

        let raw = session
            .evaluate(Transaction::QueryHealthRecord, &args(&["P1"]))
            .await
            .unwrap();
        session.release().await;

        let record = parse_record(&raw).unwrap().unwrap();
        assert_eq!(record.name, "Ravi");
        assert_eq!(ledger.releases(), 1);
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let ledger = MemoryLedger::new();
        ledger.insert(HealthRecord {
            patient_id: "P1".into(),
            ..Default::default()
        });
        let session = ledger.acquire().await.unwrap();
        let err = session
            .submit(Transaction::CreateHealthRecord, &args(&["P1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Transaction { .. }));
    }

    #[tokio::test]
    async fn delete_of_absent_record_rejected() {
        let ledger = MemoryLedger::new();
        let session = ledger.acquire().await.unwrap();
        assert!(session
            .submit(Transaction::DeleteHealthRecord, &args(&["nope"]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn refused_connection_logs_nothing() {
        let ledger = MemoryLedger::new();
        ledger.refuse_connections();
        assert!(ledger.acquire().await.is_err());
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn injected_failure_still_logged() {
        let ledger = MemoryLedger::new();
        ledger.fail_transaction(Transaction::QueryAllHealthRecords);
        let session = ledger.acquire().await.unwrap();
        assert!(session
            .evaluate(Transaction::QueryAllHealthRecords, &[])
            .await
            .is_err());
        assert_eq!(ledger.calls().len(), 2);
    }
}
