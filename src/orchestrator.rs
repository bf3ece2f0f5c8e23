//! Record orchestration: ledger transactions, artifact hand-off and
//! notification fan-out for every record operation.
//!
//! Each operation acquires its own ledger session, runs its transactions
//! through a private `*_in_session` step and releases the session before
//! looking at the result, so release happens exactly once on every path
//! past acquisition. Artifact and notification failures only degrade the
//! returned delivery flags.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::artifact::{Artifact, ArtifactGenerator};
use crate::diff::{diff, ChangeSummary};
use crate::error::ServiceError;
use crate::ledger::{
    bounded, parse_record, parse_records, LedgerError, LedgerGateway, LedgerSession, Transaction,
};
use crate::models::{HealthRecord, NewRecord, Notifications, RecordUpdate};
use crate::notify::{EmailMessage, NotificationDispatcher, SmsMessage};

/// Identity reported in access notifications when the caller is anonymous.
pub const DEFAULT_ACCESSOR: &str = "System";

const RECORD_NOT_FOUND: &str = "Health record not found";

// ═══════════════════════════════════════════════════════════
// Responses
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReceipt {
    pub patient_id: String,
    pub notifications: Notifications,
}

/// A queried record plus access metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAccess {
    #[serde(flatten)]
    pub record: HealthRecord,
    pub accessed_by: String,
    pub last_accessed: DateTime<Utc>,
    /// Only `sms` can be set; not part of the wire response.
    #[serde(skip)]
    pub notifications: Notifications,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordListing {
    pub count: usize,
    pub records: Vec<HealthRecord>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReceipt {
    pub patient_id: String,
    pub changes: ChangeSummary,
    pub notifications: Notifications,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReceipt {
    pub patient_id: String,
    pub deletion_time: DateTime<Utc>,
    #[serde(skip)]
    pub notifications: Notifications,
}

// ═══════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════

pub struct RecordOrchestrator {
    ledger: Arc<dyn LedgerGateway>,
    artifacts: Arc<dyn ArtifactGenerator>,
    notifier: NotificationDispatcher,
    timeout: Duration,
}

impl RecordOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        artifacts: Arc<dyn ArtifactGenerator>,
        notifier: NotificationDispatcher,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            artifacts,
            notifier,
            timeout,
        }
    }

    // ─── Create ──────────────────────────────────────────────

    pub async fn create(&self, input: NewRecord) -> Result<CreateReceipt, ServiceError> {
        let missing = input.missing_required();
        if !missing.is_empty() {
            return Err(ServiceError::missing_fields(&missing));
        }
        let patient_id = input.patient_id.as_str();

        let session = self.acquire().await?;
        let result = self
            .submit(session.as_ref(), Transaction::CreateHealthRecord, &input.ledger_args())
            .await;
        self.release(session).await;
        if let Err(e) = &result {
            tracing::error!(patient_id, error = %e, "Failed to create health record");
        }
        result?;
        tracing::info!(patient_id, "Health record created");

        let record = input.to_record();
        let email = self.artifact_for(&record).await.map(|artifact| EmailMessage {
            address: record.email.clone(),
            subject: "New Health Record Created".into(),
            body: format!(
                "Hello {name},\n\nYour new health record has been created successfully.\n\n\
                 Patient ID: {id}\nDoctor: {doctor}\n\nBest regards,\nEHR System",
                name = record.name,
                id = record.patient_id,
                doctor = record.doctor_name,
            ),
            artifact,
        });
        let sms = SmsMessage {
            to: record.phone_number.clone(),
            body: format!(
                "Hi {}, your health record was created. ID: {}. Doctor: {}",
                record.name, record.patient_id, record.doctor_name
            ),
        };

        let notifications = self
            .notifier
            .dispatch("record_creation", email, Some(sms))
            .await;

        Ok(CreateReceipt {
            patient_id: record.patient_id,
            notifications,
        })
    }

    // ─── Query ───────────────────────────────────────────────

    /// Read one record and notify the patient that it was accessed.
    pub async fn query(
        &self,
        patient_id: &str,
        accessor: Option<&str>,
    ) -> Result<RecordAccess, ServiceError> {
        if patient_id.is_empty() {
            return Err(ServiceError::missing_fields(&["patientId"]));
        }

        let session = self.acquire().await?;
        let result = self.read_record(session.as_ref(), patient_id).await;
        self.release(session).await;

        let record = result?.ok_or_else(|| ServiceError::NotFound(RECORD_NOT_FOUND.into()))?;

        let viewer = accessor
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_ACCESSOR)
            .to_string();
        let sms = SmsMessage {
            to: record.phone_number.clone(),
            body: format!(
                "Your record (ID: {}) was accessed by {} on {}",
                patient_id,
                viewer,
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ),
        };
        let notifications = self.notifier.dispatch("record_access", None, Some(sms)).await;
        tracing::debug!(patient_id, accessed_by = viewer.as_str(), "Health record accessed");

        Ok(RecordAccess {
            record,
            accessed_by: viewer,
            last_accessed: Utc::now(),
            notifications,
        })
    }

    pub async fn query_all(&self) -> Result<RecordListing, ServiceError> {
        let session = self.acquire().await?;
        let result = self
            .evaluate(session.as_ref(), Transaction::QueryAllHealthRecords, &[])
            .await;
        self.release(session).await;

        let records = parse_records(&result?)?;
        Ok(RecordListing {
            count: records.len(),
            records,
            timestamp: Utc::now(),
        })
    }

    // ─── Update ──────────────────────────────────────────────

    pub async fn update(&self, update: RecordUpdate) -> Result<UpdateReceipt, ServiceError> {
        if update.patient_id.is_empty() {
            return Err(ServiceError::missing_fields(&["patientId"]));
        }
        let patient_id = update.patient_id.as_str();

        let session = self.acquire().await?;
        let result = self.update_in_session(session.as_ref(), &update).await;
        self.release(session).await;
        if let Err(e) = &result {
            tracing::error!(patient_id, error = %e, "Failed to update health record");
        }
        let (before, after) = result?;

        let changes = diff(&before, &after);
        tracing::info!(patient_id, changes = %changes, "Health record updated");

        let email = self.artifact_for(&after).await.map(|artifact| EmailMessage {
            address: after.email.clone(),
            subject: "Health Record Updated".into(),
            body: format!(
                "Hi {name},\n\nYour health record was updated by {doctor}.\n\n\
                 Changes made:\n{changes}\n\nRegards,\nEHR System",
                name = after.name,
                doctor = after.doctor_name,
            ),
            artifact,
        });
        let sms = SmsMessage {
            to: after.phone_number.clone(),
            body: format!(
                "Your record was updated by Dr. {}. Changes: {}",
                after.doctor_name, changes
            ),
        };

        let notifications = self
            .notifier
            .dispatch("record_update", email, Some(sms))
            .await;

        Ok(UpdateReceipt {
            patient_id: after.patient_id,
            changes,
            notifications,
        })
    }

    async fn update_in_session(
        &self,
        session: &dyn LedgerSession,
        update: &RecordUpdate,
    ) -> Result<(HealthRecord, HealthRecord), ServiceError> {
        let patient_id = update.patient_id.as_str();
        let before = self
            .read_record(session, patient_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(RECORD_NOT_FOUND.into()))?;

        self.submit(session, Transaction::UpdateHealthRecord, &update.merged_args(&before))
            .await?;

        let after = self
            .read_record(session, patient_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(RECORD_NOT_FOUND.into()))?;
        Ok((before, after))
    }

    // ─── Delete ──────────────────────────────────────────────

    pub async fn delete(&self, patient_id: &str) -> Result<DeletionReceipt, ServiceError> {
        if patient_id.is_empty() {
            return Err(ServiceError::missing_fields(&["patientId"]));
        }

        let session = self.acquire().await?;
        let snapshot = match self.read_record(session.as_ref(), patient_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(patient_id, error = %e, "Pre-delete read failed, continuing");
                None
            }
        };
        let args = [patient_id.to_string()];
        let result = self
            .submit(session.as_ref(), Transaction::DeleteHealthRecord, &args)
            .await;
        self.release(session).await;
        if let Err(e) = &result {
            tracing::error!(patient_id, error = %e, "Failed to delete health record");
        }
        result?;
        tracing::info!(patient_id, "Health record deleted");

        let sms = snapshot.map(|record| SmsMessage {
            to: record.phone_number,
            body: format!(
                "Your health record (ID: {patient_id}) has been deleted from our system"
            ),
        });
        let notifications = match sms {
            Some(sms) => self.notifier.dispatch("record_deletion", None, Some(sms)).await,
            None => Notifications::default(),
        };

        Ok(DeletionReceipt {
            patient_id: patient_id.to_string(),
            deletion_time: Utc::now(),
            notifications,
        })
    }

    // ─── Ledger plumbing ─────────────────────────────────────

    async fn acquire(&self) -> Result<Box<dyn LedgerSession>, LedgerError> {
        bounded(self.timeout, "acquire", self.ledger.acquire())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Ledger session unavailable"))
    }

    /// Release never fails the operation; a hung disconnect is abandoned.
    async fn release(&self, session: Box<dyn LedgerSession>) {
        if tokio::time::timeout(self.timeout, session.release()).await.is_err() {
            tracing::warn!(secs = self.timeout.as_secs(), "Ledger session release timed out");
        }
    }

    async fn submit(
        &self,
        session: &dyn LedgerSession,
        tx: Transaction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        bounded(self.timeout, tx.as_str(), session.submit(tx, args)).await
    }

    async fn evaluate(
        &self,
        session: &dyn LedgerSession,
        tx: Transaction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        bounded(self.timeout, tx.as_str(), session.evaluate(tx, args)).await
    }

    async fn read_record(
        &self,
        session: &dyn LedgerSession,
        patient_id: &str,
    ) -> Result<Option<HealthRecord>, LedgerError> {
        let raw = self
            .evaluate(session, Transaction::QueryHealthRecord, &[patient_id.to_string()])
            .await?;
        parse_record(&raw)
    }

    // ─── Artifacts ───────────────────────────────────────────

    /// Render off the async runtime. Failures are logged and yield `None`.
    async fn artifact_for(&self, record: &HealthRecord) -> Option<Artifact> {
        let generator = Arc::clone(&self.artifacts);
        let snapshot = record.clone();
        match tokio::task::spawn_blocking(move || generator.generate(&snapshot)).await {
            Ok(Ok(artifact)) => {
                tracing::debug!(
                    patient_id = %record.patient_id,
                    document_id = artifact.document_id.as_str(),
                    verify = artifact.verification_url.as_str(),
                    "Artifact ready"
                );
                Some(artifact)
            }
            Ok(Err(e)) => {
                tracing::error!(
                    patient_id = %record.patient_id,
                    error = %e,
                    "Artifact generation failed"
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    patient_id = %record.patient_id,
                    error = %e,
                    "Artifact task failed"
                );
                None
            }
        }
    }
}
