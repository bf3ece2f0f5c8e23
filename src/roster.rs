//! Doctor roster administration: registration and removal of physician
//! accounts, with welcome and goodbye texts.

use std::sync::Arc;

use serde::Serialize;

use crate::directory::password::{hash_password, verify_password, PBKDF2_ITERATIONS};
use crate::directory::{DirectoryError, DoctorDirectory};
use crate::error::ServiceError;
use crate::models::{Doctor, DoctorSummary, NewDoctor};
use crate::notify::SmsChannel;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub doctor: DoctorSummary,
    pub sms_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Removal {
    pub doctor_id: String,
    pub name: String,
    pub sms_sent: bool,
}

pub struct DoctorRoster {
    directory: Arc<dyn DoctorDirectory>,
    sms: SmsChannel,
    hash_iterations: u32,
}

impl DoctorRoster {
    pub fn new(directory: Arc<dyn DoctorDirectory>, sms: SmsChannel) -> Self {
        Self {
            directory,
            sms,
            hash_iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Lower the key-derivation cost (tests only need a fraction).
    pub fn with_hash_iterations(mut self, iterations: u32) -> Self {
        self.hash_iterations = iterations;
        self
    }

    pub async fn add_doctor(&self, input: NewDoctor) -> Result<Registration, ServiceError> {
        let missing = input.missing_required();
        if !missing.is_empty() {
            return Err(ServiceError::missing_fields(&missing));
        }

        if let Some(existing) = self
            .directory
            .find_by_id_or_email(&input.doctor_id, &input.email)?
        {
            return Err(conflict_with(&existing, &input.doctor_id));
        }

        let password = input.password.clone();
        let iterations = self.hash_iterations;
        let password_hash =
            tokio::task::spawn_blocking(move || hash_password(&password, iterations))
                .await
                .map_err(|e| DirectoryError::Hashing(e.to_string()))?;

        let doctor = Doctor {
            doctor_id: input.doctor_id,
            name: input.name,
            email: input.email,
            phone_number: input.phone_number.filter(|p| !p.is_empty()),
            department: input.department,
            specialization: input.specialization,
            experience: input.experience,
            password_hash,
        };
        match self.directory.insert(&doctor) {
            Ok(()) => {}
            // Lost a race with a concurrent registration after the check above.
            Err(DirectoryError::Duplicate(reason)) => {
                tracing::warn!(
                    doctor_id = %doctor.doctor_id,
                    reason = %reason,
                    "Doctor insert conflicted"
                );
                let existing = self
                    .directory
                    .find_by_id_or_email(&doctor.doctor_id, &doctor.email)?;
                return Err(match existing {
                    Some(existing) => conflict_with(&existing, &doctor.doctor_id),
                    None => ServiceError::Conflict("Doctor already registered".into()),
                });
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(doctor_id = %doctor.doctor_id, "Doctor registered");

        let sms_sent = match &doctor.phone_number {
            Some(phone) => {
                let body = format!(
                    "Dr. {}, your EHR system account is ready. ID: {}",
                    doctor.name, doctor.doctor_id
                );
                self.sms.send(phone, &body, "doctor_registration").await.delivered
            }
            None => false,
        };

        Ok(Registration {
            doctor: DoctorSummary::from(&doctor),
            sms_sent,
        })
    }

    pub async fn remove_doctor(&self, doctor_id: &str) -> Result<Removal, ServiceError> {
        if doctor_id.is_empty() {
            return Err(ServiceError::missing_fields(&["doctorId"]));
        }

        let doctor = self
            .directory
            .remove(doctor_id)?
            .ok_or_else(|| ServiceError::NotFound("Doctor not found".into()))?;
        tracing::info!(doctor_id, "Doctor removed");

        let sms_sent = match doctor.phone_number.as_deref() {
            Some(phone) if !phone.is_empty() => {
                let body = format!("Dr. {}, your EHR system account has been deleted", doctor.name);
                self.sms.send(phone, &body, "doctor_deletion").await.delivered
            }
            _ => false,
        };

        Ok(Removal {
            doctor_id: doctor.doctor_id,
            name: doctor.name,
            sms_sent,
        })
    }

    /// Check credentials. Unknown doctors and wrong passwords both yield `false`.
    pub async fn verify_password(
        &self,
        doctor_id: &str,
        password: &str,
    ) -> Result<bool, ServiceError> {
        let Some(doctor) = self.directory.find(doctor_id)? else {
            return Ok(false);
        };
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || {
            verify_password(&password, &doctor.password_hash)
        })
        .await
        .map_err(|e| DirectoryError::Hashing(e.to_string()))??;
        Ok(verified)
    }
}

fn conflict_with(existing: &Doctor, doctor_id: &str) -> ServiceError {
    let message = if existing.doctor_id == doctor_id {
        "Doctor ID already exists"
    } else {
        "Email already registered"
    };
    ServiceError::Conflict(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::SqliteDoctorDirectory;
    use crate::notify::testing::RecordingSms;

    fn roster() -> (DoctorRoster, Arc<SqliteDoctorDirectory>, Arc<RecordingSms>) {
        let directory = Arc::new(SqliteDoctorDirectory::open_in_memory().unwrap());
        let sms = RecordingSms::new();
        let roster = DoctorRoster::new(directory.clone(), SmsChannel::Enabled(sms.clone()))
            .with_hash_iterations(1_000);
        (roster, directory, sms)
    }

    fn new_doctor(id: &str, email: &str) -> NewDoctor {
        NewDoctor {
            doctor_id: id.into(),
            name: "Meera Iyer".into(),
            email: email.into(),
            phone_number: Some("+919812345678".into()),
            department: Some("Cardiology".into()),
            specialization: None,
            experience: Some("12 years".into()),
            password: "s3cret-pass".into(),
        }
    }

    #[tokio::test]
    async fn add_doctor_stores_hash_and_welcomes() {
        let (roster, directory, sms) = roster();

        let registration = roster
            .add_doctor(new_doctor("D1", "meera@example.com"))
            .await
            .unwrap();

        assert_eq!(registration.doctor.doctor_id, "D1");
        assert!(registration.sms_sent);
        let stored = directory.find("D1").unwrap().unwrap();
        assert_ne!(stored.password_hash, "s3cret-pass");
        assert_eq!(
            sms.sent()[0].1,
            "[EHR System] Dr. Meera Iyer, your EHR system account is ready. ID: D1"
        );
    }

    #[tokio::test]
    async fn duplicate_id_conflicts() {
        let (roster, _, _) = roster();
        roster.add_doctor(new_doctor("D1", "a@example.com")).await.unwrap();
        let err = roster
            .add_doctor(new_doctor("D1", "b@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == "Doctor ID already exists"));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (roster, _, _) = roster();
        roster.add_doctor(new_doctor("D1", "a@example.com")).await.unwrap();
        let err = roster
            .add_doctor(new_doctor("D2", "a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == "Email already registered"));
    }

    /// Directory whose pre-insert check never sees existing rows, as when
    /// another registration commits between the check and the insert.
    struct StaleCheckDirectory {
        inner: Arc<SqliteDoctorDirectory>,
        checks: std::sync::atomic::AtomicUsize,
    }

    impl DoctorDirectory for StaleCheckDirectory {
        fn find(&self, doctor_id: &str) -> Result<Option<Doctor>, DirectoryError> {
            self.inner.find(doctor_id)
        }
        fn find_by_id_or_email(
            &self,
            doctor_id: &str,
            email: &str,
        ) -> Result<Option<Doctor>, DirectoryError> {
            use std::sync::atomic::Ordering;
            if self.checks.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            self.inner.find_by_id_or_email(doctor_id, email)
        }
        fn insert(&self, doctor: &Doctor) -> Result<(), DirectoryError> {
            self.inner.insert(doctor)
        }
        fn remove(&self, doctor_id: &str) -> Result<Option<Doctor>, DirectoryError> {
            self.inner.remove(doctor_id)
        }
    }

    #[tokio::test]
    async fn insert_race_reports_conflict_not_internal() {
        let (seeded, inner, _) = roster();
        seeded.add_doctor(new_doctor("D1", "a@example.com")).await.unwrap();

        let stale = Arc::new(StaleCheckDirectory {
            inner,
            checks: Default::default(),
        });
        let roster = DoctorRoster::new(stale, SmsChannel::Disabled).with_hash_iterations(1_000);

        let err = roster
            .add_doctor(new_doctor("D2", "a@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 409);
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == "Email already registered"));
    }

    #[tokio::test]
    async fn concurrent_registrations_of_one_id_yield_one_winner() {
        let directory = Arc::new(SqliteDoctorDirectory::open_in_memory().unwrap());
        let roster = Arc::new(
            DoctorRoster::new(directory, SmsChannel::Disabled).with_hash_iterations(1_000),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let roster = roster.clone();
                tokio::spawn(async move {
                    roster
                        .add_doctor(new_doctor("D1", &format!("d{i}@example.com")))
                        .await
                })
            })
            .collect();
        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, ServiceError::Conflict(_)), "got {e:?}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn missing_password_rejected() {
        let (roster, directory, _) = roster();
        let mut input = new_doctor("D1", "a@example.com");
        input.password.clear();
        let err = roster.add_doctor(input).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(directory.find("D1").unwrap().is_none());
    }

    #[tokio::test]
    async fn no_phone_means_no_welcome() {
        let (roster, _, sms) = roster();
        let mut input = new_doctor("D1", "a@example.com");
        input.phone_number = None;
        let registration = roster.add_doctor(input).await.unwrap();
        assert!(!registration.sms_sent);
        assert!(sms.sent().is_empty());
    }

    #[tokio::test]
    async fn stored_hash_verifies_original_only() {
        let (roster, _, _) = roster();
        roster.add_doctor(new_doctor("D1", "a@example.com")).await.unwrap();
        assert!(roster.verify_password("D1", "s3cret-pass").await.unwrap());
        assert!(!roster.verify_password("D1", "guess").await.unwrap());
        assert!(!roster.verify_password("D9", "s3cret-pass").await.unwrap());
    }

    #[tokio::test]
    async fn remove_doctor_says_goodbye() {
        let (roster, directory, sms) = roster();
        roster.add_doctor(new_doctor("D1", "a@example.com")).await.unwrap();

        let removal = roster.remove_doctor("D1").await.unwrap();

        assert_eq!(removal.name, "Meera Iyer");
        assert!(removal.sms_sent);
        assert!(directory.find("D1").unwrap().is_none());
        assert_eq!(
            sms.sent()[1].1,
            "[EHR System] Dr. Meera Iyer, your EHR system account has been deleted"
        );
    }

    #[tokio::test]
    async fn remove_unknown_doctor_not_found() {
        let (roster, _, sms) = roster();
        let err = roster.remove_doctor("D404").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(sms.sent().is_empty());
    }
}
