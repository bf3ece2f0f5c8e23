use serde::{Deserialize, Deserializer, Serialize};

/// A patient health record as stored on the ledger.
///
/// Snapshots read from the ledger are never mutated by the pipeline; the
/// "before" and "after" of an update are two independent reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthRecord {
    pub patient_id: String,
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub age: String,
    pub gender: String,
    pub email: String,
    pub phone_number: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub symptoms: String,
    pub medications: String,
    pub allergies: String,
    pub doctor_name: String,
    pub doctor_id: String,
}

impl HealthRecord {
    /// Value of one of the clinically tracked fields.
    pub fn tracked(&self, field: TrackedField) -> &str {
        match field {
            TrackedField::Diagnosis => &self.diagnosis,
            TrackedField::TreatmentPlan => &self.treatment_plan,
            TrackedField::Symptoms => &self.symptoms,
            TrackedField::Medications => &self.medications,
            TrackedField::Allergies => &self.allergies,
        }
    }
}

/// Input for creating a record. Only `patient_id`, `name` and
/// `phone_number` are mandatory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewRecord {
    pub patient_id: String,
    pub name: String,
    #[serde(deserialize_with = "optional_age")]
    pub age: Option<u32>,
    pub gender: String,
    pub email: String,
    pub phone_number: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub symptoms: String,
    pub medications: String,
    pub allergies: String,
    pub doctor_name: String,
    pub doctor_id: String,
}

impl NewRecord {
    /// Names of mandatory fields that are missing, in wire form.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.patient_id.is_empty() {
            missing.push("patientId");
        }
        if self.name.is_empty() {
            missing.push("name");
        }
        if self.phone_number.is_empty() {
            missing.push("phoneNumber");
        }
        missing
    }

    /// Positional arguments for `CreateHealthRecord`, numeric fields stringified.
    pub fn ledger_args(&self) -> Vec<String> {
        vec![
            self.patient_id.clone(),
            self.name.clone(),
            self.age.map(|a| a.to_string()).unwrap_or_default(),
            self.gender.clone(),
            self.email.clone(),
            self.phone_number.clone(),
            self.diagnosis.clone(),
            self.treatment_plan.clone(),
            self.symptoms.clone(),
            self.medications.clone(),
            self.allergies.clone(),
            self.doctor_name.clone(),
            self.doctor_id.clone(),
        ]
    }

    /// The record as the ledger will hold it after a successful create.
    pub fn to_record(&self) -> HealthRecord {
        HealthRecord {
            patient_id: self.patient_id.clone(),
            name: self.name.clone(),
            age: self.age.map(|a| a.to_string()).unwrap_or_default(),
            gender: self.gender.clone(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            diagnosis: self.diagnosis.clone(),
            treatment_plan: self.treatment_plan.clone(),
            symptoms: self.symptoms.clone(),
            medications: self.medications.clone(),
            allergies: self.allergies.clone(),
            doctor_name: self.doctor_name.clone(),
            doctor_id: self.doctor_id.clone(),
        }
    }
}

/// Partial update. `None` and empty strings both mean "keep the current value".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordUpdate {
    pub patient_id: String,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub symptoms: Option<String>,
    pub medications: Option<String>,
    pub allergies: Option<String>,
    pub doctor_name: Option<String>,
    pub doctor_id: Option<String>,
}

impl RecordUpdate {
    /// Positional arguments for `UpdateHealthRecord`, with omitted fields
    /// filled from `current`.
    pub fn merged_args(&self, current: &HealthRecord) -> Vec<String> {
        vec![
            self.patient_id.clone(),
            keep_or_replace(&self.diagnosis, &current.diagnosis),
            keep_or_replace(&self.treatment_plan, &current.treatment_plan),
            keep_or_replace(&self.symptoms, &current.symptoms),
            keep_or_replace(&self.medications, &current.medications),
            keep_or_replace(&self.allergies, &current.allergies),
            keep_or_replace(&self.doctor_name, &current.doctor_name),
            keep_or_replace(&self.doctor_id, &current.doctor_id),
        ]
    }
}

fn keep_or_replace(incoming: &Option<String>, current: &str) -> String {
    match incoming.as_deref() {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => current.to_string(),
    }
}

/// Clinical fields watched by the change detector, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackedField {
    Diagnosis,
    TreatmentPlan,
    Symptoms,
    Medications,
    Allergies,
}

impl TrackedField {
    pub const ALL: [TrackedField; 5] = [
        TrackedField::Diagnosis,
        TrackedField::TreatmentPlan,
        TrackedField::Symptoms,
        TrackedField::Medications,
        TrackedField::Allergies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnosis => "diagnosis",
            Self::TreatmentPlan => "treatmentPlan",
            Self::Symptoms => "symptoms",
            Self::Medications => "medications",
            Self::Allergies => "allergies",
        }
    }
}

impl std::fmt::Display for TrackedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ledger stores `age` as a string but older records carry a number.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Form clients send `age` as text. Accepts a number, a numeric string, or
/// an empty string / null for "not given".
fn optional_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid age: {n}"))),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<u32>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("invalid age: {s:?}")))
        }
        other => Err(D::Error::custom(format!("invalid age: {other}"))),
    }
}
