use serde::{Deserialize, Serialize};

/// A physician in the directory. The password hash never leaves the crate
/// through serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub doctor_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    pub specialization: Option<String>,
    pub experience: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
}

/// Registration input for a new doctor account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewDoctor {
    pub doctor_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    pub specialization: Option<String>,
    pub experience: Option<String>,
    pub password: String,
}

impl NewDoctor {
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.doctor_id.is_empty() {
            missing.push("doctorId");
        }
        if self.name.is_empty() {
            missing.push("name");
        }
        if self.email.is_empty() {
            missing.push("email");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        missing
    }
}

/// Public view returned after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSummary {
    pub doctor_id: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
}

impl From<&Doctor> for DoctorSummary {
    fn from(doctor: &Doctor) -> Self {
        Self {
            doctor_id: doctor.doctor_id.clone(),
            name: doctor.name.clone(),
            email: doctor.email.clone(),
            department: doctor.department.clone(),
        }
    }
}
