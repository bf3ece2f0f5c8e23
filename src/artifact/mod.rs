//! Verifiable document artifacts produced on record mutations.

pub mod pdf;

use thiserror::Error;

use crate::models::HealthRecord;

pub use pdf::PdfArtifactGenerator;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("PDF save error: {0}")]
    Render(String),
}

/// A rendered document ready to attach to a notification.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub patient_id: String,
    /// `EHR-<unix millis>`, also embedded in the verification code.
    pub document_id: String,
    pub verification_url: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        format!("{}.pdf", encode_file_stem(&self.patient_id))
    }
}

pub trait ArtifactGenerator: Send + Sync {
    fn generate(&self, record: &HealthRecord) -> Result<Artifact, ArtifactError>;
}

/// Stem used for an empty patient id. `%` followed by a non-hex letter is
/// never produced by [`encode_file_stem`] for a non-empty id.
const EMPTY_STEM: &str = "%empty";

/// Encode a patient id as a file stem. ASCII alphanumerics, `-` and `_` pass
/// through; every other byte becomes `%XX`. Distinct ids map to distinct
/// stems and no stem contains a path separator or starts with a dot.
pub fn encode_file_stem(raw: &str) -> String {
    if raw.is_empty() {
        return EMPTY_STEM.into();
    }
    let mut stem = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}
