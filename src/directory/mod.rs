//! Doctor directory: physician attributes used to enrich artifacts, plus
//! the admin roster that maintains them.

pub mod password;
pub mod sqlite;

use thiserror::Error;

use crate::models::Doctor;

pub use sqlite::SqliteDoctorDirectory;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A uniqueness constraint rejected the write (id or email taken).
    #[error("Duplicate doctor: {0}")]
    Duplicate(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Internal lock error")]
    LockPoisoned,
}

/// Lookup and maintenance of doctor accounts.
pub trait DoctorDirectory: Send + Sync {
    fn find(&self, doctor_id: &str) -> Result<Option<Doctor>, DirectoryError>;

    /// First doctor matching either the id or the email.
    fn find_by_id_or_email(
        &self,
        doctor_id: &str,
        email: &str,
    ) -> Result<Option<Doctor>, DirectoryError>;

    fn insert(&self, doctor: &Doctor) -> Result<(), DirectoryError>;

    /// Remove and return the doctor, or `None` if unknown.
    fn remove(&self, doctor_id: &str) -> Result<Option<Doctor>, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_object_safe() {
        fn _assert_directory(_: &dyn DoctorDirectory) {}
    }
}
