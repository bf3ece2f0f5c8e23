use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{DirectoryError, DoctorDirectory};
use crate::models::Doctor;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS doctors (
    doctor_id      TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    email          TEXT NOT NULL UNIQUE,
    phone_number   TEXT,
    department     TEXT,
    specialization TEXT,
    experience     TEXT,
    password_hash  TEXT NOT NULL,
    created_at     TEXT NOT NULL
);";

const COLUMNS: &str =
    "doctor_id, name, email, phone_number, department, specialization, experience, password_hash";

/// SQLite-backed directory. The connection is serialized behind a mutex.
pub struct SqliteDoctorDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDoctorDirectory {
    /// Open (creating if needed) the directory database at `path`.
    pub fn open(path: &Path) -> Result<Self, DirectoryError> {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(
                    path = %parent.display(),
                    error = %e,
                    "Cannot create directory db folder"
                );
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory directory (for testing)
    pub fn open_in_memory() -> Result<Self, DirectoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DirectoryError> {
        conn.execute_batch("PRAGMA journal_mode=DELETE;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let conn = self.conn.lock().map_err(|_| DirectoryError::LockPoisoned)?;
        f(&conn)
    }
}

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        doctor_id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone_number: row.get(3)?,
        department: row.get(4)?,
        specialization: row.get(5)?,
        experience: row.get(6)?,
        password_hash: row.get(7)?,
    })
}

impl DoctorDirectory for SqliteDoctorDirectory {
    fn find(&self, doctor_id: &str) -> Result<Option<Doctor>, DirectoryError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM doctors WHERE doctor_id = ?1"),
                params![doctor_id],
                doctor_from_row,
            )
            .optional()
            .map_err(DirectoryError::from)
        })
    }

    fn find_by_id_or_email(
        &self,
        doctor_id: &str,
        email: &str,
    ) -> Result<Option<Doctor>, DirectoryError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM doctors WHERE doctor_id = ?1 OR email = ?2 LIMIT 1"
                ),
                params![doctor_id, email],
                doctor_from_row,
            )
            .optional()
            .map_err(DirectoryError::from)
        })
    }

    fn insert(&self, doctor: &Doctor) -> Result<(), DirectoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO doctors (doctor_id, name, email, phone_number, department,
                                      specialization, experience, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    doctor.doctor_id,
                    doctor.name,
                    doctor.email,
                    doctor.phone_number,
                    doctor.department,
                    doctor.specialization,
                    doctor.experience,
                    doctor.password_hash,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, msg)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    DirectoryError::Duplicate(msg.unwrap_or_else(|| err.to_string()))
                }
                other => DirectoryError::from(other),
            })?;
            Ok(())
        })
    }

    fn remove(&self, doctor_id: &str) -> Result<Option<Doctor>, DirectoryError> {
        self.with_conn(|conn| {
            let existing = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM doctors WHERE doctor_id = ?1"),
                    params![doctor_id],
                    doctor_from_row,
                )
                .optional()?;
            if existing.is_some() {
                conn.execute("DELETE FROM doctors WHERE doctor_id = ?1", params![doctor_id])?;
            }
            Ok(existing)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(id: &str, email: &str) -> Doctor {
        Doctor {
            doctor_id: id.into(),
            name: "Meera Iyer".into(),
            email: email.into(),
            phone_number: Some("+919812345678".into()),
            department: Some("Cardiology".into()),
            specialization: Some("Electrophysiology".into()),
            experience: Some("12 years".into()),
            password_hash: "hash".into(),
        }
    }

    #[test]
    fn insert_then_find() {
        let dir = SqliteDoctorDirectory::open_in_memory().unwrap();
        dir.insert(&doctor("D1", "m@example.com")).unwrap();
        let found = dir.find("D1").unwrap().unwrap();
        assert_eq!(found.department.as_deref(), Some("Cardiology"));
        assert_eq!(found.password_hash, "hash");
        assert!(dir.find("D2").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_rejected_by_schema() {
        let dir = SqliteDoctorDirectory::open_in_memory().unwrap();
        dir.insert(&doctor("D1", "m@example.com")).unwrap();
        let err = dir.insert(&doctor("D2", "m@example.com")).unwrap_err();
        assert!(matches!(err, DirectoryError::Duplicate(_)));
    }

    #[test]
    fn duplicate_id_rejected_as_duplicate() {
        let dir = SqliteDoctorDirectory::open_in_memory().unwrap();
        dir.insert(&doctor("D1", "m@example.com")).unwrap();
        let err = dir.insert(&doctor("D1", "other@example.com")).unwrap_err();
        assert!(matches!(err, DirectoryError::Duplicate(_)));
    }

    #[test]
    fn find_by_id_or_email_matches_either() {
        let dir = SqliteDoctorDirectory::open_in_memory().unwrap();
        dir.insert(&doctor("D1", "m@example.com")).unwrap();
        assert!(dir.find_by_id_or_email("D1", "x@example.com").unwrap().is_some());
        assert!(dir.find_by_id_or_email("D9", "m@example.com").unwrap().is_some());
        assert!(dir.find_by_id_or_email("D9", "x@example.com").unwrap().is_none());
    }

    #[test]
    fn remove_returns_deleted_doctor() {
        let dir = SqliteDoctorDirectory::open_in_memory().unwrap();
        dir.insert(&doctor("D1", "m@example.com")).unwrap();
        let removed = dir.remove("D1").unwrap().unwrap();
        assert_eq!(removed.name, "Meera Iyer");
        assert!(dir.remove("D1").unwrap().is_none());
    }

    #[test]
    fn file_backed_directory_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("doctors.db");
        {
            let dir = SqliteDoctorDirectory::open(&path).unwrap();
            dir.insert(&doctor("D1", "m@example.com")).unwrap();
        }
        let reopened = SqliteDoctorDirectory::open(&path).unwrap();
        assert!(reopened.find("D1").unwrap().is_some());
    }
}
