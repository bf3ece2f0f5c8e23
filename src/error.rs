//! Caller-visible errors and their structured JSON rendering.

use serde::Serialize;

use crate::config::RunMode;
use crate::directory::DirectoryError;
use crate::ledger::LedgerError;

/// Errors returned by record and roster operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl ServiceError {
    pub fn missing_fields(fields: &[&str]) -> Self {
        Self::Validation(format!("Missing required fields: {}", fields.join(", ")))
    }

    /// HTTP-style status for the collaborator's transport layer.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Ledger(LedgerError::Connection(_)) => 503,
            Self::Ledger(LedgerError::Timeout { .. }) => 504,
            Self::Directory(DirectoryError::Duplicate(_)) => 409,
            Self::Ledger(_) | Self::Directory(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Ledger(LedgerError::Connection(_)) => "LEDGER_UNAVAILABLE",
            Self::Ledger(LedgerError::Timeout { .. }) => "LEDGER_TIMEOUT",
            Self::Ledger(_) => "LEDGER_ERROR",
            Self::Directory(DirectoryError::Duplicate(_)) => "CONFLICT",
            Self::Directory(_) => "INTERNAL",
        }
    }
}

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    /// Render an error. Internal causes are only exposed in development.
    pub fn from_error(err: &ServiceError, mode: RunMode) -> (u16, Self) {
        let (message, internal) = match err {
            ServiceError::Validation(msg)
            | ServiceError::NotFound(msg)
            | ServiceError::Conflict(msg) => (msg.clone(), None),
            ServiceError::Ledger(e) => {
                tracing::error!(error = %e, "Ledger operation failed");
                ("Ledger operation failed".to_string(), Some(e.to_string()))
            }
            ServiceError::Directory(e) => {
                tracing::error!(error = %e, "Doctor directory error");
                ("An internal error occurred".to_string(), Some(e.to_string()))
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: err.code(),
                message,
                details: internal.filter(|_| mode.is_dev()),
            },
        };
        (err.status(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(err: ServiceError, mode: RunMode) -> (u16, serde_json::Value) {
        let (status, body) = ErrorBody::from_error(&err, mode);
        (status, serde_json::to_value(body).unwrap())
    }

    #[test]
    fn validation_returns_400() {
        let (status, json) = render(
            ServiceError::missing_fields(&["patientId", "name"]),
            RunMode::Production,
        );
        assert_eq!(status, 400);
        assert_eq!(json["error"]["code"], "VALIDATION");
        assert_eq!(
            json["error"]["message"],
            "Missing required fields: patientId, name"
        );
    }

    #[test]
    fn not_found_returns_404() {
        let (status, _) = render(
            ServiceError::NotFound("Health record not found".into()),
            RunMode::Production,
        );
        assert_eq!(status, 404);
    }

    #[test]
    fn conflict_returns_409() {
        let (status, json) = render(
            ServiceError::Conflict("Doctor ID already exists".into()),
            RunMode::Production,
        );
        assert_eq!(status, 409);
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[test]
    fn ledger_details_hidden_in_production() {
        let err = ServiceError::Ledger(LedgerError::Transaction {
            transaction: "CreateHealthRecord".into(),
            reason: "record P1 already exists".into(),
        });
        let (status, json) = render(err, RunMode::Production);
        assert_eq!(status, 500);
        assert_eq!(json["error"]["message"], "Ledger operation failed");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn ledger_details_shown_in_development() {
        let err = ServiceError::Ledger(LedgerError::Connection("refused".into()));
        let (status, json) = render(err, RunMode::Development);
        assert_eq!(status, 503);
        assert_eq!(json["error"]["code"], "LEDGER_UNAVAILABLE");
        assert_eq!(
            json["error"]["details"],
            "Cannot connect to ledger network: refused"
        );
    }

    #[test]
    fn timeout_maps_to_504() {
        let err = ServiceError::from(LedgerError::Timeout {
            operation: "submit".into(),
            secs: 30,
        });
        assert_eq!(err.status(), 504);
        assert_eq!(err.code(), "LEDGER_TIMEOUT");
    }

    #[test]
    fn directory_errors_are_internal() {
        let err = ServiceError::from(DirectoryError::LockPoisoned);
        let (status, json) = render(err, RunMode::Production);
        assert_eq!(status, 500);
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn duplicate_directory_write_is_conflict() {
        let err = ServiceError::from(DirectoryError::Duplicate("UNIQUE constraint failed".into()));
        assert_eq!(err.status(), 409);
        assert_eq!(err.code(), "CONFLICT");
    }
}
