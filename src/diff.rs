//! Change detection between two snapshots of the same record.
//!
//! Only the clinical fields are compared; identity and contact fields never
//! appear in a change summary.

use serde::{Serialize, Serializer};

use crate::models::{HealthRecord, TrackedField};

/// Sentinel reported when no clinical field changed.
pub const MINOR_UPDATES: &str = "Minor updates";

/// Outcome of comparing two snapshots.
///
/// `MinorUpdates` is a distinct variant, so it can never be confused with a
/// field that happens to carry that name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSummary {
    Fields(Vec<TrackedField>),
    MinorUpdates,
}

impl ChangeSummary {
    pub fn is_minor(&self) -> bool {
        matches!(self, Self::MinorUpdates)
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinorUpdates => f.write_str(MINOR_UPDATES),
            Self::Fields(fields) => {
                let names: Vec<&str> = fields.iter().map(|field| field.as_str()).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}

/// Serialized in its display form, e.g. `"diagnosis, allergies"`.
impl Serialize for ChangeSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub fn diff(before: &HealthRecord, after: &HealthRecord) -> ChangeSummary {
    let changed: Vec<TrackedField> = TrackedField::ALL
        .into_iter()
        .filter(|field| before.tracked(*field) != after.tracked(*field))
        .collect();

    if changed.is_empty() {
        ChangeSummary::MinorUpdates
    } else {
        ChangeSummary::Fields(changed)
    }
}
