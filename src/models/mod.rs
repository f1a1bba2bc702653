//! Data model for doctor records scraped from hospital directories

use serde::{Deserialize, Serialize};

/// Value stored when a field is absent from a detail page.
pub const NOT_AVAILABLE: &str = "N/A";

/// Separator used to join multi-valued fields (specialties, units).
pub const MULTI_VALUE_SEPARATOR: &str = " | ";

/// Export column order.
pub const COLUMNS: [&str; 4] = ["name", "specialty", "unit", "registration_number"];

/// One doctor as found on a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorRecord {
    pub name: String,
    /// Specialty area(s), pipe-joined.
    pub specialty: String,
    /// Affiliated unit(s), pipe-joined.
    pub unit: String,
    /// Professional registration number, only published by some sites.
    pub registration_number: Option<String>,
}

impl DoctorRecord {
    /// Values in [`COLUMNS`] order, with a missing registration number as an empty cell.
    pub fn to_row(&self) -> [&str; 4] {
        [
            self.name.as_str(),
            self.specialty.as_str(),
            self.unit.as_str(),
            self.registration_number.as_deref().unwrap_or(""),
        ]
    }

    /// Inverse of [`DoctorRecord::to_row`].
    pub fn from_row<S: AsRef<str>>(row: &[S]) -> Self {
        let cell = |i: usize| row.get(i).map(|s| s.as_ref().to_string()).unwrap_or_default();
        let registration_number = Some(cell(3)).filter(|s| !s.is_empty());
        Self {
            name: cell(0),
            specialty: cell(1),
            unit: cell(2),
            registration_number,
        }
    }
}

/// Join multi-valued field entries, falling back to [`NOT_AVAILABLE`] when empty.
pub fn join_values(values: Vec<String>) -> String {
    if values.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        values.join(MULTI_VALUE_SEPARATOR)
    }
}
