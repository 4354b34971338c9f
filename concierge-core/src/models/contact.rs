use serde::{Deserialize, Serialize};

/// One row of the contact spreadsheet, e.g. `("Phone Number", "(+94) 117 433 3333")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub label: String,
    pub value: String,
}

impl ContactEntry {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}
