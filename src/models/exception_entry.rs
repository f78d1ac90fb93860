use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Buffer or reject record: loose serials tied to an MO outside the scanned ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    pub id: i32,
    pub session_id: String,
    pub pic: String,
    pub mo_number: String,
    pub sku_name: String,
    pub authenticity_numbers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewExceptionEntry {
    #[validate(length(min = 1, message = "session_id is required"))]
    pub session_id: String,
    #[validate(length(min = 1, message = "pic is required"))]
    pub pic: String,
    #[validate(length(min = 1, message = "mo_number is required"))]
    pub mo_number: String,
    #[validate(length(min = 1, message = "sku_name is required"))]
    pub sku_name: String,
    #[validate(length(min = 1, message = "at least one authenticity number is required"))]
    pub authenticity_numbers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateExceptionEntry {
    pub pic: Option<String>,
    pub mo_number: Option<String>,
    pub sku_name: Option<String>,
    pub authenticity_numbers: Option<Vec<String>>,
}

/// Trims, drops blanks and de-duplicates while keeping scan order
pub fn normalize_numbers(numbers: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    numbers
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty() && seen.insert(n.clone()))
        .collect()
}
