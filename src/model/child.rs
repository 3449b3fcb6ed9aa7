use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A child as known by the child directory. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Child {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub parent_phone: Option<String>,
}
