use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::child::Child;

/// Stored when a lateness is justified without a motif.
pub const DEFAULT_LATENESS_MOTIF: &str = "justified lateness";

/// Lifecycle of a daily sheet. Only ever moves forward.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SheetStatus {
    PendingStaff,
    PendingSecretary,
    Validated,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JustificationKind {
    Absence,
    Lateness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSheet {
    pub id: u64,
    pub date: NaiveDate,
    pub status: SheetStatus,
    pub created_by: u64,
    pub validated_by: Option<u64>,
    pub staff_validated_at: Option<DateTime<Utc>>,
    pub secretary_validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub id: u64,
    pub sheet_id: u64,
    pub child_id: u64,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsenceJustification {
    pub id: u64,
    pub record_id: u64,
    pub kind: JustificationKind,
    pub justification_date: NaiveDate,
    pub motif: String,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One line of a sheet: the record, its child and the justification if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub record: PresenceRecord,
    pub child: Child,
    pub justification: Option<AbsenceJustification>,
}

/// A sheet with every record populated, before any redaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetAggregate {
    pub sheet: PresenceSheet,
    pub entries: Vec<PresenceEntry>,
}

/// What the secretary submits for an absent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JustificationInput {
    pub kind: JustificationKind,
    pub justification_date: NaiveDate,
    pub motif: Option<String>,
}

/// A justification ready to be stored, motif already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJustification {
    pub kind: JustificationKind,
    pub justification_date: NaiveDate,
    pub motif: String,
    pub file_path: Option<String>,
}

impl JustificationInput {
    /// Resolves the motif: a lateness without one gets the default phrase,
    /// an absence without one is stored empty.
    pub fn into_new(self, file_path: Option<String>) -> NewJustification {
        let motif = match (self.motif, self.kind) {
            (Some(motif), _) => motif,
            (None, JustificationKind::Lateness) => DEFAULT_LATENESS_MOTIF.to_string(),
            (None, JustificationKind::Absence) => String::new(),
        };

        NewJustification {
            kind: self.kind,
            justification_date: self.justification_date,
            motif,
            file_path,
        }
    }
}

/// Counters for the history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SheetSummary {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = "2026-10-16", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub status: SheetStatus,
    #[schema(example = 24)]
    pub records: i64,
    #[schema(example = 21)]
    pub present: i64,
    #[schema(example = 3)]
    pub absent: i64,
    #[schema(example = 2)]
    pub justified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SheetPage {
    pub data: Vec<SheetSummary>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<SheetStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u64 = 10;
    pub const MAX_PER_PAGE: u64 = 100;
    /// Highest page whose offset still fits in a `u64` at any page size.
    pub const MAX_PAGE: u64 = u64::MAX / Self::MAX_PER_PAGE;

    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}

/// Reduces a client-supplied date to the calendar day used as the sheet key.
///
/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp; a timestamp keeps the
/// calendar day of the offset it was written in.
pub fn parse_sheet_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.date_naive())
}
