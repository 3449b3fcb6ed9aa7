use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;

use crate::model::child::Child;
use crate::model::presence::{
    NewJustification, PageRequest, PresenceEntry, PresenceRecord, PresenceSheet, SheetFilter,
    SheetSummary,
};

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "corrupt row: {}", _0)]
    Corrupt(String),
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Corrupt(_) => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Result of inserting a sheet under the unique date index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetInsert {
    Inserted(u64),
    /// Another writer committed a sheet for the same date first.
    DateTaken,
}

/// Entry point of the storage port: hands out units of work.
#[async_trait]
pub trait PresenceStore: Send + Sync + 'static {
    type Tx: PresenceTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn count_sheets(&self, filter: &SheetFilter) -> Result<i64, StoreError>;

    async fn list_sheets(
        &self,
        filter: &SheetFilter,
        page: PageRequest,
    ) -> Result<Vec<SheetSummary>, StoreError>;
}

/// A unit of work. Every change is discarded unless `commit` succeeds;
/// dropping the value rolls back.
///
/// The `lock_*` reads take a write lock on the sheet row that is held until
/// the unit of work ends.
#[async_trait]
pub trait PresenceTx: Send {
    async fn sheet_by_id(&mut self, id: u64) -> Result<Option<PresenceSheet>, StoreError>;

    async fn sheet_by_date(&mut self, date: NaiveDate)
    -> Result<Option<PresenceSheet>, StoreError>;

    async fn lock_sheet(&mut self, id: u64) -> Result<Option<PresenceSheet>, StoreError>;

    async fn lock_sheet_by_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<PresenceSheet>, StoreError>;

    async fn insert_sheet(
        &mut self,
        date: NaiveDate,
        created_by: u64,
        at: DateTime<Utc>,
    ) -> Result<SheetInsert, StoreError>;

    async fn mark_staff_validated(
        &mut self,
        sheet_id: u64,
        staff_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_secretary_validated(
        &mut self,
        sheet_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_children(&mut self) -> Result<Vec<Child>, StoreError>;

    async fn count_records(&mut self, sheet_id: u64) -> Result<i64, StoreError>;

    async fn delete_records(&mut self, sheet_id: u64) -> Result<(), StoreError>;

    /// Inserts one record per `(child_id, present)` pair.
    async fn insert_records(
        &mut self,
        sheet_id: u64,
        rows: &[(u64, bool)],
    ) -> Result<(), StoreError>;

    async fn record_by_id(&mut self, id: u64) -> Result<Option<PresenceRecord>, StoreError>;

    async fn has_justification(&mut self, record_id: u64) -> Result<bool, StoreError>;

    async fn insert_justification(
        &mut self,
        record_id: u64,
        justification: &NewJustification,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Absent records of the sheet that still have no justification.
    async fn count_unjustified(&mut self, sheet_id: u64) -> Result<i64, StoreError>;

    /// Records of the sheet joined with their child and justification.
    async fn entries(&mut self, sheet_id: u64) -> Result<Vec<PresenceEntry>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
