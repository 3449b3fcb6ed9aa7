//! In-memory store for the service tests.
//!
//! A unit of work holds the store mutex for its whole life and mutates a copy
//! of the state; `commit` swaps the copy in, dropping discards it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::lock::{Mutex, OwnedMutexGuard};

use crate::model::child::Child;
use crate::model::presence::{
    AbsenceJustification, NewJustification, PageRequest, PresenceEntry, PresenceRecord,
    PresenceSheet, SheetFilter, SheetStatus, SheetSummary,
};
use crate::presence::store::{PresenceStore, PresenceTx, SheetInsert, StoreError};

#[derive(Debug, Clone, Default)]
struct State {
    next_id: u64,
    children: Vec<Child>,
    sheets: Vec<PresenceSheet>,
    records: Vec<PresenceRecord>,
    justifications: Vec<AbsenceJustification>,
    /// Dates whose next locked lookup misses, as if another writer were
    /// still inserting them.
    hidden_dates: Vec<NaiveDate>,
    fail_on: Option<&'static str>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn summary(&self, sheet: &PresenceSheet) -> SheetSummary {
        let records: Vec<&PresenceRecord> = self
            .records
            .iter()
            .filter(|r| r.sheet_id == sheet.id)
            .collect();
        let present = records.iter().filter(|r| r.present).count() as i64;
        let justified = records
            .iter()
            .filter(|r| self.justifications.iter().any(|j| j.record_id == r.id))
            .count() as i64;

        SheetSummary {
            id: sheet.id,
            date: sheet.date,
            status: sheet.status,
            records: records.len() as i64,
            present,
            absent: records.len() as i64 - present,
            justified,
        }
    }
}

fn matches(filter: &SheetFilter, sheet: &PresenceSheet) -> bool {
    filter.from.is_none_or(|from| sheet.date >= from)
        && filter.to.is_none_or(|to| sheet.date <= to)
        && filter.status.is_none_or(|status| sheet.status == status)
}

#[derive(Clone, Default)]
pub struct MemoryPresenceStore {
    state: Arc<Mutex<State>>,
}

impl MemoryPresenceStore {
    pub async fn add_child(&self, first_name: &str, last_name: &str, phone: Option<&str>) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.children.push(Child {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            birth_date: NaiveDate::from_ymd_opt(2016, 3, 14).expect("valid date"),
            parent_phone: phone.map(str::to_string),
        });
        id
    }

    pub async fn sheets_on(&self, date: NaiveDate) -> usize {
        let state = self.state.lock().await;
        state.sheets.iter().filter(|s| s.date == date).count()
    }

    pub async fn sheet(&self, id: u64) -> Option<PresenceSheet> {
        let state = self.state.lock().await;
        state.sheets.iter().find(|s| s.id == id).cloned()
    }

    pub async fn records_of(&self, sheet_id: u64) -> Vec<PresenceRecord> {
        let state = self.state.lock().await;
        state
            .records
            .iter()
            .filter(|r| r.sheet_id == sheet_id)
            .cloned()
            .collect()
    }

    /// Seeds a sheet directly, bypassing the service.
    pub async fn seed_sheet(&self, date: NaiveDate, created_by: u64) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.sheets.push(PresenceSheet {
            id,
            date,
            status: SheetStatus::PendingStaff,
            created_by,
            validated_by: None,
            staff_validated_at: None,
            secretary_validated_at: None,
            created_at: Utc::now(),
        });
        id
    }

    pub async fn hide_next_lookup(&self, date: NaiveDate) {
        self.state.lock().await.hidden_dates.push(date);
    }

    /// Makes the next call of `operation` fail with a storage error.
    pub async fn fail_on(&self, operation: &'static str) {
        self.state.lock().await.fail_on = Some(operation);
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    type Tx = MemoryPresenceTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(MemoryPresenceTx { guard, work })
    }

    async fn count_sheets(&self, filter: &SheetFilter) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sheets.iter().filter(|s| matches(filter, s)).count() as i64)
    }

    async fn list_sheets(
        &self,
        filter: &SheetFilter,
        page: PageRequest,
    ) -> Result<Vec<SheetSummary>, StoreError> {
        let state = self.state.lock().await;
        let mut sheets: Vec<&PresenceSheet> =
            state.sheets.iter().filter(|s| matches(filter, s)).collect();
        sheets.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(sheets
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .map(|s| state.summary(s))
            .collect())
    }
}

pub struct MemoryPresenceTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

impl MemoryPresenceTx {
    fn check(&mut self, operation: &'static str) -> Result<(), StoreError> {
        if self.guard.fail_on == Some(operation) {
            self.guard.fail_on = None;
            return Err(StoreError::Corrupt(format!("injected failure in {operation}")));
        }
        Ok(())
    }

    fn sheet_mut(&mut self, id: u64) -> Result<&mut PresenceSheet, StoreError> {
        self.work
            .sheets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::Corrupt(format!("sheet {id} vanished")))
    }
}

#[async_trait]
impl PresenceTx for MemoryPresenceTx {
    async fn sheet_by_id(&mut self, id: u64) -> Result<Option<PresenceSheet>, StoreError> {
        Ok(self.work.sheets.iter().find(|s| s.id == id).cloned())
    }

    async fn sheet_by_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<PresenceSheet>, StoreError> {
        Ok(self.work.sheets.iter().find(|s| s.date == date).cloned())
    }

    async fn lock_sheet(&mut self, id: u64) -> Result<Option<PresenceSheet>, StoreError> {
        self.sheet_by_id(id).await
    }

    async fn lock_sheet_by_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<PresenceSheet>, StoreError> {
        if let Some(pos) = self.guard.hidden_dates.iter().position(|d| *d == date) {
            self.guard.hidden_dates.remove(pos);
            return Ok(None);
        }
        self.sheet_by_date(date).await
    }

    async fn insert_sheet(
        &mut self,
        date: NaiveDate,
        created_by: u64,
        at: DateTime<Utc>,
    ) -> Result<SheetInsert, StoreError> {
        self.check("insert_sheet")?;
        if self.work.sheets.iter().any(|s| s.date == date) {
            return Ok(SheetInsert::DateTaken);
        }
        let id = self.work.next_id();
        self.work.sheets.push(PresenceSheet {
            id,
            date,
            status: SheetStatus::PendingStaff,
            created_by,
            validated_by: None,
            staff_validated_at: None,
            secretary_validated_at: None,
            created_at: at,
        });
        Ok(SheetInsert::Inserted(id))
    }

    async fn mark_staff_validated(
        &mut self,
        sheet_id: u64,
        staff_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check("mark_staff_validated")?;
        let sheet = self.sheet_mut(sheet_id)?;
        sheet.status = SheetStatus::PendingSecretary;
        sheet.validated_by = Some(staff_id);
        sheet.staff_validated_at = Some(at);
        Ok(())
    }

    async fn mark_secretary_validated(
        &mut self,
        sheet_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check("mark_secretary_validated")?;
        let sheet = self.sheet_mut(sheet_id)?;
        sheet.status = SheetStatus::Validated;
        sheet.secretary_validated_at = Some(at);
        Ok(())
    }

    async fn list_children(&mut self) -> Result<Vec<Child>, StoreError> {
        Ok(self.work.children.clone())
    }

    async fn count_records(&mut self, sheet_id: u64) -> Result<i64, StoreError> {
        Ok(self
            .work
            .records
            .iter()
            .filter(|r| r.sheet_id == sheet_id)
            .count() as i64)
    }

    async fn delete_records(&mut self, sheet_id: u64) -> Result<(), StoreError> {
        self.check("delete_records")?;
        let State {
            records,
            justifications,
            ..
        } = &mut self.work;
        let removed: Vec<u64> = records
            .iter()
            .filter(|r| r.sheet_id == sheet_id)
            .map(|r| r.id)
            .collect();
        records.retain(|r| r.sheet_id != sheet_id);
        justifications.retain(|j| !removed.contains(&j.record_id));
        Ok(())
    }

    async fn insert_records(
        &mut self,
        sheet_id: u64,
        rows: &[(u64, bool)],
    ) -> Result<(), StoreError> {
        self.check("insert_records")?;
        for (child_id, present) in rows {
            if self
                .work
                .records
                .iter()
                .any(|r| r.sheet_id == sheet_id && r.child_id == *child_id)
            {
                return Err(StoreError::Corrupt(format!(
                    "duplicate record for child {child_id} on sheet {sheet_id}"
                )));
            }
            let id = self.work.next_id();
            self.work.records.push(PresenceRecord {
                id,
                sheet_id,
                child_id: *child_id,
                present: *present,
            });
        }
        Ok(())
    }

    async fn record_by_id(&mut self, id: u64) -> Result<Option<PresenceRecord>, StoreError> {
        Ok(self.work.records.iter().find(|r| r.id == id).cloned())
    }

    async fn has_justification(&mut self, record_id: u64) -> Result<bool, StoreError> {
        Ok(self
            .work
            .justifications
            .iter()
            .any(|j| j.record_id == record_id))
    }

    async fn insert_justification(
        &mut self,
        record_id: u64,
        justification: &NewJustification,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check("insert_justification")?;
        let id = self.work.next_id();
        self.work.justifications.push(AbsenceJustification {
            id,
            record_id,
            kind: justification.kind,
            justification_date: justification.justification_date,
            motif: justification.motif.clone(),
            file_path: justification.file_path.clone(),
            created_at: at,
        });
        Ok(id)
    }

    async fn count_unjustified(&mut self, sheet_id: u64) -> Result<i64, StoreError> {
        let work = &self.work;
        Ok(work
            .records
            .iter()
            .filter(|r| r.sheet_id == sheet_id && !r.present)
            .filter(|r| !work.justifications.iter().any(|j| j.record_id == r.id))
            .count() as i64)
    }

    async fn entries(&mut self, sheet_id: u64) -> Result<Vec<PresenceEntry>, StoreError> {
        let work = &self.work;
        let mut entries = Vec::new();
        for record in work.records.iter().filter(|r| r.sheet_id == sheet_id) {
            let child = work
                .children
                .iter()
                .find(|c| c.id == record.child_id)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt(format!("child {}", record.child_id)))?;
            entries.push(PresenceEntry {
                record: record.clone(),
                child,
                justification: work
                    .justifications
                    .iter()
                    .find(|j| j.record_id == record.id)
                    .cloned(),
            });
        }
        entries.sort_by(|a, b| {
            (&a.child.last_name, &a.child.first_name, a.child.id).cmp(&(
                &b.child.last_name,
                &b.child.first_name,
                b.child.id,
            ))
        });
        Ok(entries)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.check("commit")?;
        // Hooks live on the committed state; keep whatever the unit of work consumed.
        self.work.hidden_dates = std::mem::take(&mut self.guard.hidden_dates);
        self.work.fail_on = self.guard.fail_on.take();
        *self.guard = self.work;
        Ok(())
    }
}
