//! Lifecycle of the daily presence sheet.
//!
//! ```text
//! PENDING_STAFF --(validate)--> PENDING_SECRETARY --(last justification)--> VALIDATED
//! ```
//!
//! Every mutation runs inside one unit of work of the store, with the sheet
//! row locked, so a failure half-way leaves the previous state in place.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::error::PresenceError;
use crate::model::presence::{
    JustificationInput, PageRequest, SheetAggregate, SheetFilter, SheetPage, SheetStatus,
};
use crate::model::role::Role;
use crate::presence::store::{PresenceStore, PresenceTx, SheetInsert, StoreError};
use crate::presence::visibility::{SheetView, sheet_view};

/// Creation is retried once when another writer wins the date.
const CREATE_ATTEMPTS: usize = 2;

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: u64,
    pub role: Role,
}

fn require(allowed: bool, message: &str) -> Result<(), PresenceError> {
    if allowed {
        Ok(())
    } else {
        Err(PresenceError::Forbidden(message.to_string()))
    }
}

fn sheet_not_found(id: u64) -> PresenceError {
    PresenceError::NotFound(format!("Presence sheet {id} not found"))
}

/// Reads the sheet and its entries inside the current unit of work.
async fn load<T: PresenceTx>(tx: &mut T, sheet_id: u64) -> Result<SheetAggregate, PresenceError> {
    let sheet = tx
        .sheet_by_id(sheet_id)
        .await?
        .ok_or_else(|| sheet_not_found(sheet_id))?;
    let entries = tx.entries(sheet_id).await?;
    Ok(SheetAggregate { sheet, entries })
}

pub struct PresenceService<S> {
    store: Arc<S>,
}

impl<S> Clone for PresenceService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: PresenceStore> PresenceService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Returns the sheet of `date`, creating it (with one absent record per
    /// known child) on first touch.
    #[instrument(name = "presence_open", skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn create_or_get_sheet(
        &self,
        date: NaiveDate,
        actor: Actor,
    ) -> Result<SheetView, PresenceError> {
        require(
            actor.role.can_take_attendance(),
            "Only staff can open the daily sheet",
        )?;

        for attempt in 1..=CREATE_ATTEMPTS {
            if let Some(aggregate) = self.open_sheet(date, actor.user_id).await? {
                return Ok(sheet_view(aggregate, actor.role));
            }
            debug!(%date, attempt, "Sheet date taken by a concurrent request, fetching it");
        }

        Err(PresenceError::Storage(StoreError::Corrupt(format!(
            "sheet for {date} neither insertable nor readable"
        ))))
    }

    /// `None` when a concurrent writer committed the same date first.
    async fn open_sheet(
        &self,
        date: NaiveDate,
        staff_id: u64,
    ) -> Result<Option<SheetAggregate>, PresenceError> {
        let mut tx = self.store.begin().await?;

        let sheet_id = match tx.lock_sheet_by_date(date).await? {
            Some(sheet) => sheet.id,
            None => match tx.insert_sheet(date, staff_id, Utc::now()).await? {
                SheetInsert::Inserted(id) => {
                    info!(sheet_id = id, %date, "Presence sheet created");
                    id
                }
                SheetInsert::DateTaken => return Ok(None),
            },
        };

        if tx.count_records(sheet_id).await? == 0 {
            let rows: Vec<(u64, bool)> = tx
                .list_children()
                .await?
                .iter()
                .map(|child| (child.id, false))
                .collect();
            debug!(sheet_id, children = rows.len(), "Seeding presence records");
            tx.insert_records(sheet_id, &rows).await?;
        }

        let aggregate = load(&mut tx, sheet_id).await?;
        tx.commit().await?;
        Ok(Some(aggregate))
    }

    /// Staff validation: rewrites the roster from `present_child_ids` and
    /// hands the sheet over to the secretary.
    ///
    /// The sheet always lands in `PENDING_SECRETARY`, even when every child is
    /// present. Only a justification moves a sheet to `VALIDATED`, so a day
    /// without absentees stays there for good.
    #[instrument(name = "presence_validate", skip(self, present_child_ids, actor), fields(user_id = actor.user_id))]
    pub async fn validate(
        &self,
        sheet_id: u64,
        present_child_ids: &[u64],
        actor: Actor,
    ) -> Result<SheetView, PresenceError> {
        require(
            actor.role.can_take_attendance(),
            "Only staff can validate the daily sheet",
        )?;

        let mut tx = self.store.begin().await?;

        let sheet = tx
            .lock_sheet(sheet_id)
            .await?
            .ok_or_else(|| sheet_not_found(sheet_id))?;

        if sheet.status != SheetStatus::PendingStaff {
            return Err(PresenceError::InvalidStateTransition(format!(
                "Presence sheet {sheet_id} is {} and not eligible for validation",
                sheet.status
            )));
        }

        let present: HashSet<u64> = present_child_ids.iter().copied().collect();
        let rows: Vec<(u64, bool)> = tx
            .list_children()
            .await?
            .iter()
            .map(|child| (child.id, present.contains(&child.id)))
            .collect();

        let matched = rows.iter().filter(|(_, is_present)| *is_present).count();
        if matched < present.len() {
            warn!(
                sheet_id,
                ignored = present.len() - matched,
                "Unknown child ids ignored during validation"
            );
        }

        tx.delete_records(sheet_id).await?;
        tx.insert_records(sheet_id, &rows).await?;
        tx.mark_staff_validated(sheet_id, actor.user_id, Utc::now())
            .await?;

        let aggregate = load(&mut tx, sheet_id).await?;
        tx.commit().await?;

        info!(
            sheet_id,
            present = matched,
            absent = rows.len() - matched,
            "Presence sheet validated by staff"
        );

        Ok(sheet_view(aggregate, actor.role))
    }

    /// Attaches a justification to an absent record. The sheet becomes
    /// `VALIDATED` as soon as no absent record is left unjustified.
    #[instrument(name = "presence_justify", skip(self, input, file_path, actor), fields(user_id = actor.user_id))]
    pub async fn justify(
        &self,
        record_id: u64,
        input: JustificationInput,
        file_path: Option<String>,
        actor: Actor,
    ) -> Result<SheetView, PresenceError> {
        require(actor.role.can_justify(), "Only the secretary can justify absences")?;

        let record_not_found =
            || PresenceError::NotFound(format!("Presence record {record_id} not found"));

        let mut tx = self.store.begin().await?;

        let sheet_id = tx
            .record_by_id(record_id)
            .await?
            .ok_or_else(record_not_found)?
            .sheet_id;
        let sheet = tx
            .lock_sheet(sheet_id)
            .await?
            .ok_or_else(|| sheet_not_found(sheet_id))?;
        // Re-read under the sheet lock: a validation may have rewritten the roster.
        let record = tx
            .record_by_id(record_id)
            .await?
            .ok_or_else(record_not_found)?;

        if record.present {
            return Err(PresenceError::InvalidOperation(
                "Cannot justify a present record".to_string(),
            ));
        }
        if sheet.status != SheetStatus::PendingSecretary {
            return Err(PresenceError::InvalidOperation(format!(
                "Presence sheet {sheet_id} is {} and does not accept justifications",
                sheet.status
            )));
        }
        if tx.has_justification(record_id).await? {
            return Err(PresenceError::InvalidOperation(format!(
                "Presence record {record_id} is already justified"
            )));
        }

        let now = Utc::now();
        let justification = input.into_new(file_path);
        tx.insert_justification(record_id, &justification, now)
            .await?;

        let remaining = tx.count_unjustified(sheet_id).await?;
        if remaining == 0 {
            tx.mark_secretary_validated(sheet_id, now).await?;
        }

        let aggregate = load(&mut tx, sheet_id).await?;
        tx.commit().await?;

        if remaining == 0 {
            info!(sheet_id, "Presence sheet fully justified and validated");
        } else {
            debug!(sheet_id, remaining, "Justification recorded");
        }

        Ok(sheet_view(aggregate, actor.role))
    }

    #[instrument(name = "presence_by_date", skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn find_by_date(
        &self,
        date: NaiveDate,
        actor: Actor,
    ) -> Result<SheetView, PresenceError> {
        require(actor.role.can_read_sheet(), "Not allowed to read presence sheets")?;

        let mut tx = self.store.begin().await?;
        let sheet_id = tx
            .sheet_by_date(date)
            .await?
            .ok_or_else(|| PresenceError::NotFound(format!("No presence sheet for {date}")))?
            .id;
        let aggregate = load(&mut tx, sheet_id).await?;
        tx.commit().await?;

        Ok(sheet_view(aggregate, actor.role))
    }

    #[instrument(name = "presence_by_id", skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn find_sheet(&self, sheet_id: u64, actor: Actor) -> Result<SheetView, PresenceError> {
        require(actor.role.can_read_sheet(), "Not allowed to read presence sheets")?;

        let mut tx = self.store.begin().await?;
        let aggregate = load(&mut tx, sheet_id).await?;
        tx.commit().await?;

        Ok(sheet_view(aggregate, actor.role))
    }

    /// Sheet history, newest first. Summaries carry no contact details.
    #[instrument(name = "presence_list", skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn list_sheets(
        &self,
        filter: SheetFilter,
        page: PageRequest,
        actor: Actor,
    ) -> Result<SheetPage, PresenceError> {
        require(
            actor.role.can_browse_history(),
            "Not allowed to browse the presence history",
        )?;

        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(PresenceError::InvalidRequest(
                    "from cannot be after to".to_string(),
                ));
            }
        }

        let total = self.store.count_sheets(&filter).await?;
        let data = self.store.list_sheets(&filter, page).await?;

        Ok(SheetPage {
            data,
            page: page.page,
            per_page: page.per_page,
            total,
        })
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
