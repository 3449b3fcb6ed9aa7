//! Per-caller redaction of outgoing sheets.
//!
//! The lifecycle manager hands over a raw [`SheetAggregate`]; this module turns
//! it into the [`SheetView`] a given role is allowed to see. Nothing here
//! touches storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::presence::{
    AbsenceJustification, JustificationKind, PresenceEntry, SheetAggregate, SheetStatus,
};
use crate::model::role::Role;

const BLOCK_MASK: &str = "**";
const FULL_MASK: &str = "****";
const MIN_MASKABLE_LEN: usize = 5;
const LOCAL_NUMBER_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChildView {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "Lina")]
    pub first_name: String,
    #[schema(example = "Martin")]
    pub last_name: String,
    #[schema(example = "2015-04-02", format = "date", value_type = String)]
    pub birth_date: NaiveDate,
    #[schema(example = "06 ** ** ** 78")]
    pub parent_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct JustificationView {
    pub id: u64,
    pub kind: JustificationKind,
    #[schema(example = "2026-10-16", format = "date", value_type = String)]
    pub justification_date: NaiveDate,
    #[schema(example = "medical appointment")]
    pub motif: String,
    pub file_path: Option<String>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RecordView {
    #[schema(example = 301)]
    pub id: u64,
    pub present: bool,
    pub child: ChildView,
    pub justification: Option<JustificationView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SheetView {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = "2026-10-16", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub status: SheetStatus,
    pub created_by: u64,
    pub validated_by: Option<u64>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub staff_validated_at: Option<DateTime<Utc>>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub secretary_validated_at: Option<DateTime<Utc>>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
    pub records: Vec<RecordView>,
}

/// Returns the phone as `role` may see it.
///
/// Null and empty numbers pass through: there is nothing to hide.
pub fn phone_for(phone: Option<&str>, role: Role) -> Option<String> {
    let phone = phone?;
    if phone.is_empty() || role.sees_contact_details() {
        return Some(phone.to_string());
    }
    Some(mask_phone(phone))
}

/// Masks the middle of a phone number.
///
/// A ten-digit local number keeps its first and last two-digit blocks
/// (`06 ** ** ** 78`). Other numbers of at least five characters keep two
/// characters on each side; anything shorter is fully masked.
pub fn mask_phone(phone: &str) -> String {
    let compact: Vec<char> = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '-')
        .collect();
    let len = compact.len();

    if len < MIN_MASKABLE_LEN {
        return FULL_MASK.to_string();
    }

    let head: String = compact.iter().take(2).collect();
    let tail: String = compact.iter().skip(len - 2).collect();

    if len == LOCAL_NUMBER_LEN && compact.iter().all(char::is_ascii_digit) {
        format!("{head} {BLOCK_MASK} {BLOCK_MASK} {BLOCK_MASK} {tail}")
    } else {
        format!("{head}{}{tail}", "*".repeat(len - 4))
    }
}

pub fn sheet_view(aggregate: SheetAggregate, role: Role) -> SheetView {
    let SheetAggregate { sheet, entries } = aggregate;

    SheetView {
        id: sheet.id,
        date: sheet.date,
        status: sheet.status,
        created_by: sheet.created_by,
        validated_by: sheet.validated_by,
        staff_validated_at: sheet.staff_validated_at,
        secretary_validated_at: sheet.secretary_validated_at,
        created_at: sheet.created_at,
        records: entries
            .into_iter()
            .map(|entry| record_view(entry, role))
            .collect(),
    }
}

fn record_view(entry: PresenceEntry, role: Role) -> RecordView {
    let PresenceEntry {
        record,
        child,
        justification,
    } = entry;

    RecordView {
        id: record.id,
        present: record.present,
        child: ChildView {
            id: child.id,
            parent_phone: phone_for(child.parent_phone.as_deref(), role),
            first_name: child.first_name,
            last_name: child.last_name,
            birth_date: child.birth_date,
        },
        justification: justification.map(justification_view),
    }
}

fn justification_view(j: AbsenceJustification) -> JustificationView {
    JustificationView {
        id: j.id,
        kind: j.kind,
        justification_date: j.justification_date,
        motif: j.motif,
        file_path: j.file_path,
        created_at: j.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::child::Child;
    use crate::model::presence::{PresenceRecord, PresenceSheet};
    use rstest::rstest;

    #[rstest]
    #[case("0612345678", "06 ** ** ** 78")]
    #[case("06 12 34 56 78", "06 ** ** ** 78")]
    #[case("06.12.34.56.78", "06 ** ** ** 78")]
    #[case("+33612345678", "+3********78")]
    #[case("+336123456", "+3******56")]
    #[case("06-12-AB-56-78", "06******78")]
    #[case("1234", "****")]
    #[case("12345", "12*45")]
    #[case("123", "****")]
    #[case("  ", "****")]
    fn masks_numbers(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(mask_phone(raw), expected);
    }

    #[rstest]
    #[case(Role::Staff, Some("06 ** ** ** 78"))]
    #[case(Role::Parent, Some("06 ** ** ** 78"))]
    #[case(Role::Secretary, Some("0612345678"))]
    #[case(Role::Director, Some("0612345678"))]
    #[case(Role::ServiceManager, Some("0612345678"))]
    fn applies_role_policy(#[case] role: Role, #[case] expected: Option<&str>) {
        assert_eq!(phone_for(Some("0612345678"), role).as_deref(), expected);
    }

    #[rstest]
    #[case(Role::Staff)]
    #[case(Role::Secretary)]
    fn null_and_empty_pass_through(#[case] role: Role) {
        assert_eq!(phone_for(None, role), None);
        assert_eq!(phone_for(Some(""), role).as_deref(), Some(""));
    }

    #[test]
    fn sheet_view_masks_every_record() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let sheet = PresenceSheet {
            id: 1,
            date,
            status: SheetStatus::PendingStaff,
            created_by: 9,
            validated_by: None,
            staff_validated_at: None,
            secretary_validated_at: None,
            created_at: Utc::now(),
        };
        let entries = (1..=3)
            .map(|id| PresenceEntry {
                record: PresenceRecord {
                    id: 100 + id,
                    sheet_id: 1,
                    child_id: id,
                    present: false,
                },
                child: Child {
                    id,
                    first_name: format!("Child{id}"),
                    last_name: "Doe".to_string(),
                    birth_date: date,
                    parent_phone: Some("0611223344".to_string()),
                },
                justification: None,
            })
            .collect();

        let view = sheet_view(SheetAggregate { sheet, entries }, Role::Staff);

        assert_eq!(view.records.len(), 3);
        assert!(
            view.records
                .iter()
                .all(|r| r.child.parent_phone.as_deref() == Some("06 ** ** ** 44"))
        );
    }
}
