use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder, Transaction};

use crate::model::child::Child;
use crate::model::presence::{
    AbsenceJustification, JustificationKind, NewJustification, PageRequest, PresenceEntry,
    PresenceRecord, PresenceSheet, SheetFilter, SheetStatus, SheetSummary,
};
use crate::presence::store::{PresenceStore, PresenceTx, SheetInsert, StoreError};

// SQLSTATE of a duplicate key, and of the deadlock InnoDB raises when two
// inserts race on the same gap of the unique date index.
const DUPLICATE_KEY: &str = "23000";
const DEADLOCK: &str = "40001";

const SHEET_COLUMNS: &str = r#"
    id, sheet_date, status, created_by, validated_by,
    staff_validated_at, secretary_validated_at, created_at
"#;

#[derive(FromRow)]
struct SheetRow {
    id: u64,
    sheet_date: NaiveDate,
    status: String,
    created_by: u64,
    validated_by: Option<u64>,
    staff_validated_at: Option<DateTime<Utc>>,
    secretary_validated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

fn parse_status(raw: &str) -> Result<SheetStatus, StoreError> {
    SheetStatus::from_str(raw).map_err(|_| StoreError::Corrupt(format!("sheet status '{raw}'")))
}

impl TryFrom<SheetRow> for PresenceSheet {
    type Error = StoreError;

    fn try_from(row: SheetRow) -> Result<Self, Self::Error> {
        Ok(PresenceSheet {
            id: row.id,
            date: row.sheet_date,
            status: parse_status(&row.status)?,
            created_by: row.created_by,
            validated_by: row.validated_by,
            staff_validated_at: row.staff_validated_at,
            secretary_validated_at: row.secretary_validated_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RecordRow {
    id: u64,
    sheet_id: u64,
    child_id: u64,
    present: bool,
}

#[derive(FromRow)]
struct EntryRow {
    record_id: u64,
    sheet_id: u64,
    present: bool,
    child_id: u64,
    first_name: String,
    last_name: String,
    birth_date: NaiveDate,
    parent_phone: Option<String>,
    justification_id: Option<u64>,
    kind: Option<String>,
    justification_date: Option<NaiveDate>,
    motif: Option<String>,
    file_path: Option<String>,
    justified_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for PresenceEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let justification = match row.justification_id {
            None => None,
            Some(id) => {
                let corrupt = || StoreError::Corrupt(format!("justification {id}"));
                let kind = row.kind.as_deref().ok_or_else(corrupt)?;
                Some(AbsenceJustification {
                    id,
                    record_id: row.record_id,
                    kind: JustificationKind::from_str(kind).map_err(|_| corrupt())?,
                    justification_date: row.justification_date.ok_or_else(corrupt)?,
                    motif: row.motif.unwrap_or_default(),
                    file_path: row.file_path,
                    created_at: row.justified_at.ok_or_else(corrupt)?,
                })
            }
        };

        Ok(PresenceEntry {
            record: PresenceRecord {
                id: row.record_id,
                sheet_id: row.sheet_id,
                child_id: row.child_id,
                present: row.present,
            },
            child: Child {
                id: row.child_id,
                first_name: row.first_name,
                last_name: row.last_name,
                birth_date: row.birth_date,
                parent_phone: row.parent_phone,
            },
            justification,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    id: u64,
    sheet_date: NaiveDate,
    status: String,
    records: i64,
    present: i64,
    absent: i64,
    justified: i64,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    Date(NaiveDate),
    Str(String),
}

fn where_clause(filter: &SheetFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    if let Some(from) = filter.from {
        where_sql.push_str(" AND s.sheet_date >= ?");
        args.push(FilterValue::Date(from));
    }
    if let Some(to) = filter.to {
        where_sql.push_str(" AND s.sheet_date <= ?");
        args.push(FilterValue::Date(to));
    }
    if let Some(status) = filter.status {
        where_sql.push_str(" AND s.status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }

    (where_sql, args)
}

fn optional_sheet(row: Option<SheetRow>) -> Result<Option<PresenceSheet>, StoreError> {
    row.map(PresenceSheet::try_from).transpose()
}

#[derive(Clone)]
pub struct MySqlPresenceStore {
    pool: MySqlPool,
}

impl MySqlPresenceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceStore for MySqlPresenceStore {
    type Tx = MySqlPresenceTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MySqlPresenceTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn count_sheets(&self, filter: &SheetFilter) -> Result<i64, StoreError> {
        let (where_sql, args) = where_clause(filter);
        let count_sql = format!("SELECT COUNT(*) FROM presence_sheets s{}", where_sql);

        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in args {
            count_q = match arg {
                FilterValue::Date(d) => count_q.bind(d),
                FilterValue::Str(s) => count_q.bind(s),
            };
        }

        Ok(count_q.fetch_one(&self.pool).await?)
    }

    async fn list_sheets(
        &self,
        filter: &SheetFilter,
        page: PageRequest,
    ) -> Result<Vec<SheetSummary>, StoreError> {
        let (where_sql, args) = where_clause(filter);
        let data_sql = format!(
            r#"
            SELECT
                s.id,
                s.sheet_date,
                s.status,
                COUNT(r.id) AS records,
                CAST(COALESCE(SUM(r.present = TRUE), 0) AS SIGNED) AS present,
                CAST(COALESCE(SUM(r.present = FALSE), 0) AS SIGNED) AS absent,
                COUNT(j.id) AS justified
            FROM presence_sheets s
            LEFT JOIN presence_records r ON r.sheet_id = s.id
            LEFT JOIN absence_justifications j ON j.record_id = r.id
            {}
            GROUP BY s.id, s.sheet_date, s.status
            ORDER BY s.sheet_date DESC
            LIMIT ? OFFSET ?
            "#,
            where_sql
        );

        let mut data_q = sqlx::query_as::<_, SummaryRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::Date(d) => data_q.bind(d),
                FilterValue::Str(s) => data_q.bind(s),
            };
        }

        data_q
            .bind(page.per_page)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                Ok(SheetSummary {
                    id: row.id,
                    date: row.sheet_date,
                    status: parse_status(&row.status)?,
                    records: row.records,
                    present: row.present,
                    absent: row.absent,
                    justified: row.justified,
                })
            })
            .collect()
    }
}

pub struct MySqlPresenceTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl PresenceTx for MySqlPresenceTx {
    async fn sheet_by_id(&mut self, id: u64) -> Result<Option<PresenceSheet>, StoreError> {
        let sql = format!("SELECT {SHEET_COLUMNS} FROM presence_sheets WHERE id = ?");
        let row = sqlx::query_as::<_, SheetRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_sheet(row)
    }

    async fn sheet_by_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<PresenceSheet>, StoreError> {
        let sql = format!("SELECT {SHEET_COLUMNS} FROM presence_sheets WHERE sheet_date = ?");
        let row = sqlx::query_as::<_, SheetRow>(&sql)
            .bind(date)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_sheet(row)
    }

    async fn lock_sheet(&mut self, id: u64) -> Result<Option<PresenceSheet>, StoreError> {
        let sql = format!("SELECT {SHEET_COLUMNS} FROM presence_sheets WHERE id = ? FOR UPDATE");
        let row = sqlx::query_as::<_, SheetRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_sheet(row)
    }

    async fn lock_sheet_by_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<PresenceSheet>, StoreError> {
        let sql = format!(
            "SELECT {SHEET_COLUMNS} FROM presence_sheets WHERE sheet_date = ? FOR UPDATE"
        );
        let row = sqlx::query_as::<_, SheetRow>(&sql)
            .bind(date)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_sheet(row)
    }

    async fn insert_sheet(
        &mut self,
        date: NaiveDate,
        created_by: u64,
        at: DateTime<Utc>,
    ) -> Result<SheetInsert, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO presence_sheets (sheet_date, status, created_by, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(date)
        .bind(SheetStatus::PendingStaff.to_string())
        .bind(created_by)
        .bind(at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(done) => Ok(SheetInsert::Inserted(done.last_insert_id())),
            Err(sqlx::Error::Database(db_err))
                if matches!(db_err.code().as_deref(), Some(DUPLICATE_KEY | DEADLOCK)) =>
            {
                Ok(SheetInsert::DateTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_staff_validated(
        &mut self,
        sheet_id: u64,
        staff_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE presence_sheets
            SET status = ?, validated_by = ?, staff_validated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(SheetStatus::PendingSecretary.to_string())
        .bind(staff_id)
        .bind(at)
        .bind(sheet_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn mark_secretary_validated(
        &mut self,
        sheet_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE presence_sheets
            SET status = ?, secretary_validated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(SheetStatus::Validated.to_string())
        .bind(at)
        .bind(sheet_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_children(&mut self) -> Result<Vec<Child>, StoreError> {
        let children = sqlx::query_as::<_, Child>(
            r#"
            SELECT id, first_name, last_name, birth_date, parent_phone
            FROM children
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(children)
    }

    async fn count_records(&mut self, sheet_id: u64) -> Result<i64, StoreError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM presence_records WHERE sheet_id = ?")
                .bind(sheet_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(count)
    }

    async fn delete_records(&mut self, sheet_id: u64) -> Result<(), StoreError> {
        // Justifications go with their records (ON DELETE CASCADE).
        sqlx::query("DELETE FROM presence_records WHERE sheet_id = ?")
            .bind(sheet_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_records(
        &mut self,
        sheet_id: u64,
        rows: &[(u64, bool)],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut builder =
            QueryBuilder::<MySql>::new("INSERT INTO presence_records (sheet_id, child_id, present) ");
        builder.push_values(rows, |mut b, (child_id, present)| {
            b.push_bind(sheet_id).push_bind(*child_id).push_bind(*present);
        });
        builder.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn record_by_id(&mut self, id: u64) -> Result<Option<PresenceRecord>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT id, sheet_id, child_id, present FROM presence_records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|r| PresenceRecord {
            id: r.id,
            sheet_id: r.sheet_id,
            child_id: r.child_id,
            present: r.present,
        }))
    }

    async fn has_justification(&mut self, record_id: u64) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM absence_justifications WHERE record_id = ?",
        )
        .bind(record_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count > 0)
    }

    async fn insert_justification(
        &mut self,
        record_id: u64,
        justification: &NewJustification,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let done = sqlx::query(
            r#"
            INSERT INTO absence_justifications
                (record_id, kind, justification_date, motif, file_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record_id)
        .bind(justification.kind.to_string())
        .bind(justification.justification_date)
        .bind(&justification.motif)
        .bind(&justification.file_path)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        Ok(done.last_insert_id())
    }

    async fn count_unjustified(&mut self, sheet_id: u64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM presence_records r
            LEFT JOIN absence_justifications j ON j.record_id = r.id
            WHERE r.sheet_id = ?
            AND r.present = FALSE
            AND j.id IS NULL
            "#,
        )
        .bind(sheet_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn entries(&mut self, sheet_id: u64) -> Result<Vec<PresenceEntry>, StoreError> {
        sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT
                r.id AS record_id,
                r.sheet_id,
                r.present,
                c.id AS child_id,
                c.first_name,
                c.last_name,
                c.birth_date,
                c.parent_phone,
                j.id AS justification_id,
                j.kind,
                j.justification_date,
                j.motif,
                j.file_path,
                j.created_at AS justified_at
            FROM presence_records r
            JOIN children c ON c.id = r.child_id
            LEFT JOIN absence_justifications j ON j.record_id = r.id
            WHERE r.sheet_id = ?
            ORDER BY c.last_name, c.first_name, c.id
            "#,
        )
        .bind(sheet_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(PresenceEntry::try_from)
        .collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}


#[cfg(test)]
#[path = "mysql_tests.rs"]
mod database_tests;
