use crate::auth::auth::AuthUser;
use crate::error::PresenceError;
use crate::model::presence::{
    JustificationInput, JustificationKind, PageRequest, SheetFilter, SheetPage, SheetStatus,
    parse_sheet_date,
};
use crate::presence::service::PresenceService;
use crate::presence::store::PresenceStore;
use crate::presence::visibility::SheetView;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct OpenSheet {
    /// Calendar day of the sheet; a timestamp is reduced to its day
    #[schema(example = "2026-10-16")]
    pub date: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ValidateSheet {
    /// Children present today; every other child is recorded absent
    #[schema(example = json!([7, 9]))]
    pub present_child_ids: Vec<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct JustifyRecord {
    #[schema(example = "ABSENCE")]
    pub kind: JustificationKind,
    #[schema(example = "2026-10-16")]
    pub justification_date: String,
    #[schema(example = "medical appointment")]
    pub motif: Option<String>,
    /// Path of an already stored supporting document
    #[schema(example = "justifications/2026/10/certificate.pdf")]
    pub file_path: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct SheetQuery {
    #[schema(example = "2026-10-01")]
    /// First day of the range (inclusive)
    pub from: Option<String>,
    #[schema(example = "2026-10-31")]
    /// Last day of the range (inclusive)
    pub to: Option<String>,
    /// Filter by sheet status
    pub status: Option<SheetStatus>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    #[schema(example = 10)]
    /// Pagination per page number
    pub per_page: Option<u64>,
}

fn date_param(raw: &str, field: &str) -> Result<NaiveDate, PresenceError> {
    parse_sheet_date(raw)
        .ok_or_else(|| PresenceError::InvalidRequest(format!("{field} is not a valid date: {raw}")))
}

/* =========================
Open the daily sheet (staff)
========================= */
#[utoipa::path(
    post,
    path = "/api/presence/sheets",
    request_body(
        content = OpenSheet,
        description = "Day of the sheet",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Sheet of the day, created on first call", body = SheetView),
        (status = 400, description = "Malformed date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn open_sheet<S: PresenceStore>(
    auth: AuthUser,
    service: web::Data<PresenceService<S>>,
    payload: web::Json<OpenSheet>,
) -> actix_web::Result<impl Responder> {
    let date = date_param(&payload.date, "date")?;
    let sheet = service.create_or_get_sheet(date, auth.actor()).await?;
    Ok(HttpResponse::Ok().json(sheet))
}

/* =========================
Staff validation
========================= */
#[utoipa::path(
    put,
    path = "/api/presence/sheets/{sheet_id}/validate",
    params(
        ("sheet_id" = u64, Path, description = "ID of the sheet to validate")
    ),
    request_body(content = ValidateSheet, content_type = "application/json"),
    responses(
        (status = 200, description = "Sheet handed over to the secretary", body = SheetView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Sheet not found"),
        (status = 409, description = "Sheet already validated by staff", body = Object, example = json!({
            "code": "invalid_state_transition",
            "message": "Presence sheet 12 is PENDING_SECRETARY and not eligible for validation"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn validate_sheet<S: PresenceStore>(
    auth: AuthUser,
    service: web::Data<PresenceService<S>>,
    path: web::Path<u64>,
    payload: web::Json<ValidateSheet>,
) -> actix_web::Result<impl Responder> {
    let sheet_id = path.into_inner();
    let sheet = service
        .validate(sheet_id, &payload.present_child_ids, auth.actor())
        .await?;
    Ok(HttpResponse::Ok().json(sheet))
}

/* =========================
Justify an absence (secretary)
========================= */
#[utoipa::path(
    post,
    path = "/api/presence/records/{record_id}/justification",
    params(
        ("record_id" = u64, Path, description = "ID of the absent record")
    ),
    request_body(content = JustifyRecord, content_type = "application/json"),
    responses(
        (status = 200, description = "Justification recorded; the sheet is returned", body = SheetView),
        (status = 400, description = "Malformed date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Record not found"),
        (status = 422, description = "Record present, already justified, or sheet not awaiting the secretary")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn justify_record<S: PresenceStore>(
    auth: AuthUser,
    service: web::Data<PresenceService<S>>,
    path: web::Path<u64>,
    payload: web::Json<JustifyRecord>,
) -> actix_web::Result<impl Responder> {
    let record_id = path.into_inner();
    let JustifyRecord {
        kind,
        justification_date,
        motif,
        file_path,
    } = payload.into_inner();

    let input = JustificationInput {
        kind,
        justification_date: date_param(&justification_date, "justification_date")?,
        motif,
    };

    let sheet = service
        .justify(record_id, input, file_path, auth.actor())
        .await?;
    Ok(HttpResponse::Ok().json(sheet))
}

/// Reads the sheet of a day without ever creating it.
#[utoipa::path(
    get,
    path = "/api/presence/sheets/date/{date}",
    params(
        ("date" = String, Path, description = "Day of the sheet (YYYY-MM-DD)")
    ),
    responses(
        (status = 200, description = "Sheet found", body = SheetView),
        (status = 400, description = "Malformed date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No sheet for that day")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn sheet_by_date<S: PresenceStore>(
    auth: AuthUser,
    service: web::Data<PresenceService<S>>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let date = date_param(&path.into_inner(), "date")?;
    let sheet = service.find_by_date(date, auth.actor()).await?;
    Ok(HttpResponse::Ok().json(sheet))
}

#[utoipa::path(
    get,
    path = "/api/presence/sheets/{sheet_id}",
    params(
        ("sheet_id" = u64, Path, description = "ID of the sheet to fetch")
    ),
    responses(
        (status = 200, description = "Sheet found", body = SheetView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Sheet not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn get_sheet<S: PresenceStore>(
    auth: AuthUser,
    service: web::Data<PresenceService<S>>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let sheet = service.find_sheet(path.into_inner(), auth.actor()).await?;
    Ok(HttpResponse::Ok().json(sheet))
}

/// Sheet history, newest first
#[utoipa::path(
    get,
    path = "/api/presence/sheets",
    params(SheetQuery),
    responses(
        (status = 200, description = "Paginated sheet summaries", body = SheetPage),
        (status = 400, description = "Malformed date or inverted range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn list_sheets<S: PresenceStore>(
    auth: AuthUser,
    service: web::Data<PresenceService<S>>,
    query: web::Query<SheetQuery>,
) -> actix_web::Result<impl Responder> {
    let SheetQuery {
        from,
        to,
        status,
        page,
        per_page,
    } = query.into_inner();

    let filter = SheetFilter {
        from: from.as_deref().map(|d| date_param(d, "from")).transpose()?,
        to: to.as_deref().map(|d| date_param(d, "to")).transpose()?,
        status,
    };

    let page = service
        .list_sheets(filter, PageRequest::new(page, per_page), auth.actor())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
