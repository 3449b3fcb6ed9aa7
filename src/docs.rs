use crate::api::presence::{JustifyRecord, OpenSheet, SheetQuery, ValidateSheet};
use crate::model::presence::{JustificationKind, SheetPage, SheetStatus, SheetSummary};
use crate::model::role::Role;
use crate::presence::visibility::{ChildView, JustificationView, RecordView, SheetView};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "IME Presence API",
        version = "0.1.0",
        description = r#"
## Daily presence sheets

Tracks which children attend the institute each day.

### Workflow
- **Staff** open the sheet of the day and record who is present
- **Secretary** justifies every absence or lateness
- The sheet is **validated** once the last absence is justified

### Security
Every endpoint requires a **JWT Bearer** access token.
Parent phone numbers are masked unless the caller belongs to the
secretariat or the management.

### Response Format
- JSON bodies; errors are `{ "code", "message" }`
- Pagination supported for the sheet history
"#,
    ),
    paths(
        crate::api::presence::open_sheet,
        crate::api::presence::validate_sheet,
        crate::api::presence::justify_record,
        crate::api::presence::sheet_by_date,
        crate::api::presence::get_sheet,
        crate::api::presence::list_sheets
    ),
    components(
        schemas(
            OpenSheet,
            ValidateSheet,
            JustifyRecord,
            SheetQuery,
            SheetView,
            RecordView,
            ChildView,
            JustificationView,
            SheetPage,
            SheetSummary,
            SheetStatus,
            JustificationKind,
            Role
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Presence", description = "Daily presence sheets and absence justifications"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
