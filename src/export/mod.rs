//! CSV export of application summaries and machine installations

use crate::db::InventoryDb;
use crate::error::{Error, Result};
use crate::query::{application_counts, item_machines, require_application, FieldFilter, InventoryFilter};
use crate::scope::{ReportContext, Scope};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::info;

/// Characters left unescaped in filename components
const FILENAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

pub const SUMMARY_HEADER: [&str; 4] = ["Name", "BundleID", "BundleName", "Install Count"];
pub const MACHINE_HEADER: [&str; 4] = ["Hostname", "Serial Number", "Last Checkin", "Console User"];

/// A rendered export
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub filename: String,
    pub body: Vec<u8>,
    /// Data rows, header excluded
    pub rows: usize,
}

/// Deterministic filename for an export.
///
/// Components: scope, then the application qualifier, then the field
/// qualifier. Application id 0 selects the summary export.
pub fn export_filename(base: &str, scope: Scope, application_id: i64, field: &FieldFilter) -> String {
    let mut parts: Vec<String> = vec![base.to_string()];

    if application_id == 0 {
        parts.extend(["application", "list", "for"].map(String::from));
        push_scope(&mut parts, scope);
    } else {
        parts.extend([
            "application".to_string(),
            application_id.to_string(),
            "for".to_string(),
        ]);
        push_scope(&mut parts, scope);
        if let Some(value) = field.value() {
            parts.extend([
                "where".to_string(),
                field.field_type().to_string(),
                "is".to_string(),
                utf8_percent_encode(value, FILENAME_SAFE).to_string(),
            ]);
        }
    }

    format!("{}.csv", parts.join("_"))
}

fn push_scope(parts: &mut Vec<String>, scope: Scope) {
    parts.push(scope.group_type().to_string());
    if scope != Scope::All {
        parts.push(scope.group_id().to_string());
    }
}

/// Render the export selected by `application_id` for the active scope
pub async fn export_csv(
    db: &InventoryDb,
    ctx: &ReportContext,
    filename_base: &str,
    application_id: i64,
    field: &FieldFilter,
) -> Result<CsvExport> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let rows = if application_id == 0 {
        writer.write_record(SUMMARY_HEADER)?;
        let counts = application_counts(db, ctx.filter()).await?;
        for count in &counts {
            let app = &count.application;
            writer.write_record([
                app.name.as_str(),
                app.bundleid.as_str(),
                app.bundlename.as_str(),
                count.install_count.to_string().as_str(),
            ])?;
        }
        counts.len()
    } else {
        let application = require_application(db, application_id).await?;
        let filter = InventoryFilter::scoped(ctx.filter())
            .with_application(application.id)
            .with_field(field.clone());
        writer.write_record(MACHINE_HEADER)?;
        let machines = item_machines(db, &filter).await?;
        for machine in &machines {
            writer.write_record([
                machine.hostname.as_str(),
                machine.serial.as_str(),
                machine.last_checkin_display().as_str(),
                machine.console_user.as_deref().unwrap_or(""),
            ])?;
        }
        machines.len()
    };

    let body = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    let filename = export_filename(filename_base, ctx.scope(), application_id, field);

    info!(request_id = %ctx.request_id, filename = %filename, rows, "Rendered CSV export");

    Ok(CsvExport {
        filename,
        body,
        rows,
    })
}
