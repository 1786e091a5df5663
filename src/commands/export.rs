//! Export command implementation

use crate::config::Config;
use crate::db::InventoryDb;
use crate::error::Result;
use crate::export::{export_csv, CsvExport};
use crate::query::FieldFilter;
use crate::scope::{ReportContext, Scope};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub group_type: String,
    pub group_id: i64,
    /// 0 exports the application summary
    pub application_id: i64,
    pub field_type: String,
    pub field_value: String,
    /// Directory to write into; stdout when unset
    pub output_dir: Option<PathBuf>,
}

/// Where an export ended up
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub export: CsvExport,
    pub path: Option<PathBuf>,
}

/// Render a CSV export and write it to the output directory, if any
pub async fn cmd_export(config: &Config, db: &InventoryDb, options: ExportOptions) -> Result<ExportResult> {
    let scope = Scope::from_parts(&options.group_type, options.group_id)?;
    let ctx = ReportContext::resolve(db, scope).await?;
    let field = FieldFilter::from_parts(&options.field_type, &options.field_value);

    let export = export_csv(
        db,
        &ctx,
        &config.export.filename_base,
        options.application_id,
        &field,
    )
    .await?;

    let path = match options.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            // Filter values may contain '/', which must not nest directories
            let path = dir.join(export.filename.replace('/', "%2F"));
            std::fs::write(&path, &export.body)?;
            info!("Wrote {} rows to {:?}", export.rows, path);
            Some(path)
        }
        None => None,
    };

    Ok(ExportResult { export, path })
}

/// Print the export location, or the CSV itself when it was not written to disk
pub fn print_export(result: &ExportResult) -> Result<()> {
    match &result.path {
        Some(path) => {
            println!("✓ Exported {} rows", result.export.rows);
            println!("  File: {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&result.export.body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
