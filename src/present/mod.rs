//! List and detail presenters
//!
//! Shapes query results into the JSON views served by the report routes.
//! Every view echoes the scope it was computed for.

mod links;

pub use links::*;

use crate::config::ReportsConfig;
use crate::db::InventoryDb;
use crate::error::Result;
use crate::models::{Application, Machine};
use crate::query::{
    application_counts, count_items, distinct_machines, path_counts, require_application,
    version_counts, FieldFilter, InventoryFilter,
};
use crate::scope::{GroupType, ReportContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Query-string pagination and search parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub search: Option<String>,
}

/// A validated page request; pages start at 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
    /// Lowercased case-insensitive substring filter
    pub search: Option<String>,
}

impl PageRequest {
    pub fn new(params: PageParams, config: &ReportsConfig) -> Self {
        let max = config.max_per_page.max(1);
        Self {
            page: params.page.unwrap_or(1).max(1),
            per_page: params.per_page.unwrap_or(config.per_page).clamp(1, max),
            search: params
                .search
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        }
    }

    /// Whether any of `fields` contains the search term
    fn matches(&self, fields: &[&str]) -> bool {
        match &self.search {
            None => true,
            Some(term) => fields.iter().any(|f| f.to_lowercase().contains(term)),
        }
    }

    /// Cut one page out of `rows`. Pages past the end are empty.
    pub fn paginate<T>(&self, rows: Vec<T>) -> Page<T> {
        let total = rows.len();
        let start = (self.page - 1).saturating_mul(self.per_page);
        let rows = rows.into_iter().skip(start).take(self.per_page).collect();
        Page {
            page: self.page,
            per_page: self.per_page,
            total,
            rows,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(PageParams::default(), &ReportsConfig::default())
    }
}

/// One page of rows plus the total across all pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub rows: Vec<T>,
}

impl<T> Page<T> {
    fn with_rows<U>(self, rows: Vec<U>) -> Page<U> {
        Page {
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            rows,
        }
    }
}

/// A machine running the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryListRow {
    pub machine_id: i64,
    pub machine_url: String,
    pub hostname: String,
    pub serial: String,
    pub last_checkin: String,
    pub console_user: String,
    /// Matching items on this machine
    pub install_count: i64,
}

impl InventoryListRow {
    fn new(machine: Machine, install_count: i64) -> Self {
        Self {
            machine_id: machine.id,
            machine_url: machine_url(machine.id),
            last_checkin: machine.last_checkin_display(),
            hostname: machine.hostname,
            serial: machine.serial,
            console_user: machine.console_user.unwrap_or_default(),
            install_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryListView {
    pub request_id: String,
    pub group_type: GroupType,
    pub group_id: i64,
    pub group_name: Option<String>,
    pub application_id: i64,
    pub app_name: String,
    pub field_type: String,
    pub field_value: Option<String>,
    pub csv_url: String,
    pub machines: Page<InventoryListRow>,
}

/// Machines running an application under the active scope
pub async fn inventory_list(
    db: &InventoryDb,
    ctx: &ReportContext,
    application_id: i64,
    field: FieldFilter,
    page: PageRequest,
) -> Result<InventoryListView> {
    let application = require_application(db, application_id).await?;
    let filter = InventoryFilter::scoped(ctx.filter())
        .with_application(application.id)
        .with_field(field);

    let machines: Vec<Machine> = distinct_machines(db, &filter)
        .await?
        .into_iter()
        .filter(|m| {
            page.matches(&[
                m.hostname.as_str(),
                m.serial.as_str(),
                m.console_user.as_deref().unwrap_or(""),
            ])
        })
        .collect();
    let machines = page.paginate(machines);
    let mut rows = Vec::with_capacity(machines.rows.len());
    for machine in &machines.rows {
        let install_count = count_items(db, &filter.for_machine(machine.id)).await?;
        rows.push(InventoryListRow::new(machine.clone(), install_count));
    }
    debug!(
        request_id = %ctx.request_id,
        application_id,
        total = machines.total,
        "Built inventory list"
    );

    let scope = ctx.scope();
    Ok(InventoryListView {
        request_id: ctx.request_id.to_string(),
        group_type: scope.group_type(),
        group_id: scope.group_id(),
        group_name: ctx.target.name(),
        application_id: application.id,
        app_name: application.name,
        field_type: filter.field.field_type().to_string(),
        field_value: filter.field.value().map(str::to_string),
        csv_url: csv_export_url(scope, application_id, &filter.field),
        machines: machines.with_rows(rows),
    })
}

/// An application visible under the active scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationListRow {
    pub application_id: i64,
    pub name: String,
    pub bundleid: String,
    pub bundlename: String,
    pub install_count: i64,
    pub detail_url: String,
    /// Inventory list pre-filtered to this application
    pub inventory_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListView {
    pub request_id: String,
    pub group_type: GroupType,
    pub group_id: i64,
    pub group_name: Option<String>,
    pub csv_url: String,
    pub applications: Page<ApplicationListRow>,
}

/// Applications with at least one install under the active scope, by name
pub async fn application_list(
    db: &InventoryDb,
    ctx: &ReportContext,
    page: PageRequest,
) -> Result<ApplicationListView> {
    let scope = ctx.scope();
    let counts: Vec<_> = application_counts(db, ctx.filter())
        .await?
        .into_iter()
        .filter(|c| {
            let app = &c.application;
            page.matches(&[app.name.as_str(), app.bundleid.as_str(), app.bundlename.as_str()])
        })
        .collect();
    let counts = page.paginate(counts);
    let rows = counts
        .rows
        .iter()
        .map(|count| {
            let app = &count.application;
            ApplicationListRow {
                application_id: app.id,
                name: app.name.clone(),
                bundleid: app.bundleid.clone(),
                bundlename: app.bundlename.clone(),
                install_count: count.install_count,
                detail_url: application_detail_url(scope, app.id),
                inventory_url: inventory_list_url(scope, app.id, &FieldFilter::All),
            }
        })
        .collect();

    Ok(ApplicationListView {
        request_id: ctx.request_id.to_string(),
        group_type: scope.group_type(),
        group_id: scope.group_id(),
        group_name: ctx.target.name(),
        csv_url: csv_export_url(scope, 0, &FieldFilter::All),
        applications: counts.with_rows(rows),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionCount {
    pub version: String,
    pub count: i64,
    pub inventory_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathCount {
    pub path: String,
    pub count: i64,
    pub inventory_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetailView {
    pub request_id: String,
    pub group_type: GroupType,
    pub group_id: i64,
    pub group_name: Option<String>,
    pub application: Application,
    /// Application list for the same scope
    pub applications_url: String,
    pub install_count: i64,
    pub versions: Vec<VersionCount>,
    pub paths: Vec<PathCount>,
}

/// Install totals for one application, broken down by version and by path
pub async fn application_detail(
    db: &InventoryDb,
    ctx: &ReportContext,
    application_id: i64,
) -> Result<ApplicationDetailView> {
    let application = require_application(db, application_id).await?;
    let filter = InventoryFilter::scoped(ctx.filter()).with_application(application.id);
    let scope = ctx.scope();

    let install_count = count_items(db, &filter).await?;
    let versions = version_counts(db, &filter)
        .await?
        .into_iter()
        .map(|v| VersionCount {
            inventory_url: inventory_list_url(
                scope,
                application.id,
                &FieldFilter::Version(v.value.clone()),
            ),
            version: v.value,
            count: v.count,
        })
        .collect();
    let paths = path_counts(db, &filter)
        .await?
        .into_iter()
        .map(|p| PathCount {
            inventory_url: inventory_list_url(
                scope,
                application.id,
                &FieldFilter::Path(p.value.clone()),
            ),
            path: p.value,
            count: p.count,
        })
        .collect();

    Ok(ApplicationDetailView {
        request_id: ctx.request_id.to_string(),
        group_type: scope.group_type(),
        group_id: scope.group_id(),
        group_name: ctx.target.name(),
        application,
        applications_url: application_list_url(scope),
        install_count,
        versions,
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistinctMode;
    use crate::db::test_support::*;
    use crate::error::Error;
    use crate::scope::Scope;
    use chrono::{TimeZone, Utc};

    async fn ctx(f: &Fleet, scope: Scope) -> ReportContext {
        ReportContext::resolve(&f.db, scope).await.unwrap()
    }

    #[test]
    fn test_page_request_bounds() {
        let config = ReportsConfig::default();
        let page = PageRequest::new(
            PageParams {
                page: Some(0),
                per_page: Some(10_000),
                search: Some("  ".to_string()),
            },
            &config,
        );
        assert_eq!(page.search, None);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, config.max_per_page);

        let page = PageRequest {
            page: 2,
            per_page: 2,
            search: None,
        };
        let cut = page.paginate(vec![1, 2, 3, 4, 5]);
        assert_eq!(cut.rows, vec![3, 4]);
        assert_eq!(cut.total, 5);

        let past_end = PageRequest {
            page: 9,
            per_page: 2,
            search: None,
        }
        .paginate(vec![1, 2, 3]);
        assert!(past_end.rows.is_empty());
        assert_eq!(past_end.total, 3);
    }

    #[tokio::test]
    async fn test_inventory_list_rows() {
        let f = fleet().await;
        let app = f.app().await;
        f.db.record_checkin(
            f.m1.id,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            Some("dev"),
        )
        .await
        .unwrap();

        let ctx = ctx(&f, Scope::MachineGroup(f.laptops.id)).await;
        let view = inventory_list(&f.db, &ctx, app.id, FieldFilter::All, PageRequest::default())
            .await
            .unwrap();

        assert_eq!(view.group_name.as_deref(), Some("Laptops"));
        assert_eq!(view.app_name, "App");
        assert_eq!(view.field_type, "all");
        assert_eq!(view.machines.total, 2);

        let first = &view.machines.rows[0];
        assert_eq!(first.serial, "ABC123");
        assert_eq!(first.install_count, 2);
        assert_eq!(first.last_checkin, "2024-05-01 08:30:00");
        assert_eq!(first.console_user, "dev");
        assert_eq!(first.machine_url, format!("/machine_detail/{}/", f.m1.id));

        let second = &view.machines.rows[1];
        assert_eq!(second.serial, "DEF456");
        assert_eq!(second.install_count, 1);
        assert_eq!(second.last_checkin, "");
    }

    #[tokio::test]
    async fn test_inventory_list_field_filter_narrows_counts() {
        let f = fleet().await;
        let app = f.app().await;
        let ctx = ctx(&f, Scope::All).await;
        let field = FieldFilter::Path("/Applications/App.app".to_string());

        let view = inventory_list(&f.db, &ctx, app.id, field, PageRequest::default())
            .await
            .unwrap();
        let counts: Vec<(&str, i64)> = view
            .machines
            .rows
            .iter()
            .map(|r| (r.serial.as_str(), r.install_count))
            .collect();
        assert_eq!(
            counts,
            vec![("ABC123", 1), ("DEF456", 1), ("GHI789", 1), ("JKL012", 1)]
        );
        assert_eq!(view.field_value.as_deref(), Some("/Applications/App.app"));
    }

    #[tokio::test]
    async fn test_inventory_list_same_under_fallback() {
        let f = fleet().await;
        let app = f.app().await;
        let ctx = ctx(&f, Scope::BusinessUnit(f.eng.id)).await;
        let fallback = f.db.with_distinct_mode(DistinctMode::Fallback);

        let native = inventory_list(&f.db, &ctx, app.id, FieldFilter::All, PageRequest::default())
            .await
            .unwrap();
        let other = inventory_list(&fallback, &ctx, app.id, FieldFilter::All, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(native.machines.rows, other.machines.rows);
    }

    #[tokio::test]
    async fn test_inventory_list_unknown_application() {
        let f = fleet().await;
        let ctx = ctx(&f, Scope::All).await;
        let result =
            inventory_list(&f.db, &ctx, 999, FieldFilter::All, PageRequest::default()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_application_list() {
        let f = fleet().await;
        let ctx = ctx(&f, Scope::BusinessUnit(f.ops.id)).await;

        let view = application_list(&f.db, &ctx, PageRequest::default()).await.unwrap();
        assert_eq!(view.group_name.as_deref(), Some("Operations"));
        assert_eq!(view.applications.total, 1);

        let row = &view.applications.rows[0];
        assert_eq!(row.name, "App");
        assert_eq!(row.install_count, 1);
        assert_eq!(
            row.inventory_url,
            format!("/inventory/list/business_unit/{}/{}/all/0/", f.ops.id, row.application_id)
        );
        assert_eq!(
            row.detail_url,
            format!("/inventory/application/business_unit/{}/{}/", f.ops.id, row.application_id)
        );
    }

    #[tokio::test]
    async fn test_search_filters_rows() {
        let f = fleet().await;
        let app = f.app().await;
        let ctx = ctx(&f, Scope::All).await;
        let search = |term: &str| {
            PageRequest::new(
                PageParams {
                    search: Some(term.to_string()),
                    ..Default::default()
                },
                &ReportsConfig::default(),
            )
        };

        let view = application_list(&f.db, &ctx, search("COM.BAR")).await.unwrap();
        assert_eq!(view.applications.total, 1);
        assert_eq!(view.applications.rows[0].name, "Tool");

        let view = inventory_list(&f.db, &ctx, app.id, FieldFilter::All, search("imac"))
            .await
            .unwrap();
        assert_eq!(view.machines.total, 1);
        assert_eq!(view.machines.rows[0].serial, "GHI789");
    }

    #[tokio::test]
    async fn test_application_detail_counts() {
        let f = fleet().await;
        let app = f.app().await;
        let ctx = ctx(&f, Scope::All).await;

        let view = application_detail(&f.db, &ctx, app.id).await.unwrap();
        assert_eq!(view.install_count, 5);
        assert_eq!(view.group_id, 0);
        assert!(view.group_name.is_none());
        assert_eq!(view.applications_url, "/inventory/applications/all/0/");

        let versions: Vec<(&str, i64)> = view
            .versions
            .iter()
            .map(|v| (v.version.as_str(), v.count))
            .collect();
        assert_eq!(versions, vec![("", 1), ("1.0", 3), ("2.0", 1)]);

        let version_sum: i64 = view.versions.iter().map(|v| v.count).sum();
        let path_sum: i64 = view.paths.iter().map(|p| p.count).sum();
        assert!(version_sum <= view.install_count);
        assert!(path_sum <= view.install_count);
        assert!(view.paths.iter().all(|p| p.count <= view.install_count));
    }

    #[tokio::test]
    async fn test_application_detail_machine_scope() {
        let f = fleet().await;
        let app = f.app().await;
        let ctx = ctx(&f, Scope::Machine(f.m1.id)).await;

        let view = application_detail(&f.db, &ctx, app.id).await.unwrap();
        assert_eq!(view.install_count, 2);
        assert_eq!(view.group_name.as_deref(), Some("eng-mbp-01"));
        assert_eq!(view.paths.len(), 2);
        assert_eq!(view.versions.len(), 1);
    }
}
