//! Inventory query builder
//!
//! Every report reads `inventory_items` through an [`InventoryFilter`]:
//! a scope predicate, an optional application and an optional exact match
//! on path or version.

mod distinct;

pub use distinct::*;

use crate::db::InventoryDb;
use crate::error::{Error, Result};
use crate::models::{Application, InventoryItem, Machine};
use crate::scope::ScopeFilter;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};

/// Joins every inventory query shares; predicates are appended after `WHERE 1 = 1`
const ITEM_JOINS: &str = r#"
    FROM inventory_items i
    JOIN applications a ON a.id = i.application_id
    JOIN machines m ON m.id = i.machine_id
    JOIN machine_groups mg ON mg.id = m.machine_group_id
    WHERE 1 = 1"#;

/// Optional exact-match constraint on an item field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFilter {
    All,
    Path(String),
    Version(String),
}

impl FieldFilter {
    /// Build from URL parts. Unknown field types apply no constraint.
    pub fn from_parts(field_type: &str, field_value: &str) -> Self {
        match field_type {
            "path" => FieldFilter::Path(field_value.to_string()),
            "version" => FieldFilter::Version(field_value.to_string()),
            _ => FieldFilter::All,
        }
    }

    pub fn field_type(&self) -> &'static str {
        match self {
            FieldFilter::All => "all",
            FieldFilter::Path(_) => "path",
            FieldFilter::Version(_) => "version",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            FieldFilter::All => None,
            FieldFilter::Path(v) | FieldFilter::Version(v) => Some(v),
        }
    }

    fn push_predicate(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            FieldFilter::All => {}
            FieldFilter::Path(path) => {
                qb.push(" AND i.path = ").push_bind(path.clone());
            }
            FieldFilter::Version(version) => {
                qb.push(" AND i.version = ").push_bind(version.clone());
            }
        }
    }
}

/// Scope + application + field constraint over inventory items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryFilter {
    pub scope: ScopeFilter,
    pub application_id: Option<i64>,
    pub field: FieldFilter,
}

impl InventoryFilter {
    pub fn scoped(scope: ScopeFilter) -> Self {
        Self {
            scope,
            application_id: None,
            field: FieldFilter::All,
        }
    }

    pub fn with_application(mut self, application_id: i64) -> Self {
        self.application_id = Some(application_id);
        self
    }

    pub fn with_field(mut self, field: FieldFilter) -> Self {
        self.field = field;
        self
    }

    /// Same application and field constraint, narrowed to one machine
    pub fn for_machine(&self, machine_id: i64) -> Self {
        Self {
            scope: ScopeFilter::Machine(machine_id),
            ..self.clone()
        }
    }

    /// Append the shared joins and every predicate
    pub(crate) fn push_from_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(ITEM_JOINS);
        self.scope.push_predicate(qb);
        if let Some(application_id) = self.application_id {
            qb.push(" AND i.application_id = ").push_bind(application_id);
        }
        self.field.push_predicate(qb);
    }
}

/// An application with its install count under some scope
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ApplicationCount {
    #[sqlx(flatten)]
    pub application: Application,
    pub install_count: i64,
}

/// A distinct field value with the number of items carrying it
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: i64,
}

/// Load an application or fail with `NotFound`
pub async fn require_application(db: &InventoryDb, application_id: i64) -> Result<Application> {
    db.get_application(application_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("No application with id {}", application_id)))
}

/// Matching items in insertion order
pub async fn inventory_items(db: &InventoryDb, filter: &InventoryFilter) -> Result<Vec<InventoryItem>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT i.*");
    filter.push_from_where(&mut qb);
    qb.push(" ORDER BY i.id");
    let items = qb.build_query_as::<InventoryItem>().fetch_all(db.pool()).await?;
    Ok(items)
}

pub async fn count_items(db: &InventoryDb, filter: &InventoryFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    filter.push_from_where(&mut qb);
    let count = qb.build_query_scalar::<i64>().fetch_one(db.pool()).await?;
    Ok(count)
}

/// The machine of every matching item, one row per item (not deduplicated)
pub async fn item_machines(db: &InventoryDb, filter: &InventoryFilter) -> Result<Vec<Machine>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT m.*");
    filter.push_from_where(&mut qb);
    qb.push(" ORDER BY i.id");
    let machines = qb.build_query_as::<Machine>().fetch_all(db.pool()).await?;
    Ok(machines)
}

/// Applications with at least one item under `scope`, sorted by name
pub async fn application_counts(db: &InventoryDb, scope: ScopeFilter) -> Result<Vec<ApplicationCount>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT a.id, a.bundleid, a.name, a.bundlename, COUNT(i.id) AS install_count",
    );
    InventoryFilter::scoped(scope).push_from_where(&mut qb);
    qb.push(" GROUP BY a.id ORDER BY a.name, a.bundleid, a.bundlename, a.id");
    let rows = qb.build_query_as::<ApplicationCount>().fetch_all(db.pool()).await?;
    Ok(rows)
}

/// Distinct versions among matching items with their counts, sorted by value
pub async fn version_counts(db: &InventoryDb, filter: &InventoryFilter) -> Result<Vec<ValueCount>> {
    grouped_counts(db, filter, "i.version").await
}

/// Distinct paths among matching items with their counts, sorted by value
pub async fn path_counts(db: &InventoryDb, filter: &InventoryFilter) -> Result<Vec<ValueCount>> {
    grouped_counts(db, filter, "i.path").await
}

async fn grouped_counts(
    db: &InventoryDb,
    filter: &InventoryFilter,
    column: &'static str,
) -> Result<Vec<ValueCount>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
    qb.push(column).push(" AS value, COUNT(*) AS count");
    filter.push_from_where(&mut qb);
    qb.push(" GROUP BY ").push(column).push(" ORDER BY ").push(column);
    let rows = qb.build_query_as::<ValueCount>().fetch_all(db.pool()).await?;
    Ok(rows)
}
