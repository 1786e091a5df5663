//! Distinct machines behind an inventory filter
//!
//! Two strategies produce the same set. The native one deduplicates in a
//! single statement; the fallback collects distinct machine ids first and
//! loads the machines by id. The backend's capability flag picks one.

use super::InventoryFilter;
use crate::db::InventoryDb;
use crate::error::Result;
use crate::models::Machine;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

/// Keeps `IN (...)` lists well under SQLite's bound-parameter limit
const ID_BATCH_SIZE: usize = 500;

/// Produces the deduplicated machines that have at least one matching item
#[async_trait]
pub trait DistinctMachines: Send + Sync {
    fn name(&self) -> &'static str;

    /// Matching machines, ordered by id
    async fn distinct_machines(
        &self,
        db: &InventoryDb,
        filter: &InventoryFilter,
    ) -> Result<Vec<Machine>>;
}

/// Single-statement deduplication
pub struct NativeDistinct;

/// Distinct ids first, then a lookup by id
pub struct FallbackDistinct;

#[async_trait]
impl DistinctMachines for NativeDistinct {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn distinct_machines(
        &self,
        db: &InventoryDb,
        filter: &InventoryFilter,
    ) -> Result<Vec<Machine>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT m.*");
        filter.push_from_where(&mut qb);
        qb.push(" ORDER BY m.id");
        let machines = qb.build_query_as::<Machine>().fetch_all(db.pool()).await?;
        Ok(machines)
    }
}

#[async_trait]
impl DistinctMachines for FallbackDistinct {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn distinct_machines(
        &self,
        db: &InventoryDb,
        filter: &InventoryFilter,
    ) -> Result<Vec<Machine>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT i.machine_id");
        filter.push_from_where(&mut qb);
        let ids: Vec<i64> = qb.build_query_scalar().fetch_all(db.pool()).await?;
        debug!(count = ids.len(), "Collected distinct machine ids");

        let mut machines = Vec::with_capacity(ids.len());
        for batch in ids.chunks(ID_BATCH_SIZE) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM machines WHERE id IN (");
            let mut separated = qb.separated(", ");
            for id in batch {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            machines.extend(qb.build_query_as::<Machine>().fetch_all(db.pool()).await?);
        }

        machines.sort_by_key(|m| m.id);
        Ok(machines)
    }
}

/// Strategy matching the backend's capability
pub fn strategy_for(db: &InventoryDb) -> &'static dyn DistinctMachines {
    if db.supports_distinct_on() {
        &NativeDistinct
    } else {
        &FallbackDistinct
    }
}

/// Distinct machines for `filter` using whichever strategy the backend supports
pub async fn distinct_machines(db: &InventoryDb, filter: &InventoryFilter) -> Result<Vec<Machine>> {
    strategy_for(db).distinct_machines(db, filter).await
}
