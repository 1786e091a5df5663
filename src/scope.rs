//! Group resolution: turning a `group_type`/`group_id` pair into a scope
//!
//! A [`Scope`] is what a request asks for, a [`ScopeTarget`] is the row it
//! resolved to, and a [`ScopeFilter`] is the predicate the query layer
//! applies to inventory items.

use crate::db::InventoryDb;
use crate::error::{Error, Result};
use crate::models::{BusinessUnit, Machine, MachineGroup};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use uuid::Uuid;

/// Scope type tag as it appears in URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    All,
    BusinessUnit,
    MachineGroup,
    Machine,
}

impl std::fmt::Display for GroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupType::All => write!(f, "all"),
            GroupType::BusinessUnit => write!(f, "business_unit"),
            GroupType::MachineGroup => write!(f, "machine_group"),
            GroupType::Machine => write!(f, "machine"),
        }
    }
}

impl FromStr for GroupType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(GroupType::All),
            "business_unit" => Ok(GroupType::BusinessUnit),
            "machine_group" => Ok(GroupType::MachineGroup),
            "machine" => Ok(GroupType::Machine),
            _ => Err(Error::InvalidScope(s.to_string())),
        }
    }
}

/// Requested scope, before any lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    BusinessUnit(i64),
    MachineGroup(i64),
    Machine(i64),
}

impl Scope {
    /// Build a scope from URL parts. The id is ignored for `all`.
    pub fn from_parts(group_type: &str, group_id: i64) -> Result<Self> {
        Ok(match group_type.parse::<GroupType>()? {
            GroupType::All => Scope::All,
            GroupType::BusinessUnit => Scope::BusinessUnit(group_id),
            GroupType::MachineGroup => Scope::MachineGroup(group_id),
            GroupType::Machine => Scope::Machine(group_id),
        })
    }

    pub fn group_type(&self) -> GroupType {
        match self {
            Scope::All => GroupType::All,
            Scope::BusinessUnit(_) => GroupType::BusinessUnit,
            Scope::MachineGroup(_) => GroupType::MachineGroup,
            Scope::Machine(_) => GroupType::Machine,
        }
    }

    /// Id as used in URLs; `0` for the "all" scope
    pub fn group_id(&self) -> i64 {
        match self {
            Scope::All => 0,
            Scope::BusinessUnit(id) | Scope::MachineGroup(id) | Scope::Machine(id) => *id,
        }
    }
}

/// The row a scope resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTarget {
    All,
    BusinessUnit(BusinessUnit),
    MachineGroup(MachineGroup),
    Machine(Machine),
}

impl ScopeTarget {
    pub fn scope(&self) -> Scope {
        match self {
            ScopeTarget::All => Scope::All,
            ScopeTarget::BusinessUnit(bu) => Scope::BusinessUnit(bu.id),
            ScopeTarget::MachineGroup(group) => Scope::MachineGroup(group.id),
            ScopeTarget::Machine(machine) => Scope::Machine(machine.id),
        }
    }

    /// Display name: unit or group name, machine hostname, nothing for "all"
    pub fn name(&self) -> Option<String> {
        match self {
            ScopeTarget::All => None,
            ScopeTarget::BusinessUnit(bu) => Some(bu.name.clone()),
            ScopeTarget::MachineGroup(group) => Some(group.name.clone()),
            ScopeTarget::Machine(machine) => Some(machine.hostname.clone()),
        }
    }

    /// Predicate for the query layer. Machine scopes filter on the machine
    /// itself, not on the business unit above it.
    pub fn filter(&self) -> ScopeFilter {
        match self.scope() {
            Scope::All => ScopeFilter::Unrestricted,
            Scope::BusinessUnit(id) => ScopeFilter::BusinessUnit(id),
            Scope::MachineGroup(id) => ScopeFilter::MachineGroup(id),
            Scope::Machine(id) => ScopeFilter::Machine(id),
        }
    }
}

/// Restriction applied to inventory items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Unrestricted,
    BusinessUnit(i64),
    MachineGroup(i64),
    Machine(i64),
}

impl ScopeFilter {
    /// Append the predicate as ` AND ...`.
    ///
    /// Expects `inventory_items i` joined to `machines m` and
    /// `machine_groups mg` in the surrounding statement.
    pub fn push_predicate(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            ScopeFilter::Unrestricted => {}
            ScopeFilter::BusinessUnit(id) => {
                qb.push(" AND mg.business_unit_id = ").push_bind(*id);
            }
            ScopeFilter::MachineGroup(id) => {
                qb.push(" AND m.machine_group_id = ").push_bind(*id);
            }
            ScopeFilter::Machine(id) => {
                qb.push(" AND i.machine_id = ").push_bind(*id);
            }
        }
    }
}

/// Look up the row a scope names. Fails with `NotFound` when it does not exist.
pub async fn resolve(db: &InventoryDb, scope: Scope) -> Result<ScopeTarget> {
    let target = match scope {
        Scope::All => Some(ScopeTarget::All),
        Scope::BusinessUnit(id) => db.get_business_unit(id).await?.map(ScopeTarget::BusinessUnit),
        Scope::MachineGroup(id) => db.get_machine_group(id).await?.map(ScopeTarget::MachineGroup),
        Scope::Machine(id) => db.get_machine(id).await?.map(ScopeTarget::Machine),
    };
    target.ok_or_else(|| {
        Error::not_found(format!("No {} with id {}", scope.group_type(), scope.group_id()))
    })
}

/// Business unit owning a resolved scope; `None` for "all".
///
/// Groups and machines walk up the hierarchy. The hierarchy is always
/// resolvable, so a missing parent is reported as `NotFound`.
pub async fn business_unit_for(db: &InventoryDb, target: &ScopeTarget) -> Result<Option<BusinessUnit>> {
    let group_id = match target {
        ScopeTarget::All => return Ok(None),
        ScopeTarget::BusinessUnit(bu) => return Ok(Some(bu.clone())),
        ScopeTarget::MachineGroup(group) => return parent_unit(db, group).await.map(Some),
        ScopeTarget::Machine(machine) => machine.machine_group_id,
    };
    let group = db
        .get_machine_group(group_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("No machine_group with id {}", group_id)))?;
    parent_unit(db, &group).await.map(Some)
}

async fn parent_unit(db: &InventoryDb, group: &MachineGroup) -> Result<BusinessUnit> {
    db.get_business_unit(group.business_unit_id)
        .await?
        .ok_or_else(|| {
            Error::not_found(format!("No business_unit with id {}", group.business_unit_id))
        })
}

/// Request-scoped context threaded through presenters and exporters
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub request_id: Uuid,
    pub target: ScopeTarget,
    pub business_unit: Option<BusinessUnit>,
}

impl ReportContext {
    /// Resolve `scope` and its owning business unit
    pub async fn resolve(db: &InventoryDb, scope: Scope) -> Result<Self> {
        Self::resolve_for(db, scope, Uuid::new_v4()).await
    }

    /// Same as [`ReportContext::resolve`], keeping the caller's request id
    pub async fn resolve_for(db: &InventoryDb, scope: Scope, request_id: Uuid) -> Result<Self> {
        let target = resolve(db, scope).await?;
        let business_unit = business_unit_for(db, &target).await?;
        Ok(Self {
            request_id,
            target,
            business_unit,
        })
    }

    pub fn scope(&self) -> Scope {
        self.target.scope()
    }

    pub fn filter(&self) -> ScopeFilter {
        self.target.filter()
    }
}
