//! Row types for the inventory database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Display format for checkin timestamps in reports and exports
pub const CHECKIN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Top-level scoping entity
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BusinessUnit {
    pub id: i64,
    pub name: String,
}

/// A group of machines inside one business unit
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct MachineGroup {
    pub id: i64,
    pub business_unit_id: i64,
    pub name: String,
    /// Enrollment key agents authenticate with
    #[serde(skip_serializing)]
    pub key: Option<String>,
}

/// A managed endpoint
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Machine {
    pub id: i64,
    pub machine_group_id: i64,
    pub serial: String,
    pub hostname: String,
    pub last_checkin: Option<DateTime<Utc>>,
    pub console_user: Option<String>,
    pub last_inventory_update: Option<DateTime<Utc>>,
}

impl Machine {
    /// Last checkin as `YYYY-MM-DD HH:MM:SS`, empty when the machine never checked in
    pub fn last_checkin_display(&self) -> String {
        self.last_checkin
            .map(|ts| ts.format(CHECKIN_FORMAT).to_string())
            .unwrap_or_default()
    }
}

/// An application, identified by its (bundleid, name, bundlename) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub bundleid: String,
    pub name: String,
    pub bundlename: String,
}

/// One observed installation of an application on a machine
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub machine_id: i64,
    pub application_id: i64,
    pub version: String,
    pub path: String,
}

/// Content hash of the last accepted payload for a machine
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct InventoryMeta {
    pub machine_id: i64,
    pub sha256hash: String,
    pub updated_at: DateTime<Utc>,
}
