//! SQLite schema definition

/// SQL schema for the inventory database
pub const SCHEMA_SQL: &str = r#"
-- Business units: top-level scope
CREATE TABLE IF NOT EXISTS business_units (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

-- Machine groups: second-level scope, carries the agent enrollment key
CREATE TABLE IF NOT EXISTS machine_groups (
    id INTEGER PRIMARY KEY,
    business_unit_id INTEGER NOT NULL REFERENCES business_units(id),
    name TEXT NOT NULL,
    key TEXT UNIQUE
);

-- Machines: managed endpoints
CREATE TABLE IF NOT EXISTS machines (
    id INTEGER PRIMARY KEY,
    machine_group_id INTEGER NOT NULL REFERENCES machine_groups(id),
    serial TEXT NOT NULL UNIQUE,
    hostname TEXT NOT NULL DEFAULT '',
    last_checkin TEXT,
    console_user TEXT,
    last_inventory_update TEXT
);

-- Applications: unique on the identifying triple
CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY,
    bundleid TEXT NOT NULL,
    name TEXT NOT NULL,
    bundlename TEXT NOT NULL,
    UNIQUE(bundleid, name, bundlename)
);

-- Inventory items: one row per observed installation
CREATE TABLE IF NOT EXISTS inventory_items (
    id INTEGER PRIMARY KEY,
    machine_id INTEGER NOT NULL REFERENCES machines(id),
    application_id INTEGER NOT NULL REFERENCES applications(id),
    version TEXT NOT NULL DEFAULT '',
    path TEXT NOT NULL DEFAULT ''
);

-- Inventory meta: hash of the last accepted payload per machine
CREATE TABLE IF NOT EXISTS inventory_meta (
    machine_id INTEGER PRIMARY KEY REFERENCES machines(id),
    sha256hash TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes for report queries
CREATE INDEX IF NOT EXISTS idx_groups_business_unit ON machine_groups(business_unit_id);
CREATE INDEX IF NOT EXISTS idx_machines_group ON machines(machine_group_id);
CREATE INDEX IF NOT EXISTS idx_items_machine ON inventory_items(machine_id);
CREATE INDEX IF NOT EXISTS idx_items_application ON inventory_items(application_id);
CREATE INDEX IF NOT EXISTS idx_items_version ON inventory_items(application_id, version);
CREATE INDEX IF NOT EXISTS idx_items_path ON inventory_items(application_id, path);
"#;
