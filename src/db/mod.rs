//! Inventory storage using SQLite
//!
//! This module owns every table the service reads or writes:
//! - Business units, machine groups and machines (scoping hierarchy)
//! - Applications (get-or-create on the identifying triple)
//! - Inventory items (replaced wholesale per machine on submission)
//! - Inventory meta (per-machine payload hash)

mod schema;

pub use schema::*;

use crate::config::{Config, DistinctMode};
use crate::error::Result;
use crate::models::{
    Application, BusinessUnit, InventoryItem, InventoryMeta, Machine, MachineGroup,
};
use crate::submit::InventoryEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Inventory database handle
#[derive(Clone)]
pub struct InventoryDb {
    pool: SqlitePool,
    distinct_mode: DistinctMode,
}

/// Outcome of replacing a machine's inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceStats {
    pub items_removed: u64,
    pub items_created: u64,
}

/// Row counts across the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub business_unit_count: usize,
    pub machine_group_count: usize,
    pub machine_count: usize,
    pub application_count: usize,
    pub inventory_item_count: usize,
    pub inventory_meta_count: usize,
}

impl InventoryDb {
    /// Connect to the database described by the config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(
            &config.paths.db_file,
            config.database.max_connections,
            config.database.distinct_strategy,
        )
        .await
    }

    /// Open a database at `db_path`, creating file and schema when missing
    pub async fn open(
        db_path: &Path,
        max_connections: u32,
        distinct_mode: DistinctMode,
    ) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            distinct_mode,
        };

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='inventory_items'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether distinct machines can be produced by a single statement.
    ///
    /// SQLite deduplicates whole machine rows with `SELECT DISTINCT`, so the
    /// native path is available unless configuration forces the fallback.
    pub fn supports_distinct_on(&self) -> bool {
        match self.distinct_mode {
            DistinctMode::Auto | DistinctMode::Native => true,
            DistinctMode::Fallback => false,
        }
    }

    /// Copy of this handle using a different distinct-machine mode
    pub fn with_distinct_mode(&self, distinct_mode: DistinctMode) -> Self {
        Self {
            pool: self.pool.clone(),
            distinct_mode,
        }
    }

    // ===== Scope hierarchy =====

    pub async fn insert_business_unit(&self, name: &str) -> Result<BusinessUnit> {
        let id = sqlx::query("INSERT INTO business_units (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(BusinessUnit {
            id,
            name: name.to_string(),
        })
    }

    pub async fn insert_machine_group(
        &self,
        business_unit_id: i64,
        name: &str,
        key: Option<&str>,
    ) -> Result<MachineGroup> {
        let id = sqlx::query(
            "INSERT INTO machine_groups (business_unit_id, name, key) VALUES (?, ?, ?)",
        )
        .bind(business_unit_id)
        .bind(name)
        .bind(key)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(MachineGroup {
            id,
            business_unit_id,
            name: name.to_string(),
            key: key.map(str::to_string),
        })
    }

    pub async fn insert_machine(
        &self,
        machine_group_id: i64,
        serial: &str,
        hostname: &str,
    ) -> Result<Machine> {
        let id = sqlx::query(
            "INSERT INTO machines (machine_group_id, serial, hostname) VALUES (?, ?, ?)",
        )
        .bind(machine_group_id)
        .bind(serial)
        .bind(hostname)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(Machine {
            id,
            machine_group_id,
            serial: serial.to_string(),
            hostname: hostname.to_string(),
            last_checkin: None,
            console_user: None,
            last_inventory_update: None,
        })
    }

    /// Record a checkin reported by the enrollment side
    pub async fn record_checkin(
        &self,
        machine_id: i64,
        at: DateTime<Utc>,
        console_user: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE machines SET last_checkin = ?, console_user = ? WHERE id = ?")
            .bind(at)
            .bind(console_user)
            .bind(machine_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_business_unit(&self, id: i64) -> Result<Option<BusinessUnit>> {
        let unit = sqlx::query_as::<_, BusinessUnit>("SELECT * FROM business_units WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(unit)
    }

    pub async fn get_machine_group(&self, id: i64) -> Result<Option<MachineGroup>> {
        let group = sqlx::query_as::<_, MachineGroup>("SELECT * FROM machine_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(group)
    }

    pub async fn get_machine(&self, id: i64) -> Result<Option<Machine>> {
        let machine = sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(machine)
    }

    pub async fn get_machine_by_serial(&self, serial: &str) -> Result<Option<Machine>> {
        let machine = sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE serial = ?")
            .bind(serial)
            .fetch_optional(&self.pool)
            .await?;
        Ok(machine)
    }

    // ===== Applications =====

    pub async fn get_application(&self, id: i64) -> Result<Option<Application>> {
        let app = sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(app)
    }

    pub async fn find_application(
        &self,
        bundleid: &str,
        name: &str,
        bundlename: &str,
    ) -> Result<Option<Application>> {
        let app = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE bundleid = ? AND name = ? AND bundlename = ?",
        )
        .bind(bundleid)
        .bind(name)
        .bind(bundlename)
        .fetch_optional(&self.pool)
        .await?;
        Ok(app)
    }

    pub async fn count_applications(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM applications")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ===== Inventory =====

    /// Items currently recorded for a machine, in insertion order
    pub async fn list_machine_items(&self, machine_id: i64) -> Result<Vec<InventoryItem>> {
        let items = sqlx::query_as::<_, InventoryItem>(
            "SELECT * FROM inventory_items WHERE machine_id = ? ORDER BY id",
        )
        .bind(machine_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn get_inventory_meta(&self, machine_id: i64) -> Result<Option<InventoryMeta>> {
        let meta =
            sqlx::query_as::<_, InventoryMeta>("SELECT * FROM inventory_meta WHERE machine_id = ?")
                .bind(machine_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(meta)
    }

    /// Replace a machine's inventory with `entries` and store the payload hash.
    ///
    /// Runs as one transaction. The first statement writes, so a concurrent
    /// replacement for the same machine waits on the write lock instead of
    /// interleaving its delete and inserts with ours.
    pub async fn replace_inventory(
        &self,
        machine_id: i64,
        sha256hash: &str,
        entries: &[InventoryEntry],
    ) -> Result<ReplaceStats> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO inventory_meta (machine_id, sha256hash, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(machine_id) DO UPDATE SET
                sha256hash = excluded.sha256hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(machine_id)
        .bind(sha256hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let items_removed = sqlx::query("DELETE FROM inventory_items WHERE machine_id = ?")
            .bind(machine_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut items_created = 0;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO applications (bundleid, name, bundlename)
                VALUES (?, ?, ?)
                ON CONFLICT(bundleid, name, bundlename) DO NOTHING
                "#,
            )
            .bind(&entry.bundleid)
            .bind(&entry.name)
            .bind(&entry.bundlename)
            .execute(&mut *tx)
            .await?;

            let application_id: i64 = sqlx::query_scalar(
                "SELECT id FROM applications WHERE bundleid = ? AND name = ? AND bundlename = ?",
            )
            .bind(&entry.bundleid)
            .bind(&entry.name)
            .bind(&entry.bundlename)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO inventory_items (machine_id, application_id, version, path)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(machine_id)
            .bind(application_id)
            .bind(&entry.version)
            .bind(&entry.path)
            .execute(&mut *tx)
            .await?;
            items_created += 1;
        }

        sqlx::query("UPDATE machines SET last_inventory_update = ? WHERE id = ?")
            .bind(now)
            .bind(machine_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ReplaceStats {
            items_removed,
            items_created,
        })
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        Ok(GlobalStats {
            business_unit_count: self.count_rows("business_units").await?,
            machine_group_count: self.count_rows("machine_groups").await?,
            machine_count: self.count_rows("machines").await?,
            application_count: self.count_rows("applications").await?,
            inventory_item_count: self.count_rows("inventory_items").await?,
            inventory_meta_count: self.count_rows("inventory_meta").await?,
        })
    }

    async fn count_rows(&self, table: &'static str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Fresh database with one business unit, group and machine
    pub struct Fixture {
        pub db: InventoryDb,
        pub business_unit: BusinessUnit,
        pub group: MachineGroup,
        pub machine: Machine,
        pub _tmp: TempDir,
    }

    pub async fn setup_test_db() -> (InventoryDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = InventoryDb::open(&tmp.path().join("test.db"), 5, DistinctMode::Auto)
            .await
            .unwrap();
        (db, tmp)
    }

    pub async fn fixture() -> Fixture {
        let (db, tmp) = setup_test_db().await;
        let business_unit = db.insert_business_unit("Engineering").await.unwrap();
        let group = db
            .insert_machine_group(business_unit.id, "Laptops", Some("group-key"))
            .await
            .unwrap();
        let machine = db.insert_machine(group.id, "ABC123", "eng-mbp-01").await.unwrap();
        Fixture {
            db,
            business_unit,
            group,
            machine,
            _tmp: tmp,
        }
    }

    /// Two business units, three groups, four machines with overlapping inventory.
    ///
    /// App (com.foo.App): m1 x2 (1.0, two paths), m2 (2.0), m3 (no version), m4 (1.0)
    /// Tool (com.bar.Tool): m1, m3
    pub struct Fleet {
        pub db: InventoryDb,
        pub eng: BusinessUnit,
        pub ops: BusinessUnit,
        pub laptops: MachineGroup,
        pub desktops: MachineGroup,
        pub ops_group: MachineGroup,
        pub m1: Machine,
        pub m2: Machine,
        pub m3: Machine,
        pub m4: Machine,
        pub _tmp: TempDir,
    }

    impl Fleet {
        pub async fn app(&self) -> Application {
            self.db
                .find_application("com.foo.App", "App", "App")
                .await
                .unwrap()
                .unwrap()
        }

        pub async fn tool(&self) -> Application {
            self.db
                .find_application("com.bar.Tool", "Tool", "Tool")
                .await
                .unwrap()
                .unwrap()
        }
    }

    pub async fn fleet() -> Fleet {
        let (db, tmp) = setup_test_db().await;
        let eng = db.insert_business_unit("Engineering").await.unwrap();
        let ops = db.insert_business_unit("Operations").await.unwrap();
        let laptops = db.insert_machine_group(eng.id, "Laptops", Some("laptop-key")).await.unwrap();
        let desktops = db.insert_machine_group(eng.id, "Desktops", Some("desktop-key")).await.unwrap();
        let ops_group = db.insert_machine_group(ops.id, "Ops", None).await.unwrap();
        let m1 = db.insert_machine(laptops.id, "ABC123", "eng-mbp-01").await.unwrap();
        let m2 = db.insert_machine(laptops.id, "DEF456", "eng-mbp-02").await.unwrap();
        let m3 = db.insert_machine(desktops.id, "GHI789", "eng-imac-01").await.unwrap();
        let m4 = db.insert_machine(ops_group.id, "JKL012", "ops-mini-01").await.unwrap();

        let app = "/Applications/App.app";
        db.replace_inventory(
            m1.id,
            "h1",
            &[
                entry("com.foo.App", "App", "1.0", app),
                entry("com.foo.App", "App", "1.0", "/Users/dev/Applications/App.app"),
                entry("com.bar.Tool", "Tool", "2.0", "/Applications/Tool.app"),
            ],
        )
        .await
        .unwrap();
        db.replace_inventory(m2.id, "h2", &[entry("com.foo.App", "App", "2.0", app)])
            .await
            .unwrap();
        db.replace_inventory(
            m3.id,
            "h3",
            &[
                entry("com.foo.App", "App", "", app),
                entry("com.bar.Tool", "Tool", "2.0", "/Applications/Tool.app"),
            ],
        )
        .await
        .unwrap();
        db.replace_inventory(m4.id, "h4", &[entry("com.foo.App", "App", "1.0", app)])
            .await
            .unwrap();

        Fleet {
            db,
            eng,
            ops,
            laptops,
            desktops,
            ops_group,
            m1,
            m2,
            m3,
            m4,
            _tmp: tmp,
        }
    }

    pub fn entry(bundleid: &str, name: &str, version: &str, path: &str) -> InventoryEntry {
        InventoryEntry {
            bundleid: bundleid.to_string(),
            name: name.to_string(),
            bundlename: name.to_string(),
            version: version.to_string(),
            path: path.to_string(),
        }
    }
}
