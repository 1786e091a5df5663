//! Hash command implementation

use crate::config::{Config, SubmissionConfig};
use crate::db::InventoryDb;
use crate::error::Result;
use crate::submit::{inventory_hash, HashLookup};

/// Look up the stored payload hash for a serial.
///
/// Runs with local database access, so no machine key is checked.
pub async fn cmd_hash(config: &Config, db: &InventoryDb, serial: &str) -> Result<HashLookup> {
    let local = SubmissionConfig {
        require_machine_key: false,
        ..config.submission.clone()
    };
    inventory_hash(db, &local, Some(serial), None).await
}

pub fn print_hash(lookup: &HashLookup) {
    println!("{}", lookup.body());
}
