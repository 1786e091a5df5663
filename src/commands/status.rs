//! Status command implementation

use crate::config::Config;
use crate::db::{GlobalStats, InventoryDb};
use crate::error::Result;
use crate::query::strategy_for;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub bind_address: String,
    pub distinct_strategy: String,
    pub access_tokens: usize,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &InventoryDb) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        bind_address: config.server.bind_address.clone(),
        distinct_strategy: strategy_for(db).name().to_string(),
        access_tokens: config.access.tokens.len(),
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 sal-inventory Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Listen address: {}", status.bind_address);
    println!("Distinct strategy: {}", status.distinct_strategy);
    println!("Access tokens: {}", status.access_tokens);
    println!("\nDatabase Stats:");
    println!("  Business units: {}", status.db_stats.business_unit_count);
    println!("  Machine groups: {}", status.db_stats.machine_group_count);
    println!("  Machines: {}", status.db_stats.machine_count);
    println!(
        "  Machines with inventory: {}",
        status.db_stats.inventory_meta_count
    );
    println!("  Applications: {}", status.db_stats.application_count);
    println!("  Inventory items: {}", status.db_stats.inventory_item_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistinctMode;
    use crate::db::test_support::*;

    #[tokio::test]
    async fn test_status_reports_counts_and_strategy() {
        let f = fleet().await;
        let config = Config::default();

        let status = cmd_status(&config, &f.db).await.unwrap();
        assert_eq!(status.distinct_strategy, "native");
        assert_eq!(status.db_stats.machine_count, 4);
        assert_eq!(status.db_stats.inventory_item_count, 7);

        let fallback = f.db.with_distinct_mode(DistinctMode::Fallback);
        let status = cmd_status(&config, &fallback).await.unwrap();
        assert_eq!(status.distinct_strategy, "fallback");
    }
}
