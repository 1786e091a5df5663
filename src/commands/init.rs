//! Init command implementation

use crate::config::Config;
use crate::db::InventoryDb;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Write a default config and create the database schema
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.validate()?;
    config.save()?;

    let db = InventoryDb::connect(&config).await?;
    if !db.is_initialized().await? {
        db.init_schema().await?;
    }
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

/// Print init summary to console
pub fn print_init(config: &Config) {
    println!("✓ sal-inventory initialized");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Database: {}", config.paths.db_file.display());
    println!("\nNext steps:");
    println!("  1. Add report tokens under [access] in the config file");
    println!("  2. Start the service: sal-inventory serve");
}
