//! sal-inventory CLI entry point

use clap::{Parser, Subcommand};
use sal_inventory::{
    commands::{
        cmd_export, cmd_hash, cmd_init, cmd_serve, cmd_status, print_export, print_hash,
        print_init, print_status, ExportOptions, InitOptions,
    },
    config::Config,
    db::InventoryDb,
    error::Result,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sal-inventory")]
#[command(version, about = "Application inventory ingestion and reporting service", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "SAL_INVENTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Run the HTTP service
    Serve {
        /// Listen address, overriding server.bind_address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show configuration and database counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a CSV report
    Export {
        /// all, business_unit, machine_group or machine
        group_type: String,

        /// Group id (ignored for "all")
        group_id: i64,

        /// Application id; 0 exports the application summary
        application_id: i64,

        /// all, path or version
        #[arg(default_value = "all")]
        field_type: String,

        /// Value to match for path or version
        #[arg(default_value = "0")]
        field_value: String,

        /// Directory to write the file into (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the stored inventory hash for a serial number
    Hash {
        serial: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    // Init does not need an existing config
    if let Commands::Init { force } = cli.command {
        let (base_dir, config_path) = init_paths(cli.config);
        let config = cmd_init(InitOptions {
            base_dir,
            config_path,
            force,
        })
        .await?;
        print_init(&config);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = InventoryDb::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Serve { bind } => {
            cmd_serve(config, db, bind).await?;
        }

        Commands::Status { json } => {
            let status = cmd_status(&config, &db).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Export {
            group_type,
            group_id,
            application_id,
            field_type,
            field_value,
            output,
        } => {
            let options = ExportOptions {
                group_type,
                group_id,
                application_id,
                field_type,
                field_value,
                output_dir: output,
            };
            let result = cmd_export(&config, &db, options).await?;
            print_export(&result)?;
        }

        Commands::Hash { serial } => {
            let lookup = cmd_hash(&config, &db, &serial).await?;
            print_hash(&lookup);
        }
    }

    Ok(())
}

/// Base directory and config path for `init`.
///
/// A `.toml` path names the config file; anything else is a directory.
fn init_paths(config: Option<PathBuf>) -> (PathBuf, PathBuf) {
    match config {
        Some(path) if path.extension().map_or(false, |e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => {
            let config_path = dir.join("config.toml");
            (dir, config_path)
        }
        None => {
            let base = Config::default_base_dir();
            let config_path = base.join("config.toml");
            (base, config_path)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'sal-inventory init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
