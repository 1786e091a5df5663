//! Serve command implementation

use crate::config::Config;
use crate::db::InventoryDb;
use crate::error::{Error, Result};
use crate::server::{serve, AppState};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Run the HTTP service until Ctrl-C
pub async fn cmd_serve(config: Config, db: InventoryDb, bind: Option<String>) -> Result<()> {
    let addr: SocketAddr = match bind {
        Some(bind) => bind
            .parse()
            .map_err(|_| Error::Config(format!("Invalid bind address: {}", bind)))?,
        None => config.bind_addr()?,
    };

    if config.access.tokens.is_empty() {
        warn!("No access tokens configured; report endpoints will reject every request");
    }
    if !config.submission.require_machine_key {
        warn!("Machine keys are not required; any client can submit inventory");
    }

    info!(
        distinct = if db.supports_distinct_on() { "native" } else { "fallback" },
        "Starting inventory service"
    );
    serve(AppState::new(db, config), addr).await
}
