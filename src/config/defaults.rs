//! Default values for configuration

use super::DistinctMode;

/// Default HTTP listen address
pub fn default_bind_address() -> String {
    std::env::var("SAL_INVENTORY_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string())
}

/// Default SQLite pool size
pub fn default_max_connections() -> u32 {
    5
}

/// Default distinct-machine strategy selection
pub fn default_distinct_strategy() -> DistinctMode {
    DistinctMode::Auto
}

/// Machine keys are enforced unless explicitly disabled
pub fn default_require_machine_key() -> bool {
    true
}

/// Bundle ids never recorded as inventory items
pub fn default_bundleid_ignorelist() -> Vec<String> {
    vec!["com.apple.print.PrinterProxy".to_string()]
}

/// Decompressed payload cap (32 MiB)
pub fn default_max_payload_bytes() -> usize {
    32 * 1024 * 1024
}

/// Default CSV filename base
pub fn default_filename_base() -> String {
    "sal_inventory".to_string()
}

/// Default rows per report page
pub fn default_per_page() -> usize {
    25
}

/// Upper bound for a client-requested page size
pub fn default_max_per_page() -> usize {
    100
}
