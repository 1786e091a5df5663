//! Inventory submission and hash lookup
//!
//! A submission replaces everything recorded for the machine with the
//! entries in the payload. Payloads that cannot be decoded are dropped
//! without touching stored state.

mod decode;

pub use decode::*;

use crate::config::SubmissionConfig;
use crate::db::{InventoryDb, ReplaceStats};
use crate::error::{Error, Result};
use crate::models::Machine;
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConstantTimeEq};
use tracing::{debug, info, warn};

/// Response to a submission with nothing to record
pub const NOTHING_SUBMITTED: &str = "No inventory submitted.\n";

/// Hash lookup response for a request without a serial
pub const MACHINE_NOT_FOUND: &str = "MACHINE NOT FOUND";

/// Form fields posted by agents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubmitForm {
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub base64bz2inventory: Option<String>,
}

/// What a submission request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing was persisted
    NothingSubmitted,
    /// The machine's inventory was replaced
    Submitted {
        serial: String,
        sha256hash: String,
        stats: ReplaceStats,
        ignored: usize,
    },
}

impl SubmitOutcome {
    /// Plain-text acknowledgement sent back to the agent
    pub fn message(&self) -> String {
        match self {
            SubmitOutcome::NothingSubmitted => NOTHING_SUBMITTED.to_string(),
            SubmitOutcome::Submitted { serial, .. } => {
                format!("Inventory submitted for {}.\n", serial)
            }
        }
    }
}

/// Process one submission.
///
/// Order of checks: serial, machine lookup, machine key, payload. Decode
/// and parse failures are logged and reported as nothing submitted.
pub async fn submit_inventory(
    db: &InventoryDb,
    config: &SubmissionConfig,
    form: &SubmitForm,
    credential: Option<&str>,
) -> Result<SubmitOutcome> {
    let serial = match form.serial.as_deref() {
        Some(serial) if !serial.is_empty() => serial,
        _ => return Ok(SubmitOutcome::NothingSubmitted),
    };

    let machine = db
        .get_machine_by_serial(serial)
        .await?
        .ok_or_else(|| Error::not_found("Serial Number not found"))?;

    verify_machine_key(db, config, &machine, credential).await?;

    let encoded = match form.base64bz2inventory.as_deref() {
        Some(encoded) if !encoded.is_empty() => encoded,
        _ => {
            debug!(serial = %serial, "Submission without inventory payload");
            return Ok(SubmitOutcome::NothingSubmitted);
        }
    };

    let (raw, entries) = match decode_payload(encoded, config.max_payload_bytes)
        .and_then(|raw| parse_inventory(&raw).map(|entries| (raw, entries)))
    {
        Ok((_, entries)) if entries.is_empty() => {
            info!(serial = %serial, "Inventory payload is empty");
            return Ok(SubmitOutcome::NothingSubmitted);
        }
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(serial = %serial, error = %e, "Discarding unreadable inventory payload");
            return Ok(SubmitOutcome::NothingSubmitted);
        }
    };

    let sha256hash = sha256_hex(&raw);
    let total = entries.len();
    let kept: Vec<InventoryEntry> = entries
        .into_iter()
        .filter(|entry| !config.bundleid_ignorelist.contains(&entry.bundleid))
        .collect();
    let ignored = total - kept.len();

    let stats = db.replace_inventory(machine.id, &sha256hash, &kept).await?;

    info!(
        serial = %serial,
        items = stats.items_created,
        removed = stats.items_removed,
        ignored,
        "Inventory replaced"
    );

    Ok(SubmitOutcome::Submitted {
        serial: serial.to_string(),
        sha256hash,
        stats,
        ignored,
    })
}

/// Result of a hash lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashLookup {
    /// No serial was given
    MachineNotFound,
    /// Stored hash; empty when the machine or its hash record is unknown
    Hash(String),
}

impl HashLookup {
    pub fn body(&self) -> &str {
        match self {
            HashLookup::MachineNotFound => MACHINE_NOT_FOUND,
            HashLookup::Hash(hash) => hash,
        }
    }
}

/// Last stored payload hash for `serial`
pub async fn inventory_hash(
    db: &InventoryDb,
    config: &SubmissionConfig,
    serial: Option<&str>,
    credential: Option<&str>,
) -> Result<HashLookup> {
    let serial = match serial {
        Some(serial) if !serial.is_empty() => serial,
        _ => return Ok(HashLookup::MachineNotFound),
    };

    let Some(machine) = db.get_machine_by_serial(serial).await? else {
        debug!(serial = %serial, "Hash requested for unknown machine");
        return Ok(HashLookup::Hash(String::new()));
    };

    verify_machine_key(db, config, &machine, credential).await?;

    let hash = db
        .get_inventory_meta(machine.id)
        .await?
        .map(|meta| meta.sha256hash)
        .unwrap_or_default();
    Ok(HashLookup::Hash(hash))
}

/// Check the key a machine presented.
///
/// Accepts the machine group's key or any shared key. A missing key is
/// `Unauthorized`, a wrong one `PermissionDenied`.
pub async fn verify_machine_key(
    db: &InventoryDb,
    config: &SubmissionConfig,
    machine: &Machine,
    credential: Option<&str>,
) -> Result<()> {
    if !config.require_machine_key {
        return Ok(());
    }

    let key = match credential {
        Some(key) if !key.is_empty() => key,
        _ => return Err(Error::Unauthorized("Machine key required".to_string())),
    };

    let group_key = db
        .get_machine_group(machine.machine_group_id)
        .await?
        .and_then(|group| group.key);

    let accepted = group_key
        .iter()
        .chain(config.shared_keys.iter())
        .fold(Choice::from(0), |acc, candidate| {
            acc | candidate.as_bytes().ct_eq(key.as_bytes())
        });
    if bool::from(accepted) {
        Ok(())
    } else {
        warn!(serial = %machine.serial, "Rejected machine key");
        Err(Error::PermissionDenied("Invalid machine key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    fn config() -> SubmissionConfig {
        SubmissionConfig::default()
    }

    fn form(serial: &str, entries: &[InventoryEntry]) -> (SubmitForm, Vec<u8>) {
        let raw = to_plist_xml(entries).unwrap();
        let form = SubmitForm {
            serial: Some(serial.to_string()),
            base64bz2inventory: Some(encode_payload(&raw).unwrap()),
        };
        (form, raw)
    }

    fn app_entry() -> InventoryEntry {
        InventoryEntry {
            bundleid: "com.foo.App".to_string(),
            name: "App".to_string(),
            bundlename: String::new(),
            version: "1.0".to_string(),
            path: "/Applications/App.app".to_string(),
        }
    }

    #[tokio::test]
    async fn test_items_match_payload() {
        let f = fixture().await;
        let entries = vec![
            entry("com.foo.App", "App", "1.0", "/Applications/App.app"),
            entry("com.foo.App", "App", "", "/Users/dev/App.app"),
            entry("com.bar.Tool", "Tool", "3.1", "/Applications/Tool.app"),
            entry("com.apple.print.PrinterProxy", "Printer", "1", "/tmp/Printer.app"),
        ];
        let (form, _) = form("ABC123", &entries);

        let outcome = submit_inventory(&f.db, &config(), &form, Some("group-key"))
            .await
            .unwrap();
        assert_eq!(outcome.message(), "Inventory submitted for ABC123.\n");

        let items = f.db.list_machine_items(f.machine.id).await.unwrap();
        assert_eq!(items.len(), 3);
        for (item, expected) in items.iter().zip(&entries[..3]) {
            let app = f.db.get_application(item.application_id).await.unwrap().unwrap();
            assert_eq!(app.bundleid, expected.bundleid);
            assert_eq!(app.name, expected.name);
            assert_eq!(app.bundlename, expected.bundlename);
            assert_eq!(item.version, expected.version);
            assert_eq!(item.path, expected.path);
        }
        assert!(matches!(
            outcome,
            SubmitOutcome::Submitted { ignored: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_resubmit_replaces_and_keeps_hash() {
        let f = fixture().await;
        let (form, raw) = form("ABC123", &[app_entry()]);

        submit_inventory(&f.db, &config(), &form, Some("group-key")).await.unwrap();
        assert_eq!(f.db.list_machine_items(f.machine.id).await.unwrap().len(), 1);
        let first = inventory_hash(&f.db, &config(), Some("ABC123"), Some("group-key"))
            .await
            .unwrap();

        submit_inventory(&f.db, &config(), &form, Some("group-key")).await.unwrap();
        assert_eq!(f.db.list_machine_items(f.machine.id).await.unwrap().len(), 1);
        let second = inventory_hash(&f.db, &config(), Some("ABC123"), Some("group-key"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first, HashLookup::Hash(sha256_hex(&raw)));
        assert_eq!(first.body().len(), 64);
        assert!(first.body().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(f.db.count_applications().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_payload_leaves_state_unchanged() {
        let f = fixture().await;
        let (good, raw) = form("ABC123", &[app_entry()]);
        submit_inventory(&f.db, &config(), &good, Some("group-key")).await.unwrap();

        for junk in ["%%%", "aGVsbG8gd29ybGQ=", ""] {
            let bad = SubmitForm {
                serial: Some("ABC123".to_string()),
                base64bz2inventory: Some(junk.to_string()),
            };
            let outcome = submit_inventory(&f.db, &config(), &bad, Some("group-key"))
                .await
                .unwrap();
            assert_eq!(outcome, SubmitOutcome::NothingSubmitted);
            assert_eq!(outcome.message(), NOTHING_SUBMITTED);
        }

        // Valid bzip2 around something that is not a plist
        let not_plist = SubmitForm {
            serial: Some("ABC123".to_string()),
            base64bz2inventory: Some(encode_payload(b"not a plist").unwrap()),
        };
        let outcome = submit_inventory(&f.db, &config(), &not_plist, Some("group-key"))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::NothingSubmitted);

        let items = f.db.list_machine_items(f.machine.id).await.unwrap();
        assert_eq!(items.len(), 1);
        let meta = f.db.get_inventory_meta(f.machine.id).await.unwrap().unwrap();
        assert_eq!(meta.sha256hash, sha256_hex(&raw));
    }

    #[tokio::test]
    async fn test_oversized_payload_is_not_submitted() {
        let f = fixture().await;
        let (good, raw) = form("ABC123", &[app_entry()]);
        submit_inventory(&f.db, &config(), &good, Some("group-key")).await.unwrap();

        let small = SubmissionConfig {
            max_payload_bytes: raw.len() - 1,
            ..config()
        };
        let (bigger, _) = form("ABC123", &[app_entry(), app_entry()]);
        let outcome = submit_inventory(&f.db, &small, &bigger, Some("group-key"))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::NothingSubmitted);

        assert_eq!(f.db.list_machine_items(f.machine.id).await.unwrap().len(), 1);
        let meta = f.db.get_inventory_meta(f.machine.id).await.unwrap().unwrap();
        assert_eq!(meta.sha256hash, sha256_hex(&raw));
    }

    #[tokio::test]
    async fn test_ignored_bundle_still_updates_hash() {
        let f = fixture().await;
        let printer = InventoryEntry {
            bundleid: "com.apple.print.PrinterProxy".to_string(),
            name: "Printer".to_string(),
            ..Default::default()
        };
        let (form, raw) = form("ABC123", &[printer]);

        let outcome = submit_inventory(&f.db, &config(), &form, Some("group-key"))
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Submitted { ignored: 1, .. }));

        assert!(f.db.list_machine_items(f.machine.id).await.unwrap().is_empty());
        assert_eq!(f.db.count_applications().await.unwrap(), 0);
        let meta = f.db.get_inventory_meta(f.machine.id).await.unwrap().unwrap();
        assert_eq!(meta.sha256hash, sha256_hex(&raw));
    }

    #[tokio::test]
    async fn test_same_triple_from_two_machines_shares_application() {
        let f = fixture().await;
        f.db.insert_machine(f.group.id, "XYZ789", "eng-mbp-02").await.unwrap();

        let (a, _) = form("ABC123", &[app_entry()]);
        let (b, _) = form("XYZ789", &[app_entry()]);
        submit_inventory(&f.db, &config(), &a, Some("group-key")).await.unwrap();
        submit_inventory(&f.db, &config(), &b, Some("group-key")).await.unwrap();

        assert_eq!(f.db.count_applications().await.unwrap(), 1);
        assert_eq!(f.db.get_global_stats().await.unwrap().inventory_item_count, 2);
    }

    #[tokio::test]
    async fn test_serial_checks() {
        let f = fixture().await;

        let empty = SubmitForm::default();
        let outcome = submit_inventory(&f.db, &config(), &empty, None).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::NothingSubmitted);

        let (unknown, _) = form("NOPE", &[app_entry()]);
        match submit_inventory(&f.db, &config(), &unknown, Some("group-key")).await {
            Err(Error::NotFound(msg)) => assert_eq!(msg, "Serial Number not found"),
            other => panic!("expected NotFound, got {:?}", other),
        }

        let no_payload = SubmitForm {
            serial: Some("ABC123".to_string()),
            base64bz2inventory: None,
        };
        let outcome = submit_inventory(&f.db, &config(), &no_payload, Some("group-key"))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::NothingSubmitted);
        assert!(f.db.get_inventory_meta(f.machine.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_machine_key_outcomes() {
        let f = fixture().await;
        let (form, _) = form("ABC123", &[app_entry()]);

        assert!(matches!(
            submit_inventory(&f.db, &config(), &form, None).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            submit_inventory(&f.db, &config(), &form, Some("wrong")).await,
            Err(Error::PermissionDenied(_))
        ));
        assert!(f.db.list_machine_items(f.machine.id).await.unwrap().is_empty());

        let shared = SubmissionConfig {
            shared_keys: vec!["fleet-key".to_string()],
            ..config()
        };
        submit_inventory(&f.db, &shared, &form, Some("fleet-key")).await.unwrap();

        let open = SubmissionConfig {
            require_machine_key: false,
            ..config()
        };
        submit_inventory(&f.db, &open, &form, None).await.unwrap();
        assert_eq!(f.db.list_machine_items(f.machine.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_machine_key_must_match_exactly() {
        let f = fixture().await;
        let shared = SubmissionConfig {
            shared_keys: vec!["fleet-key".to_string()],
            ..config()
        };

        for near in ["group-ke", "group-key2", "GROUP-KEY", "fleet-ke", "fleet-key "] {
            assert!(
                matches!(
                    verify_machine_key(&f.db, &shared, &f.machine, Some(near)).await,
                    Err(Error::PermissionDenied(_))
                ),
                "{near} should be rejected"
            );
        }
        verify_machine_key(&f.db, &shared, &f.machine, Some("group-key")).await.unwrap();
        verify_machine_key(&f.db, &shared, &f.machine, Some("fleet-key")).await.unwrap();
    }

    #[tokio::test]
    async fn test_hash_lookup_edges() {
        let f = fixture().await;

        assert_eq!(
            inventory_hash(&f.db, &config(), None, None).await.unwrap().body(),
            MACHINE_NOT_FOUND
        );
        assert_eq!(
            inventory_hash(&f.db, &config(), Some(""), None).await.unwrap(),
            HashLookup::MachineNotFound
        );
        assert_eq!(
            inventory_hash(&f.db, &config(), Some("NOPE"), None).await.unwrap(),
            HashLookup::Hash(String::new())
        );
        assert_eq!(
            inventory_hash(&f.db, &config(), Some("ABC123"), Some("group-key"))
                .await
                .unwrap(),
            HashLookup::Hash(String::new())
        );
        assert!(matches!(
            inventory_hash(&f.db, &config(), Some("ABC123"), None).await,
            Err(Error::Unauthorized(_))
        ));
    }
}
