//! Inventory payload codec
//!
//! Agents send `base64(bzip2(plist))`. Form encoding may have turned `+`
//! into spaces on the way in, so those are restored before decoding.

use crate::error::{Error, Result};
use base64::{engine::general_purpose, Engine as _};
use bzip2::read::BzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;

/// One application observed by the agent. Missing keys read as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    #[serde(default)]
    pub bundleid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "CFBundleName")]
    pub bundlename: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub path: String,
}

/// Undo the transport encoding, returning the raw plist bytes.
///
/// Decompression stops once the output would exceed `max_bytes`.
pub fn decode_payload(encoded: &str, max_bytes: usize) -> Result<Vec<u8>> {
    let restored: String = encoded
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n'))
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();

    let compressed = general_purpose::STANDARD.decode(restored.as_bytes())?;

    let mut raw = Vec::new();
    BzDecoder::new(compressed.as_slice())
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| Error::Decode(format!("bzip2: {}", e)))?;
    if raw.len() > max_bytes {
        return Err(Error::Decode(format!(
            "payload too large: more than {} bytes",
            max_bytes
        )));
    }
    Ok(raw)
}

/// Parse raw plist bytes (XML or binary) into inventory entries
pub fn parse_inventory(raw: &[u8]) -> Result<Vec<InventoryEntry>> {
    let entries: Vec<InventoryEntry> = plist::from_bytes(raw)?;
    Ok(entries)
}

/// Lowercase hex SHA-256 of the raw payload
pub fn sha256_hex(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

/// Inverse of [`decode_payload`]; what an agent does before posting
pub fn encode_payload(raw: &[u8]) -> Result<String> {
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    let compressed = encoder.finish()?;
    Ok(general_purpose::STANDARD.encode(compressed))
}

/// Serialize entries as an XML plist, the format agents submit
pub fn to_plist_xml(entries: &[InventoryEntry]) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    plist::to_writer_xml(&mut raw, &entries)?;
    Ok(raw)
}
