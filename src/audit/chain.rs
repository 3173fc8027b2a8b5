//! Hash chain over audit entries.
//!
//! An entry's hash is the SHA-256 of a CBOR array holding every stored field,
//! `previous_hash` included. CBOR strings carry their own length and optional
//! fields encode as `null`, so no two distinct field combinations produce the
//! same input bytes.

use super::entry::AuditLog;
use crate::error::AuditError;
use minicbor::Encoder;
use std::convert::Infallible;

/// An entry together with its own hash, ready to become the new chain head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub entry: AuditLog,
    pub hash: String,
}

const FIELD_COUNT: u64 = 11;

fn chain_input(entry: &AuditLog) -> Result<Vec<u8>, minicbor::encode::Error<Infallible>> {
    let mut e = Encoder::new(Vec::new());
    e.array(FIELD_COUNT)?
        .str(&entry.id)?
        .str(&entry.user_id)?
        .str(entry.entity_type.as_str())?
        .str(&entry.entity_id)?
        .str(entry.action.as_str())?
        .str(entry.outcome.as_str())?
        .encode(entry.created_at)?
        .encode(&entry.request_id)?
        .encode(&entry.ip_address)?
        .encode(&entry.user_agent)?
        .str(&entry.previous_hash)?;
    Ok(e.into_writer())
}

/// Hex-encoded SHA-256 of the entry's chain input.
pub fn entry_hash(entry: &AuditLog) -> Result<String, AuditError> {
    let input = chain_input(entry).map_err(|e| AuditError::Encoding(e.to_string()))?;
    Ok(sha256::digest(&input))
}

/// Build the link for `entry` on top of `last_hash`.
pub fn link(mut entry: AuditLog, last_hash: &str) -> Result<ChainLink, AuditError> {
    entry.previous_hash = last_hash.to_string();
    let hash = entry_hash(&entry)?;
    Ok(ChainLink { entry, hash })
}

/// Replay `entries` in insertion order and check every back-link as well as
/// the recorded chain tip.
///
/// An entry that can no longer be hashed (a timestamp pushed out of the
/// encodable range) was not written that way, so it counts as a mismatch.
pub fn verify<'a>(entries: impl IntoIterator<Item = &'a AuditLog>, last_hash: &str) -> bool {
    let mut expected_previous = String::new();

    for entry in entries {
        if entry.previous_hash != expected_previous {
            return false;
        }
        match entry_hash(entry) {
            Ok(hash) => expected_previous = hash,
            Err(_) => return false,
        }
    }

    expected_previous == last_hash
}
