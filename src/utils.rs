//! Utility functions for identifier generation

use bech32::Bech32m;
use uuid7::uuid7;

/// Prefix for payment record ids.
pub const PAYMENT_HRP: &str = "pay";
/// Prefix for audit log ids.
pub const AUDIT_HRP: &str = "aud";

// construct a unique time-ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}
