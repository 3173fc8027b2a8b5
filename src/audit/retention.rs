//! Network address retention policy.
//!
//! Stored entries are never rewritten: changing a hashed field would break
//! the chain for every later entry. The policy is applied either before an
//! entry is hashed (write-time anonymization) or to copies leaving the trail
//! (exports).

use super::entry::AuditLog;
use crate::timestamp::TimeStamp;
use chrono::{DateTime, TimeDelta, Utc};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const DEFAULT_IP_RETENTION_DAYS: u32 = 90;

// IPv6 keeps its /48 routing prefix
const IPV6_HOST_BITS: u32 = 80;

/// Zero the last octet of an IPv4 address or the low 80 bits of an IPv6
/// address. Returns `None` for anything that is not an IP address, so an
/// unparseable value is dropped rather than kept verbatim.
pub fn anonymize_ip(addr: &str) -> Option<String> {
    match addr.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            Some(Ipv4Addr::new(a, b, c, 0).to_string())
        }
        IpAddr::V6(v6) => {
            let mask = !((1u128 << IPV6_HOST_BITS) - 1);
            Some(Ipv6Addr::from(u128::from(v6) & mask).to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    ip_retention: TimeDelta,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_IP_RETENTION_DAYS)
    }
}

impl RetentionPolicy {
    pub fn new(ip_retention: TimeDelta) -> Self {
        Self { ip_retention }
    }

    pub fn from_days(days: u32) -> Self {
        Self::new(TimeDelta::days(i64::from(days)))
    }

    pub fn ip_retention(&self) -> TimeDelta {
        self.ip_retention
    }

    /// True once `created_at` is at least the retention window before `as_of`.
    pub fn is_expired(&self, created_at: TimeStamp, as_of: DateTime<Utc>) -> bool {
        as_of - created_at.to_datetime_utc() >= self.ip_retention
    }

    /// Copy of `entry` with its address anonymized if it is past the window.
    pub fn redact(&self, entry: &AuditLog, as_of: DateTime<Utc>) -> AuditLog {
        let mut copy = entry.clone();
        if self.is_expired(entry.created_at, as_of) {
            copy.ip_address = entry.ip_address.as_deref().and_then(anonymize_ip);
        }
        copy
    }
}
