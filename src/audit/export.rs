//! Filtered export of the audit trail for compliance requests
use super::entry::AuditLog;
use super::retention::RetentionPolicy;
use crate::error::AuditError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Which entries to export and how.
///
/// The time window is half-open: `from` inclusive, `until` exclusive.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub format: ExportFormat,
    pub redaction: Option<(RetentionPolicy, DateTime<Utc>)>,
}

impl ExportFilter {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }
    /// Anonymize addresses of entries that are past `policy`'s window as of
    /// `as_of`. Applies to the exported copy only.
    pub fn redact_expired(mut self, policy: RetentionPolicy, as_of: DateTime<Utc>) -> Self {
        self.redaction = Some((policy, as_of));
        self
    }

    pub fn matches(&self, entry: &AuditLog) -> bool {
        let at = entry.created_at.to_datetime_utc();
        self.user_id.as_deref().is_none_or(|u| entry.user_id == u)
            && self.from.is_none_or(|from| at >= from)
            && self.until.is_none_or(|until| at < until)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    user_id: &'a str,
    entity_type: &'static str,
    entity_id: &'a str,
    action: &'static str,
    outcome: &'static str,
    created_at: String,
    request_id: Option<&'a str>,
    ip_address: Option<&'a str>,
    user_agent: Option<&'a str>,
    previous_hash: &'a str,
}

impl<'a> From<&'a AuditLog> for CsvRow<'a> {
    fn from(entry: &'a AuditLog) -> Self {
        Self {
            id: &entry.id,
            user_id: &entry.user_id,
            entity_type: entry.entity_type.as_str(),
            entity_id: &entry.entity_id,
            action: entry.action.as_str(),
            outcome: entry.outcome.as_str(),
            created_at: entry
                .created_at
                .to_datetime_utc()
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            request_id: entry.request_id.as_deref(),
            ip_address: entry.ip_address.as_deref(),
            user_agent: entry.user_agent.as_deref(),
            previous_hash: &entry.previous_hash,
        }
    }
}

/// Select, optionally redact, and serialise `entries` (insertion order kept).
pub fn export(entries: &[AuditLog], filter: &ExportFilter) -> Result<String, AuditError> {
    let selected: Vec<AuditLog> = entries
        .iter()
        .filter(|e| filter.matches(e))
        .map(|e| match &filter.redaction {
            Some((policy, as_of)) => policy.redact(e, *as_of),
            None => e.clone(),
        })
        .collect();

    match filter.format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(&selected).map_err(|e| AuditError::Export(e.to_string()))
        }
        ExportFormat::Csv => to_csv(&selected),
    }
}

fn to_csv(entries: &[AuditLog]) -> Result<String, AuditError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for entry in entries {
        writer
            .serialize(CsvRow::from(entry))
            .map_err(|e| AuditError::Export(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AuditError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AuditError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{AuditAction, EntityType, Outcome};
    use crate::timestamp::TimeStamp;

    fn entry(id: &str, user: &str, day: u32) -> AuditLog {
        AuditLog {
            id: id.into(),
            user_id: user.into(),
            entity_type: EntityType::Event,
            entity_id: "evt_1".into(),
            action: AuditAction::ExportMemberData,
            outcome: Outcome::Success,
            created_at: TimeStamp::new_with(2024, 3, day, 8, 0, 0).unwrap(),
            request_id: Some("req-1".into()),
            ip_address: Some("172.16.5.4".into()),
            user_agent: None,
            previous_hash: String::new(),
        }
    }

    fn sample() -> Vec<AuditLog> {
        vec![
            entry("a", "u1", 1),
            entry("b", "u2", 2),
            entry("c", "u1", 3),
            entry("d", "u1", 4),
        ]
    }

    fn day(d: u32) -> DateTime<Utc> {
        TimeStamp::new_with(2024, 3, d, 0, 0, 0).unwrap().to_datetime_utc()
    }

    #[test]
    fn filters_by_user_and_window() {
        let filter = ExportFilter::new(ExportFormat::Json)
            .for_user("u1")
            .since(day(2))
            .until(day(4));
        let ids: Vec<String> = sample()
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn json_export_is_an_array_in_insertion_order() {
        let out = export(&sample(), &ExportFilter::new(ExportFormat::Json).for_user("u1")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        let ids: Vec<&str> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
        assert_eq!(parsed[0]["entity_type"], "event");
        assert_eq!(parsed[0]["action"], "export_member_data");
        assert_eq!(parsed[0]["outcome"], "success");
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let out = export(&sample(), &ExportFilter::new(ExportFormat::Csv).for_user("u2")).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,user_id,entity_type,entity_id,action,outcome,created_at,request_id,ip_address,user_agent,previous_hash"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("b,u2,event,evt_1,export_member_data,success,2024-03-02T08:00:00"));
        assert!(row.ends_with(",req-1,172.16.5.4,,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn redaction_applies_to_copies_only() {
        let entries = sample();
        let filter = ExportFilter::new(ExportFormat::Json)
            .redact_expired(RetentionPolicy::from_days(1), day(4));

        let out = export(&entries, &filter).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        // a and b are more than a day old at day 4 00:00, c is not
        assert_eq!(parsed[0]["ip_address"], "172.16.5.0");
        assert_eq!(parsed[1]["ip_address"], "172.16.5.0");
        assert_eq!(parsed[2]["ip_address"], "172.16.5.4");
        assert_eq!(entries[0].ip_address.as_deref(), Some("172.16.5.4"));
    }

    #[test]
    fn empty_selection_exports_cleanly() {
        let filter = ExportFilter::new(ExportFormat::Json).for_user("nobody");
        assert_eq!(export(&sample(), &filter).unwrap(), "[]");

        let filter = ExportFilter::new(ExportFormat::Csv).for_user("nobody");
        assert_eq!(export(&sample(), &filter).unwrap(), "");
    }
}
