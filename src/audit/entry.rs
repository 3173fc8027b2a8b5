//! Audit log entries and the whitelists they are validated against
use crate::error::AuditError;
use crate::timestamp::TimeStamp;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[n(0)]
    Scene,
    #[n(1)]
    Event,
    #[n(2)]
    User,
    #[n(3)]
    AdminPanel,
    #[n(4)]
    Post,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Scene,
        EntityType::Event,
        EntityType::User,
        EntityType::AdminPanel,
        EntityType::Post,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Scene => "scene",
            EntityType::Event => "event",
            EntityType::User => "user",
            EntityType::AdminPanel => "admin_panel",
            EntityType::Post => "post",
        }
    }
}

impl FromStr for EntityType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AuditError::InvalidEntityType(s.to_string()))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    #[n(0)]
    AccessPreciseLocation,
    #[n(1)]
    AccessCoarseLocation,
    #[n(2)]
    ViewAdminPanel,
    #[n(3)]
    ViewPrivacySettings,
    #[n(4)]
    ModifyPrivacySettings,
    #[n(5)]
    ViewSceneDetails,
    #[n(6)]
    ViewEventDetails,
    #[n(7)]
    ExportMemberData,
}

impl AuditAction {
    pub const ALL: [AuditAction; 8] = [
        AuditAction::AccessPreciseLocation,
        AuditAction::AccessCoarseLocation,
        AuditAction::ViewAdminPanel,
        AuditAction::ViewPrivacySettings,
        AuditAction::ModifyPrivacySettings,
        AuditAction::ViewSceneDetails,
        AuditAction::ViewEventDetails,
        AuditAction::ExportMemberData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccessPreciseLocation => "access_precise_location",
            AuditAction::AccessCoarseLocation => "access_coarse_location",
            AuditAction::ViewAdminPanel => "view_admin_panel",
            AuditAction::ViewPrivacySettings => "view_privacy_settings",
            AuditAction::ModifyPrivacySettings => "modify_privacy_settings",
            AuditAction::ViewSceneDetails => "view_scene_details",
            AuditAction::ViewEventDetails => "view_event_details",
            AuditAction::ExportMemberData => "export_member_data",
        }
    }
}

impl FromStr for AuditAction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AuditError::InvalidAction(s.to_string()))
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    #[n(0)]
    Success,
    #[n(1)]
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// A stored, chained audit entry. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct AuditLog {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub entity_type: EntityType,
    #[n(3)]
    pub entity_id: String,
    #[n(4)]
    pub action: AuditAction,
    #[n(5)]
    pub outcome: Outcome,
    #[n(6)]
    pub created_at: TimeStamp,
    #[n(7)]
    pub request_id: Option<String>,
    #[n(8)]
    pub ip_address: Option<String>,
    #[n(9)]
    pub user_agent: Option<String>,
    #[n(10)]
    pub previous_hash: String, // hash of the preceding entry, empty for the first
}

/// Unvalidated input for `log_access`. Entity type and action arrive as raw
/// strings and are checked against the whitelists before anything is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub user_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub outcome: Option<Outcome>,
    pub request_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Option<TimeStamp>,
}

impl NewAuditEntry {
    pub fn new(
        user_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            ..Self::default()
        }
    }
    pub fn set_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
    pub fn set_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
    pub fn set_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }
    pub fn set_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
    pub fn set_created_at(mut self, at: TimeStamp) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Check the whitelists and required fields.
    pub fn validate(&self) -> Result<(EntityType, AuditAction), AuditError> {
        let entity_type = self.entity_type.parse::<EntityType>()?;
        if self.entity_id.is_empty() {
            return Err(AuditError::InvalidEntityId);
        }
        let action = self.action.parse::<AuditAction>()?;
        Ok((entity_type, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelists_round_trip_through_strings() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        for a in AuditAction::ALL {
            assert_eq!(a.as_str().parse::<AuditAction>().unwrap(), a);
        }
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert_eq!(
            "payment".parse::<EntityType>().unwrap_err(),
            AuditError::InvalidEntityType("payment".into())
        );
        assert_eq!(
            "Scene".parse::<EntityType>().unwrap_err(),
            AuditError::InvalidEntityType("Scene".into())
        );
        assert_eq!(
            "delete_everything".parse::<AuditAction>().unwrap_err(),
            AuditError::InvalidAction("delete_everything".into())
        );
    }

    #[test]
    fn validate_checks_fields_in_order() {
        let ok = NewAuditEntry::new("u", "scene", "s1", "view_scene_details");
        assert_eq!(
            ok.validate().unwrap(),
            (EntityType::Scene, AuditAction::ViewSceneDetails)
        );

        let bad_type = NewAuditEntry::new("u", "", "s1", "view_scene_details");
        assert!(matches!(
            bad_type.validate(),
            Err(AuditError::InvalidEntityType(_))
        ));

        let no_id = NewAuditEntry::new("u", "scene", "", "view_scene_details");
        assert_eq!(no_id.validate().unwrap_err(), AuditError::InvalidEntityId);

        let no_action = NewAuditEntry::new("u", "scene", "s1", "");
        assert_eq!(
            no_action.validate().unwrap_err(),
            AuditError::InvalidAction(String::new())
        );
    }

    #[test]
    fn outcome_defaults_to_success() {
        assert_eq!(Outcome::default(), Outcome::Success);
        assert_eq!(NewAuditEntry::default().outcome, None);
    }
}
