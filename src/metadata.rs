use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicationStatus {
    #[serde(rename = "DRAFT")]
    Draft,
    #[serde(rename = "SCHEDULED")]
    Scheduled,
    #[serde(rename = "PUBLISHED")]
    Published,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Draft => "DRAFT",
            PublicationStatus::Scheduled => "SCHEDULED",
            PublicationStatus::Published => "PUBLISHED",
            PublicationStatus::Archived => "ARCHIVED",
        }
    }

    /// General edits (title/content/metadata) are only permitted before
    /// publication.
    pub fn editable(&self) -> bool {
        matches!(self, PublicationStatus::Draft | PublicationStatus::Scheduled)
    }
}

impl FromStr for PublicationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "DRAFT" => Ok(PublicationStatus::Draft),
            "SCHEDULED" => Ok(PublicationStatus::Scheduled),
            "PUBLISHED" => Ok(PublicationStatus::Published),
            "ARCHIVED" => Ok(PublicationStatus::Archived),
            other => Err(format!("unknown publication status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnouncementKind {
    #[serde(rename = "MAINTENANCE")]
    Maintenance,
    #[serde(rename = "INCIDENT")]
    Incident,
    #[serde(rename = "NEWS")]
    News,
    #[serde(rename = "ALERT")]
    Alert,
}

impl AnnouncementKind {
    pub const ALL: [AnnouncementKind; 4] = [
        AnnouncementKind::Maintenance,
        AnnouncementKind::Incident,
        AnnouncementKind::News,
        AnnouncementKind::Alert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnouncementKind::Maintenance => "MAINTENANCE",
            AnnouncementKind::Incident => "INCIDENT",
            AnnouncementKind::News => "NEWS",
            AnnouncementKind::Alert => "ALERT",
        }
    }
}

impl FromStr for AnnouncementKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "MAINTENANCE" => Ok(AnnouncementKind::Maintenance),
            "INCIDENT" => Ok(AnnouncementKind::Incident),
            "NEWS" => Ok(AnnouncementKind::News),
            "ALERT" => Ok(AnnouncementKind::Alert),
            other => Err(format!("unknown announcement kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl Urgency {
    fn parse(value: &str) -> Option<Urgency> {
        match value {
            "LOW" => Some(Urgency::Low),
            "MEDIUM" => Some(Urgency::Medium),
            "HIGH" => Some(Urgency::High),
            "CRITICAL" => Some(Urgency::Critical),
            _ => None,
        }
    }
}

/// A field-level rejection produced while validating a metadata payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct MetadataError {
    pub field: String,
    pub message: String,
}

impl MetadataError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceMetadata {
    pub urgency: Urgency,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub is_emergency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_services: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentMetadata {
    pub urgency: Urgency,
    pub is_resolved: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_services: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallToAction {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsMetadata {
    pub news_type: String,
    pub target_audience: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<CallToAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMetadata {
    pub urgency: Urgency,
    pub alert_type: String,
    pub message: String,
    pub action_required: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_services: Option<Vec<String>>,
}

/// Tagged union over the four announcement kinds. The kind is immutable for
/// the lifetime of an announcement; the JSON column stores only the variant
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementMetadata {
    Maintenance(MaintenanceMetadata),
    Incident(IncidentMetadata),
    News(NewsMetadata),
    Alert(AlertMetadata),
}

impl AnnouncementMetadata {
    pub fn kind(&self) -> AnnouncementKind {
        match self {
            AnnouncementMetadata::Maintenance(_) => AnnouncementKind::Maintenance,
            AnnouncementMetadata::Incident(_) => AnnouncementKind::Incident,
            AnnouncementMetadata::News(_) => AnnouncementKind::News,
            AnnouncementMetadata::Alert(_) => AnnouncementKind::Alert,
        }
    }

    /// Parse and validate a full metadata payload for the given kind.
    pub fn parse(kind: AnnouncementKind, value: &Value) -> Result<Self, MetadataError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MetadataError::new("metadata", "metadata must be an object"))?;

        match kind {
            AnnouncementKind::Maintenance => {
                let parsed = MaintenanceMetadata {
                    urgency: req_urgency(obj, "urgency")?,
                    scheduled_start: req_datetime(obj, "scheduled_start")?,
                    scheduled_end: req_datetime(obj, "scheduled_end")?,
                    is_emergency: req_bool(obj, "is_emergency")?,
                    actual_start: opt_datetime(obj, "actual_start")?,
                    actual_end: opt_datetime(obj, "actual_end")?,
                    affected_services: opt_string_list(obj, "affected_services")?,
                };
                if parsed.scheduled_end <= parsed.scheduled_start {
                    return Err(MetadataError::new(
                        "scheduled_end",
                        "scheduled_end must be after scheduled_start",
                    ));
                }
                Ok(AnnouncementMetadata::Maintenance(parsed))
            }
            AnnouncementKind::Incident => {
                let parsed = IncidentMetadata {
                    urgency: req_urgency(obj, "urgency")?,
                    is_resolved: req_bool(obj, "is_resolved")?,
                    started_at: req_datetime(obj, "started_at")?,
                    resolved_at: opt_datetime(obj, "resolved_at")?,
                    resolution_content: opt_string(obj, "resolution_content")?,
                    ended_at: opt_datetime(obj, "ended_at")?,
                    affected_services: opt_string_list(obj, "affected_services")?,
                };
                if parsed.is_resolved {
                    if parsed.resolved_at.is_none() {
                        return Err(MetadataError::new(
                            "resolved_at",
                            "resolved_at is required when is_resolved is true",
                        ));
                    }
                    if parsed.resolution_content.is_none() {
                        return Err(MetadataError::new(
                            "resolution_content",
                            "resolution_content is required when is_resolved is true",
                        ));
                    }
                }
                if let Some(ended_at) = parsed.ended_at {
                    if ended_at <= parsed.started_at {
                        return Err(MetadataError::new(
                            "ended_at",
                            "ended_at must be after started_at",
                        ));
                    }
                }
                Ok(AnnouncementMetadata::Incident(parsed))
            }
            AnnouncementKind::News => {
                let call_to_action = match obj.get("call_to_action") {
                    None | Some(Value::Null) => None,
                    Some(Value::Object(cta)) => Some(CallToAction {
                        url: req_string(cta, "url")?,
                        text: req_string(cta, "text")?,
                    }),
                    Some(_) => {
                        return Err(MetadataError::new(
                            "call_to_action",
                            "call_to_action must be an object",
                        ))
                    }
                };
                Ok(AnnouncementMetadata::News(NewsMetadata {
                    news_type: req_string(obj, "news_type")?,
                    target_audience: req_string_list(obj, "target_audience")?,
                    summary: req_string(obj, "summary")?,
                    call_to_action,
                }))
            }
            AnnouncementKind::Alert => {
                let urgency = req_urgency(obj, "urgency")?;
                // Restricted subset, enforced here rather than in the enum.
                if !matches!(urgency, Urgency::High | Urgency::Critical) {
                    return Err(MetadataError::new(
                        "urgency",
                        "alert urgency must be HIGH or CRITICAL",
                    ));
                }
                let parsed = AlertMetadata {
                    urgency,
                    alert_type: req_string(obj, "alert_type")?,
                    message: req_string(obj, "message")?,
                    action_required: req_bool(obj, "action_required")?,
                    started_at: req_datetime(obj, "started_at")?,
                    action_description: opt_string(obj, "action_description")?,
                    ended_at: opt_datetime(obj, "ended_at")?,
                    affected_services: opt_string_list(obj, "affected_services")?,
                };
                if parsed.action_required && parsed.action_description.is_none() {
                    return Err(MetadataError::new(
                        "action_description",
                        "action_description is required when action_required is true",
                    ));
                }
                Ok(AnnouncementMetadata::Alert(parsed))
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            AnnouncementMetadata::Maintenance(m) => {
                serde_json::to_value(m).unwrap_or(Value::Null)
            }
            AnnouncementMetadata::Incident(m) => serde_json::to_value(m).unwrap_or(Value::Null),
            AnnouncementMetadata::News(m) => serde_json::to_value(m).unwrap_or(Value::Null),
            AnnouncementMetadata::Alert(m) => serde_json::to_value(m).unwrap_or(Value::Null),
        }
    }

    /// Apply a partial metadata update. Each kind has a fixed set of
    /// patchable keys; anything else in the patch is ignored, matching the
    /// tolerant-update contract of the HTTP layer. Incidents additionally
    /// enforce the resolution irreversibility rule.
    pub fn merge_update(&self, patch: &Map<String, Value>) -> Result<Self, MetadataError> {
        if let AnnouncementMetadata::Incident(existing) = self {
            match patch.get("is_resolved") {
                Some(Value::Bool(false)) if existing.is_resolved => {
                    return Err(MetadataError::new(
                        "is_resolved",
                        "is_resolved cannot be reverted to false",
                    ));
                }
                Some(Value::Bool(true)) if !existing.is_resolved => {
                    return Err(MetadataError::new(
                        "is_resolved",
                        "use the resolve action to resolve an incident",
                    ));
                }
                _ => {}
            }
        }

        let mut merged = match self.to_value() {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        for key in self.patchable_keys() {
            if let Some(value) = patch.get(*key) {
                // null removes optional keys, anything else overwrites
                if value.is_null() {
                    merged.remove(*key);
                } else {
                    merged.insert((*key).to_string(), value.clone());
                }
            }
        }

        Self::parse(self.kind(), &Value::Object(merged))
    }

    fn patchable_keys(&self) -> &'static [&'static str] {
        match self {
            AnnouncementMetadata::Maintenance(_) => &[
                "urgency",
                "scheduled_start",
                "scheduled_end",
                "is_emergency",
                "actual_start",
                "actual_end",
                "affected_services",
            ],
            // Post-creation, incidents only expose the fields that stay
            // editable after resolution; lifecycle fields go through the
            // resolve action.
            AnnouncementMetadata::Incident(_) => {
                &["urgency", "resolution_content", "affected_services"]
            }
            AnnouncementMetadata::News(_) => {
                &["news_type", "target_audience", "summary", "call_to_action"]
            }
            AnnouncementMetadata::Alert(_) => &[
                "urgency",
                "alert_type",
                "message",
                "action_required",
                "action_description",
                "started_at",
                "ended_at",
                "affected_services",
            ],
        }
    }
}

/// Field lists served by the schemas endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetadataSchema {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

pub fn schema_for(kind: AnnouncementKind) -> MetadataSchema {
    match kind {
        AnnouncementKind::Maintenance => MetadataSchema {
            required: &["urgency", "scheduled_start", "scheduled_end", "is_emergency"],
            optional: &["actual_start", "actual_end", "affected_services"],
        },
        AnnouncementKind::Incident => MetadataSchema {
            required: &["urgency", "is_resolved", "started_at"],
            optional: &[
                "resolved_at",
                "resolution_content",
                "ended_at",
                "affected_services",
            ],
        },
        AnnouncementKind::News => MetadataSchema {
            required: &["news_type", "target_audience", "summary"],
            optional: &["call_to_action"],
        },
        AnnouncementKind::Alert => MetadataSchema {
            required: &[
                "urgency",
                "alert_type",
                "message",
                "action_required",
                "started_at",
            ],
            optional: &["action_description", "affected_services", "ended_at"],
        },
    }
}

fn req_value<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value, MetadataError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(MetadataError::new(field, format!("{field} is required"))),
        Some(value) => Ok(value),
    }
}

fn req_string(obj: &Map<String, Value>, field: &str) -> Result<String, MetadataError> {
    match req_value(obj, field)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::String(_) => Err(MetadataError::new(field, format!("{field} must not be empty"))),
        _ => Err(MetadataError::new(field, format!("{field} must be a string"))),
    }
}

fn opt_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, MetadataError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(MetadataError::new(field, format!("{field} must be a string"))),
    }
}

fn req_bool(obj: &Map<String, Value>, field: &str) -> Result<bool, MetadataError> {
    match req_value(obj, field)? {
        Value::Bool(b) => Ok(*b),
        _ => Err(MetadataError::new(field, format!("{field} must be a boolean"))),
    }
}

fn req_urgency(obj: &Map<String, Value>, field: &str) -> Result<Urgency, MetadataError> {
    match req_value(obj, field)? {
        Value::String(s) => Urgency::parse(s).ok_or_else(|| {
            MetadataError::new(field, "urgency must be one of LOW, MEDIUM, HIGH, CRITICAL")
        }),
        _ => Err(MetadataError::new(field, format!("{field} must be a string"))),
    }
}

fn parse_datetime(field: &str, raw: &str) -> Result<DateTime<Utc>, MetadataError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MetadataError::new(field, format!("{field} must be an RFC 3339 timestamp")))
}

fn req_datetime(obj: &Map<String, Value>, field: &str) -> Result<DateTime<Utc>, MetadataError> {
    match req_value(obj, field)? {
        Value::String(s) => parse_datetime(field, s),
        _ => Err(MetadataError::new(field, format!("{field} must be a string"))),
    }
}

fn opt_datetime(
    obj: &Map<String, Value>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, MetadataError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_datetime(field, s).map(Some),
        Some(_) => Err(MetadataError::new(field, format!("{field} must be a string"))),
    }
}

fn string_list(field: &str, value: &Value) -> Result<Vec<String>, MetadataError> {
    let items = value
        .as_array()
        .ok_or_else(|| MetadataError::new(field, format!("{field} must be an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| MetadataError::new(field, format!("{field} must contain strings")))
        })
        .collect()
}

fn req_string_list(obj: &Map<String, Value>, field: &str) -> Result<Vec<String>, MetadataError> {
    string_list(field, req_value(obj, field)?)
}

fn opt_string_list(
    obj: &Map<String, Value>,
    field: &str,
) -> Result<Option<Vec<String>>, MetadataError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => string_list(field, value).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn maintenance_value() -> Value {
        json!({
            "urgency": "MEDIUM",
            "scheduled_start": "2025-11-09T10:00:00Z",
            "scheduled_end": "2025-11-09T14:00:00Z",
            "is_emergency": false,
            "affected_services": ["reports", "analytics"]
        })
    }

    #[test]
    fn maintenance_round_trips() {
        let parsed =
            AnnouncementMetadata::parse(AnnouncementKind::Maintenance, &maintenance_value())
                .unwrap();
        assert_eq!(parsed.to_value(), maintenance_value());
    }

    #[test]
    fn maintenance_requires_scheduled_start() {
        let mut value = maintenance_value();
        value.as_object_mut().unwrap().remove("scheduled_start");
        let err =
            AnnouncementMetadata::parse(AnnouncementKind::Maintenance, &value).unwrap_err();
        assert_eq!(err.field, "scheduled_start");
    }

    #[test]
    fn maintenance_window_must_be_ordered() {
        let value = json!({
            "urgency": "MEDIUM",
            "scheduled_start": "2025-11-09T14:00:00Z",
            "scheduled_end": "2025-11-09T10:00:00Z",
            "is_emergency": false
        });
        let err =
            AnnouncementMetadata::parse(AnnouncementKind::Maintenance, &value).unwrap_err();
        assert_eq!(err.field, "scheduled_end");
    }

    #[test]
    fn incident_requires_started_at() {
        let value = json!({
            "urgency": "CRITICAL",
            "is_resolved": false,
            "affected_services": ["login", "api"]
        });
        let err = AnnouncementMetadata::parse(AnnouncementKind::Incident, &value).unwrap_err();
        assert_eq!(err.field, "started_at");
    }

    #[test]
    fn resolved_incident_requires_resolution_content() {
        let value = json!({
            "urgency": "HIGH",
            "is_resolved": true,
            "started_at": "2025-11-02T18:45:00Z",
            "resolved_at": "2025-11-02T20:30:00Z"
        });
        let err = AnnouncementMetadata::parse(AnnouncementKind::Incident, &value).unwrap_err();
        assert_eq!(err.field, "resolution_content");
    }

    #[test]
    fn incident_resolution_is_irreversible() {
        let resolved = AnnouncementMetadata::parse(
            AnnouncementKind::Incident,
            &json!({
                "urgency": "HIGH",
                "is_resolved": true,
                "started_at": "2025-11-02T18:45:00Z",
                "resolved_at": "2025-11-02T20:30:00Z",
                "resolution_content": "rolled back"
            }),
        )
        .unwrap();

        let patch = json!({"is_resolved": false})
            .as_object()
            .cloned()
            .unwrap();
        let err = resolved.merge_update(&patch).unwrap_err();
        assert_eq!(err.field, "is_resolved");

        // and it stays irreversible on repeated attempts
        let err = resolved.merge_update(&patch).unwrap_err();
        assert_eq!(err.field, "is_resolved");
    }

    #[test]
    fn resolved_incident_keeps_editable_fields() {
        let resolved = AnnouncementMetadata::parse(
            AnnouncementKind::Incident,
            &json!({
                "urgency": "HIGH",
                "is_resolved": true,
                "started_at": "2025-11-02T18:45:00Z",
                "resolved_at": "2025-11-02T20:30:00Z",
                "resolution_content": "rolled back"
            }),
        )
        .unwrap();

        let patch = json!({
            "urgency": "CRITICAL",
            "resolution_content": "full postmortem attached",
            "affected_services": ["api"],
            "started_at": "2020-01-01T00:00:00Z"
        })
        .as_object()
        .cloned()
        .unwrap();

        let merged = resolved.merge_update(&patch).unwrap();
        match merged {
            AnnouncementMetadata::Incident(incident) => {
                assert_eq!(incident.urgency, Urgency::Critical);
                assert_eq!(
                    incident.resolution_content.as_deref(),
                    Some("full postmortem attached")
                );
                // started_at is not a patchable key and stays untouched
                assert_eq!(
                    incident.started_at,
                    parse_datetime("started_at", "2025-11-02T18:45:00Z").unwrap()
                );
            }
            other => panic!("expected incident metadata, got {other:?}"),
        }
    }

    #[test]
    fn news_requires_target_audience_array() {
        let value = json!({
            "news_type": "feature_release",
            "target_audience": "users",
            "summary": "New feature announcement for all users"
        });
        let err = AnnouncementMetadata::parse(AnnouncementKind::News, &value).unwrap_err();
        assert_eq!(err.field, "target_audience");
    }

    #[test]
    fn news_call_to_action_can_be_removed_with_null() {
        let news = AnnouncementMetadata::parse(
            AnnouncementKind::News,
            &json!({
                "news_type": "feature_release",
                "target_audience": ["users"],
                "summary": "s",
                "call_to_action": {"url": "https://example.com", "text": "Read"}
            }),
        )
        .unwrap();

        let patch = json!({"call_to_action": null}).as_object().cloned().unwrap();
        match news.merge_update(&patch).unwrap() {
            AnnouncementMetadata::News(news) => assert!(news.call_to_action.is_none()),
            other => panic!("expected news metadata, got {other:?}"),
        }
    }

    #[test]
    fn alert_urgency_is_restricted() {
        let value = json!({
            "urgency": "LOW",
            "alert_type": "security",
            "message": "patch now",
            "action_required": false,
            "started_at": "2025-11-02T22:00:00Z"
        });
        let err = AnnouncementMetadata::parse(AnnouncementKind::Alert, &value).unwrap_err();
        assert_eq!(err.field, "urgency");
    }

    #[test]
    fn alert_action_description_required_when_action_required() {
        let value = json!({
            "urgency": "CRITICAL",
            "alert_type": "security",
            "message": "Critical security alert requiring immediate action",
            "action_required": true,
            "started_at": "2025-11-02T22:00:00Z"
        });
        let err = AnnouncementMetadata::parse(AnnouncementKind::Alert, &value).unwrap_err();
        assert_eq!(err.field, "action_description");
    }
}
