//! Shared record types for the guardian API

use chrono::{DateTime, Local, NaiveDate};
use guardian_util::{AlertId, AppId, ChildId, ParentId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Catalog-assigned risk tier of an app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyBadge {
    #[serde(rename = "safe")]
    Safe,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "high-risk")]
    HighRisk,
}

impl SafetyBadge {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyBadge::Safe => "safe",
            SafetyBadge::Moderate => "moderate",
            SafetyBadge::HighRisk => "high-risk",
        }
    }
}

/// Immutable catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
    pub category: String,
    /// Minimum recommended age in years
    pub age_rating: u8,
    pub safety_badge: SafetyBadge,
    pub description: Option<String>,
    pub expert_review: Option<String>,
    pub icon_url: Option<String>,
    pub created_at: DateTime<Local>,
}

/// Catalog entry as submitted for creation; the catalog assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApp {
    pub name: String,
    pub category: String,
    pub age_rating: u8,
    pub safety_badge: SafetyBadge,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expert_review: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// A child profile, owned by exactly one parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub id: ChildId,
    pub parent_id: ParentId,
    pub name: String,
    pub age: u8,
    pub device_info: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Local>,
}

/// Public view of a parent account (never carries the password)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentProfile {
    pub id: ParentId,
    pub username: String,
    pub email: String,
    pub role: String,
}

/// How often notification digests go out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationFrequency {
    #[serde(rename = "real-time")]
    RealTime,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
}

/// Per-child parental settings, keyed by (parent, child)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub parent_id: ParentId,
    pub child_id: ChildId,
    /// Minutes per day
    pub daily_screen_time_limit: u32,
    /// `HH:MM`
    pub bedtime_start: String,
    /// `HH:MM`
    pub bedtime_end: String,
    pub weekend_extended_hours: bool,
    pub auto_block_high_risk: bool,
    pub review_moderate_apps: bool,
    /// None means the child's actual age applies
    pub age_override: Option<u8>,
    pub email_notifications: bool,
    pub notification_frequency: NotificationFrequency,
    /// None until the policy is first saved
    pub updated_at: Option<DateTime<Local>>,
}

impl Policy {
    pub const DEFAULT_DAILY_LIMIT_MINUTES: u32 = 180;
    pub const DEFAULT_BEDTIME_START: &'static str = "20:00";
    pub const DEFAULT_BEDTIME_END: &'static str = "07:00";

    /// The policy that applies when a parent has never saved one for a child.
    pub fn defaults_for(parent_id: ParentId, child_id: ChildId) -> Self {
        Self {
            parent_id,
            child_id,
            daily_screen_time_limit: Self::DEFAULT_DAILY_LIMIT_MINUTES,
            bedtime_start: Self::DEFAULT_BEDTIME_START.into(),
            bedtime_end: Self::DEFAULT_BEDTIME_END.into(),
            weekend_extended_hours: true,
            auto_block_high_risk: true,
            review_moderate_apps: true,
            age_override: None,
            email_notifications: true,
            notification_frequency: NotificationFrequency::RealTime,
            updated_at: None,
        }
    }

    /// Merge the provided fields of `patch` onto this policy and stamp `now`.
    pub fn apply(&mut self, patch: &PolicyPatch, now: DateTime<Local>) {
        if let Some(v) = patch.daily_screen_time_limit {
            self.daily_screen_time_limit = v;
        }
        if let Some(v) = &patch.bedtime_start {
            self.bedtime_start = v.clone();
        }
        if let Some(v) = &patch.bedtime_end {
            self.bedtime_end = v.clone();
        }
        if let Some(v) = patch.weekend_extended_hours {
            self.weekend_extended_hours = v;
        }
        if let Some(v) = patch.auto_block_high_risk {
            self.auto_block_high_risk = v;
        }
        if let Some(v) = patch.review_moderate_apps {
            self.review_moderate_apps = v;
        }
        if let Some(v) = patch.age_override {
            self.age_override = v;
        }
        if let Some(v) = patch.email_notifications {
            self.email_notifications = v;
        }
        if let Some(v) = patch.notification_frequency {
            self.notification_frequency = v;
        }
        self.updated_at = Some(now);
    }

    /// Age used for age-group decisions
    pub fn effective_age(&self, child: &Child) -> u8 {
        self.age_override.unwrap_or(child.age)
    }
}

/// Partial policy update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_screen_time_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedtime_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedtime_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekend_extended_hours: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_block_high_risk: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_moderate_apps: Option<bool>,
    /// `Some(None)` (an explicit `null`) clears the override
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub age_override: Option<Option<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_frequency: Option<NotificationFrequency>,
}

/// A patch that sets every field to the policy's values
impl From<&Policy> for PolicyPatch {
    fn from(policy: &Policy) -> Self {
        Self {
            daily_screen_time_limit: Some(policy.daily_screen_time_limit),
            bedtime_start: Some(policy.bedtime_start.clone()),
            bedtime_end: Some(policy.bedtime_end.clone()),
            weekend_extended_hours: Some(policy.weekend_extended_hours),
            auto_block_high_risk: Some(policy.auto_block_high_risk),
            review_moderate_apps: Some(policy.review_moderate_apps),
            age_override: Some(policy.age_override),
            email_notifications: Some(policy.email_notifications),
            notification_frequency: Some(policy.notification_frequency),
        }
    }
}

/// Distinguishes a field set to `null` from a missing field.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Installation record, unique per (child, app)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildApp {
    pub child_id: ChildId,
    pub app_id: AppId,
    pub is_blocked: bool,
    /// Minutes used today
    pub screen_time_today: u32,
    pub installed_at: DateTime<Local>,
}

impl ChildApp {
    pub fn apply(&mut self, patch: &ChildAppPatch) {
        if let Some(blocked) = patch.is_blocked {
            self.is_blocked = blocked;
        }
        if let Some(minutes) = patch.screen_time_today {
            self.screen_time_today = minutes;
        }
    }
}

/// Block/unblock and usage adjustments for an installed app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildAppPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_time_today: Option<u32>,
}

/// Installed app joined with its catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledApp {
    #[serde(flatten)]
    pub install: ChildApp,
    pub app: App,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    AppInstall,
    ScreenTime,
    HighRisk,
    Restriction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Danger,
}

/// Notification record surfaced to a parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub parent_id: ParentId,
    pub child_id: ChildId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub is_read: bool,
    /// Free-form details for UI linking, e.g. `{"appId": 4, "appName": "TikTok"}`
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Local>,
}

/// Alert contents before the ledger assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub parent_id: ParentId,
    pub child_id: ChildId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewAlert {
    /// Materialize as an unread alert
    pub fn into_alert(self, id: AlertId, created_at: DateTime<Local>) -> Alert {
        Alert {
            id,
            parent_id: self.parent_id,
            child_id: self.child_id,
            alert_type: self.alert_type,
            title: self.title,
            message: self.message,
            severity: self.severity,
            is_read: false,
            metadata: self.metadata,
            created_at,
        }
    }
}

/// Daily screen-time total for one child, keyed by (child, date)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenTimeRecord {
    pub child_id: ChildId,
    pub date: NaiveDate,
    pub total_minutes: u32,
    /// Minutes per app
    #[serde(default)]
    pub app_breakdown: BTreeMap<AppId, u32>,
}

/// Service health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub connected_clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_badge_wire_names() {
        assert_eq!(serde_json::to_string(&SafetyBadge::HighRisk).unwrap(), "\"high-risk\"");
        let parsed: SafetyBadge = serde_json::from_str("\"moderate\"").unwrap();
        assert_eq!(parsed, SafetyBadge::Moderate);
    }

    #[test]
    fn default_policy_values() {
        let policy = Policy::defaults_for(ParentId::new(1), ChildId::new(1));
        assert_eq!(policy.daily_screen_time_limit, 180);
        assert_eq!(policy.bedtime_start, "20:00");
        assert_eq!(policy.bedtime_end, "07:00");
        assert!(policy.auto_block_high_risk);
        assert!(policy.review_moderate_apps);
        assert!(policy.email_notifications);
        assert_eq!(policy.notification_frequency, NotificationFrequency::RealTime);
        assert!(policy.updated_at.is_none());
    }

    #[test]
    fn policy_patch_merges_only_present_fields() {
        let mut policy = Policy::defaults_for(ParentId::new(1), ChildId::new(2));
        let patch: PolicyPatch =
            serde_json::from_str(r#"{"daily_screen_time_limit": 90, "auto_block_high_risk": false}"#)
                .unwrap();

        let now = guardian_util::now();
        policy.apply(&patch, now);

        assert_eq!(policy.daily_screen_time_limit, 90);
        assert!(!policy.auto_block_high_risk);
        assert_eq!(policy.bedtime_start, "20:00");
        assert!(policy.review_moderate_apps);
        assert_eq!(policy.updated_at, Some(now));
    }

    #[test]
    fn policy_patch_null_clears_age_override() {
        let mut policy = Policy::defaults_for(ParentId::new(1), ChildId::new(2));
        policy.age_override = Some(10);

        let untouched: PolicyPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.age_override, None);
        policy.apply(&untouched, guardian_util::now());
        assert_eq!(policy.age_override, Some(10));

        let cleared: PolicyPatch = serde_json::from_str(r#"{"age_override": null}"#).unwrap();
        assert_eq!(cleared.age_override, Some(None));
        policy.apply(&cleared, guardian_util::now());
        assert_eq!(policy.age_override, None);
    }

    #[test]
    fn alert_type_field_is_named_type() {
        let alert = NewAlert {
            parent_id: ParentId::new(1),
            child_id: ChildId::new(1),
            alert_type: AlertType::HighRisk,
            title: "High Risk App Detected".into(),
            message: "msg".into(),
            severity: AlertSeverity::Danger,
            metadata: serde_json::json!({ "appId": 4, "appName": "TikTok" }),
        }
        .into_alert(AlertId::new(1), guardian_util::now());

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["type"], "high_risk");
        assert_eq!(value["severity"], "danger");
        assert_eq!(value["is_read"], false);
    }

    #[test]
    fn screen_time_breakdown_uses_app_ids_as_keys() {
        let record = ScreenTimeRecord {
            child_id: ChildId::new(1),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            total_minutes: 90,
            app_breakdown: BTreeMap::from([(AppId::new(1), 60), (AppId::new(3), 30)]),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"2024-01-01\""));
        let parsed: ScreenTimeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
