//! Raw configuration schema (as parsed from TOML)

use chrono::NaiveDate;
use guardian_api::{AlertSeverity, AlertType, PolicyPatch, SafetyBadge};
use guardian_util::{AppId, ChildId, ParentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    /// Parent accounts allowed to log in
    #[serde(default)]
    pub parents: Vec<RawParent>,

    /// Children roster (onboarding happens outside this service)
    #[serde(default)]
    pub children: Vec<RawChild>,

    /// App catalog seed
    #[serde(default)]
    pub apps: Vec<RawApp>,

    /// Saved policies; children without one use the defaults
    #[serde(default)]
    pub policies: Vec<RawPolicy>,

    /// Alerts present at startup
    #[serde(default)]
    pub alerts: Vec<RawAlert>,

    /// Historic screen-time days
    #[serde(default)]
    pub screen_time: Vec<RawScreenTime>,

    /// Apps already installed at startup
    #[serde(default)]
    pub installs: Vec<RawInstall>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/guardian/guardiand.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the sqlite store
    pub data_dir: Option<PathBuf>,

    /// "memory" (default) or "sqlite"
    pub store: Option<String>,

    /// Requests per second allowed per client connection
    pub max_requests_per_second: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawParent {
    pub id: ParentId,
    pub username: String,
    pub email: String,
    /// Plain-text demo password
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "parent".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawChild {
    pub id: ChildId,
    pub parent_id: ParentId,
    pub name: String,
    pub age: u8,
    pub device_info: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawApp {
    pub id: AppId,
    pub name: String,
    pub category: String,
    pub age_rating: u8,
    pub safety_badge: SafetyBadge,
    pub description: Option<String>,
    pub expert_review: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPolicy {
    pub parent_id: ParentId,
    pub child_id: ChildId,
    #[serde(flatten)]
    pub settings: PolicyPatch,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAlert {
    pub parent_id: ParentId,
    pub child_id: ChildId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawScreenTime {
    pub child_id: ChildId,
    pub date: NaiveDate,
    pub total_minutes: u32,
    #[serde(default)]
    pub app_breakdown: BTreeMap<AppId, u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawInstall {
    pub child_id: ChildId,
    pub app_id: AppId,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub screen_time_today: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roster_and_catalog() {
        let toml_str = r#"
            config_version = 1

            [[parents]]
            id = 1
            username = "sarah.johnson"
            email = "sarah.johnson@email.com"
            password = "password123"

            [[children]]
            id = 1
            parent_id = 1
            name = "Emma Johnson"
            age = 8

            [[apps]]
            id = 4
            name = "TikTok"
            category = "Social"
            age_rating = 13
            safety_badge = "high-risk"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.parents[0].role, "parent");
        assert_eq!(config.children[0].parent_id, ParentId::new(1));
        assert_eq!(config.apps[0].safety_badge, SafetyBadge::HighRisk);
        assert!(config.service.store.is_none());
    }

    #[test]
    fn parse_policy_and_screen_time_seeds() {
        let toml_str = r#"
            config_version = 1

            [[policies]]
            parent_id = 1
            child_id = 1
            daily_screen_time_limit = 120
            auto_block_high_risk = false

            [[screen_time]]
            child_id = 1
            date = "2024-01-01"
            total_minutes = 150
            app_breakdown = { "1" = 90, "3" = 60 }
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        let policy = &config.policies[0];
        assert_eq!(policy.settings.daily_screen_time_limit, Some(120));
        assert_eq!(policy.settings.auto_block_high_risk, Some(false));
        assert_eq!(policy.settings.bedtime_start, None);

        let day = &config.screen_time[0];
        assert_eq!(day.app_breakdown.get(&AppId::new(1)), Some(&90));
    }

    #[test]
    fn reject_unknown_safety_badge() {
        let toml_str = r#"
            config_version = 1

            [[apps]]
            id = 1
            name = "Mystery"
            category = "Games"
            age_rating = 4
            safety_badge = "spicy"
        "#;

        assert!(toml::from_str::<RawConfig>(toml_str).is_err());
    }
}
