//! Validated configuration structures

use crate::schema::{
    RawAlert, RawApp, RawChild, RawConfig, RawInstall, RawParent, RawPolicy, RawScreenTime,
    RawServiceConfig,
};
use chrono::{DateTime, Local};
use guardian_api::{App, Child, ChildApp, NewAlert, ParentProfile, Policy, ScreenTimeRecord};
use guardian_util::ParentId;
use std::path::PathBuf;

/// Default per-connection request budget
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: u32 = 30;

/// Validated configuration ready for seeding the store
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service: ServiceSettings,
    pub parents: Vec<ParentAccount>,
    pub children: Vec<Child>,
    pub apps: Vec<App>,
    pub policies: Vec<Policy>,
    pub alerts: Vec<SeedAlert>,
    pub screen_time: Vec<ScreenTimeRecord>,
    pub installs: Vec<ChildApp>,
}

impl ServiceConfig {
    /// Convert from raw config (after validation). Seed records are stamped
    /// with the current time.
    pub fn from_raw(raw: RawConfig) -> Self {
        let now = guardian_util::now();

        Self {
            service: ServiceSettings::from_raw(raw.service),
            parents: raw.parents.into_iter().map(ParentAccount::from_raw).collect(),
            children: raw.children.into_iter().map(|c| child_from_raw(c, now)).collect(),
            apps: raw.apps.into_iter().map(|a| app_from_raw(a, now)).collect(),
            policies: raw.policies.into_iter().map(|p| policy_from_raw(p, now)).collect(),
            alerts: raw.alerts.into_iter().map(SeedAlert::from_raw).collect(),
            screen_time: raw.screen_time.into_iter().map(screen_time_from_raw).collect(),
            installs: raw.installs.into_iter().map(|i| install_from_raw(i, now)).collect(),
        }
    }

    /// Find a parent account by login name
    pub fn find_parent(&self, username: &str) -> Option<&ParentAccount> {
        self.parents.iter().find(|p| p.username == username)
    }

    pub fn get_parent(&self, id: ParentId) -> Option<&ParentAccount> {
        self.parents.iter().find(|p| p.id == id)
    }
}

/// Which store backend holds service state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Service settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub store: StoreBackend,
    pub max_requests_per_second: u32,
}

impl ServiceSettings {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let store = match raw.store.as_deref() {
            Some("sqlite") => StoreBackend::Sqlite,
            _ => StoreBackend::Memory,
        };

        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(guardian_util::socket_path_without_env),
            data_dir: raw
                .data_dir
                .unwrap_or_else(guardian_util::data_dir_without_env),
            store,
            max_requests_per_second: raw
                .max_requests_per_second
                .unwrap_or(DEFAULT_MAX_REQUESTS_PER_SECOND),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// A parent who may log in to the service
#[derive(Debug, Clone)]
pub struct ParentAccount {
    pub id: ParentId,
    pub username: String,
    pub email: String,
    pub role: String,
    password: String,
}

impl ParentAccount {
    fn from_raw(raw: RawParent) -> Self {
        Self {
            id: raw.id,
            username: raw.username,
            email: raw.email,
            role: raw.role,
            password: raw.password,
        }
    }

    pub fn profile(&self) -> ParentProfile {
        ParentProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }

    // Demo accounts carry plain-text passwords.
    pub fn verify_password(&self, candidate: &str) -> bool {
        self.password == candidate
    }
}

/// Alert present at startup, possibly already read
#[derive(Debug, Clone)]
pub struct SeedAlert {
    pub alert: NewAlert,
    pub is_read: bool,
}

impl SeedAlert {
    fn from_raw(raw: RawAlert) -> Self {
        Self {
            alert: NewAlert {
                parent_id: raw.parent_id,
                child_id: raw.child_id,
                alert_type: raw.alert_type,
                title: raw.title,
                message: raw.message,
                severity: raw.severity,
                metadata: raw.metadata.unwrap_or(serde_json::Value::Null),
            },
            is_read: raw.is_read,
        }
    }
}

fn child_from_raw(raw: RawChild, now: DateTime<Local>) -> Child {
    Child {
        id: raw.id,
        parent_id: raw.parent_id,
        name: raw.name,
        age: raw.age,
        device_info: raw.device_info,
        profile_image: raw.profile_image,
        created_at: now,
    }
}

fn app_from_raw(raw: RawApp, now: DateTime<Local>) -> App {
    App {
        id: raw.id,
        name: raw.name,
        category: raw.category,
        age_rating: raw.age_rating,
        safety_badge: raw.safety_badge,
        description: raw.description,
        expert_review: raw.expert_review,
        icon_url: raw.icon_url,
        created_at: now,
    }
}

fn policy_from_raw(raw: RawPolicy, now: DateTime<Local>) -> Policy {
    let mut policy = Policy::defaults_for(raw.parent_id, raw.child_id);
    policy.apply(&raw.settings, now);
    policy
}

fn screen_time_from_raw(raw: RawScreenTime) -> ScreenTimeRecord {
    ScreenTimeRecord {
        child_id: raw.child_id,
        date: raw.date,
        total_minutes: raw.total_minutes,
        app_breakdown: raw.app_breakdown,
    }
}

fn install_from_raw(raw: RawInstall, now: DateTime<Local>) -> ChildApp {
    ChildApp {
        child_id: raw.child_id,
        app_id: raw.app_id,
        is_blocked: raw.is_blocked,
        screen_time_today: raw.screen_time_today,
        installed_at: now,
    }
}
