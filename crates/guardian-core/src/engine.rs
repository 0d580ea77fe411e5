//! Core guardian engine

use chrono::NaiveDate;
use guardian_api::{
    Alert, App, Child, ChildApp, ChildAppPatch, InstalledApp, NewApp, Policy, PolicyPatch,
    SafetyBadge, ScreenTimeRecord,
};
use guardian_store::Store;
use guardian_util::{AlertId, AppId, ChildId, GuardianError, ParentId, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{evaluate_install, CoreEvent};

/// App installed by [`Guardian::simulate_install`] when no name is given
pub const DEFAULT_SIMULATED_APP: &str = "TikTok";

/// Result of a successful install
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub child_app: ChildApp,
    /// The one alert the install raised
    pub alert: Alert,
}

impl InstallOutcome {
    /// Events to broadcast for this install
    pub fn events(&self) -> Vec<CoreEvent> {
        vec![
            CoreEvent::AppInstalled {
                parent_id: self.alert.parent_id,
                child_id: self.child_app.child_id,
                app_id: self.child_app.app_id,
                blocked: self.child_app.is_blocked,
            },
            CoreEvent::AlertRaised {
                alert: self.alert.clone(),
            },
        ]
    }
}

/// The core engine.
///
/// Every parent-scoped operation verifies that the child belongs to the
/// calling parent; a missing child and a foreign child both yield
/// `AccessDenied`.
pub struct Guardian {
    store: Arc<dyn Store>,
}

impl Guardian {
    /// Create a new engine over an already-seeded store
    pub fn new(store: Arc<dyn Store>) -> Self {
        info!("Guardian engine initialized");
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Resolve a child owned by `parent_id`
    fn owned_child(&self, parent_id: ParentId, child_id: ChildId) -> Result<Child> {
        match self.store.get_child(child_id)? {
            Some(child) if child.parent_id == parent_id => Ok(child),
            Some(_) => {
                warn!(parent_id = %parent_id, child_id = %child_id, "Access to foreign child denied");
                Err(GuardianError::access_denied(format!("child {}", child_id)))
            }
            None => {
                debug!(parent_id = %parent_id, child_id = %child_id, "Access to unknown child denied");
                Err(GuardianError::access_denied(format!("child {}", child_id)))
            }
        }
    }

    fn policy_or_default(&self, parent_id: ParentId, child_id: ChildId) -> Result<Policy> {
        Ok(self
            .store
            .get_policy(parent_id, child_id)?
            .unwrap_or_else(|| Policy::defaults_for(parent_id, child_id)))
    }

    // Children and catalog

    pub fn list_children(&self, parent_id: ParentId) -> Result<Vec<Child>> {
        Ok(self.store.list_children(parent_id)?)
    }

    pub fn get_child(&self, parent_id: ParentId, child_id: ChildId) -> Result<Child> {
        self.owned_child(parent_id, child_id)
    }

    pub fn list_apps(&self) -> Result<Vec<App>> {
        Ok(self.store.list_apps()?)
    }

    /// Installed apps for a child, joined with their catalog entries
    pub fn list_child_apps(&self, parent_id: ParentId, child_id: ChildId) -> Result<Vec<InstalledApp>> {
        self.owned_child(parent_id, child_id)?;

        let mut joined = Vec::new();
        for install in self.store.list_child_apps(child_id)? {
            match self.store.get_app(install.app_id)? {
                Some(app) => joined.push(InstalledApp { install, app }),
                None => warn!(
                    child_id = %child_id,
                    app_id = %install.app_id,
                    "Installed app missing from catalog"
                ),
            }
        }
        Ok(joined)
    }

    // Installation

    /// Install an app for a child.
    ///
    /// Blocks the app when the policy auto-blocks high-risk apps and the
    /// app is high-risk, and raises exactly one alert. The install record
    /// and its alert are written together; a duplicate install fails with
    /// `Conflict` and changes nothing.
    pub fn install_app(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        app_id: AppId,
    ) -> Result<InstallOutcome> {
        let child = self.owned_child(parent_id, child_id)?;
        let app = self
            .store
            .get_app(app_id)?
            .ok_or_else(|| GuardianError::not_found(format!("app {}", app_id)))?;

        // Fast path; the store re-checks under its write lock
        if self.store.get_child_app(child_id, app_id)?.is_some() {
            return Err(GuardianError::conflict(format!(
                "app {} already installed for child {}",
                app_id, child_id
            )));
        }

        let policy = self.policy_or_default(parent_id, child_id)?;
        let decision = evaluate_install(&policy, &app, &child);

        let install = ChildApp {
            child_id,
            app_id,
            is_blocked: decision.blocked,
            screen_time_today: 0,
            installed_at: guardian_util::now(),
        };
        let (child_app, alert) = self.store.install_with_alert(install, decision.alert)?;

        info!(
            parent_id = %parent_id,
            child_id = %child_id,
            app_id = %app_id,
            app = %app.name,
            badge = app.safety_badge.as_str(),
            blocked = child_app.is_blocked,
            alert_id = %alert.id,
            "App installed"
        );

        Ok(InstallOutcome { child_app, alert })
    }

    /// Demo flow: install an app by catalog name, adding a high-risk
    /// "Social" entry to the catalog first if no app has that name.
    pub fn simulate_install(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        app_name: Option<&str>,
    ) -> Result<InstallOutcome> {
        self.owned_child(parent_id, child_id)?;
        let name = app_name.unwrap_or(DEFAULT_SIMULATED_APP);

        let app = self.store.find_or_create_app(simulated_catalog_entry(name))?;
        debug!(app_id = %app.id, name = %app.name, "Simulated app resolved");

        self.install_app(parent_id, child_id, app.id)
    }

    /// Block/unblock an installed app or set today's usage. Raises no alert.
    pub fn update_child_app(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        app_id: AppId,
        changes: &ChildAppPatch,
    ) -> Result<ChildApp> {
        self.owned_child(parent_id, child_id)?;
        let updated = self.store.update_child_app(child_id, app_id, changes)?;

        info!(
            child_id = %child_id,
            app_id = %app_id,
            blocked = updated.is_blocked,
            screen_time_today = updated.screen_time_today,
            "Child app updated"
        );
        Ok(updated)
    }

    // Alerts

    /// Alerts for a parent, newest first
    pub fn list_alerts(&self, parent_id: ParentId) -> Result<Vec<Alert>> {
        Ok(self.store.list_alerts(parent_id)?)
    }

    pub fn unread_alert_count(&self, parent_id: ParentId) -> Result<usize> {
        Ok(self.store.count_unread_alerts(parent_id)?)
    }

    /// Mark an alert read. Idempotent. Another parent's alert is reported
    /// as `NotFound`.
    pub fn mark_alert_read(&self, parent_id: ParentId, alert_id: AlertId) -> Result<Alert> {
        match self.store.get_alert(alert_id)? {
            Some(alert) if alert.parent_id == parent_id => {}
            _ => return Err(GuardianError::not_found(format!("alert {}", alert_id))),
        }

        let alert = self.store.mark_alert_read(alert_id)?;
        debug!(alert_id = %alert_id, "Alert marked read");
        Ok(alert)
    }

    // Policy

    /// Saved policy, or the defaults if the parent never saved one
    pub fn get_policy(&self, parent_id: ParentId, child_id: ChildId) -> Result<Policy> {
        self.owned_child(parent_id, child_id)?;
        self.policy_or_default(parent_id, child_id)
    }

    /// Merge `changes` onto the policy. Values are stored as given; range
    /// checks belong to the caller.
    pub fn set_policy(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        changes: &PolicyPatch,
    ) -> Result<(Policy, CoreEvent)> {
        self.owned_child(parent_id, child_id)?;
        let policy = self
            .store
            .upsert_policy(parent_id, child_id, changes, guardian_util::now())?;

        info!(
            parent_id = %parent_id,
            child_id = %child_id,
            daily_limit = policy.daily_screen_time_limit,
            auto_block = policy.auto_block_high_risk,
            "Policy updated"
        );
        Ok((policy, CoreEvent::PolicyUpdated { parent_id, child_id }))
    }

    // Screen time

    /// Insert or replace one day of usage for a child
    pub fn record_screen_time(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        date: NaiveDate,
        total_minutes: u32,
        app_breakdown: BTreeMap<AppId, u32>,
    ) -> Result<ScreenTimeRecord> {
        self.owned_child(parent_id, child_id)?;
        let record = self.store.record_screen_time(ScreenTimeRecord {
            child_id,
            date,
            total_minutes,
            app_breakdown,
        })?;

        debug!(
            child_id = %child_id,
            date = %date,
            total = %guardian_util::format_minutes(total_minutes),
            "Screen time recorded"
        );
        Ok(record)
    }

    pub fn get_screen_time_day(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        date: NaiveDate,
    ) -> Result<Option<ScreenTimeRecord>> {
        self.owned_child(parent_id, child_id)?;
        Ok(self.store.get_screen_time(child_id, date)?)
    }

    /// Recorded days among `days` days from `start`; missing days are omitted
    pub fn get_screen_time_range(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        start: NaiveDate,
        days: u32,
    ) -> Result<Vec<ScreenTimeRecord>> {
        self.owned_child(parent_id, child_id)?;
        Ok(self.store.get_screen_time_range(child_id, start, days)?)
    }

    // Health

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }
}

fn simulated_catalog_entry(name: &str) -> NewApp {
    NewApp {
        name: name.to_string(),
        category: "Social".into(),
        age_rating: 13,
        safety_badge: SafetyBadge::HighRisk,
        description: Some("Short-form video social networking platform".into()),
        expert_review: Some(
            "Age-inappropriate content and privacy concerns for young children.".into(),
        ),
        icon_url: Some(
            "https://images.unsplash.com/photo-1611262588024-d12430b98920?w=60".into(),
        ),
    }
}
