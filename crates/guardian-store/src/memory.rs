//! In-process store implementation

use chrono::{DateTime, Local, NaiveDate};
use guardian_api::{
    Alert, App, Child, ChildApp, ChildAppPatch, NewAlert, NewApp, Policy, PolicyPatch,
    ScreenTimeRecord,
};
use guardian_util::{AlertId, AppId, ChildId, ParentId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::traits::sort_newest_first;
use crate::{Store, StoreError, StoreResult, StoreSeed};

#[derive(Default, Clone)]
struct Inner {
    apps: BTreeMap<AppId, App>,
    children: BTreeMap<ChildId, Child>,
    child_apps: BTreeMap<(ChildId, AppId), ChildApp>,
    alerts: BTreeMap<AlertId, Alert>,
    last_alert_id: u64,
    policies: HashMap<(ParentId, ChildId), Policy>,
    screen_time: BTreeMap<(ChildId, NaiveDate), ScreenTimeRecord>,
}

impl Inner {
    fn push_alert(&mut self, alert: NewAlert) -> Alert {
        self.last_alert_id += 1;
        let alert = alert.into_alert(AlertId::new(self.last_alert_id), guardian_util::now());
        self.alerts.insert(alert.id, alert.clone());
        alert
    }

    fn find_app(&self, name: &str) -> Option<&App> {
        self.apps.values().find(|app| app.name == name)
    }

    fn create_app(&mut self, app: NewApp) -> App {
        let next_id = self.apps.keys().next_back().map_or(1, |id| id.get() + 1);

        let app = App {
            id: AppId::new(next_id),
            name: app.name,
            category: app.category,
            age_rating: app.age_rating,
            safety_badge: app.safety_badge,
            description: app.description,
            expert_review: app.expert_review,
            icon_url: app.icon_url,
            created_at: guardian_util::now(),
        };
        self.apps.insert(app.id, app.clone());

        debug!(app_id = %app.id, name = %app.name, "App added to catalog");
        app
    }

    fn insert_app(&mut self, app: App) -> StoreResult<()> {
        if self.apps.contains_key(&app.id) {
            return Err(StoreError::Conflict(format!("app {} already exists", app.id)));
        }
        self.apps.insert(app.id, app);
        Ok(())
    }

    fn insert_child(&mut self, child: Child) -> StoreResult<()> {
        if self.children.contains_key(&child.id) {
            return Err(StoreError::Conflict(format!("child {} already exists", child.id)));
        }
        self.children.insert(child.id, child);
        Ok(())
    }

    fn insert_child_app(&mut self, install: ChildApp) -> StoreResult<()> {
        let key = (install.child_id, install.app_id);
        if self.child_apps.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "app {} already installed for child {}",
                install.app_id, install.child_id
            )));
        }
        self.child_apps.insert(key, install);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.apps.is_empty()
    }
}

/// Store held entirely in process memory. State is lost on exit.
///
/// One mutex guards every map, so each trait method is atomic with respect
/// to all others.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn get_app(&self, app_id: AppId) -> StoreResult<Option<App>> {
        Ok(self.lock()?.apps.get(&app_id).cloned())
    }

    fn list_apps(&self) -> StoreResult<Vec<App>> {
        Ok(self.lock()?.apps.values().cloned().collect())
    }

    fn find_app_by_name(&self, name: &str) -> StoreResult<Option<App>> {
        Ok(self.lock()?.find_app(name).cloned())
    }

    fn create_app(&self, app: NewApp) -> StoreResult<App> {
        Ok(self.lock()?.create_app(app))
    }

    fn find_or_create_app(&self, app: NewApp) -> StoreResult<App> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.find_app(&app.name) {
            return Ok(existing.clone());
        }
        Ok(inner.create_app(app))
    }

    fn insert_app(&self, app: App) -> StoreResult<()> {
        self.lock()?.insert_app(app)
    }

    fn get_child(&self, child_id: ChildId) -> StoreResult<Option<Child>> {
        Ok(self.lock()?.children.get(&child_id).cloned())
    }

    fn list_children(&self, parent_id: ParentId) -> StoreResult<Vec<Child>> {
        Ok(self
            .lock()?
            .children
            .values()
            .filter(|c| c.parent_id == parent_id)
            .cloned()
            .collect())
    }

    fn insert_child(&self, child: Child) -> StoreResult<()> {
        self.lock()?.insert_child(child)
    }

    fn get_child_app(&self, child_id: ChildId, app_id: AppId) -> StoreResult<Option<ChildApp>> {
        Ok(self.lock()?.child_apps.get(&(child_id, app_id)).cloned())
    }

    fn list_child_apps(&self, child_id: ChildId) -> StoreResult<Vec<ChildApp>> {
        Ok(self
            .lock()?
            .child_apps
            .range((child_id, AppId::new(0))..=(child_id, AppId::new(u64::MAX)))
            .map(|(_, install)| install.clone())
            .collect())
    }

    fn install_with_alert(
        &self,
        install: ChildApp,
        alert: NewAlert,
    ) -> StoreResult<(ChildApp, Alert)> {
        let mut inner = self.lock()?;
        inner.insert_child_app(install.clone())?;
        let alert = inner.push_alert(alert);

        debug!(
            child_id = %install.child_id,
            app_id = %install.app_id,
            alert_id = %alert.id,
            "Install recorded"
        );
        Ok((install, alert))
    }

    fn insert_child_app(&self, install: ChildApp) -> StoreResult<()> {
        self.lock()?.insert_child_app(install)
    }

    fn update_child_app(
        &self,
        child_id: ChildId,
        app_id: AppId,
        patch: &ChildAppPatch,
    ) -> StoreResult<ChildApp> {
        let mut inner = self.lock()?;
        let install = inner.child_apps.get_mut(&(child_id, app_id)).ok_or_else(|| {
            StoreError::NotFound(format!("app {} is not installed for child {}", app_id, child_id))
        })?;
        install.apply(patch);
        Ok(install.clone())
    }

    fn append_alert(&self, alert: NewAlert) -> StoreResult<Alert> {
        let alert = self.lock()?.push_alert(alert);
        debug!(alert_id = %alert.id, parent_id = %alert.parent_id, "Alert appended");
        Ok(alert)
    }

    fn get_alert(&self, alert_id: AlertId) -> StoreResult<Option<Alert>> {
        Ok(self.lock()?.alerts.get(&alert_id).cloned())
    }

    fn list_alerts(&self, parent_id: ParentId) -> StoreResult<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .lock()?
            .alerts
            .values()
            .filter(|a| a.parent_id == parent_id)
            .cloned()
            .collect();
        sort_newest_first(&mut alerts);
        Ok(alerts)
    }

    fn count_unread_alerts(&self, parent_id: ParentId) -> StoreResult<usize> {
        Ok(self
            .lock()?
            .alerts
            .values()
            .filter(|a| a.parent_id == parent_id && !a.is_read)
            .count())
    }

    fn mark_alert_read(&self, alert_id: AlertId) -> StoreResult<Alert> {
        let mut inner = self.lock()?;
        let alert = inner
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?;
        alert.is_read = true;
        Ok(alert.clone())
    }

    fn get_policy(&self, parent_id: ParentId, child_id: ChildId) -> StoreResult<Option<Policy>> {
        Ok(self.lock()?.policies.get(&(parent_id, child_id)).cloned())
    }

    fn upsert_policy(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        patch: &PolicyPatch,
        now: DateTime<Local>,
    ) -> StoreResult<Policy> {
        let mut inner = self.lock()?;
        let policy = inner
            .policies
            .entry((parent_id, child_id))
            .or_insert_with(|| Policy::defaults_for(parent_id, child_id));
        policy.apply(patch, now);
        Ok(policy.clone())
    }

    fn record_screen_time(&self, record: ScreenTimeRecord) -> StoreResult<ScreenTimeRecord> {
        self.lock()?
            .screen_time
            .insert((record.child_id, record.date), record.clone());
        Ok(record)
    }

    fn get_screen_time(
        &self,
        child_id: ChildId,
        date: NaiveDate,
    ) -> StoreResult<Option<ScreenTimeRecord>> {
        Ok(self.lock()?.screen_time.get(&(child_id, date)).cloned())
    }

    fn get_screen_time_range(
        &self,
        child_id: ChildId,
        start: NaiveDate,
        days: u32,
    ) -> StoreResult<Vec<ScreenTimeRecord>> {
        let Some((first, last)) = guardian_util::date_range_bounds(start, days) else {
            return Ok(Vec::new());
        };
        Ok(self
            .lock()?
            .screen_time
            .range((child_id, first)..=(child_id, last))
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn import_seed(&self, seed: &StoreSeed) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if !inner.is_empty() {
            return Ok(false);
        }

        // Stage on a copy so a failure leaves the store untouched
        let mut staged = inner.clone();
        for child in &seed.children {
            staged.insert_child(child.clone())?;
        }
        for app in &seed.apps {
            staged.insert_app(app.clone())?;
        }
        for policy in &seed.policies {
            staged
                .policies
                .insert((policy.parent_id, policy.child_id), policy.clone());
        }
        for install in &seed.installs {
            staged.insert_child_app(install.clone())?;
        }
        for (alert, is_read) in &seed.alerts {
            let alert = staged.push_alert(alert.clone());
            if *is_read && let Some(stored) = staged.alerts.get_mut(&alert.id) {
                stored.is_read = true;
            }
        }
        for record in &seed.screen_time {
            staged
                .screen_time
                .insert((record.child_id, record.date), record.clone());
        }

        *inner = staged;
        Ok(true)
    }

    fn is_healthy(&self) -> bool {
        if self.inner.is_poisoned() {
            warn!("Store lock poisoned");
            return false;
        }
        true
    }
}
