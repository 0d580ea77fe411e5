//! Store trait definitions

use chrono::{DateTime, Local, NaiveDate};
use guardian_api::{
    Alert, App, Child, ChildApp, ChildAppPatch, NewAlert, NewApp, Policy, PolicyPatch,
    ScreenTimeRecord,
};
use guardian_util::{AlertId, AppId, ChildId, ParentId};

use crate::StoreResult;

/// Main store trait
///
/// Every method is a single atomic step against the backend. Callers that
/// need ownership checks do them before calling in; the store trusts its ids.
pub trait Store: Send + Sync {
    // Catalog

    fn get_app(&self, app_id: AppId) -> StoreResult<Option<App>>;

    /// All catalog entries, ordered by id
    fn list_apps(&self) -> StoreResult<Vec<App>>;

    /// Exact, case-sensitive name match. First by id if several share a name.
    fn find_app_by_name(&self, name: &str) -> StoreResult<Option<App>>;

    /// Add an app, assigning the next free id
    fn create_app(&self, app: NewApp) -> StoreResult<App>;

    /// The first app named `app.name`, or `app` added to the catalog if
    /// none exists. Lookup and insert happen as one step.
    fn find_or_create_app(&self, app: NewApp) -> StoreResult<App>;

    /// Add an app with a preassigned id. `Conflict` if the id is taken.
    fn insert_app(&self, app: App) -> StoreResult<()>;

    // Children

    fn get_child(&self, child_id: ChildId) -> StoreResult<Option<Child>>;

    /// Children owned by a parent, ordered by id
    fn list_children(&self, parent_id: ParentId) -> StoreResult<Vec<Child>>;

    /// `Conflict` if the id is taken.
    fn insert_child(&self, child: Child) -> StoreResult<()>;

    // Installations

    fn get_child_app(&self, child_id: ChildId, app_id: AppId) -> StoreResult<Option<ChildApp>>;

    /// Installations for a child, ordered by app id
    fn list_child_apps(&self, child_id: ChildId) -> StoreResult<Vec<ChildApp>>;

    /// Record an installation and its alert as one step.
    ///
    /// Fails with `Conflict`, leaving the store untouched, if the
    /// (child, app) pair is already installed.
    fn install_with_alert(
        &self,
        install: ChildApp,
        alert: NewAlert,
    ) -> StoreResult<(ChildApp, Alert)>;

    /// Record an installation without an alert (seeding). `Conflict` if present.
    fn insert_child_app(&self, install: ChildApp) -> StoreResult<()>;

    /// Apply a patch to an existing installation. `NotFound` if absent.
    fn update_child_app(
        &self,
        child_id: ChildId,
        app_id: AppId,
        patch: &ChildAppPatch,
    ) -> StoreResult<ChildApp>;

    // Alert ledger

    /// Append an alert; the ledger assigns id and `created_at`
    fn append_alert(&self, alert: NewAlert) -> StoreResult<Alert>;

    fn get_alert(&self, alert_id: AlertId) -> StoreResult<Option<Alert>>;

    /// Alerts for a parent, newest first
    fn list_alerts(&self, parent_id: ParentId) -> StoreResult<Vec<Alert>>;

    fn count_unread_alerts(&self, parent_id: ParentId) -> StoreResult<usize>;

    /// Set `is_read`. Marking a read alert again is a no-op success.
    fn mark_alert_read(&self, alert_id: AlertId) -> StoreResult<Alert>;

    // Policies

    /// The saved policy, if any. Callers fall back to [`Policy::defaults_for`].
    fn get_policy(&self, parent_id: ParentId, child_id: ChildId) -> StoreResult<Option<Policy>>;

    /// Merge `patch` onto the saved policy (or the defaults) and stamp `now`.
    /// Values are stored as given.
    fn upsert_policy(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        patch: &PolicyPatch,
        now: DateTime<Local>,
    ) -> StoreResult<Policy>;

    // Screen time

    /// Insert or replace the record for (child, date)
    fn record_screen_time(&self, record: ScreenTimeRecord) -> StoreResult<ScreenTimeRecord>;

    fn get_screen_time(
        &self,
        child_id: ChildId,
        date: NaiveDate,
    ) -> StoreResult<Option<ScreenTimeRecord>>;

    /// Recorded days among `days` consecutive days from `start`, ascending.
    /// Days without a record are omitted. The window is clipped by
    /// [`guardian_util::date_range_bounds`].
    fn get_screen_time_range(
        &self,
        child_id: ChildId,
        start: NaiveDate,
        days: u32,
    ) -> StoreResult<Vec<ScreenTimeRecord>>;

    // Housekeeping

    /// Whether the store holds no children and no apps (safe to seed)
    fn is_empty(&self) -> StoreResult<bool>;

    /// Write `seed` into an empty store as one step.
    ///
    /// Returns `false` without writing when the store already holds data.
    /// On error nothing is written.
    fn import_seed(&self, seed: &StoreSeed) -> StoreResult<bool>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Initial contents for an empty store
#[derive(Debug, Clone, Default)]
pub struct StoreSeed {
    pub children: Vec<Child>,
    pub apps: Vec<App>,
    /// Stored as given, `updated_at` included
    pub policies: Vec<Policy>,
    pub installs: Vec<ChildApp>,
    /// Oldest first; `true` marks the alert read
    pub alerts: Vec<(NewAlert, bool)>,
    pub screen_time: Vec<ScreenTimeRecord>,
}

/// Ledger order: `created_at` descending, higher id first on ties
pub(crate) fn sort_newest_first(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Behaviour every backend must share. Each backend's test module runs
/// these against a fresh instance.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::StoreError;
    use guardian_api::{AlertSeverity, AlertType, SafetyBadge};
    use std::collections::BTreeMap;

    pub fn app(id: u64, name: &str, badge: SafetyBadge) -> App {
        App {
            id: AppId::new(id),
            name: name.into(),
            category: "Educational".into(),
            age_rating: 3,
            safety_badge: badge,
            description: None,
            expert_review: None,
            icon_url: None,
            created_at: guardian_util::now(),
        }
    }

    pub fn child(id: u64, parent: u64) -> Child {
        Child {
            id: ChildId::new(id),
            parent_id: ParentId::new(parent),
            name: "Emma Johnson".into(),
            age: 8,
            device_info: Some("iPhone 13".into()),
            profile_image: None,
            created_at: guardian_util::now(),
        }
    }

    pub fn install(child: u64, app: u64) -> ChildApp {
        ChildApp {
            child_id: ChildId::new(child),
            app_id: AppId::new(app),
            is_blocked: false,
            screen_time_today: 0,
            installed_at: guardian_util::now(),
        }
    }

    pub fn alert(parent: u64, child: u64, title: &str) -> NewAlert {
        NewAlert {
            parent_id: ParentId::new(parent),
            child_id: ChildId::new(child),
            alert_type: AlertType::AppInstall,
            title: title.into(),
            message: format!("{} message", title),
            severity: AlertSeverity::Info,
            metadata: serde_json::json!({ "appId": 1 }),
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    pub fn catalog(store: &dyn Store) {
        assert!(store.is_empty().unwrap());
        store.insert_app(app(1, "Khan Academy Kids", SafetyBadge::Safe)).unwrap();
        store.insert_app(app(4, "TikTok", SafetyBadge::HighRisk)).unwrap();
        assert!(!store.is_empty().unwrap());

        let err = store
            .insert_app(app(4, "Duplicate", SafetyBadge::Safe))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let created = store
            .create_app(NewApp {
                name: "Drawing Pad".into(),
                category: "Creative".into(),
                age_rating: 6,
                safety_badge: SafetyBadge::Moderate,
                description: Some("Digital drawing and art creation app".into()),
                expert_review: None,
                icon_url: None,
            })
            .unwrap();
        assert_eq!(created.id, AppId::new(5));

        let listed: Vec<_> = store.list_apps().unwrap().iter().map(|a| a.id).collect();
        assert_eq!(listed, vec![AppId::new(1), AppId::new(4), AppId::new(5)]);

        let found = store.find_app_by_name("TikTok").unwrap().unwrap();
        assert_eq!(found.safety_badge, SafetyBadge::HighRisk);
        assert!(store.find_app_by_name("tiktok").unwrap().is_none());
        assert_eq!(
            store.get_app(AppId::new(5)).unwrap().unwrap().description.as_deref(),
            Some("Digital drawing and art creation app")
        );
        assert!(store.get_app(AppId::new(99)).unwrap().is_none());
    }

    pub fn children(store: &dyn Store) {
        store.insert_child(child(1, 1)).unwrap();
        store.insert_child(child(2, 2)).unwrap();
        store.insert_child(child(3, 1)).unwrap();

        let ids: Vec<_> = store
            .list_children(ParentId::new(1))
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![ChildId::new(1), ChildId::new(3)]);

        let emma = store.get_child(ChildId::new(1)).unwrap().unwrap();
        assert_eq!(emma.device_info.as_deref(), Some("iPhone 13"));
        assert!(matches!(
            store.insert_child(child(1, 2)),
            Err(StoreError::Conflict(_))
        ));
    }

    pub fn install_is_unique_and_atomic(store: &dyn Store) {
        let (installed, raised) = store
            .install_with_alert(install(1, 4), alert(1, 1, "High Risk App Detected"))
            .unwrap();
        assert_eq!(installed.app_id, AppId::new(4));
        assert!(!raised.is_read);
        assert_eq!(store.count_unread_alerts(ParentId::new(1)).unwrap(), 1);

        let err = store
            .install_with_alert(install(1, 4), alert(1, 1, "Second"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.list_child_apps(ChildId::new(1)).unwrap().len(), 1);
        assert_eq!(store.list_alerts(ParentId::new(1)).unwrap().len(), 1);

        assert!(matches!(
            store.insert_child_app(install(1, 4)),
            Err(StoreError::Conflict(_))
        ));
    }

    pub fn update_child_app(store: &dyn Store) {
        store.insert_child_app(install(1, 3)).unwrap();

        let blocked = store
            .update_child_app(
                ChildId::new(1),
                AppId::new(3),
                &ChildAppPatch {
                    is_blocked: Some(true),
                    screen_time_today: None,
                },
            )
            .unwrap();
        assert!(blocked.is_blocked);
        assert_eq!(blocked.screen_time_today, 0);

        let used = store
            .update_child_app(
                ChildId::new(1),
                AppId::new(3),
                &ChildAppPatch {
                    is_blocked: None,
                    screen_time_today: Some(45),
                },
            )
            .unwrap();
        assert!(used.is_blocked);
        assert_eq!(used.screen_time_today, 45);
        assert_eq!(store.get_child_app(ChildId::new(1), AppId::new(3)).unwrap(), Some(used));

        let err = store
            .update_child_app(ChildId::new(1), AppId::new(9), &ChildAppPatch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    pub fn alert_ledger(store: &dyn Store) {
        let first = store.append_alert(alert(1, 1, "first")).unwrap();
        let second = store.append_alert(alert(1, 1, "second")).unwrap();
        store.append_alert(alert(2, 2, "other parent")).unwrap();
        assert!(second.id > first.id);

        let titles: Vec<_> = store
            .list_alerts(ParentId::new(1))
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles, vec!["second", "first"]);
        assert_eq!(store.count_unread_alerts(ParentId::new(1)).unwrap(), 2);

        let read = store.mark_alert_read(first.id).unwrap();
        assert!(read.is_read);
        let again = store.mark_alert_read(first.id).unwrap();
        assert_eq!(read, again);
        assert_eq!(store.count_unread_alerts(ParentId::new(1)).unwrap(), 1);
        assert_eq!(store.count_unread_alerts(ParentId::new(2)).unwrap(), 1);

        assert_eq!(store.get_alert(first.id).unwrap(), Some(read));
        assert!(matches!(
            store.mark_alert_read(AlertId::new(999)),
            Err(StoreError::NotFound(_))
        ));
    }

    pub fn policy_upsert(store: &dyn Store) {
        let parent = ParentId::new(1);
        let child = ChildId::new(1);
        assert!(store.get_policy(parent, child).unwrap().is_none());

        let now = guardian_util::now();
        let saved = store
            .upsert_policy(
                parent,
                child,
                &PolicyPatch {
                    daily_screen_time_limit: Some(120),
                    age_override: Some(Some(10)),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(saved.daily_screen_time_limit, 120);
        assert_eq!(saved.bedtime_start, Policy::DEFAULT_BEDTIME_START);
        assert!(saved.auto_block_high_risk);
        assert_eq!(saved.updated_at, Some(now));

        let updated = store
            .upsert_policy(
                parent,
                child,
                &PolicyPatch {
                    auto_block_high_risk: Some(false),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(updated.daily_screen_time_limit, 120);
        assert_eq!(updated.age_override, Some(10));
        assert!(!updated.auto_block_high_risk);
        assert_eq!(store.get_policy(parent, child).unwrap(), Some(updated));

        // Keyed by the pair
        assert!(store.get_policy(ParentId::new(2), child).unwrap().is_none());
    }

    pub fn screen_time(store: &dyn Store) {
        let child = ChildId::new(1);
        for (day, minutes) in [(1, 150), (3, 200), (7, 90)] {
            store
                .record_screen_time(ScreenTimeRecord {
                    child_id: child,
                    date: date(day),
                    total_minutes: minutes,
                    app_breakdown: BTreeMap::from([(AppId::new(1), minutes / 2)]),
                })
                .unwrap();
        }

        let week = store.get_screen_time_range(child, date(1), 7).unwrap();
        let days: Vec<_> = week.iter().map(|r| r.date).collect();
        assert_eq!(days, vec![date(1), date(3), date(7)]);

        assert!(store.get_screen_time_range(child, date(1), 0).unwrap().is_empty());
        assert_eq!(store.get_screen_time_range(child, date(2), 2).unwrap().len(), 1);

        // Upsert replaces the day
        store
            .record_screen_time(ScreenTimeRecord {
                child_id: child,
                date: date(3),
                total_minutes: 45,
                app_breakdown: BTreeMap::new(),
            })
            .unwrap();
        let day = store.get_screen_time(child, date(3)).unwrap().unwrap();
        assert_eq!(day.total_minutes, 45);
        assert!(day.app_breakdown.is_empty());

        assert!(store.get_screen_time(ChildId::new(2), date(3)).unwrap().is_none());
    }

    fn social_app(name: &str) -> NewApp {
        NewApp {
            name: name.into(),
            category: "Social".into(),
            age_rating: 13,
            safety_badge: SafetyBadge::HighRisk,
            description: None,
            expert_review: None,
            icon_url: None,
        }
    }

    pub fn find_or_create_app(store: &dyn Store) {
        store.insert_app(app(4, "TikTok", SafetyBadge::HighRisk)).unwrap();

        let existing = store.find_or_create_app(social_app("TikTok")).unwrap();
        assert_eq!(existing.id, AppId::new(4));

        let created = store.find_or_create_app(social_app("Snapchat")).unwrap();
        assert_eq!(created.id, AppId::new(5));
        let again = store.find_or_create_app(social_app("Snapchat")).unwrap();
        assert_eq!(again.id, created.id);

        assert_eq!(store.list_apps().unwrap().len(), 2);
    }

    pub fn screen_time_wide_range(store: &dyn Store) {
        let child = ChildId::new(1);
        let last = guardian_util::last_plain_date();
        for (child_id, day) in [(child, date(1)), (child, last), (ChildId::new(2), date(2))] {
            store
                .record_screen_time(ScreenTimeRecord {
                    child_id,
                    date: day,
                    total_minutes: 60,
                    app_breakdown: BTreeMap::new(),
                })
                .unwrap();
        }

        for days in [3_000_000, u32::MAX] {
            let found: Vec<_> = store
                .get_screen_time_range(child, date(1), days)
                .unwrap()
                .iter()
                .map(|r| r.date)
                .collect();
            assert_eq!(found, vec![date(1), last]);
        }

        assert!(store.get_screen_time_range(child, NaiveDate::MAX, 7).unwrap().is_empty());
    }

    fn seed() -> StoreSeed {
        StoreSeed {
            children: vec![child(1, 1)],
            apps: vec![app(1, "Khan Academy Kids", SafetyBadge::Safe)],
            policies: vec![Policy::defaults_for(ParentId::new(1), ChildId::new(1))],
            installs: vec![install(1, 1)],
            alerts: vec![(alert(1, 1, "First"), true), (alert(1, 1, "Second"), false)],
            screen_time: vec![ScreenTimeRecord {
                child_id: ChildId::new(1),
                date: date(1),
                total_minutes: 83,
                app_breakdown: BTreeMap::new(),
            }],
        }
    }

    pub fn import_seed(store: &dyn Store) {
        assert!(store.import_seed(&seed()).unwrap());

        assert_eq!(store.list_children(ParentId::new(1)).unwrap().len(), 1);
        assert_eq!(store.list_child_apps(ChildId::new(1)).unwrap().len(), 1);
        assert!(store.get_policy(ParentId::new(1), ChildId::new(1)).unwrap().is_some());
        assert!(store.get_screen_time(ChildId::new(1), date(1)).unwrap().is_some());

        let alerts = store.list_alerts(ParentId::new(1)).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(store.count_unread_alerts(ParentId::new(1)).unwrap(), 1);
        let first = alerts.iter().find(|a| a.title == "First").unwrap();
        let second = alerts.iter().find(|a| a.title == "Second").unwrap();
        assert!(first.is_read);
        assert!(first.id < second.id);

        // Populated stores are left alone
        assert!(!store.import_seed(&seed()).unwrap());
        assert_eq!(store.list_alerts(ParentId::new(1)).unwrap().len(), 2);
    }

    pub fn failed_import_writes_nothing(store: &dyn Store) {
        let mut broken = seed();
        // Second install of the same pair fails after everything else is staged
        broken.installs.push(install(1, 1));

        assert!(matches!(
            store.import_seed(&broken).unwrap_err(),
            StoreError::Conflict(_)
        ));

        assert!(store.is_empty().unwrap());
        assert!(store.list_alerts(ParentId::new(1)).unwrap().is_empty());
        assert!(store.get_policy(ParentId::new(1), ChildId::new(1)).unwrap().is_none());
        assert!(store.get_screen_time(ChildId::new(1), date(1)).unwrap().is_none());

        // A later, valid seed still goes in
        assert!(store.import_seed(&seed()).unwrap());
    }
}
