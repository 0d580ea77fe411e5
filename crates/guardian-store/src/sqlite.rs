//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use guardian_api::{
    Alert, App, Child, ChildApp, ChildAppPatch, NewAlert, NewApp, Policy, PolicyPatch,
    ScreenTimeRecord,
};
use guardian_util::{AlertId, AppId, ChildId, ParentId};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::traits::sort_newest_first;
use crate::{Store, StoreError, StoreResult, StoreSeed};

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "guardian.db";

const APP_COLUMNS: &str =
    "id, name, category, age_rating, safety_badge, description, expert_review, icon_url, created_at";
const CHILD_COLUMNS: &str = "id, parent_id, name, age, device_info, profile_image, created_at";
const CHILD_APP_COLUMNS: &str = "child_id, app_id, is_blocked, screen_time_today, installed_at";
const ALERT_COLUMNS: &str =
    "id, parent_id, child_id, alert_type, title, message, severity, is_read, metadata_json, created_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open or create `guardian.db` inside `data_dir`, creating the directory
    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        Self::open(data_dir.as_ref().join(DATABASE_FILE))
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Catalog (append-only)
            CREATE TABLE IF NOT EXISTS apps (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                age_rating INTEGER NOT NULL,
                safety_badge TEXT NOT NULL,
                description TEXT,
                expert_review TEXT,
                icon_url TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS children (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                age INTEGER NOT NULL,
                device_info TEXT,
                profile_image TEXT,
                created_at TEXT NOT NULL
            );

            -- One row per installed (child, app)
            CREATE TABLE IF NOT EXISTS child_apps (
                child_id INTEGER NOT NULL,
                app_id INTEGER NOT NULL,
                is_blocked INTEGER NOT NULL,
                screen_time_today INTEGER NOT NULL DEFAULT 0,
                installed_at TEXT NOT NULL,
                PRIMARY KEY (child_id, app_id)
            );

            -- Alert ledger
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER NOT NULL,
                child_id INTEGER NOT NULL,
                alert_type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                severity TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Last-write-wins policy per (parent, child)
            CREATE TABLE IF NOT EXISTS policies (
                parent_id INTEGER NOT NULL,
                child_id INTEGER NOT NULL,
                policy_json TEXT NOT NULL,
                PRIMARY KEY (parent_id, child_id)
            );

            CREATE TABLE IF NOT EXISTS screen_time (
                child_id INTEGER NOT NULL,
                day TEXT NOT NULL,
                total_minutes INTEGER NOT NULL,
                breakdown_json TEXT NOT NULL,
                PRIMARY KEY (child_id, day)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_children_parent ON children(parent_id);
            CREATE INDEX IF NOT EXISTS idx_alerts_parent ON alerts(parent_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn sql_id(id: u64) -> i64 {
    id as i64
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

/// Serde enums are stored by their wire name
fn enum_to_sql<T: Serialize>(value: &T) -> StoreResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::Serialization(format!(
            "expected a string variant, got {}",
            other
        ))),
    }
}

fn enum_from_sql<T: DeserializeOwned>(s: String) -> StoreResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(s))?)
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_day(s: &str) -> StoreResult<NaiveDate> {
    guardian_util::parse_date(s).map_err(StoreError::Serialization)
}

// Rows are read as plain column tuples inside rusqlite closures and
// converted afterwards, so conversion errors surface as `StoreError`.

struct AppRow {
    id: i64,
    name: String,
    category: String,
    age_rating: u8,
    safety_badge: String,
    description: Option<String>,
    expert_review: Option<String>,
    icon_url: Option<String>,
    created_at: String,
}

impl AppRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            age_rating: row.get(3)?,
            safety_badge: row.get(4)?,
            description: row.get(5)?,
            expert_review: row.get(6)?,
            icon_url: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_app(self) -> StoreResult<App> {
        Ok(App {
            id: AppId::new(self.id as u64),
            name: self.name,
            category: self.category,
            age_rating: self.age_rating,
            safety_badge: enum_from_sql(self.safety_badge)?,
            description: self.description,
            expert_review: self.expert_review,
            icon_url: self.icon_url,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct ChildRow {
    id: i64,
    parent_id: i64,
    name: String,
    age: u8,
    device_info: Option<String>,
    profile_image: Option<String>,
    created_at: String,
}

impl ChildRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            name: row.get(2)?,
            age: row.get(3)?,
            device_info: row.get(4)?,
            profile_image: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_child(self) -> StoreResult<Child> {
        Ok(Child {
            id: ChildId::new(self.id as u64),
            parent_id: ParentId::new(self.parent_id as u64),
            name: self.name,
            age: self.age,
            device_info: self.device_info,
            profile_image: self.profile_image,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct ChildAppRow {
    child_id: i64,
    app_id: i64,
    is_blocked: bool,
    screen_time_today: u32,
    installed_at: String,
}

impl ChildAppRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            child_id: row.get(0)?,
            app_id: row.get(1)?,
            is_blocked: row.get(2)?,
            screen_time_today: row.get(3)?,
            installed_at: row.get(4)?,
        })
    }

    fn into_child_app(self) -> StoreResult<ChildApp> {
        Ok(ChildApp {
            child_id: ChildId::new(self.child_id as u64),
            app_id: AppId::new(self.app_id as u64),
            is_blocked: self.is_blocked,
            screen_time_today: self.screen_time_today,
            installed_at: parse_timestamp(&self.installed_at)?,
        })
    }
}

struct AlertRow {
    id: i64,
    parent_id: i64,
    child_id: i64,
    alert_type: String,
    title: String,
    message: String,
    severity: String,
    is_read: bool,
    metadata_json: String,
    created_at: String,
}

impl AlertRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            child_id: row.get(2)?,
            alert_type: row.get(3)?,
            title: row.get(4)?,
            message: row.get(5)?,
            severity: row.get(6)?,
            is_read: row.get(7)?,
            metadata_json: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_alert(self) -> StoreResult<Alert> {
        Ok(Alert {
            id: AlertId::new(self.id as u64),
            parent_id: ParentId::new(self.parent_id as u64),
            child_id: ChildId::new(self.child_id as u64),
            alert_type: enum_from_sql(self.alert_type)?,
            title: self.title,
            message: self.message,
            severity: enum_from_sql(self.severity)?,
            is_read: self.is_read,
            metadata: serde_json::from_str(&self.metadata_json)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn query_app(conn: &Connection, app_id: AppId) -> StoreResult<Option<App>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM apps WHERE id = ?", APP_COLUMNS),
            [sql_id(app_id.get())],
            AppRow::read,
        )
        .optional()?;
    row.map(AppRow::into_app).transpose()
}

fn query_child_app(
    conn: &Connection,
    child_id: ChildId,
    app_id: AppId,
) -> StoreResult<Option<ChildApp>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM child_apps WHERE child_id = ? AND app_id = ?",
                CHILD_APP_COLUMNS
            ),
            params![sql_id(child_id.get()), sql_id(app_id.get())],
            ChildAppRow::read,
        )
        .optional()?;
    row.map(ChildAppRow::into_child_app).transpose()
}

fn query_alert(conn: &Connection, alert_id: AlertId) -> StoreResult<Option<Alert>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM alerts WHERE id = ?", ALERT_COLUMNS),
            [sql_id(alert_id.get())],
            AlertRow::read,
        )
        .optional()?;
    row.map(AlertRow::into_alert).transpose()
}

fn insert_child_app_row(conn: &Connection, install: &ChildApp) -> StoreResult<()> {
    let result = conn.execute(
        &format!(
            "INSERT INTO child_apps ({}) VALUES (?, ?, ?, ?, ?)",
            CHILD_APP_COLUMNS
        ),
        params![
            sql_id(install.child_id.get()),
            sql_id(install.app_id.get()),
            install.is_blocked,
            install.screen_time_today,
            install.installed_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(StoreError::Conflict(format!(
            "app {} already installed for child {}",
            install.app_id, install.child_id
        ))),
        Err(e) => Err(e.into()),
    }
}

fn insert_alert_row(conn: &Connection, alert: NewAlert) -> StoreResult<Alert> {
    let created_at = guardian_util::now();

    conn.execute(
        r#"
        INSERT INTO alerts (parent_id, child_id, alert_type, title, message, severity, is_read, metadata_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
        params![
            sql_id(alert.parent_id.get()),
            sql_id(alert.child_id.get()),
            enum_to_sql(&alert.alert_type)?,
            alert.title,
            alert.message,
            enum_to_sql(&alert.severity)?,
            serde_json::to_string(&alert.metadata)?,
            created_at.to_rfc3339(),
        ],
    )?;

    let id = AlertId::new(conn.last_insert_rowid() as u64);
    Ok(alert.into_alert(id, created_at))
}

fn query_app_by_name(conn: &Connection, name: &str) -> StoreResult<Option<App>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM apps WHERE name = ? ORDER BY id LIMIT 1",
                APP_COLUMNS
            ),
            [name],
            AppRow::read,
        )
        .optional()?;
    row.map(AppRow::into_app).transpose()
}

fn insert_new_app_row(conn: &Connection, app: NewApp) -> StoreResult<App> {
    let created_at = guardian_util::now();

    conn.execute(
        r#"
        INSERT INTO apps (name, category, age_rating, safety_badge, description, expert_review, icon_url, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            app.name,
            app.category,
            app.age_rating,
            app.safety_badge.as_str(),
            app.description,
            app.expert_review,
            app.icon_url,
            created_at.to_rfc3339(),
        ],
    )?;

    let app = App {
        id: AppId::new(conn.last_insert_rowid() as u64),
        name: app.name,
        category: app.category,
        age_rating: app.age_rating,
        safety_badge: app.safety_badge,
        description: app.description,
        expert_review: app.expert_review,
        icon_url: app.icon_url,
        created_at,
    };

    debug!(app_id = %app.id, name = %app.name, "App added to catalog");
    Ok(app)
}

fn insert_app_row(conn: &Connection, app: &App) -> StoreResult<()> {
    let result = conn.execute(
        &format!(
            "INSERT INTO apps ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            APP_COLUMNS
        ),
        params![
            sql_id(app.id.get()),
            app.name,
            app.category,
            app.age_rating,
            app.safety_badge.as_str(),
            app.description,
            app.expert_review,
            app.icon_url,
            app.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => {
            Err(StoreError::Conflict(format!("app {} already exists", app.id)))
        }
        Err(e) => Err(e.into()),
    }
}

fn insert_child_row(conn: &Connection, child: &Child) -> StoreResult<()> {
    let result = conn.execute(
        &format!(
            "INSERT INTO children ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            CHILD_COLUMNS
        ),
        params![
            sql_id(child.id.get()),
            sql_id(child.parent_id.get()),
            child.name,
            child.age,
            child.device_info,
            child.profile_image,
            child.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => {
            Err(StoreError::Conflict(format!("child {} already exists", child.id)))
        }
        Err(e) => Err(e.into()),
    }
}

fn mark_alert_read_row(conn: &Connection, alert_id: AlertId) -> StoreResult<Alert> {
    conn.execute(
        "UPDATE alerts SET is_read = 1 WHERE id = ?",
        [sql_id(alert_id.get())],
    )?;
    query_alert(conn, alert_id)?
        .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))
}

fn query_policy(
    conn: &Connection,
    parent_id: ParentId,
    child_id: ChildId,
) -> StoreResult<Option<Policy>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT policy_json FROM policies WHERE parent_id = ? AND child_id = ?",
            params![sql_id(parent_id.get()), sql_id(child_id.get())],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

fn put_policy_row(conn: &Connection, policy: &Policy) -> StoreResult<()> {
    conn.execute(
        r#"
        INSERT INTO policies (parent_id, child_id, policy_json)
        VALUES (?, ?, ?)
        ON CONFLICT(parent_id, child_id)
        DO UPDATE SET policy_json = excluded.policy_json
        "#,
        params![
            sql_id(policy.parent_id.get()),
            sql_id(policy.child_id.get()),
            serde_json::to_string(policy)?,
        ],
    )?;
    Ok(())
}

fn record_screen_time_row(conn: &Connection, record: &ScreenTimeRecord) -> StoreResult<()> {
    conn.execute(
        r#"
        INSERT INTO screen_time (child_id, day, total_minutes, breakdown_json)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(child_id, day)
        DO UPDATE SET total_minutes = excluded.total_minutes,
                      breakdown_json = excluded.breakdown_json
        "#,
        params![
            sql_id(record.child_id.get()),
            guardian_util::format_date(record.date),
            record.total_minutes,
            serde_json::to_string(&record.app_breakdown)?,
        ],
    )?;
    Ok(())
}

fn store_is_empty(conn: &Connection) -> StoreResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM children) + (SELECT COUNT(*) FROM apps)",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 0)
}

impl Store for SqliteStore {
    fn get_app(&self, app_id: AppId) -> StoreResult<Option<App>> {
        let conn = self.conn()?;
        query_app(&conn, app_id)
    }

    fn list_apps(&self) -> StoreResult<Vec<App>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM apps ORDER BY id", APP_COLUMNS))?;
        let rows = stmt.query_map([], AppRow::read)?;

        let mut apps = Vec::new();
        for row in rows {
            apps.push(row?.into_app()?);
        }
        Ok(apps)
    }

    fn find_app_by_name(&self, name: &str) -> StoreResult<Option<App>> {
        let conn = self.conn()?;
        query_app_by_name(&conn, name)
    }

    fn create_app(&self, app: NewApp) -> StoreResult<App> {
        let conn = self.conn()?;
        insert_new_app_row(&conn, app)
    }

    fn find_or_create_app(&self, app: NewApp) -> StoreResult<App> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(existing) = query_app_by_name(&tx, &app.name)? {
            return Ok(existing);
        }
        let app = insert_new_app_row(&tx, app)?;
        tx.commit()?;
        Ok(app)
    }

    fn insert_app(&self, app: App) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_app_row(&conn, &app)
    }

    fn get_child(&self, child_id: ChildId) -> StoreResult<Option<Child>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM children WHERE id = ?", CHILD_COLUMNS),
                [sql_id(child_id.get())],
                ChildRow::read,
            )
            .optional()?;
        row.map(ChildRow::into_child).transpose()
    }

    fn list_children(&self, parent_id: ParentId) -> StoreResult<Vec<Child>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children WHERE parent_id = ? ORDER BY id",
            CHILD_COLUMNS
        ))?;
        let rows = stmt.query_map([sql_id(parent_id.get())], ChildRow::read)?;

        let mut children = Vec::new();
        for row in rows {
            children.push(row?.into_child()?);
        }
        Ok(children)
    }

    fn insert_child(&self, child: Child) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_child_row(&conn, &child)
    }

    fn get_child_app(&self, child_id: ChildId, app_id: AppId) -> StoreResult<Option<ChildApp>> {
        let conn = self.conn()?;
        query_child_app(&conn, child_id, app_id)
    }

    fn list_child_apps(&self, child_id: ChildId) -> StoreResult<Vec<ChildApp>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM child_apps WHERE child_id = ? ORDER BY app_id",
            CHILD_APP_COLUMNS
        ))?;
        let rows = stmt.query_map([sql_id(child_id.get())], ChildAppRow::read)?;

        let mut installs = Vec::new();
        for row in rows {
            installs.push(row?.into_child_app()?);
        }
        Ok(installs)
    }

    fn install_with_alert(
        &self,
        install: ChildApp,
        alert: NewAlert,
    ) -> StoreResult<(ChildApp, Alert)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // Dropping `tx` on an early return rolls back
        insert_child_app_row(&tx, &install)?;
        let alert = insert_alert_row(&tx, alert)?;
        tx.commit()?;

        debug!(
            child_id = %install.child_id,
            app_id = %install.app_id,
            alert_id = %alert.id,
            "Install recorded"
        );
        Ok((install, alert))
    }

    fn insert_child_app(&self, install: ChildApp) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_child_app_row(&conn, &install)
    }

    fn update_child_app(
        &self,
        child_id: ChildId,
        app_id: AppId,
        patch: &ChildAppPatch,
    ) -> StoreResult<ChildApp> {
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            UPDATE child_apps
            SET is_blocked = COALESCE(?, is_blocked),
                screen_time_today = COALESCE(?, screen_time_today)
            WHERE child_id = ? AND app_id = ?
            "#,
            params![
                patch.is_blocked,
                patch.screen_time_today,
                sql_id(child_id.get()),
                sql_id(app_id.get()),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "app {} is not installed for child {}",
                app_id, child_id
            )));
        }

        query_child_app(&conn, child_id, app_id)?.ok_or_else(|| {
            StoreError::NotFound(format!("app {} is not installed for child {}", app_id, child_id))
        })
    }

    fn append_alert(&self, alert: NewAlert) -> StoreResult<Alert> {
        let conn = self.conn()?;
        let alert = insert_alert_row(&conn, alert)?;
        debug!(alert_id = %alert.id, parent_id = %alert.parent_id, "Alert appended");
        Ok(alert)
    }

    fn get_alert(&self, alert_id: AlertId) -> StoreResult<Option<Alert>> {
        let conn = self.conn()?;
        query_alert(&conn, alert_id)
    }

    fn list_alerts(&self, parent_id: ParentId) -> StoreResult<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts WHERE parent_id = ?",
            ALERT_COLUMNS
        ))?;
        let rows = stmt.query_map([sql_id(parent_id.get())], AlertRow::read)?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?.into_alert()?);
        }
        // Text timestamps do not sort across UTC offsets
        sort_newest_first(&mut alerts);
        Ok(alerts)
    }

    fn count_unread_alerts(&self, parent_id: ParentId) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE parent_id = ? AND is_read = 0",
            [sql_id(parent_id.get())],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn mark_alert_read(&self, alert_id: AlertId) -> StoreResult<Alert> {
        let conn = self.conn()?;
        mark_alert_read_row(&conn, alert_id)
    }

    fn get_policy(&self, parent_id: ParentId, child_id: ChildId) -> StoreResult<Option<Policy>> {
        let conn = self.conn()?;
        query_policy(&conn, parent_id, child_id)
    }

    fn upsert_policy(
        &self,
        parent_id: ParentId,
        child_id: ChildId,
        patch: &PolicyPatch,
        now: DateTime<Local>,
    ) -> StoreResult<Policy> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut policy = query_policy(&tx, parent_id, child_id)?
            .unwrap_or_else(|| Policy::defaults_for(parent_id, child_id));
        policy.apply(patch, now);
        put_policy_row(&tx, &policy)?;
        tx.commit()?;

        debug!(parent_id = %parent_id, child_id = %child_id, "Policy saved");
        Ok(policy)
    }

    fn record_screen_time(&self, record: ScreenTimeRecord) -> StoreResult<ScreenTimeRecord> {
        let conn = self.conn()?;
        record_screen_time_row(&conn, &record)?;
        Ok(record)
    }

    fn get_screen_time(
        &self,
        child_id: ChildId,
        date: NaiveDate,
    ) -> StoreResult<Option<ScreenTimeRecord>> {
        let conn = self.conn()?;
        let row: Option<(u32, String)> = conn
            .query_row(
                "SELECT total_minutes, breakdown_json FROM screen_time WHERE child_id = ? AND day = ?",
                params![sql_id(child_id.get()), guardian_util::format_date(date)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((total_minutes, breakdown)) => Ok(Some(ScreenTimeRecord {
                child_id,
                date,
                total_minutes,
                app_breakdown: serde_json::from_str(&breakdown)?,
            })),
            None => Ok(None),
        }
    }

    fn get_screen_time_range(
        &self,
        child_id: ChildId,
        start: NaiveDate,
        days: u32,
    ) -> StoreResult<Vec<ScreenTimeRecord>> {
        // Both bounds keep four-digit years so text order is date order
        let Some((start, end)) = guardian_util::date_range_bounds(start, days) else {
            return Ok(Vec::new());
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT day, total_minutes, breakdown_json FROM screen_time
            WHERE child_id = ? AND day BETWEEN ? AND ?
            ORDER BY day
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                sql_id(child_id.get()),
                guardian_util::format_date(start),
                guardian_util::format_date(end),
            ],
            |row| {
                let day: String = row.get(0)?;
                let total: u32 = row.get(1)?;
                let breakdown: String = row.get(2)?;
                Ok((day, total, breakdown))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (day, total_minutes, breakdown) = row?;
            records.push(ScreenTimeRecord {
                child_id,
                date: parse_day(&day)?,
                total_minutes,
                app_breakdown: serde_json::from_str(&breakdown)?,
            });
        }
        Ok(records)
    }

    fn is_empty(&self) -> StoreResult<bool> {
        let conn = self.conn()?;
        store_is_empty(&conn)
    }

    fn import_seed(&self, seed: &StoreSeed) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if !store_is_empty(&tx)? {
            return Ok(false);
        }

        // Dropping `tx` on an early return rolls back
        for child in &seed.children {
            insert_child_row(&tx, child)?;
        }
        for app in &seed.apps {
            insert_app_row(&tx, app)?;
        }
        for policy in &seed.policies {
            put_policy_row(&tx, policy)?;
        }
        for install in &seed.installs {
            insert_child_app_row(&tx, install)?;
        }
        for (alert, is_read) in &seed.alerts {
            let alert = insert_alert_row(&tx, alert.clone())?;
            if *is_read {
                mark_alert_read_row(&tx, alert.id)?;
            }
        }
        for record in &seed.screen_time {
            record_screen_time_row(&tx, record)?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::conformance;
    use guardian_api::SafetyBadge;

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_catalog() {
        conformance::catalog(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_children() {
        conformance::children(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_install_is_unique_and_atomic() {
        conformance::install_is_unique_and_atomic(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_update_child_app() {
        conformance::update_child_app(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_alert_ledger() {
        conformance::alert_ledger(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_policy_upsert() {
        conformance::policy_upsert(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_screen_time() {
        conformance::screen_time(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_screen_time_wide_range() {
        conformance::screen_time_wide_range(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_find_or_create_app() {
        conformance::find_or_create_app(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_import_seed() {
        conformance::import_seed(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_failed_import_writes_nothing() {
        conformance::failed_import_writes_nothing(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_failed_import_is_retried_after_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = SqliteStore::open_in_dir(dir.path()).unwrap();
            let mut seed = StoreSeed {
                children: vec![conformance::child(1, 1)],
                ..Default::default()
            };
            seed.children.push(conformance::child(1, 1));
            assert!(store.import_seed(&seed).is_err());
        }

        let store = SqliteStore::open_in_dir(dir.path()).unwrap();
        assert!(store.is_empty().unwrap());
        let seed = StoreSeed {
            children: vec![conformance::child(1, 1)],
            ..Default::default()
        };
        assert!(store.import_seed(&seed).unwrap());
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = SqliteStore::open_in_dir(dir.path()).unwrap();
            store
                .insert_app(conformance::app(4, "TikTok", SafetyBadge::HighRisk))
                .unwrap();
            store.insert_child(conformance::child(1, 1)).unwrap();
            store
                .install_with_alert(
                    conformance::install(1, 4),
                    conformance::alert(1, 1, "High Risk App Detected"),
                )
                .unwrap();
        }

        let store = SqliteStore::open_in_dir(dir.path()).unwrap();
        assert!(!store.is_empty().unwrap());
        assert!(store
            .get_child_app(ChildId::new(1), AppId::new(4))
            .unwrap()
            .is_some());

        let alerts = store.list_alerts(ParentId::new(1)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metadata["appId"], 1);
        assert_eq!(
            store.get_app(AppId::new(4)).unwrap().unwrap().safety_badge,
            SafetyBadge::HighRisk
        );
    }
}
