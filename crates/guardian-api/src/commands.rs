//! Command types for the guardiand protocol

use chrono::NaiveDate;
use guardian_util::{AlertId, AppId, ChildId, ClientId, GuardianError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    Alert, App, Child, ChildApp, ChildAppPatch, HealthStatus, InstalledApp, ParentProfile, Policy,
    PolicyPatch, ScreenTimeRecord, API_VERSION,
};

/// Number of days returned by a screen-time range query when unspecified
pub const DEFAULT_SCREEN_TIME_DAYS: u32 = 7;

/// Longest screen-time range a single query may ask for
pub const MAX_SCREEN_TIME_DAYS: u32 = 366;

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }

    /// Build a response from a core result
    pub fn from_result(
        request_id: u64,
        result: Result<ResponsePayload, GuardianError>,
    ) -> Self {
        match result {
            Ok(payload) => Self::success(request_id, payload),
            Err(e) => Self::error(request_id, ErrorInfo::from(&e)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&GuardianError> for ErrorInfo {
    fn from(e: &GuardianError) -> Self {
        let code = match e {
            GuardianError::NotFound(_) => ErrorCode::NotFound,
            GuardianError::AccessDenied(_) => ErrorCode::AccessDenied,
            GuardianError::Conflict(_) => ErrorCode::Conflict,
            GuardianError::ValidationError(_) => ErrorCode::ValidationFailed,
            GuardianError::StoreError(_) => ErrorCode::StoreError,
            GuardianError::Internal(_) => ErrorCode::InternalError,
        };
        Self::new(code, e.to_string())
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthenticated,
    NotFound,
    AccessDenied,
    Conflict,
    ValidationFailed,
    RateLimited,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Bind this connection to a parent account
    Login { username: String, password: String },

    Logout,

    /// Profile of the logged-in parent
    WhoAmI,

    ListChildren,

    GetChild { child_id: ChildId },

    /// Full app catalog
    ListApps,

    /// Apps installed for a child, joined with catalog entries
    ListChildApps { child_id: ChildId },

    InstallApp { child_id: ChildId, app_id: AppId },

    /// Block/unblock or adjust today's usage
    UpdateChildApp {
        child_id: ChildId,
        app_id: AppId,
        changes: ChildAppPatch,
    },

    /// Demo flow: install an app by name, adding it to the catalog as
    /// high-risk if it does not exist yet
    SimulateInstall {
        child_id: ChildId,
        #[serde(default)]
        app_name: Option<String>,
    },

    ListAlerts,

    UnreadAlertCount,

    MarkAlertRead { alert_id: AlertId },

    GetPolicy { child_id: ChildId },

    SetPolicy {
        child_id: ChildId,
        changes: PolicyPatch,
    },

    /// Upsert one day of screen time (device agent feed)
    RecordScreenTime {
        child_id: ChildId,
        date: NaiveDate,
        total_minutes: u32,
        #[serde(default)]
        app_breakdown: BTreeMap<AppId, u32>,
    },

    /// Without `start_date`: today's record only. With it: the recorded
    /// days among `days` consecutive days.
    GetScreenTime {
        child_id: ChildId,
        #[serde(default)]
        start_date: Option<NaiveDate>,
        #[serde(default)]
        days: Option<u32>,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    Ping,
}

impl Command {
    /// Commands that may be sent before logging in
    pub fn allowed_anonymously(&self) -> bool {
        matches!(
            self,
            Command::Login { .. } | Command::GetHealth | Command::Ping
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    LoggedIn { parent: ParentProfile },
    LoggedOut,
    Profile { parent: ParentProfile },
    Children { children: Vec<Child> },
    Child { child: Child },
    Apps { apps: Vec<App> },
    ChildApps { apps: Vec<InstalledApp> },
    ChildApp { child_app: ChildApp },
    Alerts { alerts: Vec<Alert> },
    UnreadCount { count: usize },
    Alert { alert: Alert },
    Policy { policy: Policy },
    ScreenTimeRecorded { record: ScreenTimeRecord },
    ScreenTimeDay { record: Option<ScreenTimeRecord> },
    ScreenTimeRange { records: Vec<ScreenTimeRecord> },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health { health: HealthStatus },
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
