//! Event types for guardiand -> client streaming

use chrono::{DateTime, Local};
use guardian_util::{AppId, ChildId, ParentId};
use serde::{Deserialize, Serialize};

use crate::{Alert, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: guardian_util::now(),
            payload,
        }
    }

    /// Parent this event concerns; `None` for service-wide events
    pub fn parent_id(&self) -> Option<ParentId> {
        match &self.payload {
            EventPayload::AlertRaised { alert } => Some(alert.parent_id),
            EventPayload::AppInstalled { parent_id, .. } => Some(*parent_id),
            EventPayload::PolicyUpdated { parent_id, .. } => Some(*parent_id),
            EventPayload::Shutdown => None,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new alert was appended to a parent's ledger
    AlertRaised { alert: Alert },

    AppInstalled {
        parent_id: ParentId,
        child_id: ChildId,
        app_id: AppId,
        blocked: bool,
    },

    PolicyUpdated {
        parent_id: ParentId,
        child_id: ChildId,
    },

    /// Service is shutting down
    Shutdown,
}
