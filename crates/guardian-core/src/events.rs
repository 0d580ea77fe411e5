//! Core events emitted by the engine

use guardian_api::Alert;
use guardian_util::{AppId, ChildId, ParentId};

/// Events emitted by the core engine
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// An alert was appended to a parent's ledger
    AlertRaised { alert: Alert },

    /// An app was installed for a child
    AppInstalled {
        parent_id: ParentId,
        child_id: ChildId,
        app_id: AppId,
        blocked: bool,
    },

    /// A parent saved settings for a child
    PolicyUpdated {
        parent_id: ParentId,
        child_id: ChildId,
    },
}
