//! Configuration and settings validation

use crate::schema::RawConfig;
use guardian_api::PolicyPatch;
use guardian_util::{ChildId, ParentId, WallClock};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Bounds for the daily screen-time limit, in minutes
pub const SCREEN_TIME_LIMIT_RANGE: std::ops::RangeInclusive<u32> = 30..=480;

/// Bounds for an age override, in years
pub const AGE_OVERRIDE_RANGE: std::ops::RangeInclusive<u8> = 1..=18;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: u64 },

    #[error("Duplicate username: {0}")]
    DuplicateUsername(String),

    #[error("{kind} {id} references unknown {target} {target_id}")]
    UnknownReference {
        kind: &'static str,
        id: String,
        target: &'static str,
        target_id: u64,
    },

    #[error("Child {child_id} belongs to parent {owner}, not parent {claimed}")]
    OwnershipMismatch {
        child_id: ChildId,
        owner: ParentId,
        claimed: ParentId,
    },

    #[error("Invalid {field} '{value}': {message}")]
    InvalidSetting {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("Unknown store backend '{0}' (expected \"memory\" or \"sqlite\")")]
    UnknownStoreBackend(String),
}

/// Range and format checks for a policy update.
///
/// The policy store accepts any value; callers run this first.
pub fn validate_policy_patch(patch: &PolicyPatch) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(limit) = patch.daily_screen_time_limit
        && !SCREEN_TIME_LIMIT_RANGE.contains(&limit)
    {
        errors.push(ValidationError::InvalidSetting {
            field: "daily_screen_time_limit",
            value: limit.to_string(),
            message: format!(
                "must be between {} and {} minutes",
                SCREEN_TIME_LIMIT_RANGE.start(),
                SCREEN_TIME_LIMIT_RANGE.end()
            ),
        });
    }

    for (field, value) in [
        ("bedtime_start", &patch.bedtime_start),
        ("bedtime_end", &patch.bedtime_end),
    ] {
        if let Some(value) = value
            && let Err(message) = WallClock::parse(value)
        {
            errors.push(ValidationError::InvalidSetting {
                field,
                value: value.clone(),
                message,
            });
        }
    }

    if let Some(Some(age)) = patch.age_override
        && !AGE_OVERRIDE_RANGE.contains(&age)
    {
        errors.push(ValidationError::InvalidSetting {
            field: "age_override",
            value: age.to_string(),
            message: format!(
                "must be between {} and {}",
                AGE_OVERRIDE_RANGE.start(),
                AGE_OVERRIDE_RANGE.end()
            ),
        });
    }

    errors
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(backend) = &config.service.store
        && !matches!(backend.as_str(), "memory" | "sqlite")
    {
        errors.push(ValidationError::UnknownStoreBackend(backend.clone()));
    }

    // Unique ids and usernames
    let mut parent_ids = HashSet::new();
    let mut usernames = HashSet::new();
    for parent in &config.parents {
        if !parent_ids.insert(parent.id) {
            errors.push(ValidationError::DuplicateId {
                kind: "parent",
                id: parent.id.get(),
            });
        }
        if !usernames.insert(parent.username.as_str()) {
            errors.push(ValidationError::DuplicateUsername(parent.username.clone()));
        }
    }

    let mut owners: HashMap<ChildId, ParentId> = HashMap::new();
    for child in &config.children {
        if owners.insert(child.id, child.parent_id).is_some() {
            errors.push(ValidationError::DuplicateId {
                kind: "child",
                id: child.id.get(),
            });
        }
        if !parent_ids.contains(&child.parent_id) {
            errors.push(ValidationError::UnknownReference {
                kind: "child",
                id: child.id.to_string(),
                target: "parent",
                target_id: child.parent_id.get(),
            });
        }
    }

    let mut app_ids = HashSet::new();
    for app in &config.apps {
        if !app_ids.insert(app.id) {
            errors.push(ValidationError::DuplicateId {
                kind: "app",
                id: app.id.get(),
            });
        }
    }

    let mut check_owner = |kind: &'static str, child_id: ChildId, parent_id: ParentId| {
        match owners.get(&child_id) {
            None => errors.push(ValidationError::UnknownReference {
                kind,
                id: format!("for child {}", child_id),
                target: "child",
                target_id: child_id.get(),
            }),
            Some(owner) if *owner != parent_id => {
                errors.push(ValidationError::OwnershipMismatch {
                    child_id,
                    owner: *owner,
                    claimed: parent_id,
                })
            }
            Some(_) => {}
        }
    };

    for policy in &config.policies {
        check_owner("policy", policy.child_id, policy.parent_id);
    }
    for alert in &config.alerts {
        check_owner("alert", alert.child_id, alert.parent_id);
    }

    for policy in &config.policies {
        errors.extend(validate_policy_patch(&policy.settings));
    }

    for day in &config.screen_time {
        if !owners.contains_key(&day.child_id) {
            errors.push(ValidationError::UnknownReference {
                kind: "screen_time",
                id: day.date.to_string(),
                target: "child",
                target_id: day.child_id.get(),
            });
        }
    }

    let mut installed = HashSet::new();
    for install in &config.installs {
        if !owners.contains_key(&install.child_id) {
            errors.push(ValidationError::UnknownReference {
                kind: "install",
                id: format!("of app {}", install.app_id),
                target: "child",
                target_id: install.child_id.get(),
            });
        }
        if !app_ids.contains(&install.app_id) {
            errors.push(ValidationError::UnknownReference {
                kind: "install",
                id: format!("for child {}", install.child_id),
                target: "app",
                target_id: install.app_id.get(),
            });
        }
        if !installed.insert((install.child_id, install.app_id)) {
            errors.push(ValidationError::InvalidSetting {
                field: "installs",
                value: format!("child {} / app {}", install.child_id, install.app_id),
                message: "app listed twice for the same child".into(),
            });
        }
    }

    errors
}
