//! Install-time policy evaluation
//!
//! Pure decision logic: given the policy in force, the catalog entry and the
//! child, decide whether the install is blocked and which alert to raise.
//! Nothing here touches the store.

use guardian_api::{AlertSeverity, AlertType, App, Child, NewAlert, Policy, SafetyBadge};
use serde_json::json;

/// Outcome of evaluating an install
#[derive(Debug, Clone, PartialEq)]
pub struct InstallDecision {
    /// Whether the app starts out blocked
    pub blocked: bool,
    /// The single alert this install raises
    pub alert: NewAlert,
}

/// Decide block/allow and build the alert for installing `app` for `child`.
pub fn evaluate_install(policy: &Policy, app: &App, child: &Child) -> InstallDecision {
    let blocked = policy.auto_block_high_risk && app.safety_badge == SafetyBadge::HighRisk;

    let (alert_type, severity, title, message) = if blocked {
        (
            AlertType::HighRisk,
            AlertSeverity::Danger,
            "High Risk App Detected",
            format!(
                "{} has been installed and automatically blocked due to age-inappropriate content for {} (Age {}).",
                app.name, child.name, child.age
            ),
        )
    } else {
        let (severity, rating) = match app.safety_badge {
            SafetyBadge::Safe => (AlertSeverity::Info, "certified safe"),
            // High-risk apps that slipped past a disabled auto-block are
            // reported with moderate wording
            SafetyBadge::Moderate | SafetyBadge::HighRisk => {
                (AlertSeverity::Warning, "marked as moderate risk")
            }
        };
        (
            AlertType::AppInstall,
            severity,
            "New App Installed",
            format!(
                "{} has been installed. This app is {} for {}'s age group ({} years old).",
                app.name, rating, child.name, child.age
            ),
        )
    };

    InstallDecision {
        blocked,
        alert: NewAlert {
            parent_id: policy.parent_id,
            child_id: child.id,
            alert_type,
            title: title.to_string(),
            message,
            severity,
            metadata: json!({ "appId": app.id, "appName": app.name }),
        },
    }
}
