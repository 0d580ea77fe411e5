//! Command dispatch: authentication, validation and engine calls

use guardian_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response, ResponsePayload,
    DEFAULT_SCREEN_TIME_DAYS, MAX_SCREEN_TIME_DAYS,
};
use guardian_config::{validate_policy_patch, ServiceConfig};
use guardian_core::{CoreEvent, Guardian};
use guardian_util::{ClientId, GuardianError, ParentId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Change to a connection's session state requested by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    LoggedIn(ParentId),
    LoggedOut,
    Subscribed(bool),
}

/// Everything the service loop needs to act on after one command
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub events: Vec<CoreEvent>,
    pub session: Option<SessionChange>,
}

impl Dispatched {
    fn reply(response: Response) -> Self {
        Self {
            response,
            events: Vec::new(),
            session: None,
        }
    }
}

pub struct Dispatcher {
    config: Arc<ServiceConfig>,
    guardian: Guardian,
}

impl Dispatcher {
    pub fn new(config: Arc<ServiceConfig>, guardian: Guardian) -> Self {
        Self { config, guardian }
    }

    /// Handle one command from a connection logged in as `parent`, if any
    pub fn dispatch(
        &self,
        client_id: &ClientId,
        parent: Option<ParentId>,
        request_id: u64,
        command: Command,
        connected_clients: usize,
    ) -> Dispatched {
        let parent_id = match parent {
            Some(p) => p,
            None if command.allowed_anonymously() => ParentId::new(0),
            None => {
                debug!(client_id = %client_id, ?command, "Unauthenticated command rejected");
                return Dispatched::reply(Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::Unauthenticated, "Login required"),
                ));
            }
        };

        match command {
            Command::Login { username, password } => self.login(client_id, request_id, &username, &password),

            Command::Logout => {
                info!(client_id = %client_id, parent_id = %parent_id, "Parent logged out");
                Dispatched {
                    response: Response::success(request_id, ResponsePayload::LoggedOut),
                    events: Vec::new(),
                    session: Some(SessionChange::LoggedOut),
                }
            }

            Command::WhoAmI => {
                let result = self
                    .config
                    .get_parent(parent_id)
                    .map(|account| ResponsePayload::Profile {
                        parent: account.profile(),
                    })
                    .ok_or_else(|| GuardianError::not_found(format!("parent {}", parent_id)));
                Dispatched::reply(Response::from_result(request_id, result))
            }

            Command::ListChildren => self.query(request_id, || {
                Ok(ResponsePayload::Children {
                    children: self.guardian.list_children(parent_id)?,
                })
            }),

            Command::GetChild { child_id } => self.query(request_id, || {
                Ok(ResponsePayload::Child {
                    child: self.guardian.get_child(parent_id, child_id)?,
                })
            }),

            Command::ListApps => self.query(request_id, || {
                Ok(ResponsePayload::Apps {
                    apps: self.guardian.list_apps()?,
                })
            }),

            Command::ListChildApps { child_id } => self.query(request_id, || {
                Ok(ResponsePayload::ChildApps {
                    apps: self.guardian.list_child_apps(parent_id, child_id)?,
                })
            }),

            Command::InstallApp { child_id, app_id } => {
                match self.guardian.install_app(parent_id, child_id, app_id) {
                    Ok(outcome) => Dispatched {
                        events: outcome.events(),
                        response: Response::success(
                            request_id,
                            ResponsePayload::ChildApp {
                                child_app: outcome.child_app,
                            },
                        ),
                        session: None,
                    },
                    Err(e) => self.failed(request_id, e),
                }
            }

            Command::SimulateInstall { child_id, app_name } => {
                match self
                    .guardian
                    .simulate_install(parent_id, child_id, app_name.as_deref())
                {
                    Ok(outcome) => Dispatched {
                        events: outcome.events(),
                        response: Response::success(
                            request_id,
                            ResponsePayload::ChildApp {
                                child_app: outcome.child_app,
                            },
                        ),
                        session: None,
                    },
                    Err(e) => self.failed(request_id, e),
                }
            }

            Command::UpdateChildApp {
                child_id,
                app_id,
                changes,
            } => self.query(request_id, || {
                Ok(ResponsePayload::ChildApp {
                    child_app: self
                        .guardian
                        .update_child_app(parent_id, child_id, app_id, &changes)?,
                })
            }),

            Command::ListAlerts => self.query(request_id, || {
                Ok(ResponsePayload::Alerts {
                    alerts: self.guardian.list_alerts(parent_id)?,
                })
            }),

            Command::UnreadAlertCount => self.query(request_id, || {
                Ok(ResponsePayload::UnreadCount {
                    count: self.guardian.unread_alert_count(parent_id)?,
                })
            }),

            Command::MarkAlertRead { alert_id } => self.query(request_id, || {
                Ok(ResponsePayload::Alert {
                    alert: self.guardian.mark_alert_read(parent_id, alert_id)?,
                })
            }),

            Command::GetPolicy { child_id } => self.query(request_id, || {
                Ok(ResponsePayload::Policy {
                    policy: self.guardian.get_policy(parent_id, child_id)?,
                })
            }),

            Command::SetPolicy { child_id, changes } => {
                let errors = validate_policy_patch(&changes);
                if !errors.is_empty() {
                    let message = errors
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ");
                    return self.failed(request_id, GuardianError::validation(message));
                }

                match self.guardian.set_policy(parent_id, child_id, &changes) {
                    Ok((policy, event)) => Dispatched {
                        response: Response::success(request_id, ResponsePayload::Policy { policy }),
                        events: vec![event],
                        session: None,
                    },
                    Err(e) => self.failed(request_id, e),
                }
            }

            Command::RecordScreenTime {
                child_id,
                date,
                total_minutes,
                app_breakdown,
            } => self.query(request_id, || {
                Ok(ResponsePayload::ScreenTimeRecorded {
                    record: self.guardian.record_screen_time(
                        parent_id,
                        child_id,
                        date,
                        total_minutes,
                        app_breakdown,
                    )?,
                })
            }),

            Command::GetScreenTime {
                child_id,
                start_date,
                days,
            } => self.query(request_id, || match start_date {
                None => Ok(ResponsePayload::ScreenTimeDay {
                    record: self.guardian.get_screen_time_day(
                        parent_id,
                        child_id,
                        guardian_util::today(),
                    )?,
                }),
                Some(start) => {
                    let days = days.unwrap_or(DEFAULT_SCREEN_TIME_DAYS);
                    if !(1..=MAX_SCREEN_TIME_DAYS).contains(&days) {
                        return Err(GuardianError::validation(format!(
                            "days must be between 1 and {MAX_SCREEN_TIME_DAYS}, got {days}"
                        )));
                    }
                    Ok(ResponsePayload::ScreenTimeRange {
                        records: self
                            .guardian
                            .get_screen_time_range(parent_id, child_id, start, days)?,
                    })
                }
            }),

            Command::SubscribeEvents => Dispatched {
                response: Response::success(
                    request_id,
                    ResponsePayload::Subscribed {
                        client_id: client_id.clone(),
                    },
                ),
                events: Vec::new(),
                session: Some(SessionChange::Subscribed(true)),
            },

            Command::UnsubscribeEvents => Dispatched {
                response: Response::success(request_id, ResponsePayload::Unsubscribed),
                events: Vec::new(),
                session: Some(SessionChange::Subscribed(false)),
            },

            Command::GetHealth => {
                let store_ok = self.guardian.is_healthy();
                Dispatched::reply(Response::success(
                    request_id,
                    ResponsePayload::Health {
                        health: HealthStatus {
                            live: true,
                            ready: store_ok,
                            store_ok,
                            connected_clients,
                        },
                    },
                ))
            }

            Command::Ping => Dispatched::reply(Response::success(request_id, ResponsePayload::Pong)),
        }
    }

    fn login(&self, client_id: &ClientId, request_id: u64, username: &str, password: &str) -> Dispatched {
        match self.config.find_parent(username) {
            Some(account) if account.verify_password(password) => {
                info!(client_id = %client_id, parent_id = %account.id, username, "Parent logged in");
                Dispatched {
                    response: Response::success(
                        request_id,
                        ResponsePayload::LoggedIn {
                            parent: account.profile(),
                        },
                    ),
                    events: Vec::new(),
                    session: Some(SessionChange::LoggedIn(account.id)),
                }
            }
            _ => {
                warn!(client_id = %client_id, username, "Login failed");
                Dispatched::reply(Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::Unauthenticated, "Invalid username or password"),
                ))
            }
        }
    }

    fn query(
        &self,
        request_id: u64,
        f: impl FnOnce() -> guardian_util::Result<ResponsePayload>,
    ) -> Dispatched {
        match f() {
            Ok(payload) => Dispatched::reply(Response::success(request_id, payload)),
            Err(e) => self.failed(request_id, e),
        }
    }

    fn failed(&self, request_id: u64, error: GuardianError) -> Dispatched {
        debug!(request_id, error = %error, "Command failed");
        Dispatched::reply(Response::from_result(request_id, Err(error)))
    }
}

/// Wire event for a core event
pub fn to_wire_event(event: CoreEvent) -> Event {
    let payload = match event {
        CoreEvent::AlertRaised { alert } => EventPayload::AlertRaised { alert },
        CoreEvent::AppInstalled {
            parent_id,
            child_id,
            app_id,
            blocked,
        } => EventPayload::AppInstalled {
            parent_id,
            child_id,
            app_id,
            blocked,
        },
        CoreEvent::PolicyUpdated { parent_id, child_id } => {
            EventPayload::PolicyUpdated { parent_id, child_id }
        }
    };
    Event::new(payload)
}
