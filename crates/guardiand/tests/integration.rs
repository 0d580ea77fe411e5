//! Integration tests for guardiand
//!
//! These tests start the daemon on a temporary socket and talk to it over
//! the NDJSON protocol.

use guardian_api::{
    Command, ErrorCode, EventPayload, ResponsePayload, ResponseResult, SafetyBadge,
};
use guardian_ipc::IpcClient;
use guardian_util::{AppId, ChildId, ParentId};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as Process, Stdio};
use std::time::Duration;
use tempfile::TempDir;

const CONFIG: &str = r#"
config_version = 1

[service]
store = "memory"

[[parents]]
id = 1
username = "sarah.johnson"
email = "sarah.johnson@email.com"
password = "password123"

[[parents]]
id = 2
username = "other.parent"
email = "other@email.com"
password = "hunter2"

[[children]]
id = 1
parent_id = 1
name = "Emma"
age = 8

[[apps]]
id = 1
name = "Khan Academy Kids"
category = "Educational"
age_rating = 3
safety_badge = "safe"

[[apps]]
id = 4
name = "TikTok"
category = "Social"
age_rating = 13
safety_badge = "high-risk"
"#;

struct Daemon {
    process: Child,
    socket: PathBuf,
    _dir: TempDir,
}

impl Daemon {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, CONFIG).unwrap();
        let socket = dir.path().join("guardiand.sock");

        let process = Process::new(env!("CARGO_BIN_EXE_guardiand"))
            .arg("--config")
            .arg(&config)
            .arg("--socket")
            .arg(&socket)
            .arg("--log-level")
            .arg("warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        wait_for_socket(&socket).await;

        Self {
            process,
            socket,
            _dir: dir,
        }
    }

    async fn client(&self) -> IpcClient {
        IpcClient::connect(&self.socket).await.unwrap()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("guardiand did not create {}", path.display());
}

async fn login(client: &mut IpcClient, username: &str, password: &str) {
    let response = client
        .send(Command::Login {
            username: username.into(),
            password: password.into(),
        })
        .await
        .unwrap();
    assert!(
        matches!(response.result, ResponseResult::Ok(ResponsePayload::LoggedIn { .. })),
        "login failed: {:?}",
        response.result
    );
}

fn error_code(result: &ResponseResult) -> Option<ErrorCode> {
    match result {
        ResponseResult::Err(e) => Some(e.code),
        ResponseResult::Ok(_) => None,
    }
}

#[tokio::test]
async fn test_login_required() {
    let daemon = Daemon::start().await;
    let mut client = daemon.client().await;

    let response = client.send(Command::Ping).await.unwrap();
    assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Pong)));

    let response = client.send(Command::ListChildren).await.unwrap();
    assert_eq!(error_code(&response.result), Some(ErrorCode::Unauthenticated));

    let response = client
        .send(Command::Login {
            username: "sarah.johnson".into(),
            password: "nope".into(),
        })
        .await
        .unwrap();
    assert_eq!(error_code(&response.result), Some(ErrorCode::Unauthenticated));

    login(&mut client, "sarah.johnson", "password123").await;
    let response = client.send(Command::ListChildren).await.unwrap();
    match response.result {
        ResponseResult::Ok(ResponsePayload::Children { children }) => {
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].name, "Emma");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let response = client.send(Command::Logout).await.unwrap();
    assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::LoggedOut)));
    let response = client.send(Command::ListAlerts).await.unwrap();
    assert_eq!(error_code(&response.result), Some(ErrorCode::Unauthenticated));
}

#[tokio::test]
async fn test_install_over_socket() {
    let daemon = Daemon::start().await;
    let mut client = daemon.client().await;
    login(&mut client, "sarah.johnson", "password123").await;

    let response = client
        .send(Command::InstallApp {
            child_id: ChildId::new(1),
            app_id: AppId::new(4),
        })
        .await
        .unwrap();
    match response.result {
        ResponseResult::Ok(ResponsePayload::ChildApp { child_app }) => assert!(child_app.is_blocked),
        other => panic!("unexpected result: {:?}", other),
    }

    let response = client
        .send(Command::InstallApp {
            child_id: ChildId::new(1),
            app_id: AppId::new(4),
        })
        .await
        .unwrap();
    assert_eq!(error_code(&response.result), Some(ErrorCode::Conflict));

    let response = client.send(Command::UnreadAlertCount).await.unwrap();
    assert!(matches!(
        response.result,
        ResponseResult::Ok(ResponsePayload::UnreadCount { count: 1 })
    ));

    let response = client.send(Command::ListChildApps { child_id: ChildId::new(1) }).await.unwrap();
    match response.result {
        ResponseResult::Ok(ResponsePayload::ChildApps { apps }) => {
            assert_eq!(apps.len(), 1);
            assert_eq!(apps[0].app.safety_badge, SafetyBadge::HighRisk);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_events_reach_only_owning_parent() {
    let daemon = Daemon::start().await;

    let mut sarah = daemon.client().await;
    login(&mut sarah, "sarah.johnson", "password123").await;
    let mut sarah_events = sarah.subscribe().await.unwrap();

    let mut other = daemon.client().await;
    login(&mut other, "other.parent", "hunter2").await;
    let response = other.send(Command::SubscribeEvents).await.unwrap();
    assert!(matches!(
        response.result,
        ResponseResult::Ok(ResponsePayload::Subscribed { .. })
    ));

    // Other parent cannot touch Emma
    let response = other
        .send(Command::InstallApp {
            child_id: ChildId::new(1),
            app_id: AppId::new(1),
        })
        .await
        .unwrap();
    assert_eq!(error_code(&response.result), Some(ErrorCode::AccessDenied));

    let mut installer = daemon.client().await;
    login(&mut installer, "sarah.johnson", "password123").await;
    installer
        .send(Command::InstallApp {
            child_id: ChildId::new(1),
            app_id: AppId::new(1),
        })
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), sarah_events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.parent_id(), Some(ParentId::new(1)));
    assert!(matches!(event.payload, EventPayload::AppInstalled { blocked: false, .. }));

    let event = tokio::time::timeout(Duration::from_secs(5), sarah_events.next())
        .await
        .unwrap()
        .unwrap();
    match event.payload {
        EventPayload::AlertRaised { alert } => assert_eq!(alert.title, "New App Installed"),
        other => panic!("unexpected event: {:?}", other),
    }

    // Nothing was routed to the other parent; a ping round-trips cleanly
    let response = other.send(Command::Ping).await.unwrap();
    assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Pong)));
    let stray = tokio::time::timeout(Duration::from_millis(200), other.next_event()).await;
    assert!(stray.is_err());
}

#[tokio::test]
async fn test_invalid_json_gets_error() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let daemon = Daemon::start().await;
    let stream = tokio::net::UnixStream::connect(&daemon.socket).await.unwrap();
    let (read, mut write) = stream.into_split();

    write.write_all(b"{not json}\n").await.unwrap();

    let mut line = String::new();
    BufReader::new(read).read_line(&mut line).await.unwrap();
    let response: guardian_api::Response = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(error_code(&response.result), Some(ErrorCode::InvalidRequest));
}
