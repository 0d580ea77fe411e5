//! Default paths for guardian components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/guardian/guardiand.sock` or `/tmp/guardian-$USER/guardiand.sock`
//! - Data: `$XDG_DATA_HOME/guardian` or `~/.local/share/guardian`
//! - Config: `$XDG_CONFIG_HOME/guardian/config.toml` or `~/.config/guardian/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const GUARDIAN_SOCKET_ENV: &str = "GUARDIAN_SOCKET";

/// Environment variable for overriding the data directory
pub const GUARDIAN_DATA_DIR_ENV: &str = "GUARDIAN_DATA_DIR";

const SOCKET_FILENAME: &str = "guardiand.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "guardian";

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$GUARDIAN_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/guardian/guardiand.sock`
/// 3. `/tmp/guardian-$USER/guardiand.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(GUARDIAN_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path ignoring `$GUARDIAN_SOCKET`; used as the config default
/// where the env var is handled by the CLI layer.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$GUARDIAN_DATA_DIR`
/// 2. `$XDG_DATA_HOME/guardian`
/// 3. `~/.local/share/guardian`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(GUARDIAN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    match home_dir() {
        Some(home) => home.join(".local").join("share").join(APP_DIR),
        None => PathBuf::from("/tmp").join(APP_DIR).join("data"),
    }
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    match home_dir() {
        Some(home) => home.join(".config").join(APP_DIR).join(CONFIG_FILENAME),
        None => PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME),
    }
}
