//! Local socket transport between guardiand and parent-facing clients
//!
//! Each line on the socket is one JSON document. Clients send
//! [`guardian_api::Request`]s and get back a [`guardian_api::Response`]
//! carrying the same `request_id`. Events are pushed on the same stream,
//! but only to subscribed connections logged in as the parent who owns
//! the child the event is about.
//!
//! The server records the connecting process's uid for the audit log; a
//! parent identity only comes from a successful `Login`.

mod client;
mod server;

pub use client::*;
pub use server::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON line: {0}")]
    Json(#[from] serde_json::Error),

    /// Peer went away, or the server dropped a client it no longer tracks
    #[error("Peer disconnected")]
    Disconnected,

    /// A line that is neither a response nor an event
    #[error("Unexpected line from guardiand: {0}")]
    UnexpectedLine(String),

    /// guardiand answered with an error where the client needed success
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("IPC server was not started")]
    NotStarted,
}

pub type IpcResult<T> = Result<T, IpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_failing_side() {
        assert_eq!(IpcError::Disconnected.to_string(), "Peer disconnected");
        assert_eq!(
            IpcError::Rejected("Not logged in".into()).to_string(),
            "Request rejected: Not logged in"
        );

        let err: IpcError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Malformed JSON line"));
    }
}
