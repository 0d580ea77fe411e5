//! IPC client implementation

use guardian_api::{Command, Event, Request, Response, ResponseResult};
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::trace;

use crate::{IpcError, IpcResult};

/// IPC Client for connecting to guardiand
pub struct IpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    next_request_id: u64,
    /// Events that arrived while waiting for a response
    pending_events: VecDeque<Event>,
}

impl IpcClient {
    /// Connect to guardiand
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
            pending_events: VecDeque::new(),
        })
    }

    /// Send a command and wait for its response.
    ///
    /// A subscribed connection may interleave events with responses; those
    /// are buffered and returned by [`IpcClient::next_event`].
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;

        loop {
            let line = self.read_line().await?;

            if let Ok(response) = serde_json::from_str::<Response>(&line) {
                return Ok(response);
            }

            match serde_json::from_str::<Event>(&line) {
                Ok(event) => {
                    trace!(?event, "Buffered event while awaiting response");
                    self.pending_events.push_back(event);
                }
                Err(_) => return Err(IpcError::UnexpectedLine(line)),
            }
        }
    }

    /// Next event on a subscribed connection
    pub async fn next_event(&mut self) -> IpcResult<Event> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }

        let line = self.read_line().await?;
        Ok(serde_json::from_str(&line)?)
    }

    /// Subscribe to events and consume this client to return an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        let response = self.send(Command::SubscribeEvents).await?;

        if let ResponseResult::Err(e) = response.result {
            return Err(IpcError::Rejected(e.message));
        }

        Ok(EventStream { client: self })
    }

    async fn read_line(&mut self) -> IpcResult<String> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(IpcError::Disconnected);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }
}

/// Stream of events from guardiand
pub struct EventStream {
    client: IpcClient,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        self.client.next_event().await
    }
}
