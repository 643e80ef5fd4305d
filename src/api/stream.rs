//! Server-sent event stream transport
//!
//! Each stream is driven by one spawned task that owns the session's inbox.
//! The task writes frames in a fixed order: the `endpoint` announcement
//! first, then every queued response in FIFO order, with keep-alive comments
//! whenever the stream has been idle for the configured interval. When the
//! stream ends for any reason the session is removed from the registry,
//! exactly once.

use super::sessions::{SessionId, SessionRegistry};
use crate::mcp::JsonRpcResponse;
use crate::types::Identity;
use axum::response::sse::{Event, Sse};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Frames buffered between the stream task and the HTTP body
const FRAME_BUFFER: usize = 32;

/// One frame written to an event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `event: endpoint` carrying the session's POST path
    Endpoint(String),
    /// Default-typed event carrying one serialized response
    Message(String),
    /// Comment line with no event semantics
    KeepAlive,
}

impl Frame {
    fn into_event(self) -> Event {
        match self {
            Frame::Endpoint(path) => Event::default().event("endpoint").data(path),
            Frame::Message(json) => Event::default().data(json),
            Frame::KeepAlive => Event::default().comment("keepalive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Disconnected,
    Shutdown,
}

/// Opens streams and runs their delivery tasks
#[derive(Clone)]
pub struct StreamTransport {
    registry: SessionRegistry,
    keepalive: Duration,
    cleanup_grace: Duration,
    shutdown: CancellationToken,
}

impl StreamTransport {
    pub fn new(
        registry: SessionRegistry,
        keepalive: Duration,
        cleanup_grace: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            keepalive,
            cleanup_grace,
            shutdown,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Create a session for `identity` and return its event stream body
    pub async fn open(
        &self,
        identity: Identity,
        client: &str,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let (frames, _task) = self.open_frames(identity, client).await;
        let events = ReceiverStream::new(frames).map(|frame| Ok(frame.into_event()));
        Sse::new(events)
    }

    /// Create a session and spawn its delivery task
    ///
    /// Dropping the returned receiver is treated as a client disconnect.
    pub async fn open_frames(
        &self,
        identity: Identity,
        client: &str,
    ) -> (mpsc::Receiver<Frame>, JoinHandle<()>) {
        let user_id = identity.caller.user_id.clone();
        let (session_id, inbox) = self.registry.create(identity, client).await;
        info!("Opened stream {} for {} ({})", session_id, user_id, client);

        let endpoint = format!("/mcp/{}/messages/{}", client, session_id);
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);

        let transport = self.clone();
        let task = tokio::spawn(async move {
            let end = transport.pump(endpoint, inbox, tx).await;
            transport.finish(session_id, end).await;
        });

        (rx, task)
    }

    async fn pump(
        &self,
        endpoint: String,
        mut inbox: mpsc::UnboundedReceiver<JsonRpcResponse>,
        tx: mpsc::Sender<Frame>,
    ) -> StreamEnd {
        if let Some(end) = self.deliver(&tx, Frame::Endpoint(endpoint)).await {
            return end;
        }

        loop {
            let frame = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return StreamEnd::Shutdown,
                _ = tx.closed() => return StreamEnd::Disconnected,
                queued = inbox.recv() => match queued {
                    Some(response) => match serde_json::to_string(&response) {
                        Ok(json) => Frame::Message(json),
                        Err(e) => {
                            error!("Failed to serialize response: {}", e);
                            continue;
                        }
                    },
                    // Every sender lives in the registry entry; it is gone
                    None => return StreamEnd::Disconnected,
                },
                _ = tokio::time::sleep(self.keepalive) => Frame::KeepAlive,
            };

            if let Some(end) = self.deliver(&tx, frame).await {
                return end;
            }
        }
    }

    /// Hand one frame to the body; a full buffer must not outlive shutdown
    async fn deliver(&self, tx: &mpsc::Sender<Frame>, frame: Frame) -> Option<StreamEnd> {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Some(StreamEnd::Shutdown),
            sent = tx.send(frame) => sent.err().map(|_| StreamEnd::Disconnected),
        }
    }

    async fn finish(&self, session_id: SessionId, end: StreamEnd) {
        debug!("Stream {} ended: {:?}", session_id, end);

        // In-flight POSTs may still resolve the session during the grace
        // period; their enqueue fails because the inbox is already dropped.
        if end == StreamEnd::Disconnected && !self.cleanup_grace.is_zero() {
            tokio::time::sleep(self.cleanup_grace).await;
        }

        self.registry.destroy(&session_id).await;
        info!("Closed stream {}", session_id);
    }
}
