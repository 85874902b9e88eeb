//! Event stream session
//!
//! One session owns one WebSocket: a reader task decodes every text frame and dispatches
//! it against the session's `HandlerTable`, a writer task drains the outbound queue.
//! The first frame is the connect-time snapshot; after that the server sends partial
//! updates. Any frame (text or ping) counts as a heartbeat.
//!
//! There is no reconnection. A closed, failed or silent socket leaves the session in
//! `ConnectionStatus::Unknown`, and the writer then closes the socket.

use std::time::Duration;

use amq_common::codec::{decode_message, encode_command};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::channel::SocketCommandChannel;
use crate::error::{Error, Result};
use crate::handlers::HandlerTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Unknown,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Transport-neutral inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    /// Max silence before the stream is considered dead
    pub heartbeat: Option<Duration>,
}

/// A running stream session
pub struct Session {
    outbound: mpsc::UnboundedSender<String>,
    status: watch::Receiver<ConnectionStatus>,
    reader: JoinHandle<()>,
}

impl Session {
    /// Open a WebSocket to `url` and start dispatching into `table`
    pub async fn connect(url: &str, table: HandlerTable, config: SessionConfig) -> Result<Self> {
        info!("Connecting to {}", url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (ws_tx, ws_rx) = ws_stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel::<String>();

        let frames = ws_rx.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Frame::Text(text)),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Some(Frame::Ping),
                Ok(Message::Close(reason)) => {
                    info!("Server closed stream: {:?}", reason);
                    Some(Frame::Closed)
                }
                Ok(_) => None,
                Err(e) => {
                    error!("Error receiving frame: {}", e);
                    Some(Frame::Closed)
                }
            }
        });

        let session = Self::from_frames(Box::pin(frames), outbound, table, config);
        tokio::spawn(write_loop(ws_tx, outbound_rx, session.status_watch()));
        Ok(session)
    }

    /// Run a session over any frame source
    pub fn from_frames<S>(
        frames: S,
        outbound: mpsc::UnboundedSender<String>,
        table: HandlerTable,
        config: SessionConfig,
    ) -> Self
    where
        S: Stream<Item = Frame> + Send + Unpin + 'static,
    {
        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let reader = tokio::spawn(read_loop(frames, table, status_tx, config.heartbeat));

        Self {
            outbound,
            status,
            reader,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status transitions
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Sender for raw outbound text frames
    pub fn outbound(&self) -> mpsc::UnboundedSender<String> {
        self.outbound.clone()
    }

    /// Command transport over this session's socket
    pub fn command_channel(&self) -> SocketCommandChannel {
        SocketCommandChannel::new(self.outbound(), self.status_watch())
    }

    pub fn send_text(&self, text: String) -> Result<()> {
        if self.status() == ConnectionStatus::Unknown {
            return Err(Error::NotConnected);
        }
        self.outbound.send(text).map_err(|_| Error::NotConnected)
    }

    pub fn send_command<C: Serialize>(&self, command: &C) -> Result<()> {
        self.send_text(encode_command(command)?)
    }

    /// Wait until the stream ends
    pub async fn closed(&mut self) -> ConnectionStatus {
        until_unknown(&mut self.status).await;
        ConnectionStatus::Unknown
    }

    /// Stop reading; dropping the session does the same
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Resolves once the status is `Unknown` or its sender is gone
async fn until_unknown(status: &mut watch::Receiver<ConnectionStatus>) {
    loop {
        let current = *status.borrow_and_update();
        if current == ConnectionStatus::Unknown || status.changed().await.is_err() {
            return;
        }
    }
}

/// Drain outbound text into `sink` until the session ends, then close it
async fn write_loop<W>(
    mut sink: W,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut status: watch::Receiver<ConnectionStatus>,
) where
    W: Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            text = outbound.recv() => {
                let Some(text) = text else { break };
                trace!("-> {}", text);
                if let Err(e) = sink.send(Message::Text(text)).await {
                    error!("Failed to write to stream: {}", e);
                    break;
                }
            }
            _ = until_unknown(&mut status) => {
                debug!("Session ended, closing socket");
                break;
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Closing socket failed: {}", e);
    }
}

async fn read_loop<S>(
    mut frames: S,
    table: HandlerTable,
    status: watch::Sender<ConnectionStatus>,
    heartbeat: Option<Duration>,
) where
    S: Stream<Item = Frame> + Send + Unpin + 'static,
{
    loop {
        let next = match heartbeat {
            Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
                Ok(frame) => frame,
                Err(_) => {
                    warn!("No heartbeat in the last {:?}, closing session", limit);
                    break;
                }
            },
            None => frames.next().await,
        };

        match next {
            Some(Frame::Text(text)) => {
                trace!("<- {}", text);
                table.tap(&text);
                match decode_message(&text) {
                    Ok(decoded) => {
                        if decoded.snapshot && *status.borrow() == ConnectionStatus::Connecting {
                            info!("Session connected");
                            status.send_replace(ConnectionStatus::Connected);
                        }
                        if let Some(tag) = &decoded.tag {
                            debug!("Received {}", tag);
                        }
                        let calls = table.dispatch(&decoded);
                        debug!("Dispatched {} events to {} handlers", decoded.events.len(), calls);
                    }
                    Err(e) => warn!("Dropping undecodable frame: {}", e),
                }
            }
            Some(Frame::Ping) => trace!("heart-beat"),
            Some(Frame::Closed) | None => {
                info!("Stream closed");
                break;
            }
        }
    }

    status.send_replace(ConnectionStatus::Unknown);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Command, CommandEnvelope, CommandTransport};
    use amq_common::protocol::{EventKey, NodeCommand, StreamEvent};
    use std::sync::{Arc, Mutex};
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn start(config: SessionConfig) -> (
        Session,
        mpsc::UnboundedSender<Frame>,
        mpsc::UnboundedReceiver<String>,
        HandlerTable,
    ) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let table = HandlerTable::new();
        let session = Session::from_frames(
            UnboundedReceiverStream::new(frame_rx),
            out_tx,
            table.clone(),
            config,
        );
        (session, frame_tx, out_rx, table)
    }

    #[tokio::test]
    async fn test_snapshot_marks_connected_and_dispatches() {
        let (session, frames, _out, table) = start(SessionConfig::default());
        let queues = Arc::new(Mutex::new(Vec::new()));
        let queues_clone = queues.clone();
        table.on(EventKey::Queue, move |event| {
            if let StreamEvent::Queue { items, .. } = event {
                queues_clone.lock().unwrap().push(items.len());
            }
        });

        let mut status = session.status_watch();
        assert_eq!(session.status(), ConnectionStatus::Connecting);

        frames
            .send(Frame::Text(
                r#"{"SESSION_CONNECTED_RESPONSE":{"QUEUE":["a","b","c"]}}"#.into(),
            ))
            .unwrap();
        status
            .wait_for(|s| *s == ConnectionStatus::Connected)
            .await
            .unwrap();

        frames.send(Frame::Text(r#"{"QUEUE":["b","c"]}"#.into())).unwrap();
        frames.send(Frame::Closed).unwrap();
        status
            .wait_for(|s| *s == ConnectionStatus::Unknown)
            .await
            .unwrap();

        assert_eq!(*queues.lock().unwrap(), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_garbage_frames_do_not_end_the_session() {
        let (session, frames, _out, table) = start(SessionConfig::default());
        let hits = Arc::new(Mutex::new(0));
        let hits_clone = hits.clone();
        table.on(EventKey::Health, move |_| *hits_clone.lock().unwrap() += 1);

        frames.send(Frame::Text("{oops".into())).unwrap();
        frames.send(Frame::Text(r#"{"HEALTH":"good"}"#.into())).unwrap();
        frames.send(Frame::Closed).unwrap();

        let mut status = session.status_watch();
        status
            .wait_for(|s| *s == ConnectionStatus::Unknown)
            .await
            .unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_heartbeat_marks_unknown() {
        let (mut session, frames, _out, _table) = start(SessionConfig {
            heartbeat: Some(Duration::from_millis(600)),
        });

        frames.send(Frame::Ping).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        frames.send(Frame::Ping).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_ne!(session.status(), ConnectionStatus::Unknown);

        assert_eq!(session.closed().await, ConnectionStatus::Unknown);
        assert!(session.send_text("\"PLAY_NEXT\"".into()).is_err());
    }

    #[tokio::test]
    async fn test_writer_closes_socket_when_session_ends() {
        let (sink, mut written) = futures::channel::mpsc::unbounded::<Message>();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionStatus::Connected);
        let writer = tokio::spawn(write_loop(sink, outbound_rx, status));

        outbound.send("\"PLAY_NEXT\"".to_string()).unwrap();
        assert_eq!(
            written.next().await,
            Some(Message::Text("\"PLAY_NEXT\"".to_string()))
        );

        status_tx.send_replace(ConnectionStatus::Unknown);
        writer.await.unwrap();
        assert_eq!(written.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_miss_stops_socket_commands() {
        let (mut session, _frames, _out, _table) = start(SessionConfig {
            heartbeat: Some(Duration::from_millis(200)),
        });
        let channel = session.command_channel();

        session.closed().await;

        assert!(matches!(
            channel
                .send(CommandEnvelope::new(Command::PlayNext, Some("kitchen".into())))
                .await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_text_frames_reach_taps_before_decoding() {
        let (session, frames, _out, table) = start(SessionConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        table.on_frame(move |text| seen_clone.lock().unwrap().push(text.to_string()));

        frames.send(Frame::Text("{oops".into())).unwrap();
        frames.send(Frame::Ping).unwrap();
        frames.send(Frame::Closed).unwrap();
        let mut status = session.status_watch();
        status
            .wait_for(|s| *s == ConnectionStatus::Unknown)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["{oops".to_string()]);
    }

    #[tokio::test]
    async fn test_send_command_goes_to_outbound() {
        let (session, _frames, mut out, _table) = start(SessionConfig::default());

        session.send_command(&NodeCommand::PlayNext).unwrap();
        assert_eq!(out.recv().await.as_deref(), Some("\"PLAY_NEXT\""));
    }
}
