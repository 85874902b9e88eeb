//! Command channels
//!
//! A `Command` is what the user asked for. Transports turn it into a wire message:
//! `HttpCommandChannel` posts a `NodeCommand` to the node named in the envelope,
//! `SocketCommandChannel` pushes a `SessionCommand` over an open session socket.
//!
//! Commands are fire-and-forget. Over HTTP the node answers the POST itself; over a
//! session socket the answer is a tagged `*_RESPONSE` on the stream. `Acknowledgement`
//! tells the client which of the two to wait for.

use std::future::Future;

use amq_common::codec::encode_command;
use amq_common::protocol::{
    AddQueueItemParams, LoopBounds, LoopQueueParams, MoveQueueItemParams, NodeCommand,
    PlaySelectedParams, RemoveQueueItemParams, SessionCommand, SetAudioProgressParams,
    SetAudioVolumeParams, SourceAddQueueItemParams, SourceIndexParams, SourceLoopParams,
    SourceMoveParams, SourceParams, SourceProgressParams, SourceVolumeParams,
};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::session::ConnectionStatus;
use crate::view_model::clamp_progress;

/// Client operations
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlayNext,
    PlayPrevious,
    PlaySelected { index: usize },
    Pause,
    UnPause,
    SetAudioProgress { progress: f64 },
    SetAudioVolume { volume: f32 },
    /// `source_name` overrides the active source
    AddQueueItem {
        title: String,
        url: String,
        source_name: Option<String>,
    },
    RemoveQueueItem { index: usize },
    MoveQueueItem(MoveQueueItemParams),
    AddSource { name: String },
    SetActiveSource { name: String },
    ReadQueueItems,
    ReadSources,
    LoopQueue { bounds: Option<LoopBounds> },
    ShuffleQueue,
}

impl Command {
    /// Short kebab-case name for logs and timeout events
    pub fn name(&self) -> &'static str {
        match self {
            Command::PlayNext => "play-next",
            Command::PlayPrevious => "play-previous",
            Command::PlaySelected { .. } => "play-selected",
            Command::Pause => "pause",
            Command::UnPause => "un-pause",
            Command::SetAudioProgress { .. } => "set-audio-progress",
            Command::SetAudioVolume { .. } => "set-audio-volume",
            Command::AddQueueItem { .. } => "add-queue-item",
            Command::RemoveQueueItem { .. } => "remove-queue-item",
            Command::MoveQueueItem(_) => "move-queue-item",
            Command::AddSource { .. } => "add-source",
            Command::SetActiveSource { .. } => "set-active-source",
            Command::ReadQueueItems => "read-queue-items",
            Command::ReadSources => "read-sources",
            Command::LoopQueue { .. } => "loop-queue",
            Command::ShuffleQueue => "shuffle-queue",
        }
    }

    /// Commands that act on a source's queue and need one to be routed
    pub fn needs_source(&self) -> bool {
        !matches!(
            self,
            Command::AddSource { .. } | Command::SetActiveSource { .. } | Command::ReadSources
        )
    }

    /// Source named by the command itself
    pub fn source_override(&self) -> Option<&str> {
        match self {
            Command::AddQueueItem { source_name, .. } => source_name.as_deref(),
            _ => None,
        }
    }

    /// Node-endpoint form, `None` for session-only commands
    pub fn to_node_command(&self) -> Option<NodeCommand> {
        let command = match self {
            Command::PlayNext => NodeCommand::PlayNext,
            Command::PlayPrevious => NodeCommand::PlayPrevious,
            Command::PlaySelected { index } => {
                NodeCommand::PlaySelected(PlaySelectedParams { index: *index })
            }
            Command::Pause => NodeCommand::PauseQueue,
            Command::UnPause => NodeCommand::UnPauseQueue,
            Command::SetAudioProgress { progress } => {
                NodeCommand::SetAudioProgress(SetAudioProgressParams {
                    progress: clamp_progress(*progress),
                })
            }
            Command::SetAudioVolume { volume } => {
                NodeCommand::SetAudioVolume(SetAudioVolumeParams { volume: *volume })
            }
            Command::AddQueueItem { title, url, .. } => NodeCommand::AddQueueItem(AddQueueItemParams {
                title: title.clone(),
                url: url.clone(),
            }),
            Command::RemoveQueueItem { index } => {
                NodeCommand::RemoveQueueItem(RemoveQueueItemParams { index: *index })
            }
            Command::MoveQueueItem(params) => NodeCommand::MoveQueueItem(*params),
            Command::LoopQueue { bounds } => NodeCommand::LoopQueue(LoopQueueParams { bounds: *bounds }),
            Command::ShuffleQueue => NodeCommand::ShuffleQueue,
            Command::AddSource { .. }
            | Command::SetActiveSource { .. }
            | Command::ReadQueueItems
            | Command::ReadSources => return None,
        };
        Some(command)
    }

    /// Session-socket form; every queue command names its source
    pub fn to_session_command(&self, source: Option<&str>) -> Result<SessionCommand> {
        let source_name = || {
            source
                .map(str::to_string)
                .ok_or(Error::NoActiveSource)
        };

        let command = match self {
            Command::PlayNext => SessionCommand::PlayNext(SourceParams {
                source_name: source_name()?,
            }),
            Command::PlayPrevious => SessionCommand::PlayPrevious(SourceParams {
                source_name: source_name()?,
            }),
            Command::PlaySelected { index } => SessionCommand::PlaySelected(SourceIndexParams {
                source_name: source_name()?,
                index: *index,
            }),
            Command::Pause => SessionCommand::PauseQueue(SourceParams {
                source_name: source_name()?,
            }),
            Command::UnPause => SessionCommand::UnPauseQueue(SourceParams {
                source_name: source_name()?,
            }),
            Command::SetAudioProgress { progress } => {
                SessionCommand::SetAudioProgress(SourceProgressParams {
                    source_name: source_name()?,
                    progress: clamp_progress(*progress),
                })
            }
            Command::SetAudioVolume { volume } => SessionCommand::SetAudioVolume(SourceVolumeParams {
                source_name: source_name()?,
                volume: *volume,
            }),
            Command::AddQueueItem { title, url, .. } => {
                SessionCommand::AddQueueItem(SourceAddQueueItemParams {
                    source_name: source_name()?,
                    title: title.clone(),
                    url: url.clone(),
                })
            }
            Command::RemoveQueueItem { index } => SessionCommand::RemoveQueueItem(SourceIndexParams {
                source_name: source_name()?,
                index: *index,
            }),
            Command::MoveQueueItem(params) => SessionCommand::MoveQueueItem(SourceMoveParams {
                source_name: source_name()?,
                old_pos: params.old_pos,
                new_pos: params.new_pos,
            }),
            Command::AddSource { name } => SessionCommand::AddSource(SourceParams {
                source_name: name.clone(),
            }),
            Command::SetActiveSource { name } => SessionCommand::SetActiveSource(SourceParams {
                source_name: name.clone(),
            }),
            Command::ReadQueueItems => SessionCommand::ReadQueueItems(SourceParams {
                source_name: source_name()?,
            }),
            Command::ReadSources => SessionCommand::ReadSources,
            Command::LoopQueue { bounds } => SessionCommand::LoopQueue(SourceLoopParams {
                source_name: source_name()?,
                bounds: *bounds,
            }),
            Command::ShuffleQueue => SessionCommand::ShuffleQueue(SourceParams {
                source_name: source_name()?,
            }),
        };
        Ok(command)
    }
}

/// A command routed to a source
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    pub command: Command,
    pub source_name: Option<String>,
}

impl CommandEnvelope {
    pub fn new(command: Command, source_name: Option<String>) -> Self {
        Self {
            command,
            source_name,
        }
    }
}

/// Where the server's answer to a command shows up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// `send` returns once the server has answered
    Reply,
    /// `send` returns once the message left; the answer is a tagged stream response
    StreamResponse,
}

/// Something that can carry commands to the server
pub trait CommandTransport: Send + Sync + 'static {
    fn acknowledgement(&self) -> Acknowledgement {
        Acknowledgement::Reply
    }

    fn send(&self, envelope: CommandEnvelope) -> impl Future<Output = Result<()>> + Send;
}

/// Posts node commands to `/commands/node/{sourceName}`
#[derive(Debug, Clone)]
pub struct HttpCommandChannel {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpCommandChannel {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Url and JSON body the envelope would be posted as
    pub fn describe(&self, envelope: &CommandEnvelope) -> Result<(String, String)> {
        let command = envelope.command.to_node_command().ok_or_else(|| {
            Error::Unsupported(format!(
                "{} is only available on session sockets",
                envelope.command.name()
            ))
        })?;
        let source = envelope
            .source_name
            .as_deref()
            .ok_or(Error::NoActiveSource)?;

        let url = self.config.node_command_url(source)?;
        let body = encode_command(&command)?;
        Ok((url, body))
    }
}

impl CommandTransport for HttpCommandChannel {
    async fn send(&self, envelope: CommandEnvelope) -> Result<()> {
        let (url, body) = self.describe(&envelope)?;
        debug!("POST {} {}", url, body);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::CommandRejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Pushes session commands over an open session socket
///
/// Refuses to send once the session is `Unknown`.
#[derive(Debug, Clone)]
pub struct SocketCommandChannel {
    outbound: mpsc::UnboundedSender<String>,
    status: watch::Receiver<ConnectionStatus>,
}

impl SocketCommandChannel {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        status: watch::Receiver<ConnectionStatus>,
    ) -> Self {
        Self { outbound, status }
    }
}

impl CommandTransport for SocketCommandChannel {
    fn acknowledgement(&self) -> Acknowledgement {
        Acknowledgement::StreamResponse
    }

    async fn send(&self, envelope: CommandEnvelope) -> Result<()> {
        if *self.status.borrow() == ConnectionStatus::Unknown {
            return Err(Error::NotConnected);
        }
        let command = envelope
            .command
            .to_session_command(envelope.source_name.as_deref())?;
        let text = encode_command(&command)?;
        debug!("Session command {}", text);
        self.outbound.send(text).map_err(|_| Error::NotConnected)
    }
}
