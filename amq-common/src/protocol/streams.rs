//! Stream message types
//!
//! A stream message is a JSON object whose keys are checked independently: one message
//! may carry a queue, a health change and an audio state at once. Decoding produces one
//! `StreamEvent` per recognised key.

use serde::{Deserialize, Serialize};

use super::types::{AudioStateInfo, NodeHealth, NodeInfo, QueueItem, RunningDownloadInfo};

/// Incremental updates a client can ask for with `wanted_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    Queue,
    Health,
    AudioStateInfo,
    NodeInfo,
    #[serde(alias = "DOWNLOAD")]
    Downloads,
}

impl Capability {
    /// Every capability, in wire order
    pub const ALL: [Capability; 5] = [
        Capability::Queue,
        Capability::Health,
        Capability::AudioStateInfo,
        Capability::NodeInfo,
        Capability::Downloads,
    ];

    /// Tag used in `wanted_info` and as the stream message key
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Queue => "QUEUE",
            Capability::Health => "HEALTH",
            Capability::AudioStateInfo => "AUDIO_STATE_INFO",
            Capability::NodeInfo => "NODE_INFO",
            Capability::Downloads => "DOWNLOADS",
        }
    }

    /// Handler-table key fed by this capability
    pub fn event_key(&self) -> EventKey {
        match self {
            Capability::Queue => EventKey::Queue,
            Capability::Health => EventKey::Health,
            Capability::AudioStateInfo => EventKey::AudioState,
            Capability::NodeInfo => EventKey::NodeInfo,
            Capability::Downloads => EventKey::Downloads,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUE" => Ok(Capability::Queue),
            "HEALTH" => Ok(Capability::Health),
            "AUDIO_STATE_INFO" => Ok(Capability::AudioStateInfo),
            "NODE_INFO" => Ok(Capability::NodeInfo),
            "DOWNLOADS" | "DOWNLOAD" => Ok(Capability::Downloads),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown capability '{other}'"
            ))),
        }
    }
}

/// Discriminant of a `StreamEvent`, used to key the handler table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Queue,
    Health,
    AudioState,
    NodeInfo,
    Downloads,
    Sources,
    ActiveSource,
    DownloadFinished,
    ServerError,
}

/// What produced a queue payload
///
/// Every queue payload replaces the mirrored queue. The cause only matters to whoever
/// waits for a specific command's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueCause {
    /// `QUEUE` update or the connect snapshot
    Update,
    AddQueueItem,
    RemoveQueueItem,
    MoveQueueItem,
    ReadQueueItems,
    DownloadFinished,
}

impl QueueCause {
    /// Cause for a `*_RESPONSE` tag, if it carries a queue
    pub fn from_response_tag(tag: &str) -> Option<Self> {
        match tag {
            "ADD_QUEUE_ITEM_RESPONSE" => Some(QueueCause::AddQueueItem),
            "REMOVE_QUEUE_ITEM_RESPONSE" => Some(QueueCause::RemoveQueueItem),
            "MOVE_QUEUE_ITEM_RESPONSE" => Some(QueueCause::MoveQueueItem),
            "READ_QUEUE_ITEMS_RESPONSE" => Some(QueueCause::ReadQueueItems),
            _ => None,
        }
    }
}

/// One decoded piece of a stream message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Full, authoritative queue contents
    Queue {
        items: Vec<QueueItem>,
        cause: QueueCause,
    },
    Health(NodeHealth),
    AudioState(AudioStateInfo),
    NodeInfo(Vec<NodeInfo>),
    Downloads(RunningDownloadInfo),
    /// Authoritative list of source names
    Sources(Vec<String>),
    /// Server confirmed the session's active source
    ActiveSource(String),
    /// A download finished, possibly with an error
    DownloadFinished { error: Option<String> },
    /// Application-level error reported in-stream
    ServerError(String),
}

impl StreamEvent {
    pub fn key(&self) -> EventKey {
        match self {
            StreamEvent::Queue { .. } => EventKey::Queue,
            StreamEvent::Health(_) => EventKey::Health,
            StreamEvent::AudioState(_) => EventKey::AudioState,
            StreamEvent::NodeInfo(_) => EventKey::NodeInfo,
            StreamEvent::Downloads(_) => EventKey::Downloads,
            StreamEvent::Sources(_) => EventKey::Sources,
            StreamEvent::ActiveSource(_) => EventKey::ActiveSource,
            StreamEvent::DownloadFinished { .. } => EventKey::DownloadFinished,
            StreamEvent::ServerError(_) => EventKey::ServerError,
        }
    }
}

/// Result of decoding one inbound text frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMessage {
    /// True when the message was the connect-time snapshot
    pub snapshot: bool,
    /// Bare tag, for zero-payload messages
    pub tag: Option<String>,
    /// One event per recognised key
    pub events: Vec<StreamEvent>,
}

impl DecodedMessage {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
