//! Shared payload types
//!
//! Structs carried inside stream messages and command parameters.

use serde::{Deserialize, Deserializer, Serialize};

/// One entry of a node's playback queue
///
/// Identity for rendering is the entry's position, not `identifier`: reorders are
/// expressed as position pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Wire-stable identifier (download uid or url)
    #[serde(default, alias = "uid")]
    pub identifier: String,
    /// Display name (track title)
    #[serde(default)]
    pub name: Option<String>,
    /// Author / artist
    #[serde(default)]
    pub author: Option<String>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration: Option<i64>,
    /// Thumbnail url
    #[serde(default, alias = "cover_art_url", alias = "thumbnailUrl")]
    pub cover_art_url: Option<String>,
}

impl QueueItem {
    /// Item known only by its title (older session servers send bare strings)
    pub fn titled(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            identifier: title.clone(),
            name: Some(title),
            ..Default::default()
        }
    }

    /// Name shown to the user, falling back to the identifier
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.identifier)
    }

    /// Deserialize a queue payload whose entries may be objects or bare titles
    pub fn deserialize_queue<'de, D>(deserializer: D) -> Result<Vec<QueueItem>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireEntry {
            Title(String),
            Item(QueueItem),
        }

        let entries = Vec::<WireEntry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                WireEntry::Title(title) => QueueItem::titled(title),
                WireEntry::Item(item) => item,
            })
            .collect())
    }
}

/// Playback state reported by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackState {
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Queue position of the node's player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfo {
    pub current_queue_index: usize,
}

/// Audio processor state of the node's player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorInfo {
    pub playback_state: PlaybackState,
    /// Progress through the current item, expected in [0, 1]
    pub audio_progress: f64,
    #[serde(default)]
    pub audio_volume: f32,
}

/// Payload of the `AUDIO_STATE_INFO` capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStateInfo {
    pub playback_info: PlaybackInfo,
    pub processor_info: ProcessorInfo,
}

/// Reason for degraded but usable health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthMild {
    Buffering,
}

/// Reason for unusable health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthPoor {
    DeviceNotAvailable,
    AudioStreamReadFailed,
    AudioBackendError(String),
}

/// Node health: `"good"`, `{"mild": reason}` or `{"poor": reason}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeHealth {
    Good,
    Mild(HealthMild),
    Poor(HealthPoor),
}

impl NodeHealth {
    /// Poor nodes are not navigable or selectable
    pub fn is_poor(&self) -> bool {
        matches!(self, NodeHealth::Poor(_))
    }
}

impl std::fmt::Display for HealthMild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthMild::Buffering => write!(f, "buffering"),
        }
    }
}

impl std::fmt::Display for HealthPoor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthPoor::DeviceNotAvailable => write!(f, "device-not-available"),
            HealthPoor::AudioStreamReadFailed => write!(f, "audio-stream-read-failed"),
            HealthPoor::AudioBackendError(msg) => write!(f, "audio-backend-error({msg})"),
        }
    }
}

impl std::fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeHealth::Good => write!(f, "good"),
            NodeHealth::Mild(reason) => write!(f, "mild:{reason}"),
            NodeHealth::Poor(reason) => write!(f, "poor:{reason}"),
        }
    }
}

/// Entry of the `NODE_INFO` capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Wire key used in urls and commands
    pub source_name: String,
    pub human_readable_name: String,
    pub health: NodeHealth,
}

/// What a node is downloading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadInfo {
    YoutubeVideo {
        url: String,
    },
    YoutubePlaylist {
        playlist_url: String,
        #[serde(default)]
        video_urls: Vec<String>,
    },
}

impl DownloadInfo {
    /// Url identifying the download
    pub fn url(&self) -> &str {
        match self {
            DownloadInfo::YoutubeVideo { url } => url,
            DownloadInfo::YoutubePlaylist { playlist_url, .. } => playlist_url,
        }
    }
}

/// Error body used by servers for rejected requests and failed downloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Payload of the `DOWNLOADS` capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningDownloadInfo {
    #[serde(default)]
    pub active: Vec<DownloadInfo>,
    #[serde(default)]
    pub failed: Vec<(DownloadInfo, ErrorResponse)>,
}

/// Inclusive queue range to repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopBounds {
    pub start: usize,
    pub end: usize,
}
