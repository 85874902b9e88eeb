//! Command types
//!
//! `NodeCommand` is posted to a node's command endpoint; the node is addressed by the
//! url. `SessionCommand` travels over a session socket and names its source in every
//! payload.

use serde::{Deserialize, Serialize};

use super::types::LoopBounds;

/// Commands a client can send to an audio node
///
/// # Example commands
///
/// ```text
/// { "ADD_QUEUE_ITEM": { "title": "the pretender", "url": "https://www.youtube.com/watch?v=SBjQ9tuuTJQ" } }
/// { "MOVE_QUEUE_ITEM": { "oldPos": 2, "newPos": 0 } }
/// "PLAY_NEXT"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeCommand {
    AddQueueItem(AddQueueItemParams),
    RemoveQueueItem(RemoveQueueItemParams),
    MoveQueueItem(MoveQueueItemParams),
    SetAudioVolume(SetAudioVolumeParams),
    SetAudioProgress(SetAudioProgressParams),
    PauseQueue,
    UnPauseQueue,
    PlayNext,
    PlayPrevious,
    PlaySelected(PlaySelectedParams),
    LoopQueue(LoopQueueParams),
    ShuffleQueue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddQueueItemParams {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveQueueItemParams {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySelectedParams {
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveQueueItemParams {
    pub old_pos: usize,
    pub new_pos: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAudioVolumeParams {
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAudioProgressParams {
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopQueueParams {
    pub bounds: Option<LoopBounds>,
}

/// Commands sent over a session socket (node-less variant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionCommand {
    AddQueueItem(SourceAddQueueItemParams),
    RemoveQueueItem(SourceIndexParams),
    ReadQueueItems(SourceParams),
    MoveQueueItem(SourceMoveParams),
    AddSource(SourceParams),
    SetActiveSource(SourceParams),
    SetAudioProgress(SourceProgressParams),
    SetAudioVolume(SourceVolumeParams),
    ReadSources,
    PauseQueue(SourceParams),
    UnPauseQueue(SourceParams),
    PlayNext(SourceParams),
    PlayPrevious(SourceParams),
    PlaySelected(SourceIndexParams),
    LoopQueue(SourceLoopParams),
    ShuffleQueue(SourceParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceParams {
    pub source_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAddQueueItemParams {
    pub source_name: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIndexParams {
    pub source_name: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMoveParams {
    pub source_name: String,
    pub old_pos: usize,
    pub new_pos: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceProgressParams {
    pub source_name: String,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceVolumeParams {
    pub source_name: String,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLoopParams {
    pub source_name: String,
    pub bounds: Option<LoopBounds>,
}
