//! Wire protocol types
//!
//! Both directions use the same tagged-union convention: a zero-payload message is a
//! bare JSON string (`"PLAY_NEXT"`), a message with parameters is a single-key object
//! (`{"REMOVE_QUEUE_ITEM": {"index": 2}}`). Tags are SCREAMING_SNAKE_CASE, payload
//! fields are camelCase.

// Sub-modules (supporting types)
mod commands;
mod streams;
mod types;

pub use commands::{
    AddQueueItemParams, LoopQueueParams, MoveQueueItemParams, NodeCommand, PlaySelectedParams,
    RemoveQueueItemParams, SessionCommand, SetAudioProgressParams, SetAudioVolumeParams,
    SourceAddQueueItemParams, SourceIndexParams, SourceLoopParams, SourceMoveParams,
    SourceParams, SourceProgressParams, SourceVolumeParams,
};
pub use streams::{Capability, DecodedMessage, EventKey, QueueCause, StreamEvent};
pub use types::{
    AudioStateInfo, DownloadInfo, ErrorResponse, HealthMild, HealthPoor, LoopBounds, NodeHealth,
    NodeInfo, PlaybackInfo, PlaybackState, ProcessorInfo, QueueItem, RunningDownloadInfo,
};
