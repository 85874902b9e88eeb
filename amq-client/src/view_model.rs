//! Client-held mirror of a node's queue
//!
//! The server owns the queue. Every queue payload replaces the mirror wholesale and the
//! render order is rebuilt from it; nothing is patched. The only client-side override is
//! the scrub position, held while the user drags the progress bar.

use amq_common::protocol::{AudioStateInfo, NodeHealth, PlaybackState, QueueItem, RunningDownloadInfo};

use crate::reorder::DisplayItem;

/// Clamp a progress value into `[0, 1]`, mapping NaN to 0
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Progress for a pointer at `x` over a bar starting at `left` with `width`
pub fn progress_from_pointer(x: f64, left: f64, width: f64) -> f64 {
    if width <= 0.0 || !width.is_finite() {
        return 0.0;
    }
    clamp_progress((x - left) / width)
}

/// Server truth vs. the user's local scrub position
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrubState {
    pub server_progress: f64,
    pub local_progress: f64,
    pub is_user_scrubbing: bool,
}

impl ScrubState {
    /// Progress to render
    pub fn displayed_progress(&self) -> f64 {
        if self.is_user_scrubbing {
            self.local_progress
        } else {
            self.server_progress
        }
    }

    pub fn press(&mut self, progress: f64) {
        self.is_user_scrubbing = true;
        self.local_progress = clamp_progress(progress);
    }

    pub fn move_to(&mut self, progress: f64) {
        if self.is_user_scrubbing {
            self.local_progress = clamp_progress(progress);
        }
    }

    /// Pointer released; the override stays until `clear_override`
    pub fn release(&mut self) -> f64 {
        self.local_progress
    }

    pub fn clear_override(&mut self) {
        self.is_user_scrubbing = false;
    }

    pub fn set_server_progress(&mut self, progress: f64) {
        self.server_progress = clamp_progress(progress);
    }
}

/// Mirror of one node's queue and playback
#[derive(Debug, Clone, Default)]
pub struct QueueViewModel {
    items: Vec<QueueItem>,
    rendered: Vec<DisplayItem>,
    head: Option<usize>,
    reported_head: Option<usize>,
    playback_state: Option<PlaybackState>,
    volume: Option<f32>,
    scrub: ScrubState,
    health: Option<NodeHealth>,
    downloads: RunningDownloadInfo,
    last_error: Option<String>,
}

impl QueueViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue with an authoritative snapshot
    pub fn replace_queue(&mut self, items: Vec<QueueItem>) {
        self.rendered = display_items(&items);
        self.items = items;
        self.head = self.validated_head();
    }

    /// Apply a playback/processor update
    pub fn apply_audio_state(&mut self, state: &AudioStateInfo) {
        self.reported_head = Some(state.playback_info.current_queue_index);
        self.head = self.validated_head();
        self.playback_state = Some(state.processor_info.playback_state);
        self.volume = Some(state.processor_info.audio_volume);
        self.scrub
            .set_server_progress(state.processor_info.audio_progress);
    }

    fn validated_head(&self) -> Option<usize> {
        self.reported_head.filter(|index| *index < self.items.len())
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn rendered(&self) -> &[DisplayItem] {
        &self.rendered
    }

    /// Show an optimistic order (drag in progress)
    pub fn set_rendered(&mut self, order: Vec<DisplayItem>) {
        self.rendered = order;
    }

    /// Head index, `None` if the queue is empty or the server index is out of range
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn current_item(&self) -> Option<&QueueItem> {
        self.head.and_then(|index| self.items.get(index))
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.playback_state
    }

    pub fn is_paused(&self) -> bool {
        self.playback_state == Some(PlaybackState::Paused)
    }

    pub fn volume(&self) -> Option<f32> {
        self.volume
    }

    pub fn scrub(&self) -> &ScrubState {
        &self.scrub
    }

    pub fn scrub_mut(&mut self) -> &mut ScrubState {
        &mut self.scrub
    }

    pub fn displayed_progress(&self) -> f64 {
        self.scrub.displayed_progress()
    }

    pub fn health(&self) -> Option<&NodeHealth> {
        self.health.as_ref()
    }

    pub fn set_health(&mut self, health: NodeHealth) {
        self.health = Some(health);
    }

    pub fn downloads(&self) -> &RunningDownloadInfo {
        &self.downloads
    }

    /// Store download status, returning failures not seen before
    pub fn set_downloads(&mut self, downloads: RunningDownloadInfo) -> Vec<(String, String)> {
        let fresh = downloads
            .failed
            .iter()
            .filter(|failure| !self.downloads.failed.contains(failure))
            .map(|(info, err)| (info.url().to_string(), err.error.clone()))
            .collect();
        self.downloads = downloads;
        fresh
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_last_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}

fn display_items(items: &[QueueItem]) -> Vec<DisplayItem> {
    items
        .iter()
        .enumerate()
        .map(|(id, item)| DisplayItem {
            id,
            name: item.display_name().to_string(),
        })
        .collect()
}
