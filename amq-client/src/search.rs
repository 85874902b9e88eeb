//! Search provider boundary
//!
//! The client does not search or rank anything itself. A provider returns candidates;
//! the client only needs a playable url and a thumbnail from each.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::channel::CommandTransport;
use crate::client::QueueClient;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Thumbnails by resolution tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnails {
    #[serde(default)]
    pub default: Option<Thumbnail>,
    #[serde(default)]
    pub medium: Option<Thumbnail>,
    #[serde(default)]
    pub high: Option<Thumbnail>,
    #[serde(default)]
    pub standard: Option<Thumbnail>,
    #[serde(default)]
    pub maxres: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCandidate {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub channel_title: Option<String>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

impl SearchCandidate {
    pub fn playable_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }

    /// Highest resolution available: maxres, standard, high, medium, default
    pub fn best_thumbnail(&self) -> Option<&Thumbnail> {
        let t = &self.thumbnails;
        t.maxres
            .as_ref()
            .or(t.standard.as_ref())
            .or(t.high.as_ref())
            .or(t.medium.as_ref())
            .or(t.default.as_ref())
    }
}

/// Turns free text into ranked candidates
pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str) -> impl Future<Output = Result<Vec<SearchCandidate>>> + Send;
}

impl<C: CommandTransport> QueueClient<C> {
    /// Queue a search result on `source_name`, or on the active source
    pub async fn enqueue_candidate(
        &self,
        candidate: &SearchCandidate,
        source_name: Option<&str>,
    ) -> Result<()> {
        self.add_queue_item(&candidate.title, &candidate.playable_url(), source_name)
            .await
    }
}
