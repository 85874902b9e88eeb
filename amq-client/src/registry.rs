//! Sources and nodes known to the client
//!
//! The server decides which sources exist. A source the client asked for is only usable
//! once a `sources` payload lists it, and the active source only changes locally when
//! the server confirms it (or when it is the single source available).

use amq_common::protocol::NodeInfo;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// What changed after a new source list was applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceChange {
    /// Single source that was activated automatically
    pub auto_activated: Option<String>,
    /// Previously active source that is gone
    pub cleared: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<String>,
    requested: Vec<String>,
    active: Option<String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an authoritative source list
    pub fn replace_sources(&mut self, sources: Vec<String>) -> SourceChange {
        let mut change = SourceChange::default();

        self.requested.retain(|name| !sources.contains(name));

        if let Some(active) = &self.active {
            if !sources.contains(active) {
                info!("Active source '{}' disappeared", active);
                change.cleared = self.active.take();
            }
        }

        if self.active.is_none() && sources.len() == 1 {
            let only = sources[0].clone();
            info!("Auto-activating single source '{}'", only);
            self.active = Some(only.clone());
            change.auto_activated = Some(only);
        }

        self.sources = sources;
        change
    }

    /// Remember a source the client asked the server to add
    pub fn request(&mut self, name: &str) {
        if !self.sources.iter().any(|s| s == name) && !self.requested.iter().any(|s| s == name) {
            debug!("Source '{}' requested", name);
            self.requested.push(name.to_string());
        }
    }

    pub fn is_usable(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s == name)
    }

    /// Server confirmed `name` as the active source
    pub fn apply_active(&mut self, name: String) {
        debug!("Active source is now '{}'", name);
        self.active = Some(name);
    }

    /// Pin a source without a server round trip (node streams are addressed by url)
    pub fn pin(&mut self, name: &str) {
        if !self.is_usable(name) {
            self.sources.push(name.to_string());
        }
        self.active = Some(name.to_string());
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Requested names the server has not listed yet
    pub fn pending(&self) -> &[String] {
        &self.requested
    }
}

/// Latest `NODE_INFO` list from the brain stream
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<NodeInfo>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, nodes: Vec<NodeInfo>) {
        self.nodes = nodes;
    }

    pub fn all(&self) -> &[NodeInfo] {
        &self.nodes
    }

    /// Nodes a user may navigate to (everything not in poor health)
    pub fn navigable(&self) -> Vec<&NodeInfo> {
        self.nodes.iter().filter(|n| !n.health.is_poor()).collect()
    }

    /// Map a wire or human-readable name to the wire `sourceName`
    pub fn resolve(&self, name: &str) -> Result<String> {
        let node = self
            .nodes
            .iter()
            .find(|n| n.source_name == name)
            .or_else(|| self.nodes.iter().find(|n| n.human_readable_name == name))
            .ok_or_else(|| Error::NodeUnavailable(format!("unknown node '{name}'")))?;

        if node.health.is_poor() {
            return Err(Error::NodeUnavailable(format!(
                "node '{}' is {}",
                node.source_name, node.health
            )));
        }

        Ok(node.source_name.clone())
    }
}
