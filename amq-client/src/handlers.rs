//! Per-session handler table
//!
//! Maps each `EventKey` to an ordered list of callbacks. A table is created before its
//! session starts and handed to every component that wants stream events; cloning the
//! table clones the handle, not the registrations.
//!
//! Frame taps see every text frame as received, before it is decoded.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use amq_common::protocol::{DecodedMessage, EventKey, StreamEvent};

pub type Handler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;
pub type FrameTap = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: Arc<RwLock<HashMap<EventKey, Vec<Handler>>>>,
    taps: Arc<RwLock<Vec<FrameTap>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `key`, after any handlers already there
    pub fn on<F>(&self, key: EventKey, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register `tap` for raw text frames
    pub fn on_frame<F>(&self, tap: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.taps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(tap));
    }

    /// Hand a raw text frame to every tap
    pub fn tap(&self, text: &str) {
        let taps: Vec<FrameTap> = self
            .taps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for tap in &taps {
            tap(text);
        }
    }

    pub fn handler_count(&self, key: EventKey) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map_or(0, Vec::len)
    }

    /// Invoke every handler of every event in `message`
    ///
    /// The table is read once, on arrival. Handlers registered while this message is
    /// being dispatched see the next message onwards. Returns the number of calls made.
    pub fn dispatch(&self, message: &DecodedMessage) -> usize {
        let calls: Vec<(Handler, &StreamEvent)> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            message
                .events
                .iter()
                .flat_map(|event| {
                    handlers
                        .get(&event.key())
                        .into_iter()
                        .flatten()
                        .map(move |handler| (Arc::clone(handler), event))
                })
                .collect()
        };

        for (handler, event) in &calls {
            handler(event);
        }
        calls.len()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&EventKey, usize> =
            handlers.iter().map(|(key, list)| (key, list.len())).collect();
        let taps = self.taps.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("HandlerTable")
            .field("handlers", &counts)
            .field("taps", &taps)
            .finish()
    }
}
