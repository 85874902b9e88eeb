//! # AMQ Client Library (amq-client)
//!
//! Keeps a client's view of a remote playback queue in sync with the node that owns it.
//!
//! **Purpose:** Subscribe to node/brain/session streams, mirror queue and playback state,
//! and issue order-sensitive mutations (remove, drag-reorder, scrub) without racing the
//! server's own queue updates.
//!
//! **Architecture:** tokio-tungstenite stream sessions dispatching into a per-session
//! `HandlerTable`; `QueueClient` owns the mirrored state and sends commands through a
//! `CommandTransport` (HTTP node endpoint or session socket).

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod registry;
pub mod reorder;
pub mod search;
pub mod session;
pub mod view_model;

pub use channel::{Command, CommandEnvelope, CommandTransport, HttpCommandChannel, SocketCommandChannel};
pub use client::{ClientEvent, Dispatch, PendingCommand, QueueClient};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use handlers::HandlerTable;
pub use session::{ConnectionStatus, Session, SessionConfig};
