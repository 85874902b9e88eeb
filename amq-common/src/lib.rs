//! # AMQ Common Library
//!
//! Shared code for the audio-manager queue client and its tooling:
//! - Wire types for node/session commands and stream messages
//! - Message codec (tagged-union encoding, multi-key stream decoding)
//! - Configuration loading (TOML + overrides)
//! - Common error type

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;

pub use error::{Error, Result};
