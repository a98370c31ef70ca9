// Public modules
pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod presence;
pub mod render;
pub mod session;
pub mod token_store;
pub mod types;
pub mod validation;

mod observability;

#[cfg(test)]
mod testing;

// Re-exports
pub use api::ChatApi;
pub use client::ChatClient;
pub use config::{AuthHeader, ChatArgs, SyncConfig};
pub use cursor::Cursor;
pub use engine::{EngineState, SyncEngine};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use presence::PresencePoller;
pub use render::{RenderSink, SharedSink, TerminalSink};
pub use session::{Session, SessionGuard, Validity};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::*;
