//! Soundmesh Session Runtime
//!
//! The task engine for a group music session: per-connection writer/reader
//! tasks around the outbound priority multiplexer, the single session logic
//! task that owns all state, and the runtime that wires them together.
//! `soundmesh-core` defines the protocol and the state engines; this crate
//! makes them run.

pub mod connection;
pub mod logic;
pub mod managers;
mod runtime;

pub use connection::{spawn_connection, ConnectionHandle, ConnectionTasks};
pub use logic::SessionLogicTask;
pub use managers::{LibraryManager, PlaylistManager};
pub use runtime::SessionRuntime;

// Re-export core types for convenience
pub use soundmesh_core::{
    channel::{AppEvent, AppEventReceiver, Command, CommandSender, Event, PlaybackCommand},
    Message, PeerAddr, Result, Role, SessionConfig, SongId, SongKey, SongMetadata, SoundmeshError,
};
