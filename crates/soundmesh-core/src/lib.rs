//! Soundmesh Session Core
//!
//! Protocol types and state engines for a group music session over
//! short-range wireless links: message encoding and chunk framing, the
//! per-connection outbound priority multiplexer, the merged distributed
//! song library, and the shared playlist. Everything here is synchronous
//! and I/O-free; the runtime crate owns the tasks and the transport.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod library;
pub mod message;
pub mod playlist;
pub mod types;
pub mod wire;
pub mod writer;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{AppEvent, Command, Event, PlaybackCommand, SessionChannels};
pub use config::{ChannelConfig, SessionConfig, WriterConfig};
pub use errors::{Result, SoundmeshError};
pub use library::MusicLibrary;
pub use message::{Message, MessageKind};
pub use playlist::{Playlist, PlaylistEntry};
pub use types::{PeerAddr, Role, SongId, SongKey, SongMetadata, User, UserList};
pub use wire::{ChunkAssembler, MessageStream};
pub use writer::{Chunk, MessageWriter};
