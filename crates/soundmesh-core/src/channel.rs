//! Typed channel protocol between the session core and its collaborators
//!
//! All traffic in and out of the session logic flows through these types:
//! `Command`s come from the local application, `Event`s come up from the
//! per-connection transport tasks, and `AppEvent`s go out to whoever
//! subscribes (local UI state, rebroadcast glue). The logic task never
//! learns who is listening on the far side.

use tokio::sync::mpsc;

use crate::playlist::PlaylistEntry;
use crate::types::{PeerAddr, SongKey, SongMetadata, UserList};

// ----------------------------------------------------------------------------
// Playback Command
// ----------------------------------------------------------------------------

/// Transport-level playback intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Skip,
}

// ----------------------------------------------------------------------------
// Command: Local Application → Session Logic
// ----------------------------------------------------------------------------

/// Commands issued by the local application
#[derive(Debug, Clone)]
pub enum Command {
    /// Announce locally owned songs into the session (merged locally, then
    /// sent to the host or fanned out to guests depending on role)
    AnnounceLibrary(Vec<SongMetadata>),
    /// Queue a song on the shared playlist
    AddToPlaylist(SongMetadata),
    /// Remove a song from the shared playlist
    RemoveFromPlaylist(SongKey),
    /// Move an upcoming song to the front of the queue
    BumpSong(SongKey),
    /// Ask the playlist for the next loaded entry (host only)
    RequestNextSong,
    /// Fold played songs back in front of upcoming and restart (host only)
    ResetPlaylist,
    /// Empty the playlist (host only)
    ClearPlaylist,
    /// Play / pause / skip
    Playback(PlaybackCommand),
    /// Reply to a `SongRequested` app event with the song's bytes
    SendSong {
        to: PeerAddr,
        key: SongKey,
        file_name: String,
        bytes: Vec<u8>,
    },
    /// Drop every remote peer's library records, keep only local ones
    ClearExternalMusic,
    /// Plain-text diagnostic to all connections
    SendText(String),
    /// Stop the session logic
    Shutdown,
}

// ----------------------------------------------------------------------------
// Event: Connections → Session Logic
// ----------------------------------------------------------------------------

/// Events raised by per-connection transport tasks
#[derive(Debug, Clone)]
pub enum Event {
    /// A paired peer's connection is up and registered
    PeerConnected { peer: PeerAddr, name: String },
    /// A connection died (remote close or transport error); the peer's
    /// library contribution must be evicted
    PeerDisconnected { peer: PeerAddr, reason: String },
    /// A complete application message arrived from a peer
    MessageReceived {
        from: PeerAddr,
        message: crate::message::Message,
    },
}

// ----------------------------------------------------------------------------
// AppEvent: Session Logic → UI / Rebroadcast Subscribers
// ----------------------------------------------------------------------------

/// Change notifications carrying read-only snapshots
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The merged library changed; full snapshot in presentation order
    LibraryUpdated(Vec<SongMetadata>),
    /// The shared playlist changed; snapshot is played ++ upcoming
    PlaylistChanged(Vec<PlaylistEntry>),
    /// The connected-user set changed
    UserListUpdated(UserList),
    /// A playback intent reached the playback authority
    Playback(PlaybackCommand),
    /// The host's authoritative play state changed
    PlayStatusChanged {
        playing: bool,
        song: Option<SongMetadata>,
    },
    /// A song just started playing
    SongStatus(PlaylistEntry),
    /// A peer wants this device's song bytes; answer with `Command::SendSong`
    SongRequested { from: PeerAddr, key: SongKey },
    /// A song transfer completed locally
    SongReceived {
        from: PeerAddr,
        key: SongKey,
        file_name: String,
        bytes: Vec<u8>,
    },
    /// Plain-text diagnostic from a peer
    TextMessage { from: PeerAddr, text: String },
    /// Answer to `Command::RequestNextSong`; `None` means nothing is loaded
    /// yet (not necessarily an empty playlist)
    NextSong(Option<PlaylistEntry>),
    PeerJoined { peer: PeerAddr, name: String },
    PeerLeft { peer: PeerAddr },
}

// ----------------------------------------------------------------------------
// Channel Aliases
// ----------------------------------------------------------------------------

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

/// All channel endpoints the runtime wires between tasks
pub struct SessionChannels {
    pub command_tx: CommandSender,
    pub command_rx: CommandReceiver,
    pub event_tx: EventSender,
    pub event_rx: EventReceiver,
    pub app_event_tx: AppEventSender,
    pub app_event_rx: AppEventReceiver,
}

/// Create the session's channel set from the configured capacities
pub fn create_session_channels(config: &crate::config::ChannelConfig) -> SessionChannels {
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (app_event_tx, app_event_rx) = mpsc::channel(config.app_event_capacity);
    SessionChannels {
        command_tx,
        command_rx,
        event_tx,
        event_rx,
        app_event_tx,
        app_event_rx,
    }
}
