//! Application messages exchanged between session peers
//!
//! Every payload that crosses a host↔guest link is one of these variants.
//! All of them are small control messages except `TransferSong`, which
//! carries raw audio bytes and is deprioritized by the outbound multiplexer
//! so it can never starve the control plane.

use serde::{Deserialize, Serialize};

use crate::playlist::PlaylistEntry;
use crate::types::{SongKey, SongMetadata, UserList};

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// One application message on a host↔guest link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Start or resume playback (guest intent, or host confirmation)
    Play,
    /// Pause playback
    Pause,
    /// Skip to the next available song
    Skip,
    /// Host's authoritative play state, pushed to guests
    PlayStatus {
        playing: bool,
        song: Option<SongMetadata>,
    },
    /// The entry that just started playing
    SongStatus(PlaylistEntry),
    /// Full connected-user set, broadcast by the host on churn
    UserList(UserList),
    /// Batch of songs known to the sending peer (or, from the host, the
    /// merged view of the whole session)
    LibraryAnnounce(Vec<SongMetadata>),
    /// Queue a song at the end of the playlist
    AddToPlaylist(SongMetadata),
    /// Remove a song from the playlist wherever it sits
    RemoveFromPlaylist(SongKey),
    /// Move an upcoming song to the front of the queue
    BumpSong(SongKey),
    /// Host's authoritative playlist snapshot (played ++ upcoming)
    PlaylistUpdate(Vec<PlaylistEntry>),
    /// Ask the owning peer for a song's audio bytes
    RequestSong(SongKey),
    /// Bulk transfer of a song's audio bytes
    TransferSong {
        key: SongKey,
        file_name: String,
        bytes: Vec<u8>,
    },
    /// Plain-text diagnostic message
    Text(String),
}

// ----------------------------------------------------------------------------
// Message Kind and Priority Weight
// ----------------------------------------------------------------------------

/// Scheduling class of a message: control messages drain ahead of bulk
/// transfers at every chunk boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Control,
    Bulk,
}

/// Priority weight for bulk messages. A bulk message enqueued at sequence s
/// scores `s * BULK_WEIGHT`, so any control message with sequence below
/// `s * BULK_WEIGHT` cuts ahead of it.
pub const BULK_WEIGHT: u64 = 100;

impl MessageKind {
    /// Score multiplier for this kind; lower total score drains first
    pub fn weight(self) -> u64 {
        match self {
            MessageKind::Control => 1,
            MessageKind::Bulk => BULK_WEIGHT,
        }
    }
}

impl Message {
    /// Scheduling class of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::TransferSong { .. } => MessageKind::Bulk,
            _ => MessageKind::Control,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Message::Play => "Play",
            Message::Pause => "Pause",
            Message::Skip => "Skip",
            Message::PlayStatus { .. } => "PlayStatus",
            Message::SongStatus(_) => "SongStatus",
            Message::UserList(_) => "UserList",
            Message::LibraryAnnounce(_) => "LibraryAnnounce",
            Message::AddToPlaylist(_) => "AddToPlaylist",
            Message::RemoveFromPlaylist(_) => "RemoveFromPlaylist",
            Message::BumpSong(_) => "BumpSong",
            Message::PlaylistUpdate(_) => "PlaylistUpdate",
            Message::RequestSong(_) => "RequestSong",
            Message::TransferSong { .. } => "TransferSong",
            Message::Text(_) => "Text",
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
