//! Playlist state management for the session runtime
//!
//! Same shape as the library manager: the shared playlist plus the local
//! identity, mutations returning the snapshot that notifications carry. On a
//! guest the playlist is a mirror of the host's snapshots; on the host it is
//! the authoritative copy.

use soundmesh_core::playlist::{Playlist, PlaylistEntry};
use soundmesh_core::types::{PeerAddr, SongKey, SongMetadata};
use soundmesh_core::Result;

// ----------------------------------------------------------------------------
// Playlist Manager
// ----------------------------------------------------------------------------

/// Owns the shared playback queue for one session
#[derive(Debug)]
pub struct PlaylistManager {
    playlist: Playlist,
    local: PeerAddr,
}

impl PlaylistManager {
    pub fn new(local: PeerAddr) -> Self {
        Self {
            playlist: Playlist::new(),
            local,
        }
    }

    /// Queue a song. Locally owned songs are playable immediately; remote
    /// ones stay unloaded until their transfer lands.
    pub fn add_song(&mut self, song: SongMetadata) -> (PlaylistEntry, Vec<PlaylistEntry>) {
        let loaded = song.owner == self.local;
        let entry = PlaylistEntry::new(song, loaded);
        self.playlist.add(entry.clone());
        (entry, self.snapshot())
    }

    pub fn remove_song(&mut self, key: &SongKey) -> Result<Vec<PlaylistEntry>> {
        self.playlist.remove(key)?;
        Ok(self.snapshot())
    }

    pub fn bump_song(&mut self, key: &SongKey) -> Vec<PlaylistEntry> {
        self.playlist.bump_song(key);
        self.snapshot()
    }

    /// Advance the play cursor to the first loaded upcoming entry
    pub fn next_available_song(&mut self) -> Option<PlaylistEntry> {
        self.playlist.next_available_song()
    }

    pub fn reset(&mut self) -> Vec<PlaylistEntry> {
        self.playlist.reset();
        self.snapshot()
    }

    pub fn clear(&mut self) -> Vec<PlaylistEntry> {
        self.playlist.clear();
        self.snapshot()
    }

    /// Flag a song's bytes as locally available. Returns the snapshot only
    /// when an entry actually changed.
    pub fn mark_loaded(&mut self, key: &SongKey) -> Option<Vec<PlaylistEntry>> {
        self.playlist.mark_loaded(key).then(|| self.snapshot())
    }

    /// Adopt a snapshot from the playback authority (guest side)
    pub fn replace(&mut self, entries: Vec<PlaylistEntry>) -> Vec<PlaylistEntry> {
        self.playlist.replace(entries);
        self.snapshot()
    }

    pub fn snapshot(&self) -> Vec<PlaylistEntry> {
        self.playlist.songs_to_play()
    }

    pub fn is_empty(&self) -> bool {
        self.playlist.is_empty()
    }
}
