//! Playlist engine
//!
//! Two ordered queues of entries; the seam between them is the play cursor.
//! `played` holds everything already played in play order, `upcoming` holds
//! the rest. An entry becomes eligible for playback only once its audio
//! bytes have landed locally (`loaded`), which lets playback skip past songs
//! still mid-transfer instead of blocking on them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{SongKey, SongMetadata};
use crate::{Result, SoundmeshError};

// ----------------------------------------------------------------------------
// Playlist Entry
// ----------------------------------------------------------------------------

/// One song queued for playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub song: SongMetadata,
    /// True once the song bytes are locally available for playback
    pub loaded: bool,
    pub played: bool,
}

impl PlaylistEntry {
    /// Queue a song; `loaded` starts true only for locally owned songs
    pub fn new(song: SongMetadata, loaded: bool) -> Self {
        Self {
            song,
            loaded,
            played: false,
        }
    }

    pub fn key(&self) -> SongKey {
        self.song.key()
    }
}

// ----------------------------------------------------------------------------
// Playlist
// ----------------------------------------------------------------------------

/// The shared playback queue. An entry lives in exactly one of the two
/// queues at any time, or in neither after removal.
#[derive(Debug, Default)]
pub struct Playlist {
    played: VecDeque<PlaylistEntry>,
    upcoming: VecDeque<PlaylistEntry>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the end of `upcoming`
    pub fn add(&mut self, entry: PlaylistEntry) {
        self.upcoming.push_back(entry);
    }

    /// Remove the entry matching `key` from whichever queue holds it,
    /// returning its metadata. `NotFound` when absent from both.
    pub fn remove(&mut self, key: &SongKey) -> Result<SongMetadata> {
        if let Some(pos) = self.upcoming.iter().position(|e| e.key() == *key) {
            if let Some(entry) = self.upcoming.remove(pos) {
                return Ok(entry.song);
            }
        }
        if let Some(pos) = self.played.iter().position(|e| e.key() == *key) {
            if let Some(entry) = self.played.remove(pos) {
                return Ok(entry.song);
            }
        }
        Err(SoundmeshError::not_found("playlist entry", *key))
    }

    /// Scan `upcoming` in order for the first loaded entry; move it to the
    /// tail of `played` and return it. `None` means nothing is ready right
    /// now — distinct from the playlist being empty, since entries may still
    /// be waiting on their transfer.
    pub fn next_available_song(&mut self) -> Option<PlaylistEntry> {
        let pos = self.upcoming.iter().position(|e| e.loaded)?;
        let mut entry = self.upcoming.remove(pos)?;
        entry.played = true;
        self.played.push_back(entry.clone());
        Some(entry)
    }

    /// Restart the playthrough: previously played songs move back to the
    /// front of `upcoming` (keeping their order) ahead of everything not yet
    /// played, and all `played` flags clear. Both queues are rebuilt by
    /// moving entries into a fresh queue, so no caller can hold an alias to
    /// the old backing storage.
    pub fn reset(&mut self) {
        let played = std::mem::take(&mut self.played);
        let upcoming = std::mem::take(&mut self.upcoming);
        self.upcoming = played.into_iter().chain(upcoming).collect();
        for entry in &mut self.upcoming {
            entry.played = false;
        }
    }

    /// Move an `upcoming` entry to the front of `upcoming` ("play this
    /// next"). No effect when the entry is already played or absent.
    pub fn bump_song(&mut self, key: &SongKey) {
        if let Some(pos) = self.upcoming.iter().position(|e| e.key() == *key) {
            if let Some(entry) = self.upcoming.remove(pos) {
                self.upcoming.push_front(entry);
            }
        }
    }

    /// Flag the entry's audio bytes as locally available (wherever the entry
    /// sits). Returns true when an entry was updated.
    pub fn mark_loaded(&mut self, key: &SongKey) -> bool {
        let mut updated = false;
        for entry in self.upcoming.iter_mut().chain(self.played.iter_mut()) {
            if entry.key() == *key && !entry.loaded {
                entry.loaded = true;
                updated = true;
            }
        }
        updated
    }

    /// Total entries across both queues
    pub fn size(&self) -> usize {
        self.played.len() + self.upcoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.played.is_empty() && self.upcoming.is_empty()
    }

    /// Read-only snapshot of the full play order: played ++ upcoming
    pub fn songs_to_play(&self) -> Vec<PlaylistEntry> {
        self.played.iter().chain(self.upcoming.iter()).cloned().collect()
    }

    /// Empty both queues
    pub fn clear(&mut self) {
        self.played.clear();
        self.upcoming.clear();
    }

    /// Replace the whole playlist with a snapshot received from the playback
    /// authority, partitioning entries back into their queues by played flag
    pub fn replace(&mut self, entries: Vec<PlaylistEntry>) {
        self.played.clear();
        self.upcoming.clear();
        for entry in entries {
            if entry.played {
                self.played.push_back(entry);
            } else {
                self.upcoming.push_back(entry);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PeerAddr, SongId};

    fn song(owner: u8, id: u64, title: &str) -> SongMetadata {
        SongMetadata {
            owner: PeerAddr::new([owner; 6]),
            id: SongId(id),
            title: title.into(),
            artist: "Artist".into(),
            album: "Album".into(),
            duration_secs: 120,
            file_size: 1000,
        }
    }

    fn keys(entries: &[PlaylistEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.song.id.0).collect()
    }

    #[test]
    fn test_next_available_waits_for_loaded() {
        let mut playlist = Playlist::new();
        let meta = song(1, 1, "Waiting");
        playlist.add(PlaylistEntry::new(meta.clone(), false));

        // Nothing ready while the transfer is outstanding
        assert!(playlist.next_available_song().is_none());
        assert_eq!(playlist.size(), 1);

        playlist.mark_loaded(&meta.key());
        let next = playlist.next_available_song().unwrap();
        assert_eq!(next.song, meta);
        assert!(next.played);
    }

    #[test]
    fn test_next_available_skips_unloaded() {
        let mut playlist = Playlist::new();
        playlist.add(PlaylistEntry::new(song(1, 1, "Stuck"), false));
        playlist.add(PlaylistEntry::new(song(1, 2, "Ready"), true));

        let next = playlist.next_available_song().unwrap();
        assert_eq!(next.song.id.0, 2);
        // The unloaded entry stays queued
        assert_eq!(playlist.size(), 2);
    }

    #[test]
    fn test_remove_from_either_queue() {
        let mut playlist = Playlist::new();
        let a = song(1, 1, "A");
        let b = song(1, 2, "B");
        playlist.add(PlaylistEntry::new(a.clone(), true));
        playlist.add(PlaylistEntry::new(b.clone(), true));
        playlist.next_available_song().unwrap(); // A moves to played

        assert_eq!(playlist.remove(&a.key()).unwrap(), a);
        assert_eq!(playlist.remove(&b.key()).unwrap(), b);
        assert!(playlist.is_empty());
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let mut playlist = Playlist::new();
        let err = playlist.remove(&song(1, 9, "Ghost").key()).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_reset_order_and_flag_clearing() {
        let mut playlist = Playlist::new();
        for id in 1..=4 {
            playlist.add(PlaylistEntry::new(song(1, id, "s"), true));
        }
        // Play 1 and 2, leaving 3 and 4 upcoming
        playlist.next_available_song().unwrap();
        playlist.next_available_song().unwrap();

        playlist.reset();
        let snapshot = playlist.songs_to_play();
        assert_eq!(keys(&snapshot), vec![1, 2, 3, 4]);
        assert!(snapshot.iter().all(|e| !e.played));
    }

    #[test]
    fn test_reset_idempotent_on_all_played() {
        let mut playlist = Playlist::new();
        for id in 1..=3 {
            playlist.add(PlaylistEntry::new(song(1, id, "s"), true));
        }
        while playlist.next_available_song().is_some() {}

        playlist.reset();
        let first = keys(&playlist.songs_to_play());
        playlist.reset();
        assert_eq!(keys(&playlist.songs_to_play()), first);
    }

    #[test]
    fn test_bump_moves_to_front_of_upcoming() {
        let mut playlist = Playlist::new();
        for id in 1..=3 {
            playlist.add(PlaylistEntry::new(song(1, id, "s"), true));
        }
        playlist.bump_song(&song(1, 3, "s").key());
        assert_eq!(keys(&playlist.songs_to_play()), vec![3, 1, 2]);
    }

    #[test]
    fn test_replace_partitions_by_played_flag() {
        let mut playlist = Playlist::new();
        playlist.add(PlaylistEntry::new(song(9, 9, "stale"), true));

        let mut already_played = PlaylistEntry::new(song(1, 1, "a"), true);
        already_played.played = true;
        let snapshot = vec![
            already_played,
            PlaylistEntry::new(song(1, 2, "b"), true),
        ];
        playlist.replace(snapshot.clone());

        assert_eq!(playlist.songs_to_play(), snapshot);
        // The played entry is not eligible again until a reset
        assert_eq!(playlist.next_available_song().unwrap().song.id.0, 2);
    }

    #[test]
    fn test_bump_ignores_played_and_missing() {
        let mut playlist = Playlist::new();
        playlist.add(PlaylistEntry::new(song(1, 1, "s"), true));
        playlist.add(PlaylistEntry::new(song(1, 2, "s"), true));
        playlist.next_available_song().unwrap(); // 1 is now played

        let before = keys(&playlist.songs_to_play());
        playlist.bump_song(&song(1, 1, "s").key()); // in played
        playlist.bump_song(&song(1, 9, "s").key()); // absent
        assert_eq!(keys(&playlist.songs_to_play()), before);
    }
}
