//! Merged distributed song library
//!
//! One ordered collection of every song known to every connected peer, plus
//! a lookup index from composite key to position. The two structures are
//! only ever mutated together; the presentation order (lexicographic by
//! artist, album, title) and the index are rebuilt in full after every
//! mutation rather than maintained incrementally — libraries are hundreds of
//! entries, not millions, and the rebuild keeps the consistency argument
//! trivial.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{PeerAddr, SongKey, SongMetadata};
use crate::{Result, SoundmeshError};

// ----------------------------------------------------------------------------
// Music Library
// ----------------------------------------------------------------------------

/// The merged, deduplicated view of all songs in the session, keyed by
/// (owner, song id). Callers never see the collections directly; every
/// public operation leaves index and order mutually consistent.
#[derive(Debug, Default)]
pub struct MusicLibrary {
    songs: Vec<SongMetadata>,
    index: HashMap<SongKey, usize>,
}

impl MusicLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of announced songs. An existing composite key has its
    /// record replaced in place (last-writer-wins per key — only the owning
    /// peer ever produces records for its own keys); a new key is appended.
    /// Order and index are rebuilt once per batch.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = SongMetadata>) -> Result<()> {
        for song in batch {
            let key = song.key();
            if let Some(&pos) = self.index.get(&key) {
                self.songs[pos] = song;
            } else {
                self.index.insert(key, self.songs.len());
                self.songs.push(song);
            }
        }
        self.rebuild();
        self.verify()
    }

    /// Remove every record owned by `owner`. Idempotent: evicting an owner
    /// with no records is a no-op.
    pub fn evict_owner(&mut self, owner: &PeerAddr) -> Result<usize> {
        let before = self.songs.len();
        self.songs.retain(|s| s.owner != *owner);
        let evicted = before - self.songs.len();
        if evicted > 0 {
            self.rebuild();
        }
        debug!(%owner, evicted, "evicted library records");
        self.verify()?;
        Ok(evicted)
    }

    /// Drop everyone else's records, keeping only songs owned by `local`
    pub fn clear_external(&mut self, local: &PeerAddr) -> Result<()> {
        self.songs.retain(|s| s.owner == *local);
        self.rebuild();
        self.verify()
    }

    /// Case-insensitive substring match against title, artist, and album.
    /// An empty query returns the whole library. Never mutates the store.
    pub fn query(&self, needle: &str) -> Vec<SongMetadata> {
        if needle.is_empty() {
            return self.songs.clone();
        }
        let needle = needle.to_lowercase();
        self.songs
            .iter()
            .filter(|s| {
                s.title.to_lowercase().contains(&needle)
                    || s.artist.to_lowercase().contains(&needle)
                    || s.album.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    /// Records owned by one peer, in presentation order
    pub fn library_for(&self, owner: &PeerAddr) -> Vec<SongMetadata> {
        self.songs.iter().filter(|s| s.owner == *owner).cloned().collect()
    }

    /// Look up one record by composite key
    pub fn lookup(&self, key: &SongKey) -> Option<&SongMetadata> {
        self.index.get(key).map(|&pos| &self.songs[pos])
    }

    /// Full snapshot in presentation order
    pub fn snapshot(&self) -> Vec<SongMetadata> {
        self.songs.clone()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Re-derive the presentation order and rebuild the index from scratch
    fn rebuild(&mut self) {
        self.songs.sort_by_cached_key(|s| {
            (
                s.artist.to_lowercase(),
                s.album.to_lowercase(),
                s.title.to_lowercase(),
            )
        });
        self.index.clear();
        for (pos, song) in self.songs.iter().enumerate() {
            self.index.insert(song.key(), pos);
        }
    }

    /// Defensive index/order cross-check. Cannot fail under correct lock
    /// discipline; a failure here is a programming error, not a runtime
    /// condition.
    fn verify(&self) -> Result<()> {
        if self.index.len() != self.songs.len() {
            return Err(SoundmeshError::invariant(format!(
                "index has {} keys for {} songs",
                self.index.len(),
                self.songs.len()
            )));
        }
        for (key, &pos) in &self.index {
            match self.songs.get(pos) {
                Some(song) if song.key() == *key => {}
                _ => {
                    return Err(SoundmeshError::invariant(format!(
                        "index entry {key} points at stale position {pos}"
                    )))
                }
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
