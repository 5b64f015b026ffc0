//! Library state management for the session runtime
//!
//! Wraps the merged library with the local device's identity and returns a
//! fresh snapshot from every mutation, so the logic task can notify
//! subscribers with exactly the state the mutation produced.

use soundmesh_core::library::MusicLibrary;
use soundmesh_core::types::{PeerAddr, SongKey, SongMetadata};
use soundmesh_core::Result;

// ----------------------------------------------------------------------------
// Library Manager
// ----------------------------------------------------------------------------

/// Owns the merged song library for one session
#[derive(Debug)]
pub struct LibraryManager {
    library: MusicLibrary,
    local: PeerAddr,
}

impl LibraryManager {
    pub fn new(local: PeerAddr) -> Self {
        Self {
            library: MusicLibrary::new(),
            local,
        }
    }

    /// Merge an announced batch; returns the post-merge snapshot
    pub fn merge(&mut self, batch: Vec<SongMetadata>) -> Result<Vec<SongMetadata>> {
        self.library.merge(batch)?;
        Ok(self.library.snapshot())
    }

    /// Evict a departed peer's records. Returns the snapshot only when
    /// something was actually removed, so callers skip no-op notifications.
    pub fn evict_owner(&mut self, owner: &PeerAddr) -> Result<Option<Vec<SongMetadata>>> {
        let evicted = self.library.evict_owner(owner)?;
        Ok((evicted > 0).then(|| self.library.snapshot()))
    }

    /// Drop all remote records, keeping locally owned songs
    pub fn clear_external(&mut self) -> Result<Vec<SongMetadata>> {
        self.library.clear_external(&self.local)?;
        Ok(self.library.snapshot())
    }

    pub fn lookup(&self, key: &SongKey) -> Option<&SongMetadata> {
        self.library.lookup(key)
    }

    /// Songs this device announced itself
    pub fn local_songs(&self) -> Vec<SongMetadata> {
        self.library.library_for(&self.local)
    }

    pub fn query(&self, needle: &str) -> Vec<SongMetadata> {
        self.library.query(needle)
    }

    pub fn snapshot(&self) -> Vec<SongMetadata> {
        self.library.snapshot()
    }

    pub fn is_empty(&self) -> bool {
        self.library.is_empty()
    }
}
