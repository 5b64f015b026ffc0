//! Core types for the soundmesh session protocol
//!
//! This module defines the fundamental identity types used throughout the
//! session: peer addresses, song identifiers, and the composite song key
//! that identifies a song across the whole distributed library.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Peer Address
// ----------------------------------------------------------------------------

/// Unique identifier for a peer in the session (MAC-style, 6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddr([u8; 6]);

impl PeerAddr {
    /// Create a new PeerAddr from 6 bytes
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create a PeerAddr from the first 6 bytes of a longer identifier
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut addr = [0u8; 6];
        let len = core::cmp::min(bytes.len(), 6);
        addr[..len].copy_from_slice(&bytes[..len]);
        Self(addr)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for PeerAddr {
    type Err = crate::SoundmeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(&clean)
            .map_err(|_| crate::SoundmeshError::invariant("invalid hex in PeerAddr"))?;
        if bytes.len() != 6 {
            return Err(crate::SoundmeshError::invariant(
                "PeerAddr must be exactly 6 bytes",
            ));
        }
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&bytes);
        Ok(Self(addr))
    }
}

impl Deref for PeerAddr {
    type Target = [u8; 6];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Song Identity
// ----------------------------------------------------------------------------

/// Song identifier, unique within its owning peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SongId(pub u64);

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key identifying one song across the whole distributed library.
///
/// Two metadata records describe "the same song" iff their keys match, even
/// when the tags differ (tags are replaceable in place).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongKey {
    /// Peer that owns the song bytes
    pub owner: PeerAddr,
    /// Id unique within the owner
    pub id: SongId,
}

impl SongKey {
    pub fn new(owner: PeerAddr, id: SongId) -> Self {
        Self { owner, id }
    }
}

impl fmt::Display for SongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.id)
    }
}

// ----------------------------------------------------------------------------
// Song Metadata
// ----------------------------------------------------------------------------

/// Metadata record for one song in the shared library.
///
/// Identity is the (owner, id) composite key; all other fields are tags and
/// may be updated in place by a later announcement from the owning peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMetadata {
    pub owner: PeerAddr,
    pub id: SongId,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Track length in seconds, 0 when unknown
    pub duration_secs: u32,
    /// Size of the audio bytes, used to size transfers
    pub file_size: u64,
}

impl SongMetadata {
    /// The composite identity key for this record
    pub fn key(&self) -> SongKey {
        SongKey::new(self.owner, self.id)
    }
}

// ----------------------------------------------------------------------------
// User List
// ----------------------------------------------------------------------------

/// One connected peer as presented to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub addr: PeerAddr,
    pub name: String,
}

/// Set of currently connected peers, maintained by the host and broadcast to
/// guests on churn. Guests diff successive lists to find departed owners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    users: Vec<User>,
}

impl UserList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or rename a user; address is the identity
    pub fn upsert(&mut self, addr: PeerAddr, name: impl Into<String>) {
        let name = name.into();
        if let Some(user) = self.users.iter_mut().find(|u| u.addr == addr) {
            user.name = name;
        } else {
            self.users.push(User { addr, name });
        }
    }

    /// Remove a user by address; no-op when absent
    pub fn remove(&mut self, addr: &PeerAddr) {
        self.users.retain(|u| u.addr != *addr);
    }

    pub fn contains(&self, addr: &PeerAddr) -> bool {
        self.users.iter().any(|u| u.addr == *addr)
    }

    pub fn addrs(&self) -> impl Iterator<Item = PeerAddr> + '_ {
        self.users.iter().map(|u| u.addr)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Session Role
// ----------------------------------------------------------------------------

/// Which side of the star topology this device plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Playback authority; owns the playlist and fans announcements out
    Host,
    /// Connected to exactly one host; forwards playlist/playback intents
    Guest,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
