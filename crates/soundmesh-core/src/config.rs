//! Session configuration
//!
//! Plain data with sensible defaults; the runtime validates once at startup
//! and threads the values through to tasks.

use serde::{Deserialize, Serialize};

use crate::types::{PeerAddr, Role};
use crate::wire::CHUNK_HEADER_LEN;
use crate::{Result, SoundmeshError};

// ----------------------------------------------------------------------------
// Writer Config
// ----------------------------------------------------------------------------

/// Tuning for the per-connection outbound multiplexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Bytes per write to the connection's byte sink, framing included.
    /// Matches the transport's negotiated packet size.
    pub packet_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        // Short-range radio links top out near 1 KiB per packet
        Self { packet_size: 990 }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.packet_size <= CHUNK_HEADER_LEN {
            return Err(SoundmeshError::invariant(format!(
                "packet_size {} leaves no room for a {CHUNK_HEADER_LEN}-byte chunk header",
                self.packet_size
            )));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Channel Config
// ----------------------------------------------------------------------------

/// Capacities for the session's bounded channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub command_capacity: usize,
    pub app_event_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            app_event_capacity: 256,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Config
// ----------------------------------------------------------------------------

/// Everything a session needs to start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Host coordinates the session; guests relay through the host
    pub role: Role,
    /// This device's transport address, used as the owner tag on every song
    /// it announces
    pub local_addr: PeerAddr,
    /// Display name shown to other users
    pub local_name: String,
    pub writer: WriterConfig,
    pub channels: ChannelConfig,
}

impl SessionConfig {
    pub fn new(role: Role, local_addr: PeerAddr, local_name: impl Into<String>) -> Self {
        Self {
            role,
            local_addr,
            local_name: local_name.into(),
            writer: WriterConfig::default(),
            channels: ChannelConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.writer.validate()
    }
}
