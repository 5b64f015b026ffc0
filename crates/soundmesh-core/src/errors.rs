//! Error types for the soundmesh session core
//!
//! One unified error enum covers the whole crate: serialization failures are
//! local to a single message, lookup misses are recoverable no-ops for the
//! caller, transport failures belong to the owning connection, and invariant
//! violations indicate a programming error rather than a runtime condition.

use crate::types::SongKey;

// ----------------------------------------------------------------------------
// Error Type
// ----------------------------------------------------------------------------

/// Core error type for the soundmesh session protocol
#[derive(Debug, thiserror::Error)]
pub enum SoundmeshError {
    /// A message could not be turned into bytes (or back); rejects only the
    /// one message involved, the queue and stores are unaffected
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// A remove/lookup target was absent; recoverable, callers log and move on
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: SongKey },

    /// Sink or source I/O failure; the connection owner tears the link down
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Index/order mismatch detected defensively; never expected under
    /// correct lock discipline
    #[error("state invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// An internal channel closed underneath a task
    #[error("channel error: {message}")]
    Channel { message: String },
}

impl SoundmeshError {
    /// Create a not-found error for a playlist or library lookup
    pub fn not_found(what: &'static str, key: SongKey) -> Self {
        SoundmeshError::NotFound { what, key }
    }

    /// Create an invariant-violation error with a reason
    pub fn invariant<T: Into<String>>(reason: T) -> Self {
        SoundmeshError::InvariantViolation {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel<T: Into<String>>(message: T) -> Self {
        SoundmeshError::Channel {
            message: message.into(),
        }
    }

    /// True for errors a caller should treat as a logged no-op
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SoundmeshError::NotFound { .. })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, SoundmeshError>;
