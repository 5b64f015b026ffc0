//! Chunk framing for multiplexed message streams
//!
//! The outbound multiplexer interleaves chunks of different in-flight
//! messages on one byte stream (a partially written bulk transfer yields to
//! control messages at every chunk boundary), so every chunk carries its own
//! header and the receiver reassembles per message sequence number.
//!
//! Chunk layout on the wire:
//!
//! ```text
//! | len: u16 BE | seq: u64 BE | flags: u8 | payload (len bytes) |
//! ```
//!
//! `flags` bit 0 (FIN) marks the final chunk of message `seq`.

use std::collections::HashMap;

use tracing::warn;

use crate::message::Message;
use crate::{Result, SoundmeshError};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Bytes of framing prepended to every chunk payload
pub const CHUNK_HEADER_LEN: usize = 11;

/// FIN flag: this chunk completes its message
pub const FLAG_FIN: u8 = 0x01;

/// Upper bound on one reassembled message (a transferred song plus framing
/// slack); anything larger poisons the stream and tears the connection down
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Maximum messages mid-reassembly per connection. The multiplexer interleaves
/// at most a handful, so hitting this means the peer is misbehaving.
pub const MAX_PARTIAL_MESSAGES: usize = 64;

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Serialize a message into its transferable byte form
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    Ok(bincode::serialize(message)?)
}

/// Deserialize a fully reassembled message payload
pub fn decode_message(payload: &[u8]) -> Result<Message> {
    Ok(bincode::deserialize(payload)?)
}

/// Frame one chunk of message `seq`
fn frame_chunk(seq: u64, payload: &[u8], fin: bool) -> Vec<u8> {
    debug_assert!(payload.len() <= u16::MAX as usize);
    let mut chunk = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
    chunk.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    chunk.extend_from_slice(&seq.to_be_bytes());
    chunk.push(if fin { FLAG_FIN } else { 0 });
    chunk.extend_from_slice(payload);
    chunk
}

// ----------------------------------------------------------------------------
// Message Stream
// ----------------------------------------------------------------------------

/// A serialized message plus a read cursor.
///
/// The multiplexer drains a stream chunk by chunk; between chunks the stream
/// sits re-queued with its original priority score.
#[derive(Debug)]
pub struct MessageStream {
    seq: u64,
    bytes: Vec<u8>,
    pos: usize,
}

impl MessageStream {
    /// Serialize a message into a chunkable stream
    pub fn new(seq: u64, message: &Message) -> Result<Self> {
        Ok(Self {
            seq,
            bytes: encode_message(message)?,
            pos: 0,
        })
    }

    /// Unread payload bytes remaining
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// True once every payload byte has been framed out
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Frame the next chunk, consuming up to `max_payload` payload bytes.
    /// Returns `None` when the stream is exhausted.
    pub fn next_chunk(&mut self, max_payload: usize) -> Option<Vec<u8>> {
        if self.is_exhausted() {
            return None;
        }
        let take = max_payload.min(u16::MAX as usize).min(self.remaining());
        let end = self.pos + take;
        let fin = end == self.bytes.len();
        let chunk = frame_chunk(self.seq, &self.bytes[self.pos..end], fin);
        self.pos = end;
        Some(chunk)
    }
}

// ----------------------------------------------------------------------------
// Chunk Assembler
// ----------------------------------------------------------------------------

/// Incremental decoder for the receiving side of a connection.
///
/// Feed it raw bytes as they arrive; it splits them into chunks, accumulates
/// per-seq payloads, and yields each message once its FIN chunk lands.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    /// Raw bytes not yet forming a complete chunk
    buf: Vec<u8>,
    /// Partially reassembled message payloads by sequence number
    partials: HashMap<u64, Vec<u8>>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of messages currently mid-reassembly
    pub fn pending(&self) -> usize {
        self.partials.len()
    }

    /// Feed received bytes; returns completed messages in FIN order
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<(u64, Message)>> {
        self.buf.extend_from_slice(data);
        let mut complete = Vec::new();

        loop {
            if self.buf.len() < CHUNK_HEADER_LEN {
                break;
            }
            let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
            if self.buf.len() < CHUNK_HEADER_LEN + len {
                break;
            }

            let mut seq_bytes = [0u8; 8];
            seq_bytes.copy_from_slice(&self.buf[2..10]);
            let seq = u64::from_be_bytes(seq_bytes);
            let fin = self.buf[10] & FLAG_FIN != 0;

            let payload_end = CHUNK_HEADER_LEN + len;
            let partial = self.partials.entry(seq).or_default();
            partial.extend_from_slice(&self.buf[CHUNK_HEADER_LEN..payload_end]);
            if partial.len() > MAX_MESSAGE_BYTES {
                self.partials.remove(&seq);
                return Err(SoundmeshError::Transport(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "message exceeds reassembly limit",
                )));
            }
            self.buf.drain(..payload_end);

            if fin {
                let payload = self.partials.remove(&seq).unwrap_or_default();
                complete.push((seq, decode_message(&payload)?));
            } else if self.partials.len() > MAX_PARTIAL_MESSAGES {
                // Misbehaving peer; shed the oldest partial and keep going
                if let Some(&oldest) = self.partials.keys().min() {
                    warn!(seq = oldest, "too many partial messages, dropping oldest");
                    self.partials.remove(&oldest);
                }
            }
        }

        Ok(complete)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
