//! Outbound priority multiplexer
//!
//! Per connection, pending outbound messages wait in a priority queue keyed
//! by `sequence × weight(kind)`; lower scores drain first. Bulk song
//! transfers carry a large weight, so a control message enqueued later still
//! cuts ahead of an in-flight transfer at the next chunk boundary, and a
//! partially drained message keeps its original score when it is re-queued.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::message::{Message, MessageKind};
use crate::wire::{MessageStream, CHUNK_HEADER_LEN};
use crate::Result;

// ----------------------------------------------------------------------------
// Queue Entry
// ----------------------------------------------------------------------------

/// One pending outbound message stream
#[derive(Debug)]
struct QueueEntry {
    /// Sort key: `seq * kind.weight()`, fixed at enqueue time
    score: u64,
    seq: u64,
    kind: MessageKind,
    stream: MessageStream,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Score first; equal scores fall back to arrival order
        self.score
            .cmp(&other.score)
            .then(self.seq.cmp(&other.seq))
    }
}

// ----------------------------------------------------------------------------
// Drained Chunk
// ----------------------------------------------------------------------------

/// One framed chunk ready for the byte sink
#[derive(Debug)]
pub struct Chunk {
    /// Sequence number of the message this chunk belongs to
    pub seq: u64,
    pub kind: MessageKind,
    /// Framed bytes (header + payload), sized to the sink's packet budget
    pub bytes: Vec<u8>,
    /// True when this chunk completes its message
    pub finished: bool,
}

// ----------------------------------------------------------------------------
// Message Writer
// ----------------------------------------------------------------------------

/// Priority queue of pending outbound message streams for one connection.
///
/// The writer holds no I/O; the owning task pulls framed chunks out of it and
/// writes them to the connection's byte sink.
#[derive(Debug)]
pub struct MessageWriter {
    queue: BinaryHeap<Reverse<QueueEntry>>,
    /// Payload bytes per chunk, derived from the sink's packet size
    chunk_payload_limit: usize,
}

impl MessageWriter {
    /// Create a writer for a sink with the given negotiated packet size.
    /// Framing overhead is carved out of the packet budget.
    pub fn new(packet_size: usize) -> Self {
        assert!(
            packet_size > CHUNK_HEADER_LEN,
            "packet size must exceed chunk header"
        );
        Self {
            queue: BinaryHeap::new(),
            chunk_payload_limit: packet_size - CHUNK_HEADER_LEN,
        }
    }

    /// Serialize and queue a message under sequence number `seq`.
    ///
    /// Sequence numbers must be assigned monotonically by a single authority
    /// per connection; the priority score is fixed here and never changes,
    /// even across partial drains. A serialization failure rejects only this
    /// message and leaves the queue untouched.
    pub fn enqueue(&mut self, seq: u64, message: &Message) -> Result<()> {
        let kind = message.kind();
        let stream = MessageStream::new(seq, message)?;
        self.queue.push(Reverse(QueueEntry {
            score: seq.saturating_mul(kind.weight()),
            seq,
            kind,
            stream,
        }));
        Ok(())
    }

    /// True iff at least one message still has bytes to drain
    pub fn can_write_more(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Messages currently queued (partially drained ones included)
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pop the lowest-score message and frame its next chunk.
    ///
    /// If the message has bytes left after this chunk it is re-inserted with
    /// its original score, so a large transfer competes fairly against newer
    /// messages on every chunk boundary. Returns `None` on an empty queue.
    pub fn next_chunk(&mut self) -> Option<Chunk> {
        let Reverse(mut entry) = self.queue.pop()?;
        // A queued stream always has bytes remaining, so this cannot be None
        let bytes = entry.stream.next_chunk(self.chunk_payload_limit)?;
        let finished = entry.stream.is_exhausted();
        let chunk = Chunk {
            seq: entry.seq,
            kind: entry.kind,
            bytes,
            finished,
        };
        if !finished {
            self.queue.push(Reverse(entry));
        }
        Some(chunk)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PeerAddr, SongId, SongKey};

    fn text(n: usize) -> Message {
        Message::Text(format!("message {n}"))
    }

    fn transfer(bytes: usize) -> Message {
        Message::TransferSong {
            key: SongKey::new(PeerAddr::new([1; 6]), SongId(4)),
            file_name: "song.mp3".into(),
            bytes: vec![0x55; bytes],
        }
    }

    /// Drain everything, returning the seq of each completed message in order
    fn drain_completion_order(writer: &mut MessageWriter) -> Vec<u64> {
        let mut order = Vec::new();
        while let Some(chunk) = writer.next_chunk() {
            if chunk.finished {
                order.push(chunk.seq);
            }
        }
        order
    }

    #[test]
    fn test_same_kind_drains_in_sequence_order() {
        let mut writer = MessageWriter::new(256);
        // Enqueue out of arrival-order on purpose; score still sorts by seq
        for seq in [3u64, 1, 5, 2, 4] {
            writer.enqueue(seq, &text(seq as usize)).unwrap();
        }
        assert_eq!(drain_completion_order(&mut writer), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_control_cuts_ahead_of_bulk() {
        // Transfer at seq 1 scores 100; control at seq 5 scores 5
        let mut writer = MessageWriter::new(64);
        writer.enqueue(1, &transfer(1000)).unwrap();
        writer.enqueue(5, &text(5)).unwrap();

        let first = writer.next_chunk().unwrap();
        assert_eq!(first.seq, 5);
        assert_eq!(first.kind, MessageKind::Control);
        assert!(first.finished);
    }

    #[test]
    fn test_bulk_never_starves_control_stream() {
        // A big transfer in progress must not block controls arriving later
        let mut writer = MessageWriter::new(64);
        writer.enqueue(1, &transfer(5000)).unwrap();

        // First chunk of the transfer goes out
        let chunk = writer.next_chunk().unwrap();
        assert_eq!(chunk.seq, 1);
        assert!(!chunk.finished);

        // Controls enqueued mid-transfer all complete before the transfer
        for seq in 2..=10u64 {
            writer.enqueue(seq, &text(seq as usize)).unwrap();
        }
        let order = drain_completion_order(&mut writer);
        assert_eq!(order.last(), Some(&1));
        assert_eq!(&order[..9], &[2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_requeue_preserves_original_score() {
        // Two transfers; the first is multi-chunk and must not lose its spot
        // to the second across partial drains
        let mut writer = MessageWriter::new(64);
        writer.enqueue(1, &transfer(2000)).unwrap();
        writer.enqueue(2, &transfer(2000)).unwrap();

        let mut seen_seq2 = false;
        while let Some(chunk) = writer.next_chunk() {
            if chunk.seq == 2 {
                seen_seq2 = true;
            }
            if chunk.seq == 1 {
                assert!(!seen_seq2, "seq 1 lost priority after re-queue");
            }
            if chunk.seq == 1 && chunk.finished {
                break;
            }
        }
    }

    #[test]
    fn test_concrete_scores_from_weights() {
        // control seq=5 scores 5, transfer seq=1 scores 100: control first
        let mut writer = MessageWriter::new(4096);
        writer.enqueue(5, &text(5)).unwrap();
        writer.enqueue(1, &transfer(10)).unwrap();
        assert_eq!(drain_completion_order(&mut writer), vec![5, 1]);
    }

    #[test]
    fn test_empty_queue_is_a_noop() {
        let mut writer = MessageWriter::new(256);
        assert!(!writer.can_write_more());
        assert!(writer.next_chunk().is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Same-kind batches always complete in ascending sequence order,
            /// whatever the arrival order and message sizes.
            #[test]
            fn control_batches_drain_in_seq_order(
                sizes in proptest::collection::vec(1usize..400, 1..20),
                shuffle_seed in any::<u64>(),
            ) {
                // Cheap deterministic shuffle of enqueue order
                let n = sizes.len();
                let mut order: Vec<u64> = (1..=n as u64).collect();
                for i in (1..n).rev() {
                    let j = (shuffle_seed as usize).wrapping_mul(i) % (i + 1);
                    order.swap(i, j);
                }

                let mut writer = MessageWriter::new(64);
                for &seq in &order {
                    let size = sizes[(seq - 1) as usize];
                    writer
                        .enqueue(seq, &Message::Text("x".repeat(size)))
                        .unwrap();
                }

                let completed = drain_completion_order(&mut writer);
                let expected: Vec<u64> = (1..=n as u64).collect();
                prop_assert_eq!(completed, expected);
            }
        }
    }
}
