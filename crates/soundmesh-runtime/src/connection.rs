//! Per-connection transport tasks
//!
//! Each paired peer gets one writer task and one reader task over its byte
//! stream. The writer owns the outbound priority multiplexer: it absorbs
//! everything queued on its channel, drains one framed chunk per write, and
//! parks on the channel when the queue runs dry. No polling, no sleeps. The
//! reader feeds raw bytes into a chunk assembler and forwards each completed
//! message to the session logic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use soundmesh_core::channel::{Event, EventSender};
use soundmesh_core::types::PeerAddr;
use soundmesh_core::wire::ChunkAssembler;
use soundmesh_core::writer::MessageWriter;
use soundmesh_core::{Message, Result, SoundmeshError};

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Cloneable sending side of one connection.
///
/// The handle stamps each message with the connection's next sequence number
/// and hands it to the writer task. Sequence assignment and channel order are
/// atomic with respect to each other only per handle call; all callers share
/// one counter, so sequence numbers stay unique and monotone per connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    peer: PeerAddr,
    next_seq: Arc<AtomicU64>,
    outbound_tx: mpsc::UnboundedSender<(u64, Message)>,
}

impl ConnectionHandle {
    pub fn peer(&self) -> PeerAddr {
        self.peer
    }

    /// Queue a message for this connection. Fails only when the connection
    /// is already torn down; anything still queued at that point is dropped
    /// rather than delivered.
    pub fn send(&self, message: Message) -> Result<()> {
        // Sequences start at 1 so a bulk message's score is never zero
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(peer = %self.peer, seq, kind = message.name(), "queueing outbound message");
        self.outbound_tx
            .send((seq, message))
            .map_err(|_| SoundmeshError::channel(format!("connection to {} closed", self.peer)))
    }
}

// ----------------------------------------------------------------------------
// Writer Task
// ----------------------------------------------------------------------------

/// Owns one connection's byte sink and its outbound multiplexer
struct ConnectionWriter<W> {
    peer: PeerAddr,
    sink: W,
    writer: MessageWriter,
    outbound_rx: mpsc::UnboundedReceiver<(u64, Message)>,
    event_tx: EventSender,
}

impl<W: AsyncWrite + Unpin> ConnectionWriter<W> {
    async fn run(mut self) {
        loop {
            // Absorb every message already waiting before draining a chunk,
            // so anything enqueued during the previous write competes on
            // priority rather than on arrival
            loop {
                match self.outbound_rx.try_recv() {
                    Ok((seq, message)) => self.enqueue(seq, &message),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        // Teardown discards whatever is still queued
                        debug!(peer = %self.peer, pending = self.writer.pending(),
                               "connection closed, discarding outbound queue");
                        return;
                    }
                }
            }

            if self.writer.can_write_more() {
                if let Err(e) = self.write_next_chunk().await {
                    self.report_disconnect(e.to_string());
                    return;
                }
            } else {
                // Queue is dry; park on the channel until something arrives
                match self.outbound_rx.recv().await {
                    Some((seq, message)) => self.enqueue(seq, &message),
                    None => {
                        debug!(peer = %self.peer, "connection closed");
                        return;
                    }
                }
            }
        }
    }

    /// A message that fails to serialize is rejected alone; the queue and
    /// the connection stay up
    fn enqueue(&mut self, seq: u64, message: &Message) {
        if let Err(e) = self.writer.enqueue(seq, message) {
            warn!(peer = %self.peer, seq, kind = message.name(),
                  error = %e, "dropping unserializable message");
        }
    }

    async fn write_next_chunk(&mut self) -> Result<()> {
        if let Some(chunk) = self.writer.next_chunk() {
            trace!(peer = %self.peer, seq = chunk.seq, len = chunk.bytes.len(),
                   finished = chunk.finished, "writing chunk");
            self.sink.write_all(&chunk.bytes).await?;
            self.sink.flush().await?;
        }
        Ok(())
    }

    fn report_disconnect(&self, reason: String) {
        warn!(peer = %self.peer, %reason, "write failed, connection down");
        let _ = self.event_tx.send(Event::PeerDisconnected {
            peer: self.peer,
            reason,
        });
    }
}

// ----------------------------------------------------------------------------
// Reader Task
// ----------------------------------------------------------------------------

/// Owns one connection's byte source and its reassembly state
struct ConnectionReader<R> {
    peer: PeerAddr,
    source: R,
    assembler: ChunkAssembler,
    event_tx: EventSender,
}

impl<R: AsyncRead + Unpin> ConnectionReader<R> {
    async fn run(mut self) {
        let mut buf = vec![0u8; 4096];
        loop {
            match self.source.read(&mut buf).await {
                Ok(0) => {
                    self.report_disconnect("peer closed connection".into());
                    return;
                }
                Ok(n) => match self.assembler.feed(&buf[..n]) {
                    Ok(messages) => {
                        for (seq, message) in messages {
                            trace!(peer = %self.peer, seq, kind = message.name(),
                                   "message reassembled");
                            if self
                                .event_tx
                                .send(Event::MessageReceived {
                                    from: self.peer,
                                    message,
                                })
                                .is_err()
                            {
                                // Session logic is gone; nothing left to do
                                return;
                            }
                        }
                    }
                    // A poisoned stream cannot be resynchronized
                    Err(e) => {
                        self.report_disconnect(e.to_string());
                        return;
                    }
                },
                Err(e) => {
                    self.report_disconnect(e.to_string());
                    return;
                }
            }
        }
    }

    fn report_disconnect(&self, reason: String) {
        debug!(peer = %self.peer, %reason, "connection reader stopping");
        let _ = self.event_tx.send(Event::PeerDisconnected {
            peer: self.peer,
            reason,
        });
    }
}

// ----------------------------------------------------------------------------
// Spawning
// ----------------------------------------------------------------------------

/// Running task handles for one connection
pub struct ConnectionTasks {
    pub writer: JoinHandle<()>,
    pub reader: JoinHandle<()>,
}

/// Split a peer's byte stream and spawn its writer and reader tasks.
///
/// `packet_size` bounds each write to the sink, framing included. Dropping
/// every clone of the returned handle closes the connection's outbound side
/// and discards any undelivered messages.
pub fn spawn_connection<S>(
    peer: PeerAddr,
    stream: S,
    packet_size: usize,
    event_tx: EventSender,
) -> (ConnectionHandle, ConnectionTasks)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (source, sink) = tokio::io::split(stream);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let writer = ConnectionWriter {
        peer,
        sink,
        writer: MessageWriter::new(packet_size),
        outbound_rx,
        event_tx: event_tx.clone(),
    };
    let reader = ConnectionReader {
        peer,
        source,
        assembler: ChunkAssembler::new(),
        event_tx,
    };

    let handle = ConnectionHandle {
        peer,
        next_seq: Arc::new(AtomicU64::new(0)),
        outbound_tx,
    };
    let tasks = ConnectionTasks {
        writer: tokio::spawn(writer.run()),
        reader: tokio::spawn(reader.run()),
    };
    (handle, tasks)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
