//! Session runtime
//!
//! Wires the channel set, spawns the session logic task, and manages the
//! per-peer connection tasks. The transport itself (pairing, sockets, radio
//! links) lives outside this crate; anything implementing `AsyncRead +
//! AsyncWrite` can be attached as a peer connection.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use soundmesh_core::channel::{
    create_session_channels, AppEventReceiver, Command, CommandSender, Event, EventSender,
};
use soundmesh_core::types::PeerAddr;
use soundmesh_core::{Result, SessionConfig, SoundmeshError};

use crate::connection::{spawn_connection, ConnectionHandle};
use crate::logic::SessionLogicTask;

// ----------------------------------------------------------------------------
// Session Runtime
// ----------------------------------------------------------------------------

/// Coordinates one device's participation in a session.
///
/// Create it, take the app event receiver, start it, then attach peer byte
/// streams as the transport pairs them. Commands go in through
/// [`SessionRuntime::command_sender`].
pub struct SessionRuntime {
    config: SessionConfig,
    connections: Arc<DashMap<PeerAddr, ConnectionHandle>>,
    command_tx: CommandSender,
    event_tx: EventSender,
    app_event_rx: Option<AppEventReceiver>,
    logic: Option<SessionLogicTask>,
    logic_handle: Option<JoinHandle<Result<()>>>,
}

impl SessionRuntime {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let channels = create_session_channels(&config.channels);
        let connections = Arc::new(DashMap::new());
        let logic = SessionLogicTask::new(
            config.clone(),
            Arc::clone(&connections),
            channels.command_rx,
            channels.event_rx,
            channels.app_event_tx,
        );
        Ok(Self {
            config,
            connections,
            command_tx: channels.command_tx,
            event_tx: channels.event_tx,
            app_event_rx: Some(channels.app_event_rx),
            logic: Some(logic),
            logic_handle: None,
        })
    }

    /// Spawn the session logic task. Fails on a second call.
    pub fn start(&mut self) -> Result<()> {
        let mut logic = self
            .logic
            .take()
            .ok_or_else(|| SoundmeshError::channel("runtime already started"))?;
        info!(role = ?self.config.role, addr = %self.config.local_addr, "starting session runtime");
        self.logic_handle = Some(tokio::spawn(async move { logic.run().await }));
        Ok(())
    }

    /// Sender for application commands
    pub fn command_sender(&self) -> CommandSender {
        self.command_tx.clone()
    }

    /// Take the app event stream; yields `None` after the first call
    pub fn take_app_events(&mut self) -> Option<AppEventReceiver> {
        self.app_event_rx.take()
    }

    /// Attach a paired peer's byte stream, spawning its writer and reader
    /// tasks, and announce the peer to the session logic
    pub fn attach_peer<S>(&self, peer: PeerAddr, name: impl Into<String>, stream: S) -> Result<ConnectionHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (handle, _tasks) = spawn_connection(
            peer,
            stream,
            self.config.writer.packet_size,
            self.event_tx.clone(),
        );
        if self.connections.insert(peer, handle.clone()).is_some() {
            warn!(%peer, "replacing existing connection");
        }
        self.event_tx
            .send(Event::PeerConnected {
                peer,
                name: name.into(),
            })
            .map_err(|_| SoundmeshError::channel("session logic is not running"))?;
        Ok(handle)
    }

    /// Drop a peer's connection deliberately. Undelivered outbound messages
    /// are discarded; the logic task evicts the peer's library records.
    pub fn detach_peer(&self, peer: &PeerAddr) -> Result<()> {
        if self.connections.remove(peer).is_none() {
            return Err(SoundmeshError::channel(format!("no connection to {peer}")));
        }
        self.event_tx
            .send(Event::PeerDisconnected {
                peer: *peer,
                reason: "detached locally".into(),
            })
            .map_err(|_| SoundmeshError::channel("session logic is not running"))?;
        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Request shutdown and wait for the logic task to stop
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.command_tx.send(Command::Shutdown).await.is_err() {
            // Logic already gone; just reap the handle below
            warn!("command channel closed before shutdown");
        }
        self.connections.clear();
        if let Some(handle) = self.logic_handle.take() {
            handle
                .await
                .map_err(|e| SoundmeshError::channel(format!("logic task panicked: {e}")))??;
        }
        Ok(())
    }
}
