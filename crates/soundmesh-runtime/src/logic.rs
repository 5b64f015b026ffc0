//! Session logic task
//!
//! The single task that owns all session state and processes every command
//! from the local application and every event from the connection tasks.
//! Serializing the whole protocol through one task means no locks and no
//! interleaving hazards: each mutation completes, produces its snapshot, and
//! notifies subscribers before the next input is looked at.
//!
//! Role asymmetry: the host owns the authoritative playlist and user list and
//! fans state out to guests; a guest holds exactly one connection (to the
//! host), forwards its playlist and playback intents there, and mirrors the
//! snapshots the host pushes back.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use soundmesh_core::channel::{
    AppEvent, AppEventSender, Command, CommandReceiver, Event, EventReceiver, PlaybackCommand,
};
use soundmesh_core::types::{PeerAddr, Role, SongKey, SongMetadata, UserList};
use soundmesh_core::{Message, Result, SessionConfig, SoundmeshError};

use crate::connection::ConnectionHandle;
use crate::managers::{LibraryManager, PlaylistManager};

// ----------------------------------------------------------------------------
// Session Logic Task
// ----------------------------------------------------------------------------

/// Owns all session state and routes every command and event
pub struct SessionLogicTask {
    config: SessionConfig,
    library: LibraryManager,
    playlist: PlaylistManager,
    users: UserList,
    /// Shared with the runtime, which inserts handles as peers attach
    connections: Arc<DashMap<PeerAddr, ConnectionHandle>>,
    command_rx: CommandReceiver,
    event_rx: EventReceiver,
    app_event_tx: AppEventSender,
    playing: bool,
    current_song: Option<SongMetadata>,
    running: bool,
}

impl SessionLogicTask {
    pub fn new(
        config: SessionConfig,
        connections: Arc<DashMap<PeerAddr, ConnectionHandle>>,
        command_rx: CommandReceiver,
        event_rx: EventReceiver,
        app_event_tx: AppEventSender,
    ) -> Self {
        let mut users = UserList::new();
        users.upsert(config.local_addr, config.local_name.clone());
        let local = config.local_addr;
        Self {
            config,
            library: LibraryManager::new(local),
            playlist: PlaylistManager::new(local),
            users,
            connections,
            command_rx,
            event_rx,
            app_event_tx,
            playing: false,
            current_song: None,
            running: true,
        }
    }

    fn is_host(&self) -> bool {
        self.config.role == Role::Host
    }

    /// Run the session logic loop until shutdown or a fatal error
    pub async fn run(&mut self) -> Result<()> {
        info!(role = ?self.config.role, addr = %self.config.local_addr, "session logic starting");

        while self.running {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(cmd) => {
                        if let Err(e) = self.process_command(cmd).await {
                            self.handle_task_error(e, "command");
                        }
                    }
                    None => {
                        info!("command channel closed, shutting down");
                        break;
                    }
                },
                event = self.event_rx.recv() => match event {
                    Some(evt) => {
                        if let Err(e) = self.process_event(evt).await {
                            self.handle_task_error(e, "event");
                        }
                    }
                    None => {
                        info!("event channel closed, shutting down");
                        break;
                    }
                },
            }
        }

        info!("session logic stopped");
        Ok(())
    }

    /// Channel failures are unrecoverable; everything else is logged and the
    /// loop keeps serving
    fn handle_task_error(&mut self, error: SoundmeshError, source: &str) {
        if matches!(error, SoundmeshError::Channel { .. }) {
            error!(%error, source, "unrecoverable error, stopping session logic");
            self.running = false;
        } else if error.is_recoverable() {
            warn!(%error, source, "dropping input");
        } else {
            error!(%error, source, "error processing input");
        }
    }

    // ----------------------------------------------------------------------------
    // Command Processing
    // ----------------------------------------------------------------------------

    async fn process_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::AnnounceLibrary(mut songs) => {
                // The owner tag is this device's identity regardless of what
                // the caller filled in
                for song in &mut songs {
                    song.owner = self.config.local_addr;
                }
                let snapshot = self.library.merge(songs.clone())?;
                self.notify(AppEvent::LibraryUpdated(snapshot)).await?;
                if self.is_host() {
                    self.broadcast(&Message::LibraryAnnounce(songs));
                } else {
                    self.forward_to_host(Message::LibraryAnnounce(songs));
                }
            }
            Command::AddToPlaylist(song) => {
                if self.is_host() {
                    self.host_add_to_playlist(song).await?;
                } else {
                    self.forward_to_host(Message::AddToPlaylist(song));
                }
            }
            Command::RemoveFromPlaylist(key) => {
                if self.is_host() {
                    self.host_remove_from_playlist(key).await?;
                } else {
                    self.forward_to_host(Message::RemoveFromPlaylist(key));
                }
            }
            Command::BumpSong(key) => {
                if self.is_host() {
                    self.host_bump_song(key).await?;
                } else {
                    self.forward_to_host(Message::BumpSong(key));
                }
            }
            Command::RequestNextSong => {
                if !self.require_host("RequestNextSong") {
                    return Ok(());
                }
                let next = self.advance_playback().await?;
                self.notify(AppEvent::NextSong(next)).await?;
            }
            Command::ResetPlaylist => {
                if !self.require_host("ResetPlaylist") {
                    return Ok(());
                }
                let snapshot = self.playlist.reset();
                self.broadcast(&Message::PlaylistUpdate(snapshot.clone()));
                self.notify(AppEvent::PlaylistChanged(snapshot)).await?;
            }
            Command::ClearPlaylist => {
                if !self.require_host("ClearPlaylist") {
                    return Ok(());
                }
                let snapshot = self.playlist.clear();
                self.broadcast(&Message::PlaylistUpdate(snapshot.clone()));
                self.notify(AppEvent::PlaylistChanged(snapshot)).await?;
            }
            Command::Playback(cmd) => {
                self.handle_playback_intent(cmd).await?;
            }
            Command::SendSong {
                to,
                key,
                file_name,
                bytes,
            } => {
                self.send_to(
                    &to,
                    Message::TransferSong {
                        key,
                        file_name,
                        bytes,
                    },
                );
            }
            Command::ClearExternalMusic => {
                let snapshot = self.library.clear_external()?;
                self.notify(AppEvent::LibraryUpdated(snapshot)).await?;
            }
            Command::SendText(text) => {
                self.broadcast(&Message::Text(text));
            }
            Command::Shutdown => {
                info!("shutdown requested");
                self.running = false;
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------------------
    // Event Processing
    // ----------------------------------------------------------------------------

    async fn process_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::PeerConnected { peer, name } => self.handle_peer_connected(peer, name).await,
            Event::PeerDisconnected { peer, reason } => {
                self.handle_peer_disconnected(peer, reason).await
            }
            Event::MessageReceived { from, message } => {
                debug!(%from, kind = message.name(), "message received");
                self.handle_message(from, message).await
            }
        }
    }

    async fn handle_peer_connected(&mut self, peer: PeerAddr, name: String) -> Result<()> {
        info!(%peer, %name, "peer connected");
        self.users.upsert(peer, name.clone());
        self.notify(AppEvent::PeerJoined { peer, name }).await?;
        self.notify(AppEvent::UserListUpdated(self.users.clone()))
            .await?;

        if self.is_host() {
            // Everyone learns about the newcomer; the newcomer gets the full
            // session state
            self.broadcast(&Message::UserList(self.users.clone()));
            if !self.library.is_empty() {
                self.send_to(&peer, Message::LibraryAnnounce(self.library.snapshot()));
            }
            if !self.playlist.is_empty() {
                self.send_to(&peer, Message::PlaylistUpdate(self.playlist.snapshot()));
            }
        }
        Ok(())
    }

    async fn handle_peer_disconnected(&mut self, peer: PeerAddr, reason: String) -> Result<()> {
        // Reader and writer can both report the same teardown
        let had_connection = self.connections.remove(&peer).is_some();
        if !had_connection && !self.users.contains(&peer) {
            debug!(%peer, "duplicate disconnect, ignoring");
            return Ok(());
        }
        info!(%peer, %reason, "peer disconnected");

        self.users.remove(&peer);
        if let Some(snapshot) = self.library.evict_owner(&peer)? {
            self.notify(AppEvent::LibraryUpdated(snapshot)).await?;
        }
        self.notify(AppEvent::PeerLeft { peer }).await?;
        self.notify(AppEvent::UserListUpdated(self.users.clone()))
            .await?;

        if self.is_host() {
            self.broadcast(&Message::UserList(self.users.clone()));
        }
        Ok(())
    }

    async fn handle_message(&mut self, from: PeerAddr, message: Message) -> Result<()> {
        match message {
            Message::LibraryAnnounce(songs) => {
                let snapshot = self.library.merge(songs.clone())?;
                self.notify(AppEvent::LibraryUpdated(snapshot)).await?;
                if self.is_host() {
                    // Guests only talk to the host; relay to the others
                    self.broadcast_except(&from, &Message::LibraryAnnounce(songs));
                }
            }
            Message::UserList(list) => {
                // Only the host is authoritative for the user set
                if self.is_host() {
                    warn!(%from, "host received UserList, ignoring");
                } else {
                    self.adopt_user_list(from, list).await?;
                }
            }
            Message::AddToPlaylist(song) => {
                if self.is_host() {
                    self.host_add_to_playlist(song).await?;
                } else {
                    warn!(%from, "guest received AddToPlaylist, ignoring");
                }
            }
            Message::RemoveFromPlaylist(key) => {
                if self.is_host() {
                    self.host_remove_from_playlist(key).await?;
                }
            }
            Message::BumpSong(key) => {
                if self.is_host() {
                    self.host_bump_song(key).await?;
                }
            }
            Message::PlaylistUpdate(entries) => {
                if self.is_host() {
                    warn!(%from, "host received PlaylistUpdate, ignoring");
                } else {
                    let snapshot = self.playlist.replace(entries);
                    self.notify(AppEvent::PlaylistChanged(snapshot)).await?;
                }
            }
            Message::SongStatus(entry) => {
                if !self.is_host() {
                    self.current_song = Some(entry.song.clone());
                    self.notify(AppEvent::SongStatus(entry)).await?;
                }
            }
            Message::PlayStatus { playing, song } => {
                if !self.is_host() {
                    self.playing = playing;
                    self.current_song = song.clone();
                    self.notify(AppEvent::PlayStatusChanged { playing, song })
                        .await?;
                }
            }
            Message::Play => self.handle_playback_message(PlaybackCommand::Play).await?,
            Message::Pause => self.handle_playback_message(PlaybackCommand::Pause).await?,
            Message::Skip => self.handle_playback_message(PlaybackCommand::Skip).await?,
            Message::RequestSong(key) => {
                self.notify(AppEvent::SongRequested { from, key }).await?;
            }
            Message::TransferSong {
                key,
                file_name,
                bytes,
            } => {
                if let Some(snapshot) = self.playlist.mark_loaded(&key) {
                    if self.is_host() {
                        self.broadcast(&Message::PlaylistUpdate(snapshot.clone()));
                    }
                    self.notify(AppEvent::PlaylistChanged(snapshot)).await?;
                }
                self.notify(AppEvent::SongReceived {
                    from,
                    key,
                    file_name,
                    bytes,
                })
                .await?;
            }
            Message::Text(text) => {
                self.notify(AppEvent::TextMessage { from, text }).await?;
            }
        }
        Ok(())
    }

    /// Guest side: adopt the host's user list and evict library records of
    /// anyone who silently fell out of it
    async fn adopt_user_list(&mut self, from: PeerAddr, list: UserList) -> Result<()> {
        let local = self.config.local_addr;
        let departed: Vec<PeerAddr> = self
            .users
            .addrs()
            .filter(|addr| *addr != local && *addr != from && !list.contains(addr))
            .collect();
        for owner in departed {
            debug!(%owner, "owner left the session, evicting library records");
            if let Some(snapshot) = self.library.evict_owner(&owner)? {
                self.notify(AppEvent::LibraryUpdated(snapshot)).await?;
            }
        }
        self.users = list;
        self.notify(AppEvent::UserListUpdated(self.users.clone()))
            .await
    }

    // ----------------------------------------------------------------------------
    // Host Playlist Handling
    // ----------------------------------------------------------------------------

    async fn host_add_to_playlist(&mut self, song: SongMetadata) -> Result<()> {
        let owner = song.owner;
        let key = song.key();
        let (entry, snapshot) = self.playlist.add_song(song);
        if !entry.loaded {
            // The bytes live on another device; fetch them ahead of playback
            self.send_to(&owner, Message::RequestSong(key));
        }
        self.broadcast(&Message::PlaylistUpdate(snapshot.clone()));
        self.notify(AppEvent::PlaylistChanged(snapshot)).await
    }

    async fn host_remove_from_playlist(&mut self, key: SongKey) -> Result<()> {
        let snapshot = self.playlist.remove_song(&key)?;
        self.broadcast(&Message::PlaylistUpdate(snapshot.clone()));
        self.notify(AppEvent::PlaylistChanged(snapshot)).await
    }

    async fn host_bump_song(&mut self, key: SongKey) -> Result<()> {
        let snapshot = self.playlist.bump_song(&key);
        self.broadcast(&Message::PlaylistUpdate(snapshot.clone()));
        self.notify(AppEvent::PlaylistChanged(snapshot)).await
    }

    // ----------------------------------------------------------------------------
    // Playback
    // ----------------------------------------------------------------------------

    /// A playback intent from the local application
    async fn handle_playback_intent(&mut self, cmd: PlaybackCommand) -> Result<()> {
        if !self.is_host() {
            let message = match cmd {
                PlaybackCommand::Play => Message::Play,
                PlaybackCommand::Pause => Message::Pause,
                PlaybackCommand::Skip => Message::Skip,
            };
            self.forward_to_host(message);
            return Ok(());
        }
        self.apply_playback(cmd).await
    }

    /// A playback message from a peer: an intent when we are the host, the
    /// host's decision when we are a guest
    async fn handle_playback_message(&mut self, cmd: PlaybackCommand) -> Result<()> {
        if self.is_host() {
            self.apply_playback(cmd).await
        } else {
            match cmd {
                PlaybackCommand::Play => self.playing = true,
                PlaybackCommand::Pause => self.playing = false,
                PlaybackCommand::Skip => {}
            }
            self.notify(AppEvent::Playback(cmd)).await
        }
    }

    /// Host side: apply a playback intent and push the outcome to guests
    async fn apply_playback(&mut self, cmd: PlaybackCommand) -> Result<()> {
        match cmd {
            PlaybackCommand::Play => {
                self.playing = true;
                self.broadcast(&Message::Play);
            }
            PlaybackCommand::Pause => {
                self.playing = false;
                self.broadcast(&Message::Pause);
            }
            PlaybackCommand::Skip => {
                self.broadcast(&Message::Skip);
                self.advance_playback().await?;
            }
        }
        self.notify(AppEvent::Playback(cmd)).await?;
        self.push_play_status().await
    }

    /// Move the play cursor to the next loaded song, if any
    async fn advance_playback(
        &mut self,
    ) -> Result<Option<soundmesh_core::playlist::PlaylistEntry>> {
        match self.playlist.next_available_song() {
            Some(entry) => {
                self.playing = true;
                self.current_song = Some(entry.song.clone());
                let snapshot = self.playlist.snapshot();
                self.broadcast(&Message::SongStatus(entry.clone()));
                self.broadcast(&Message::PlaylistUpdate(snapshot.clone()));
                self.notify(AppEvent::SongStatus(entry.clone())).await?;
                self.notify(AppEvent::PlaylistChanged(snapshot)).await?;
                Ok(Some(entry))
            }
            None => {
                // Nothing loaded yet; transfers may still be in flight
                self.playing = false;
                Ok(None)
            }
        }
    }

    async fn push_play_status(&mut self) -> Result<()> {
        let status = Message::PlayStatus {
            playing: self.playing,
            song: self.current_song.clone(),
        };
        self.broadcast(&status);
        self.notify(AppEvent::PlayStatusChanged {
            playing: self.playing,
            song: self.current_song.clone(),
        })
        .await
    }

    // ----------------------------------------------------------------------------
    // Outbound Helpers
    // ----------------------------------------------------------------------------

    /// True when this device may execute a host-only operation
    fn require_host(&self, what: &str) -> bool {
        if self.is_host() {
            true
        } else {
            warn!(what, "host-only command on a guest, ignoring");
            false
        }
    }

    fn broadcast(&self, message: &Message) {
        for entry in self.connections.iter() {
            if let Err(e) = entry.value().send(message.clone()) {
                warn!(peer = %entry.key(), error = %e, "broadcast send failed");
            }
        }
    }

    fn broadcast_except(&self, origin: &PeerAddr, message: &Message) {
        for entry in self.connections.iter() {
            if entry.key() == origin {
                continue;
            }
            if let Err(e) = entry.value().send(message.clone()) {
                warn!(peer = %entry.key(), error = %e, "broadcast send failed");
            }
        }
    }

    fn send_to(&self, peer: &PeerAddr, message: Message) {
        match self.connections.get(peer) {
            Some(handle) => {
                if let Err(e) = handle.send(message) {
                    warn!(%peer, error = %e, "send failed");
                }
            }
            None => warn!(%peer, kind = message.name(), "no connection for outbound message"),
        }
    }

    /// A guest holds exactly one connection: the host's
    fn forward_to_host(&self, message: Message) {
        match self.connections.iter().next() {
            Some(entry) => {
                if let Err(e) = entry.value().send(message) {
                    warn!(peer = %entry.key(), error = %e, "forward to host failed");
                }
            }
            None => warn!(kind = message.name(), "not connected to a host, dropping message"),
        }
    }

    async fn notify(&self, event: AppEvent) -> Result<()> {
        self.app_event_tx
            .send(event)
            .await
            .map_err(|_| SoundmeshError::channel("app event channel closed"))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
