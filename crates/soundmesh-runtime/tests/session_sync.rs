//! End-to-end session tests over in-memory byte streams
//!
//! Each test stands up real runtimes (host plus guests), joins them with
//! `tokio::io::duplex` pairs, and drives them through commands and app
//! events only, the way an application would.

use std::time::Duration;

use tokio::time::timeout;

use soundmesh_runtime::{
    AppEvent, AppEventReceiver, Command, CommandSender, PeerAddr, PlaybackCommand, Role,
    SessionConfig, SessionRuntime, SongId, SongMetadata,
};

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

struct Device {
    addr: PeerAddr,
    runtime: SessionRuntime,
    commands: CommandSender,
    app_events: AppEventReceiver,
}

fn addr(n: u8) -> PeerAddr {
    PeerAddr::new([n; 6])
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn device(role: Role, n: u8, name: &str) -> Device {
    init_tracing();
    let config = SessionConfig::new(role, addr(n), name);
    let mut runtime = SessionRuntime::new(config).unwrap();
    let commands = runtime.command_sender();
    let app_events = runtime.take_app_events().unwrap();
    runtime.start().unwrap();
    Device {
        addr: addr(n),
        runtime,
        commands,
        app_events,
    }
}

/// Join two devices with an in-memory stream pair
fn connect(a: &Device, a_name: &str, b: &Device, b_name: &str) {
    let (a_end, b_end) = tokio::io::duplex(256 * 1024);
    a.runtime.attach_peer(b.addr, b_name, a_end).unwrap();
    b.runtime.attach_peer(a.addr, a_name, b_end).unwrap();
}

fn song(owner: u8, id: u64, title: &str) -> SongMetadata {
    SongMetadata {
        owner: addr(owner),
        id: SongId(id),
        title: title.into(),
        artist: "Artist".into(),
        album: "Album".into(),
        duration_secs: 240,
        file_size: 8192,
    }
}

/// Wait for the first app event the predicate accepts, skipping the rest
async fn wait_for<T>(
    rx: &mut AppEventReceiver,
    mut pred: impl FnMut(AppEvent) -> Option<T>,
) -> T {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("app event channel closed");
            if let Some(value) = pred(event) {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for app event")
}

fn titles(songs: &[SongMetadata]) -> Vec<String> {
    songs.iter().map(|s| s.title.clone()).collect()
}

// ----------------------------------------------------------------------------
// Library Synchronization
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_guest_announce_reaches_host_and_other_guest() {
    let mut host = device(Role::Host, 1, "host");
    let mut guest1 = device(Role::Guest, 2, "guest1");
    let mut guest2 = device(Role::Guest, 3, "guest2");
    connect(&host, "host", &guest1, "guest1");
    connect(&host, "host", &guest2, "guest2");

    guest1
        .commands
        .send(Command::AnnounceLibrary(vec![song(2, 1, "Shared Song")]))
        .await
        .unwrap();

    // The host merges the announcement
    let host_library = wait_for(&mut host.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) if !songs.is_empty() => Some(songs),
        _ => None,
    })
    .await;
    assert_eq!(titles(&host_library), vec!["Shared Song"]);
    assert_eq!(host_library[0].owner, guest1.addr);

    // ...and relays it to the other guest
    let guest2_library = wait_for(&mut guest2.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) if !songs.is_empty() => Some(songs),
        _ => None,
    })
    .await;
    assert_eq!(titles(&guest2_library), vec!["Shared Song"]);
}

#[tokio::test]
async fn test_late_joiner_receives_full_state() {
    let mut host = device(Role::Host, 1, "host");
    host.commands
        .send(Command::AnnounceLibrary(vec![song(1, 1, "Hosted")]))
        .await
        .unwrap();
    host.commands
        .send(Command::AddToPlaylist(song(1, 1, "Hosted")))
        .await
        .unwrap();
    // Make sure both mutations landed before anyone joins
    wait_for(&mut host.app_events, |e| match e {
        AppEvent::PlaylistChanged(entries) if !entries.is_empty() => Some(()),
        _ => None,
    })
    .await;

    // Guest joins after the session already has state
    let mut guest = device(Role::Guest, 2, "guest");
    connect(&host, "host", &guest, "guest");

    let library = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) if !songs.is_empty() => Some(songs),
        _ => None,
    })
    .await;
    assert_eq!(titles(&library), vec!["Hosted"]);

    let playlist = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::PlaylistChanged(entries) if !entries.is_empty() => Some(entries),
        _ => None,
    })
    .await;
    assert_eq!(playlist[0].song.title, "Hosted");
}

#[tokio::test]
async fn test_disconnect_evicts_library_everywhere() {
    let mut host = device(Role::Host, 1, "host");
    let guest1 = device(Role::Guest, 2, "guest1");
    let mut guest2 = device(Role::Guest, 3, "guest2");
    connect(&host, "host", &guest1, "guest1");
    connect(&host, "host", &guest2, "guest2");

    guest1
        .commands
        .send(Command::AnnounceLibrary(vec![song(2, 1, "Ephemeral")]))
        .await
        .unwrap();

    // Wait until the song is visible everywhere
    wait_for(&mut host.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) if !songs.is_empty() => Some(()),
        _ => None,
    })
    .await;
    wait_for(&mut guest2.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) if !songs.is_empty() => Some(()),
        _ => None,
    })
    .await;

    // Guest 1 drops out; its records must vanish on the host...
    host.runtime.detach_peer(&guest1.addr).unwrap();
    let host_library = wait_for(&mut host.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) => Some(songs),
        _ => None,
    })
    .await;
    assert!(host_library.is_empty());

    // ...and on the remaining guest, via the host's shrunken user list
    let guest2_library = wait_for(&mut guest2.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) if songs.is_empty() => Some(songs),
        _ => None,
    })
    .await;
    assert!(guest2_library.is_empty());

    let users = wait_for(&mut guest2.app_events, |e| match e {
        AppEvent::UserListUpdated(list) if !list.contains(&guest1.addr) => Some(list),
        _ => None,
    })
    .await;
    assert!(users.contains(&host.addr));
}

// ----------------------------------------------------------------------------
// Playlist and Transfers
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_remote_song_transfer_unblocks_playback() {
    let mut host = device(Role::Host, 1, "host");
    let mut guest = device(Role::Guest, 2, "guest");
    connect(&host, "host", &guest, "guest");

    let remote = song(2, 7, "Remote Tune");
    guest
        .commands
        .send(Command::AnnounceLibrary(vec![remote.clone()]))
        .await
        .unwrap();
    wait_for(&mut host.app_events, |e| match e {
        AppEvent::LibraryUpdated(songs) if !songs.is_empty() => Some(()),
        _ => None,
    })
    .await;

    // Queue the guest-owned song on the host; it is not yet playable
    host.commands
        .send(Command::AddToPlaylist(remote.clone()))
        .await
        .unwrap();
    let entries = wait_for(&mut host.app_events, |e| match e {
        AppEvent::PlaylistChanged(entries) if !entries.is_empty() => Some(entries),
        _ => None,
    })
    .await;
    assert!(!entries[0].loaded);

    // Nothing is loaded, so the cursor does not move
    host.commands.send(Command::RequestNextSong).await.unwrap();
    let next = wait_for(&mut host.app_events, |e| match e {
        AppEvent::NextSong(next) => Some(next),
        _ => None,
    })
    .await;
    assert!(next.is_none());

    // The host asked the owner for the bytes; the guest answers
    let (requester, key) = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::SongRequested { from, key } => Some((from, key)),
        _ => None,
    })
    .await;
    assert_eq!(requester, host.addr);
    assert_eq!(key, remote.key());
    guest
        .commands
        .send(Command::SendSong {
            to: requester,
            key,
            file_name: "remote_tune.mp3".into(),
            bytes: vec![0x5a; 30_000],
        })
        .await
        .unwrap();

    // Transfer lands: entry becomes loaded and the bytes surface
    let (from, received_key, bytes) = wait_for(&mut host.app_events, |e| match e {
        AppEvent::SongReceived { from, key, bytes, .. } => Some((from, key, bytes)),
        _ => None,
    })
    .await;
    assert_eq!(from, guest.addr);
    assert_eq!(received_key, remote.key());
    assert_eq!(bytes.len(), 30_000);

    // Now the playlist can advance to it
    host.commands.send(Command::RequestNextSong).await.unwrap();
    let next = wait_for(&mut host.app_events, |e| match e {
        AppEvent::NextSong(Some(entry)) => Some(entry),
        _ => None,
    })
    .await;
    assert_eq!(next.song, remote);
    assert!(next.played);
}

#[tokio::test]
async fn test_guest_playlist_mirrors_host_changes() {
    let mut host = device(Role::Host, 1, "host");
    let mut guest = device(Role::Guest, 2, "guest");
    connect(&host, "host", &guest, "guest");

    // Guest queues two host-owned songs through the host
    for (id, title) in [(1u64, "First"), (2, "Second")] {
        guest
            .commands
            .send(Command::AddToPlaylist(song(1, id, title)))
            .await
            .unwrap();
    }
    let entries = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::PlaylistChanged(entries) if entries.len() == 2 => Some(entries),
        _ => None,
    })
    .await;
    assert_eq!(entries[0].song.title, "First");

    // Guest bumps the second song to the front
    guest
        .commands
        .send(Command::BumpSong(song(1, 2, "Second").key()))
        .await
        .unwrap();
    let entries = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::PlaylistChanged(entries)
            if entries.len() == 2 && entries[0].song.title == "Second" =>
        {
            Some(entries)
        }
        _ => None,
    })
    .await;
    assert_eq!(entries[1].song.title, "First");

    // Guest removes a song
    guest
        .commands
        .send(Command::RemoveFromPlaylist(song(1, 2, "Second").key()))
        .await
        .unwrap();
    let entries = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::PlaylistChanged(entries) if entries.len() == 1 => Some(entries),
        _ => None,
    })
    .await;
    assert_eq!(entries[0].song.title, "First");
}

// ----------------------------------------------------------------------------
// Playback Control
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_playback_intent_relays_through_host() {
    let mut host = device(Role::Host, 1, "host");
    let mut guest = device(Role::Guest, 2, "guest");
    connect(&host, "host", &guest, "guest");

    guest
        .commands
        .send(Command::Playback(PlaybackCommand::Play))
        .await
        .unwrap();

    // The host applies the intent...
    let applied = wait_for(&mut host.app_events, |e| match e {
        AppEvent::Playback(cmd) => Some(cmd),
        _ => None,
    })
    .await;
    assert_eq!(applied, PlaybackCommand::Play);

    // ...and the decision comes back down to the guest
    let echoed = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::Playback(cmd) => Some(cmd),
        _ => None,
    })
    .await;
    assert_eq!(echoed, PlaybackCommand::Play);

    let playing = wait_for(&mut guest.app_events, |e| match e {
        AppEvent::PlayStatusChanged { playing, .. } => Some(playing),
        _ => None,
    })
    .await;
    assert!(playing);
}

#[tokio::test]
async fn test_shutdown_stops_logic_task() {
    let mut host = device(Role::Host, 1, "host");
    timeout(Duration::from_secs(5), host.runtime.shutdown())
        .await
        .expect("shutdown timed out")
        .unwrap();
}
