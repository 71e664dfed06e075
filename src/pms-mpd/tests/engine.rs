use pms_core::models::{DefaultFieldRegistry, Field, FieldRegistry};
use pms_mpd::{
    ChangeKind, EngineEvent, Mpd, MpdError, MpdOptions, PlayState, PollOutcome, SyncOutcome,
    Terminal,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::io::{Builder, Mock};

const BANNER: &[u8] = b"OK MPD 0.23.5\n";

fn options() -> MpdOptions {
    MpdOptions {
        poll_interval: Duration::from_millis(20),
        response_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_millis(500),
    }
}

async fn connect(mock: Mock) -> Mpd<Mock> {
    let mut mpd = Mpd::new(options());
    mpd.connect_stream(mock, "localhost", 6600).await.unwrap();
    mpd
}

fn listing(files: &[&str]) -> String {
    let mut out = String::new();
    for (pos, file) in files.iter().enumerate() {
        out.push_str(&format!("file: {file}\nTitle: {file}\nPos: {pos}\nId: {}\n", pos + 100));
    }
    out.push_str("OK\n");
    out
}

fn queue_files(mpd: &Mpd<Mock>) -> Vec<String> {
    mpd.queue()
        .iter()
        .filter_map(|song| song.file().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn queue_full_fetch_then_noop_then_delta() {
    let first = listing(&["a.flac", "b.flac", "c.flac"]);
    let mock = Builder::new()
        .read(BANNER)
        .write(b"status\n")
        .read(b"playlist: 5\nplaylistlength: 3\nOK\n")
        .write(b"playlistinfo\n")
        .read(first.as_bytes())
        .write(b"status\n")
        .read(b"playlist: 7\nplaylistlength: 2\nOK\n")
        .write(b"plchanges 5\n")
        .read(b"file: x.flac\nPos: 1\nId: 9\nOK\n")
        .build();
    let mut mpd = connect(mock).await;

    mpd.update_status().await.unwrap();
    assert_eq!(
        mpd.sync_queue().await.unwrap(),
        SyncOutcome::Fetched(Terminal::Ok)
    );
    assert_eq!(queue_files(&mpd), ["a.flac", "b.flac", "c.flac"]);
    assert_eq!(mpd.queue().version(), Some(5));

    // Versions match: nothing goes over the wire.
    assert_eq!(mpd.sync_queue().await.unwrap(), SyncOutcome::UpToDate);

    mpd.update_status().await.unwrap();
    mpd.sync_queue().await.unwrap();
    assert_eq!(queue_files(&mpd), ["a.flac", "x.flac"]);
    assert_eq!(mpd.queue().get(1).and_then(|s| s.id), Some(9));
    assert_eq!(mpd.queue().version(), Some(7));
}

#[tokio::test]
async fn acked_sync_keeps_old_version() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"status\n")
        .read(b"playlist: 2\nplaylistlength: 0\nOK\n")
        .write(b"playlistinfo\n")
        .read(b"ACK [50@0] {playlistinfo} boom\n")
        .build();
    let mut mpd = connect(mock).await;

    mpd.update_status().await.unwrap();
    let outcome = mpd.sync_queue().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Fetched(Terminal::Ack(ref ack)) if ack.code == 50));
    assert_eq!(mpd.queue().version(), None);
    assert!(mpd.is_connected());
    assert_eq!(mpd.last_error(), Some("ACK [50@0] {playlistinfo} boom"));
}

#[tokio::test]
async fn library_sync_reports_progress() {
    let mut body = String::new();
    for i in 0..250 {
        body.push_str(&format!("file: music/{i:03}.flac\nArtist: Someone\n"));
    }
    body.push_str("OK\n");

    let mock = Builder::new()
        .read(BANNER)
        .write(b"stats\n")
        .read(b"artists: 1\nsongs: 250\ndb_update: 1700000000\nOK\n")
        .write(b"listallinfo\n")
        .read(body.as_bytes())
        .write(b"stats\n")
        .read(b"artists: 1\nsongs: 250\ndb_update: 1700000000\nOK\n")
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut mpd = Mpd::new(options()).with_progress(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    mpd.connect_stream(mock, "localhost", 6600).await.unwrap();

    mpd.sync_library().await.unwrap();
    assert_eq!(mpd.library().len(), 250);
    assert_eq!(mpd.library().version(), Some(1_700_000_000));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        mpd.library().get(249).and_then(|s| s.file()),
        Some("music/249.flac")
    );

    assert_eq!(mpd.sync_library().await.unwrap(), SyncOutcome::UpToDate);
    assert_eq!(mpd.library().len(), 250);
}

/// Stock tags minus `Title`.
struct UntitledRegistry;

impl FieldRegistry for UntitledRegistry {
    fn lookup(&self, key: &str) -> Option<Field> {
        DefaultFieldRegistry
            .lookup(key)
            .filter(|field| *field != Field::Title)
    }
}

#[tokio::test]
async fn injected_registry_shapes_synced_songs() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"stats\n")
        .read(b"songs: 2\ndb_update: 4\nOK\n")
        .write(b"listallinfo\n")
        .read(b"file: a.flac\nTitle: First\nArtist: Band\nfile: b.flac\nTitle: Second\nOK\n")
        .build();

    let mut mpd = Mpd::new(options()).with_registry(Arc::new(UntitledRegistry));
    mpd.connect_stream(mock, "localhost", 6600).await.unwrap();

    mpd.sync_library().await.unwrap();
    assert_eq!(mpd.library().len(), 2);
    let first = mpd.library().get(0).unwrap();
    assert_eq!(first.file(), Some("a.flac"));
    assert_eq!(first.get(Field::Artist), Some("Band"));
    assert_eq!(first.get(Field::Title), None);
    assert_eq!(mpd.library().get(1).and_then(|s| s.get(Field::Title)), None);
}

#[tokio::test]
async fn short_library_fires_no_progress() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"stats\n")
        .read(b"songs: 3\ndb_update: 9\nOK\n")
        .write(b"listallinfo\n")
        .read(b"directory: a\nfile: a/1.flac\nTitle: One\nfile: a/2.flac\nfile: a/3.flac\nTime: 61\nOK\n")
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut mpd = Mpd::new(options()).with_progress(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    mpd.connect_stream(mock, "localhost", 6600).await.unwrap();

    mpd.sync_library().await.unwrap();
    assert_eq!(mpd.library().len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        mpd.library().get(0).and_then(|s| s.get(Field::Title)),
        Some("One")
    );
    assert_eq!(mpd.library().get(2).and_then(|s| s.length_seconds), Some(61));
}

#[tokio::test]
async fn stats_decode_counts() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"stats\n")
        .read(b"artists: 12\nalbums: 30\nsongs: 400\nuptime: 77\nOK\n")
        .build();
    let mut mpd = connect(mock).await;

    mpd.update_stats().await.unwrap();
    assert_eq!(mpd.stats().songs, 400);
    assert_eq!(mpd.stats().artists, 12);
    assert_eq!(mpd.stats().uptime, 77);
}

#[tokio::test]
async fn fragmented_status_response() {
    let payload: &[u8] = b"volume: 70\nstate: play\naudio: 44100:16:2\ntime: 37:215\nOK\n";
    let mut builder = Builder::new();
    builder.read(BANNER).write(b"status\n");
    for chunk in payload.chunks(3) {
        builder.read(chunk);
    }
    let mut mpd = connect(builder.build()).await;

    mpd.update_status().await.unwrap();
    let status = mpd.status();
    assert_eq!(status.volume, 70);
    assert_eq!(status.state, PlayState::Play);
    assert_eq!(status.sample_rate, 44100);
    assert_eq!(status.channels, 2);
    assert_eq!(status.elapsed, 37.0);
    assert_eq!(status.length, 215);
}

#[tokio::test]
async fn redundant_idle_transitions_send_nothing() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"idle\n")
        .write(b"noidle\n")
        .read(b"OK\n")
        .build();
    let mut mpd = connect(mock).await;

    assert!(mpd.enter_idle().await.unwrap());
    assert!(!mpd.enter_idle().await.unwrap());
    assert!(mpd.leave_idle().await.unwrap());
    assert!(!mpd.leave_idle().await.unwrap());
    assert!(!mpd.is_idle());
}

#[tokio::test]
async fn peer_close_resets_everything() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"status\n")
        .read(b"playlist: 1\nplaylistlength: 1\nOK\n")
        .write(b"playlistinfo\n")
        .read(b"file: a.flac\nPos: 0\nOK\n")
        .write(b"status\n")
        .build();
    let mut mpd = connect(mock).await;
    let mut events = mpd.subscribe();

    mpd.update_status().await.unwrap();
    mpd.sync_queue().await.unwrap();
    assert_eq!(mpd.queue().len(), 1);

    let err = mpd.update_status().await.unwrap_err();
    assert!(matches!(err, MpdError::Closed));
    assert!(!mpd.is_connected());
    assert!(!mpd.is_idle());
    assert!(mpd.queue().is_empty());
    assert_eq!(mpd.queue().version(), None);
    assert_eq!(mpd.status().playlist, 0);

    assert!(matches!(
        mpd.update_status().await,
        Err(MpdError::NotConnected)
    ));
    assert!(matches!(mpd.poll().await, Err(MpdError::NotConnected)));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.last(), Some(&EngineEvent::Disconnected));
}

#[tokio::test]
async fn poll_timeout_advances_clock() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"status\n")
        .read(b"state: play\nelapsed: 10.0\ntime: 10:300\nOK\n")
        .write(b"idle\n")
        .wait(Duration::from_secs(5))
        .build();
    let mut mpd = connect(mock).await;
    mpd.update_status().await.unwrap();

    assert_eq!(mpd.poll().await.unwrap(), PollOutcome::ClockAdvanced);
    assert!(mpd.status().elapsed > 10.0);
    assert!(mpd.is_idle());
    assert!(mpd.is_connected());
}

#[tokio::test]
async fn poll_dispatches_status_changes() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"idle\n")
        .read(b"changed: mixer\nchanged: output\nOK\n")
        .write(b"status\n")
        .read(b"volume: 55\nOK\n")
        .write(b"idle\n")
        .build();
    let mut mpd = connect(mock).await;

    match mpd.poll().await.unwrap() {
        PollOutcome::Changed(changes) => {
            assert!(changes.contains(ChangeKind::Mixer));
            assert!(changes.contains(ChangeKind::Output));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(mpd.status().volume, 55);
    assert!(mpd.is_idle());
}

#[tokio::test]
async fn poll_refreshes_status_before_queue() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"status\n")
        .read(b"playlist: 1\nplaylistlength: 1\nOK\n")
        .write(b"playlistinfo\n")
        .read(b"file: a.flac\nPos: 0\nOK\n")
        .write(b"idle\n")
        .read(b"changed: playlist\nOK\n")
        .write(b"status\n")
        .read(b"playlist: 2\nplaylistlength: 1\nOK\n")
        .write(b"plchanges 1\n")
        .read(b"file: b.flac\nPos: 0\nOK\n")
        .write(b"idle\n")
        .build();
    let mut mpd = connect(mock).await;
    mpd.update_status().await.unwrap();
    mpd.sync_queue().await.unwrap();

    mpd.poll().await.unwrap();
    assert_eq!(queue_files(&mpd), ["b.flac"]);
    assert_eq!(mpd.queue().version(), Some(2));
}

#[tokio::test]
async fn poll_syncs_library_on_database_change() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"idle\n")
        .read(b"changed: database\nOK\n")
        .write(b"stats\n")
        .read(b"songs: 1\ndb_update: 42\nOK\n")
        .write(b"listallinfo\n")
        .read(b"file: a.flac\nOK\n")
        .write(b"idle\n")
        .build();
    let mut mpd = connect(mock).await;

    mpd.poll().await.unwrap();
    assert_eq!(mpd.library().len(), 1);
    assert_eq!(mpd.library().version(), Some(42));
}

#[tokio::test]
async fn changes_seen_while_leaving_idle_are_dispatched_next_poll() {
    let mock = Builder::new()
        .read(BANNER)
        .write(b"idle\n")
        .write(b"noidle\n")
        .read(b"changed: mixer\nOK\n")
        .write(b"setvol 30\n")
        .read(b"OK\n")
        .write(b"status\n")
        .read(b"volume: 30\nOK\n")
        .write(b"idle\n")
        .build();
    let mut mpd = connect(mock).await;

    mpd.enter_idle().await.unwrap();
    mpd.set_volume(30).await.unwrap();

    let outcome = mpd.poll().await.unwrap();
    assert!(matches!(outcome, PollOutcome::Changed(ref c) if c.contains(ChangeKind::Mixer)));
    assert_eq!(mpd.status().volume, 30);
}

#[tokio::test]
async fn poll_wait_failure_reports_no_event() {
    let mock = Builder::new().read(BANNER).write(b"idle\n").build();
    let mut mpd = connect(mock).await;

    assert_eq!(mpd.poll().await.unwrap(), PollOutcome::NoEvent);
    assert!(!mpd.is_connected());
    assert!(!mpd.is_idle());
}
