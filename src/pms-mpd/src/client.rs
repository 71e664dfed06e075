//! The engine: one connection plus the local mirror of server state.

use crate::command::{Command, ReplayGainMode};
use crate::connection::{Connection, ProtocolVersion, Reply, Terminal};
use crate::decode::{apply_stats, apply_status, receive_songs, split_pair};
use crate::error::{MpdError, MpdResult};
use crate::events::{EngineEvent, EventBus};
use crate::idle::ChangeSet;
use crate::songlist::Songlist;
use crate::status::{PlayState, Stats, Status};
use pms_core::config::MpdConfig;
use pms_core::models::{DefaultFieldRegistry, FieldRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// Timing knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpdOptions {
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for MpdOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            response_timeout: Duration::from_millis(10_000),
            connect_timeout: Duration::from_millis(5000),
        }
    }
}

impl From<&MpdConfig> for MpdOptions {
    fn from(config: &MpdConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            response_timeout: config.response_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Result of one [`Mpd::poll`] tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The wait failed and the connection was dropped.
    NoEvent,
    /// Nothing happened within the poll interval; the playback clock moved.
    ClockAdvanced,
    /// The server reported changes and the affected state was refreshed.
    Changed(ChangeSet),
}

/// Result of a collection sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local version already matched the server; nothing was sent.
    UpToDate,
    /// A listing was fetched and ended with this terminator.
    Fetched(Terminal),
}

pub struct Mpd<S = TcpStream> {
    conn: Connection<S>,
    registry: Arc<dyn FieldRegistry>,
    progress: Option<Box<dyn FnMut() + Send>>,
    events: EventBus,
    status: Status,
    stats: Stats,
    queue: Songlist,
    library: Songlist,
    poll_interval: Duration,
    connect_timeout: Duration,
    last_update: Option<Instant>,
    last_clock: Instant,
}

impl<S> Mpd<S> {
    pub fn new(options: MpdOptions) -> Self {
        Self {
            conn: Connection::new(options.response_timeout),
            registry: Arc::new(DefaultFieldRegistry),
            progress: None,
            events: EventBus::default(),
            status: Status::default(),
            stats: Stats::default(),
            queue: Songlist::new(),
            library: Songlist::new(),
            poll_interval: options.poll_interval,
            connect_timeout: options.connect_timeout,
            last_update: None,
            last_clock: Instant::now(),
        }
    }

    /// Replace the registry used to map song attribute names.
    pub fn with_registry(mut self, registry: Arc<dyn FieldRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Callback fired periodically while the library is being fetched.
    pub fn with_progress(mut self, progress: impl FnMut() + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn queue(&self) -> &Songlist {
        &self.queue
    }

    pub fn library(&self) -> &Songlist {
        &self.library
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn is_idle(&self) -> bool {
        self.conn.is_idle()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.conn.last_error()
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.conn.protocol_version()
    }

    /// When the status was last fetched from the server.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn disconnect(&mut self) {
        self.conn.disconnect();
        self.settle();
    }

    /// Advance `status.elapsed` by the wall time since the last sample while
    /// playing.
    pub fn run_clock(&mut self) {
        let now = Instant::now();
        if self.conn.is_connected() && self.status.state == PlayState::Play {
            let delta = now.saturating_duration_since(self.last_clock);
            self.status.elapsed += delta.as_secs_f64();
            if self.status.length > 0 {
                self.status.elapsed = self.status.elapsed.min(f64::from(self.status.length));
            }
        }
        self.last_clock = now;
    }

    fn publish(&self, event: EngineEvent) {
        self.events.publish(event);
    }

    /// Reset everything derived from a connection that has gone away.
    fn settle(&mut self) {
        if !self.conn.take_dropped() {
            return;
        }
        debug!("resetting mirrored MPD state");
        self.status = Status::default();
        self.stats = Stats::default();
        self.queue.reset();
        self.library.reset();
        self.last_update = None;
        self.publish(EngineEvent::Disconnected);
    }

    fn finish<T>(&mut self, result: MpdResult<T>) -> MpdResult<T> {
        self.settle();
        result
    }
}

impl Mpd<TcpStream> {
    /// Connect over TCP. An existing connection is closed first.
    pub async fn connect(&mut self, host: &str, port: u16) -> MpdResult<ProtocolVersion> {
        let result = self.conn.connect(host, port, self.connect_timeout).await;
        self.settle();
        let version = result?;
        self.announce(version);
        Ok(version)
    }
}

impl<S> Mpd<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the handshake over an already-open stream.
    pub async fn connect_stream(
        &mut self,
        stream: S,
        host: &str,
        port: u16,
    ) -> MpdResult<ProtocolVersion> {
        let result = self.conn.attach(stream, host, port).await;
        self.settle();
        let version = result?;
        self.announce(version);
        Ok(version)
    }

    fn announce(&mut self, version: ProtocolVersion) {
        self.last_clock = Instant::now();
        self.publish(EngineEvent::Connected {
            host: self.conn.host().to_string(),
            port: self.conn.port(),
            version,
        });
    }

    pub async fn authenticate(&mut self, password: &str) -> MpdResult<()> {
        let result = self.conn.authenticate(password).await;
        self.finish(result)
    }

    pub async fn enter_idle(&mut self) -> MpdResult<bool> {
        let result = self.conn.enter_idle().await;
        self.finish(result)
    }

    pub async fn leave_idle(&mut self) -> MpdResult<bool> {
        let result = self.conn.leave_idle().await;
        self.finish(result)
    }

    pub async fn update_status(&mut self) -> MpdResult<()> {
        let result = self.refresh_status().await;
        self.finish(result)
    }

    pub async fn update_stats(&mut self) -> MpdResult<()> {
        let result = self.refresh_stats().await;
        self.finish(result)
    }

    /// Bring the queue in line with `status.playlist`, fetching only the
    /// entries changed since the local version when one is known.
    pub async fn sync_queue(&mut self) -> MpdResult<SyncOutcome> {
        let result = self.fetch_queue().await;
        self.finish(result)
    }

    /// Bring the library in line with the server's database timestamp.
    pub async fn sync_library(&mut self) -> MpdResult<SyncOutcome> {
        let result = self.fetch_library().await;
        self.finish(result)
    }

    /// One tick of the poll loop.
    ///
    /// Waits up to the poll interval in idle mode. Reported changes trigger
    /// the matching refreshes in the order status, queue, library; silence
    /// advances the playback clock instead.
    pub async fn poll(&mut self) -> MpdResult<PollOutcome> {
        let result = self.poll_once().await;
        self.finish(result)
    }

    pub async fn set_volume(&mut self, volume: u8) -> MpdResult<()> {
        if volume > 100 {
            return Err(MpdError::InvalidArgument(format!(
                "volume {volume} is outside 0-100"
            )));
        }
        self.run(Command::SetVol(volume)).await
    }

    pub async fn set_repeat(&mut self, on: bool) -> MpdResult<()> {
        self.run(Command::Repeat(on)).await
    }

    pub async fn set_random(&mut self, on: bool) -> MpdResult<()> {
        self.run(Command::Random(on)).await
    }

    pub async fn set_single(&mut self, on: bool) -> MpdResult<()> {
        self.run(Command::Single(on)).await
    }

    pub async fn set_consume(&mut self, on: bool) -> MpdResult<()> {
        self.run(Command::Consume(on)).await
    }

    pub async fn set_crossfade(&mut self, seconds: u32) -> MpdResult<()> {
        self.run(Command::Crossfade(seconds)).await
    }

    pub async fn set_mixrampdb(&mut self, decibels: f32) -> MpdResult<()> {
        if !decibels.is_finite() {
            return Err(MpdError::InvalidArgument(format!(
                "mixramp threshold {decibels} is not a number"
            )));
        }
        self.run(Command::MixRampDb(decibels)).await
    }

    pub async fn set_mixrampdelay(&mut self, seconds: u32) -> MpdResult<()> {
        self.run(Command::MixRampDelay(seconds)).await
    }

    pub async fn set_replay_gain_mode(&mut self, mode: ReplayGainMode) -> MpdResult<()> {
        self.run(Command::ReplayGainMode(mode)).await
    }

    pub async fn pause(&mut self, paused: bool) -> MpdResult<()> {
        self.run(Command::Pause(paused)).await
    }

    async fn run(&mut self, command: Command) -> MpdResult<()> {
        let result = self.conn.run_ok(&command).await;
        self.finish(result)
    }

    async fn refresh_status(&mut self) -> MpdResult<()> {
        self.conn.command(&Command::Status).await?;
        loop {
            match self.conn.next_reply().await? {
                Reply::Data(line) => {
                    if let Some((key, value)) = split_pair(&line) {
                        apply_status(&mut self.status, key, value);
                    }
                }
                Reply::End(terminal) => {
                    terminal.into_result()?;
                    break;
                }
            }
        }

        let now = Instant::now();
        self.last_update = Some(now);
        self.last_clock = now;
        self.publish(EngineEvent::StatusUpdated);
        Ok(())
    }

    async fn refresh_stats(&mut self) -> MpdResult<()> {
        self.conn.command(&Command::Stats).await?;
        loop {
            match self.conn.next_reply().await? {
                Reply::Data(line) => {
                    if let Some((key, value)) = split_pair(&line) {
                        apply_stats(&mut self.stats, key, value);
                    }
                }
                Reply::End(terminal) => {
                    terminal.into_result()?;
                    break;
                }
            }
        }
        self.publish(EngineEvent::StatsUpdated);
        Ok(())
    }

    async fn fetch_queue(&mut self) -> MpdResult<SyncOutcome> {
        let target = self.status.playlist;
        let local = self.queue.version();
        if local == Some(target) {
            return Ok(SyncOutcome::UpToDate);
        }

        let command = match local {
            Some(version) => Command::PlChanges(version),
            None => {
                self.queue.clear();
                Command::PlaylistInfo
            }
        };
        self.queue.truncate(presize(self.status.playlist_length));
        self.conn.command(&command).await?;

        let terminal =
            receive_songs(&mut self.conn, &*self.registry, &mut self.queue, None).await?;
        if terminal.is_ok() {
            self.queue.set_version(target);
            info!(version = target, songs = self.queue.len(), "Queue synced");
            self.publish(EngineEvent::QueueSynced {
                version: target,
                len: self.queue.len(),
            });
        }
        Ok(SyncOutcome::Fetched(terminal))
    }

    async fn fetch_library(&mut self) -> MpdResult<SyncOutcome> {
        self.refresh_stats().await?;
        let target = self.stats.db_update;
        if self.library.version() == Some(target) {
            return Ok(SyncOutcome::UpToDate);
        }

        self.library.clear();
        self.library.truncate(presize(self.stats.songs));
        self.conn.command(&Command::ListAllInfo).await?;

        let progress = self
            .progress
            .as_mut()
            .map(|callback| &mut **callback as &mut (dyn FnMut() + Send));
        let terminal =
            receive_songs(&mut self.conn, &*self.registry, &mut self.library, progress).await?;
        if terminal.is_ok() {
            self.library.set_version(target);
            info!(version = target, songs = self.library.len(), "Library synced");
            self.publish(EngineEvent::LibrarySynced {
                version: target,
                len: self.library.len(),
            });
        }
        Ok(SyncOutcome::Fetched(terminal))
    }

    async fn poll_once(&mut self) -> MpdResult<PollOutcome> {
        if !self.conn.is_connected() {
            return Err(MpdError::NotConnected);
        }

        let mut changes = self.conn.take_pending();
        if changes.is_empty() {
            match self.wait_for_changes().await {
                Ok(true) => {}
                Ok(false) => {
                    self.run_clock();
                    return Ok(PollOutcome::ClockAdvanced);
                }
                Err(err) => {
                    debug!(error = %err, "waiting for MPD changes failed");
                    self.conn.disconnect();
                    return Ok(PollOutcome::NoEvent);
                }
            }
            changes = self.conn.read_changes().await?;
        }

        self.dispatch(&changes).await?;
        self.conn.enter_idle().await?;
        Ok(PollOutcome::Changed(changes))
    }

    async fn wait_for_changes(&mut self) -> MpdResult<bool> {
        self.conn.enter_idle().await?;
        self.conn.wait_readable(self.poll_interval).await
    }

    async fn dispatch(&mut self, changes: &ChangeSet) -> MpdResult<()> {
        let refresh = changes.refresh();
        if refresh.status {
            self.refresh_status().await?;
        }
        if refresh.queue {
            self.fetch_queue().await?;
        }
        if refresh.library {
            self.fetch_library().await?;
        }
        Ok(())
    }
}

fn presize(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}
