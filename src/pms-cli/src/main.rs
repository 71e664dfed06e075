use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pms_core::{init_logging, AppDirs, Config, CredentialStore, Field, MpdConfig, SecretsError};
use pms_mpd::{EngineEvent, Mpd, MpdOptions, PlayState, ReplayGainMode, Songlist, Status};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

#[derive(Debug, Parser)]
#[command(name = "pms", version, about = "Command-line client for the Music Player Daemon")]
struct Cli {
    /// MPD host (takes precedence over config)
    #[arg(long, global = true, env = "MPD_HOST")]
    host: Option<String>,
    /// MPD port (takes precedence over config)
    #[arg(long, global = true, env = "MPD_PORT")]
    port: Option<u16>,
    /// MPD password (takes precedence over config and keyring)
    #[arg(long, global = true, env = "MPD_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show playback status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show server statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// List the current queue
    Queue,
    /// List every song in the library
    Library,
    /// Follow server changes until interrupted
    Watch,
    /// Set the mixer volume
    Volume {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },
    Repeat {
        state: Toggle,
    },
    Random {
        state: Toggle,
    },
    Single {
        state: Toggle,
    },
    Consume {
        state: Toggle,
    },
    /// Set crossfade between songs
    Crossfade {
        seconds: u32,
    },
    /// Set the MixRamp threshold in dB
    MixrampDb {
        #[arg(allow_negative_numbers = true)]
        decibels: f32,
    },
    /// Set the MixRamp delay in seconds
    MixrampDelay {
        seconds: u32,
    },
    /// Set the replay gain mode (off, track, album, auto)
    ReplayGain {
        mode: ReplayGainMode,
    },
    Pause,
    Resume,
    /// Manage the password stored in the OS keyring
    #[command(subcommand)]
    Password(PasswordCommand),
}

#[derive(Debug, Subcommand)]
enum PasswordCommand {
    /// Store a password for the selected server
    Set { password: String },
    /// Remove the stored password for the selected server
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        toggle == Toggle::On
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
}

impl Target {
    fn resolve(host: Option<&str>, port: Option<u16>, config: &MpdConfig) -> Self {
        Self {
            host: host
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(&config.host)
                .to_string(),
            port: port.filter(|p| *p != 0).unwrap_or(config.port),
        }
    }
}

/// Pick the password from the command line, then the config file, then the
/// keyring. Keyring failures are logged and treated as "no password".
fn resolve_password(
    cli: Option<&str>,
    config: Option<&str>,
    keyring: impl FnOnce() -> Result<Option<String>, SecretsError>,
) -> Option<String> {
    if let Some(password) = cli.or(config) {
        return Some(password.to_string());
    }
    match keyring() {
        Ok(password) => password,
        Err(err) => {
            tracing::warn!("Keyring lookup failed: {err}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    let target = Target::resolve(cli.host.as_deref(), cli.port, &config.mpd);

    if let Command::Password(command) = &cli.command {
        return manage_password(command, &target);
    }

    let password = resolve_password(
        cli.password.as_deref(),
        config.mpd.password.as_deref(),
        || CredentialStore::new().find_password(&target.host, target.port),
    );

    let mut mpd: Mpd = Mpd::new(MpdOptions::from(&config.mpd));
    if matches!(cli.command, Command::Library) {
        mpd = mpd.with_progress(|| eprint!("."));
    }
    let mut events = mpd.subscribe();
    connect(&mut mpd, &target, password.as_deref()).await?;

    match cli.command {
        Command::Status { json } => {
            mpd.update_status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(mpd.status())?);
            } else {
                mpd.sync_queue().await?;
                print_status(mpd.status(), mpd.queue());
            }
        }
        Command::Stats { json } => {
            mpd.update_stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(mpd.stats())?);
            } else {
                let stats = mpd.stats();
                println!("artists:     {}", stats.artists);
                println!("albums:      {}", stats.albums);
                println!("songs:       {}", stats.songs);
                println!("uptime:      {}", format_time(stats.uptime as f64));
                println!("playtime:    {}", format_time(stats.playtime as f64));
                println!("db playtime: {}", format_time(stats.db_playtime as f64));
                println!("db updated:  {}", stats.db_update);
            }
        }
        Command::Queue => {
            mpd.update_status().await?;
            mpd.sync_queue().await?;
            for (index, song) in mpd.queue().iter().enumerate() {
                let marker = if mpd.status().song == Some(index as u32) {
                    ">"
                } else {
                    " "
                };
                println!("{marker}{:>4}  {}", index + 1, song_line(song));
            }
        }
        Command::Library => {
            mpd.sync_library().await?;
            eprintln!();
            for song in mpd.library() {
                println!("{}", song.file().unwrap_or_default());
            }
            eprintln!("{} songs", mpd.library().len());
        }
        Command::Watch => {
            let delay = config.mpd.reconnect_delay();
            watch(&mut mpd, &mut events, &target, password.as_deref(), delay).await?;
        }
        Command::Volume { level } => mpd.set_volume(level).await?,
        Command::Repeat { state } => mpd.set_repeat(state.into()).await?,
        Command::Random { state } => mpd.set_random(state.into()).await?,
        Command::Single { state } => mpd.set_single(state.into()).await?,
        Command::Consume { state } => mpd.set_consume(state.into()).await?,
        Command::Crossfade { seconds } => mpd.set_crossfade(seconds).await?,
        Command::MixrampDb { decibels } => mpd.set_mixrampdb(decibels).await?,
        Command::MixrampDelay { seconds } => mpd.set_mixrampdelay(seconds).await?,
        Command::ReplayGain { mode } => mpd.set_replay_gain_mode(mode).await?,
        Command::Pause => mpd.pause(true).await?,
        Command::Resume => mpd.pause(false).await?,
        Command::Password(_) => unreachable!("handled before connecting"),
    }

    mpd.disconnect();
    Ok(())
}

fn manage_password(command: &PasswordCommand, target: &Target) -> Result<()> {
    let store = CredentialStore::new();
    match command {
        PasswordCommand::Set { password } => {
            store.store_password(&target.host, target.port, password)?;
            println!("Stored password for {}:{}", target.host, target.port);
        }
        PasswordCommand::Clear => {
            store.delete_password(&target.host, target.port)?;
            println!("Cleared password for {}:{}", target.host, target.port);
        }
    }
    Ok(())
}

async fn connect(mpd: &mut Mpd, target: &Target, password: Option<&str>) -> Result<()> {
    let version = mpd
        .connect(&target.host, target.port)
        .await
        .with_context(|| format!("connecting to {}:{}", target.host, target.port))?;
    tracing::info!(
        "Connected to {}:{} (protocol {version})",
        target.host,
        target.port
    );
    if let Some(password) = password {
        mpd.authenticate(password)
            .await
            .context("MPD rejected the password")?;
    }
    Ok(())
}

async fn watch(
    mpd: &mut Mpd,
    events: &mut Receiver<EngineEvent>,
    target: &Target,
    password: Option<&str>,
    reconnect_delay: Duration,
) -> Result<()> {
    mpd.update_status().await?;
    mpd.sync_queue().await?;
    print_status(mpd.status(), mpd.queue());
    drain_events(events);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, leaving watch");
                break;
            }
            _ = tick(mpd, target, password, reconnect_delay) => {}
        }

        for event in drain_events(events) {
            println!("{}", describe_event(&event));
            if event == EngineEvent::StatusUpdated {
                print_status(mpd.status(), mpd.queue());
            }
        }
    }
    Ok(())
}

async fn tick(mpd: &mut Mpd, target: &Target, password: Option<&str>, reconnect_delay: Duration) {
    if !mpd.is_connected() {
        tokio::time::sleep(reconnect_delay).await;
        if let Err(err) = connect(mpd, target, password).await {
            tracing::warn!("Reconnect failed: {err:#}");
            return;
        }
        if let Err(err) = mpd.update_status().await {
            tracing::warn!("Status refresh after reconnect failed: {err}");
            return;
        }
        if let Err(err) = mpd.sync_queue().await {
            tracing::warn!("Queue sync after reconnect failed: {err}");
        }
        return;
    }

    if let Err(err) = mpd.poll().await {
        tracing::warn!("Poll failed: {err}");
    }
}

fn drain_events(events: &mut Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {skipped} engine events");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    drained
}

fn describe_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Connected {
            host,
            port,
            version,
        } => format!("connected to {host}:{port} (MPD {version})"),
        EngineEvent::Disconnected => "disconnected".to_string(),
        EngineEvent::StatusUpdated => "status updated".to_string(),
        EngineEvent::StatsUpdated => "stats updated".to_string(),
        EngineEvent::QueueSynced { version, len } => {
            format!("queue synced: {len} songs (version {version})")
        }
        EngineEvent::LibrarySynced { version, len } => {
            format!("library synced: {len} songs (updated {version})")
        }
    }
}

fn print_status(status: &Status, queue: &Songlist) {
    let current = status
        .song
        .and_then(|pos| queue.get(pos as usize))
        .map(song_line)
        .unwrap_or_else(|| "-".to_string());
    println!("[{}] {current}", state_label(status.state));
    println!(
        "  {}/{}  volume: {}  repeat: {}  random: {}  single: {}  consume: {}",
        format_time(status.elapsed),
        format_time(f64::from(status.length)),
        volume_label(status.volume),
        on_off(status.repeat),
        on_off(status.random),
        on_off(status.single),
        on_off(status.consume),
    );
    if status.sample_rate > 0 {
        println!(
            "  {} Hz  {} bit  {} ch  {} kbps",
            status.sample_rate, status.bits, status.channels, status.bitrate
        );
    }
}

fn song_line(song: &pms_core::Song) -> String {
    let title = song.display_title();
    let line = match song.get(Field::Artist) {
        Some(artist) => format!("{artist} - {title}"),
        None => title.to_string(),
    };
    match song.length_seconds {
        Some(secs) => format!("{line} [{}]", format_time(f64::from(secs))),
        None => line,
    }
}

fn state_label(state: PlayState) -> &'static str {
    match state {
        PlayState::Play => "playing",
        PlayState::Pause => "paused",
        PlayState::Stop => "stopped",
        PlayState::Unknown => "unknown",
    }
}

fn volume_label(volume: i32) -> String {
    if volume < 0 {
        "n/a".to_string()
    } else {
        format!("{volume}%")
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
