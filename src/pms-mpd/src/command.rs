//! Typed MPD commands.
//!
//! Every line the engine writes is produced by [`Command`]'s `Display`
//! impl, so arguments are always formatted and quoted in one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Idle,
    NoIdle,
    Password(String),
    Status,
    Stats,
    /// Full listing of the queue.
    PlaylistInfo,
    /// Queue entries changed since the given queue version.
    PlChanges(u64),
    /// Full listing of the library.
    ListAllInfo,
    SetVol(u8),
    Repeat(bool),
    Random(bool),
    Single(bool),
    Consume(bool),
    Crossfade(u32),
    MixRampDb(f32),
    MixRampDelay(u32),
    ReplayGainMode(ReplayGainMode),
    Pause(bool),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Idle => f.write_str("idle"),
            Command::NoIdle => f.write_str("noidle"),
            Command::Password(password) => write!(f, "password {}", quote(password)),
            Command::Status => f.write_str("status"),
            Command::Stats => f.write_str("stats"),
            Command::PlaylistInfo => f.write_str("playlistinfo"),
            Command::PlChanges(version) => write!(f, "plchanges {version}"),
            Command::ListAllInfo => f.write_str("listallinfo"),
            Command::SetVol(volume) => write!(f, "setvol {volume}"),
            Command::Repeat(on) => write!(f, "repeat {}", flag(*on)),
            Command::Random(on) => write!(f, "random {}", flag(*on)),
            Command::Single(on) => write!(f, "single {}", flag(*on)),
            Command::Consume(on) => write!(f, "consume {}", flag(*on)),
            Command::Crossfade(seconds) => write!(f, "crossfade {seconds}"),
            Command::MixRampDb(decibels) => write!(f, "mixrampdb {decibels}"),
            Command::MixRampDelay(seconds) => write!(f, "mixrampdelay {seconds}"),
            Command::ReplayGainMode(mode) => write!(f, "replay_gain_mode {}", mode.as_str()),
            Command::Pause(on) => write!(f, "pause {}", flag(*on)),
        }
    }
}

fn flag(on: bool) -> u8 {
    u8::from(on)
}

/// Quote a string argument, escaping backslashes and double quotes.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayGainMode {
    Off,
    Track,
    Album,
    Auto,
}

impl ReplayGainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayGainMode::Off => "off",
            ReplayGainMode::Track => "track",
            ReplayGainMode::Album => "album",
            ReplayGainMode::Auto => "auto",
        }
    }
}

impl FromStr for ReplayGainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ReplayGainMode::Off),
            "track" => Ok(ReplayGainMode::Track),
            "album" => Ok(ReplayGainMode::Album),
            "auto" => Ok(ReplayGainMode::Auto),
            other => Err(format!("unknown replay gain mode: {other}")),
        }
    }
}
