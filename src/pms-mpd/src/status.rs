use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Unknown,
    Play,
    Stop,
    Pause,
}

impl PlayState {
    pub fn from_protocol(value: &str) -> Self {
        match value {
            "play" => PlayState::Play,
            "stop" => PlayState::Stop,
            "pause" => PlayState::Pause,
            _ => PlayState::Unknown,
        }
    }
}

/// Snapshot of the server's `status` response.
///
/// Decoding only overwrites the keys present in a response, so values the
/// server omits (e.g. `song` while stopped) keep their last known value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    /// Mixer volume, `-1` when the server has no mixer.
    pub volume: i32,
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
    /// Queue version.
    pub playlist: u64,
    pub playlist_length: u64,
    /// Crossfade in seconds.
    pub crossfade: u32,
    pub mixramp_db: f64,
    pub mixramp_delay: i64,
    pub state: PlayState,
    pub song: Option<u32>,
    pub song_id: Option<u32>,
    pub next_song: Option<u32>,
    pub next_song_id: Option<u32>,
    /// Elapsed time of the current song in seconds. Advanced locally between
    /// polls while playing.
    pub elapsed: f64,
    /// Total length of the current song in seconds.
    pub length: u32,
    /// Instantaneous bitrate in kbit/s.
    pub bitrate: u32,
    pub sample_rate: u32,
    pub bits: u32,
    pub channels: u32,
}

/// Server-wide counters from the `stats` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub artists: u64,
    pub albums: u64,
    pub songs: u64,
    pub uptime: u64,
    pub playtime: u64,
    pub db_playtime: u64,
    /// Unix time of the last database update; doubles as the library version.
    pub db_update: u64,
}
