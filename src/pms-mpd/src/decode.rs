//! Response decoders.
//!
//! The decoders work on already framed `key: value` pairs and never touch
//! the socket themselves; [`receive_songs`] is the only piece that pulls
//! lines from a [`Connection`].

use crate::connection::{Connection, Reply, Terminal};
use crate::error::MpdResult;
use crate::songlist::Songlist;
use crate::status::{PlayState, Stats, Status};
use pms_core::models::{Field, FieldRegistry, Song};
use tokio::io::{AsyncRead, AsyncWrite};

/// The progress callback fires once per this many received songs.
pub const PROGRESS_EVERY: usize = 100;

/// Listing entries that are not songs. They end the current song so their
/// attributes are not mixed into it.
const NON_SONG_ENTRIES: &[&str] = &["directory", "playlist"];

/// Split `key: value` at the first colon. The value is everything after the
/// two-character separator, untrimmed.
pub fn split_pair(line: &str) -> Option<(&str, &str)> {
    let pos = line.find(':')?;
    Some((&line[..pos], line.get(pos + 2..).unwrap_or("")))
}

/// Leading integer of `value`, or 0 when there is none.
pub fn parse_int(value: &str) -> i64 {
    let s = value.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut result: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        result = result.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative {
        -result
    } else {
        result
    }
}

/// Leading decimal number of `value`, or 0.0 when there is none.
pub fn parse_float(value: &str) -> f64 {
    let s = value.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return 0.0;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

fn parse_u64(value: &str) -> u64 {
    parse_int(value).max(0) as u64
}

fn parse_u32(value: &str) -> u32 {
    parse_int(value).clamp(0, i64::from(u32::MAX)) as u32
}

fn parse_flag(value: &str) -> bool {
    parse_int(value) != 0
}

/// Apply one `status` pair. Unknown keys are ignored.
pub fn apply_status(status: &mut Status, key: &str, value: &str) {
    match key {
        "volume" => status.volume = i32::try_from(parse_int(value)).unwrap_or(-1),
        "repeat" => status.repeat = parse_flag(value),
        "random" => status.random = parse_flag(value),
        "single" => status.single = parse_flag(value),
        "consume" => status.consume = parse_flag(value),
        "playlist" => status.playlist = parse_u64(value),
        "playlistlength" => status.playlist_length = parse_u64(value),
        "xfade" => status.crossfade = parse_u32(value),
        "mixrampdb" => status.mixramp_db = parse_float(value),
        "mixrampdelay" => status.mixramp_delay = parse_int(value),
        "song" => status.song = Some(parse_u32(value)),
        "songid" => status.song_id = Some(parse_u32(value)),
        "nextsong" => status.next_song = Some(parse_u32(value)),
        "nextsongid" => status.next_song_id = Some(parse_u32(value)),
        "elapsed" => status.elapsed = parse_float(value),
        "bitrate" => status.bitrate = parse_u32(value),
        "state" => status.state = PlayState::from_protocol(value),
        "time" => {
            if let Some((elapsed, total)) = value.split_once(':') {
                status.elapsed = parse_float(elapsed);
                status.length = parse_u32(total);
            }
        }
        "audio" => {
            if let Some((rate, rest)) = value.split_once(':') {
                status.sample_rate = parse_u32(rate);
                status.bits = parse_u32(rest);
                if let Some((_, channels)) = rest.split_once(':') {
                    status.channels = parse_u32(channels);
                }
            }
        }
        _ => {}
    }
}

/// Apply one `stats` pair. Unknown keys are ignored.
pub fn apply_stats(stats: &mut Stats, key: &str, value: &str) {
    match key {
        "artists" => stats.artists = parse_u64(value),
        "albums" => stats.albums = parse_u64(value),
        "songs" => stats.songs = parse_u64(value),
        "uptime" => stats.uptime = parse_u64(value),
        "playtime" => stats.playtime = parse_u64(value),
        "db_playtime" => stats.db_playtime = parse_u64(value),
        "db_update" => stats.db_update = parse_u64(value),
        _ => {}
    }
}

/// Incremental song-listing decoder.
///
/// Every `file` key starts a new song. The previous one is finalized and
/// handed back to the caller.
pub struct SongStream<'a> {
    registry: &'a dyn FieldRegistry,
    current: Option<Song>,
}

impl<'a> SongStream<'a> {
    pub fn new(registry: &'a dyn FieldRegistry) -> Self {
        Self {
            registry,
            current: None,
        }
    }

    /// Feed one pair; returns the completed previous song when this pair
    /// begins a new one.
    pub fn push(&mut self, key: &str, value: &str) -> Option<Song> {
        if NON_SONG_ENTRIES.contains(&key) {
            return self.take_current();
        }
        let field = self.registry.lookup(key)?;

        let mut finished = None;
        if field == Field::File {
            finished = self.take_current();
            self.current = Some(Song::new());
        }
        if let Some(song) = self.current.as_mut() {
            song.set(field, value);
        }
        finished
    }

    /// Finalize the song still being assembled, if any.
    pub fn finish(mut self) -> Option<Song> {
        self.take_current()
    }

    fn take_current(&mut self) -> Option<Song> {
        let mut song = self.current.take()?;
        song.finalize();
        Some(song)
    }
}

/// Read a song listing up to its terminator, appending every song to
/// `list`. `progress` fires every [`PROGRESS_EVERY`] songs.
pub async fn receive_songs<S>(
    conn: &mut Connection<S>,
    registry: &dyn FieldRegistry,
    list: &mut Songlist,
    mut progress: Option<&mut (dyn FnMut() + Send)>,
) -> MpdResult<Terminal>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = SongStream::new(registry);
    let mut count = 0usize;

    let terminal = loop {
        match conn.next_reply().await? {
            Reply::Data(line) => {
                let Some((key, value)) = split_pair(&line) else {
                    continue;
                };
                if let Some(song) = stream.push(key, value) {
                    list.add(song);
                    count += 1;
                    if count % PROGRESS_EVERY == 0 {
                        if let Some(callback) = progress.as_deref_mut() {
                            callback();
                        }
                    }
                }
            }
            Reply::End(terminal) => break terminal,
        }
    };

    if let Some(song) = stream.finish() {
        list.add(song);
    }

    Ok(terminal)
}
