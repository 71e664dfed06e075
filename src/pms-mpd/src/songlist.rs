use pms_core::models::Song;
use serde::Serialize;

/// Upper bound on the capacity reserved by [`Songlist::truncate`].
const MAX_PRESIZE: usize = 1 << 20;

/// Ordered list of songs mirrored from the server (queue or library).
///
/// `version` is the server-side version the contents correspond to, `None`
/// until the first complete sync.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Songlist {
    songs: Vec<Song>,
    version: Option<u64>,
}

impl Songlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Song> {
        self.songs.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = Some(version);
    }

    /// Drop all songs, keeping the version.
    pub fn clear(&mut self) {
        self.songs.clear();
    }

    /// Drop all songs and forget the version.
    pub fn reset(&mut self) {
        self.songs.clear();
        self.version = None;
    }

    /// Cut the list down to `len` entries and make room for that many.
    pub fn truncate(&mut self, len: usize) {
        self.songs.truncate(len);
        let wanted = len.min(MAX_PRESIZE);
        self.songs.reserve(wanted.saturating_sub(self.songs.len()));
    }

    /// Store a song. A song whose queue position already exists in the list
    /// replaces that entry; everything else is appended.
    pub fn add(&mut self, song: Song) {
        match song.position {
            Some(pos) if pos < self.songs.len() => self.songs[pos] = song,
            _ => self.songs.push(song),
        }
    }
}

impl<'a> IntoIterator for &'a Songlist {
    type Item = &'a Song;
    type IntoIter = std::slice::Iter<'a, Song>;

    fn into_iter(self) -> Self::IntoIter {
        self.songs.iter()
    }
}
