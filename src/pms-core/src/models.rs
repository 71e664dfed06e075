use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic song attribute that a protocol key can be stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Path of the song relative to the music directory. Starts a new song
    /// in a song listing.
    File,
    Name,
    Artist,
    ArtistSort,
    AlbumArtist,
    AlbumArtistSort,
    Title,
    Album,
    AlbumSort,
    Track,
    Disc,
    Date,
    Genre,
    Composer,
    Performer,
    Comment,
    /// Integer song length in seconds, as sent by older servers.
    Time,
    /// Fractional song length in seconds.
    Duration,
    /// Position in the queue.
    Pos,
    /// Queue-scoped song id.
    Id,
    LastModified,
    MusicBrainzTrackId,
}

/// Maps protocol field names onto [`Field`] slots.
///
/// Keys the registry does not know are skipped by the decoders.
pub trait FieldRegistry: Send + Sync {
    fn lookup(&self, key: &str) -> Option<Field>;
}

/// Registry for the tag names a stock MPD server emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFieldRegistry;

impl FieldRegistry for DefaultFieldRegistry {
    fn lookup(&self, key: &str) -> Option<Field> {
        let field = match key {
            "file" => Field::File,
            "Name" => Field::Name,
            "Artist" => Field::Artist,
            "ArtistSort" => Field::ArtistSort,
            "AlbumArtist" => Field::AlbumArtist,
            "AlbumArtistSort" => Field::AlbumArtistSort,
            "Title" => Field::Title,
            "Album" => Field::Album,
            "AlbumSort" => Field::AlbumSort,
            "Track" => Field::Track,
            "Disc" => Field::Disc,
            "Date" => Field::Date,
            "Genre" => Field::Genre,
            "Composer" => Field::Composer,
            "Performer" => Field::Performer,
            "Comment" => Field::Comment,
            "Time" => Field::Time,
            "duration" => Field::Duration,
            "Pos" => Field::Pos,
            "Id" => Field::Id,
            "Last-Modified" => Field::LastModified,
            "MUSICBRAINZ_TRACKID" => Field::MusicBrainzTrackId,
            _ => return None,
        };
        Some(field)
    }
}

/// One library or queue entry.
///
/// Raw attribute values are stored as received. [`Song::finalize`] derives
/// the typed convenience values once all attributes are known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    fields: BTreeMap<Field, String>,
    /// Length in whole seconds when known.
    pub length_seconds: Option<u32>,
    /// Position in the queue, for queue entries.
    pub position: Option<usize>,
    /// Queue-scoped id, for queue entries.
    pub id: Option<u32>,
    pub year: Option<u32>,
}

impl Song {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(file: impl Into<String>) -> Self {
        let mut song = Self::default();
        song.set(Field::File, file);
        song
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn file(&self) -> Option<&str> {
        self.get(Field::File)
    }

    pub fn fields(&self) -> impl Iterator<Item = (Field, &str)> {
        self.fields.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Post-processing run once a song has received all of its attributes.
    pub fn finalize(&mut self) {
        self.length_seconds = self
            .get(Field::Duration)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.round() as u32)
            .or_else(|| self.get(Field::Time).and_then(|v| v.trim().parse().ok()));
        self.position = self.get(Field::Pos).and_then(|v| v.trim().parse().ok());
        self.id = self.get(Field::Id).and_then(|v| v.trim().parse().ok());
        self.year = self.get(Field::Date).and_then(leading_year);
    }

    /// Display title, falling back to the file name.
    pub fn display_title(&self) -> &str {
        self.get(Field::Title)
            .or(self.get(Field::Name))
            .or_else(|| self.file().map(|f| f.rsplit('/').next().unwrap_or(f)))
            .unwrap_or("")
    }
}

fn leading_year(date: &str) -> Option<u32> {
    let digits: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}
