//! Idle mode bookkeeping and the change notifications it produces.

use serde::Serialize;
use std::collections::BTreeSet;

/// Which side of the idle/command split the connection is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleState {
    /// Commands may be sent and are answered synchronously.
    #[default]
    Active,
    /// `idle` was sent; the server answers only when something changes.
    Idle,
}

/// Subsystem named in a `changed:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The song database was modified after an update.
    Database,
    /// A database update started or finished.
    Update,
    StoredPlaylist,
    /// The queue was modified.
    Playlist,
    /// Playback was started, stopped or seeked.
    Player,
    /// The volume changed.
    Mixer,
    /// An audio output was enabled or disabled.
    Output,
    /// Repeat, random, crossfade, replay gain and friends.
    Options,
    Sticker,
    Subscription,
    Message,
    Partition,
    Neighbor,
    Mount,
}

impl ChangeKind {
    pub fn from_protocol(name: &str) -> Option<Self> {
        let kind = match name {
            "database" => ChangeKind::Database,
            "update" => ChangeKind::Update,
            "stored_playlist" => ChangeKind::StoredPlaylist,
            "playlist" => ChangeKind::Playlist,
            "player" => ChangeKind::Player,
            "mixer" => ChangeKind::Mixer,
            "output" => ChangeKind::Output,
            "options" => ChangeKind::Options,
            "sticker" => ChangeKind::Sticker,
            "subscription" => ChangeKind::Subscription,
            "message" => ChangeKind::Message,
            "partition" => ChangeKind::Partition,
            "neighbor" => ChangeKind::Neighbor,
            "mount" => ChangeKind::Mount,
            _ => return None,
        };
        Some(kind)
    }

    /// Local state that must be refetched after this change.
    pub fn refresh(&self) -> Refresh {
        match self {
            ChangeKind::Database => Refresh {
                library: true,
                ..Refresh::NONE
            },
            ChangeKind::Playlist => Refresh {
                status: true,
                queue: true,
                ..Refresh::NONE
            },
            ChangeKind::Player | ChangeKind::Mixer | ChangeKind::Options => Refresh {
                status: true,
                ..Refresh::NONE
            },
            ChangeKind::Update
            | ChangeKind::StoredPlaylist
            | ChangeKind::Output
            | ChangeKind::Sticker
            | ChangeKind::Subscription
            | ChangeKind::Message
            | ChangeKind::Partition
            | ChangeKind::Neighbor
            | ChangeKind::Mount => Refresh::NONE,
        }
    }
}

/// Set of refreshes to dispatch, applied in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Refresh {
    pub status: bool,
    pub queue: bool,
    pub library: bool,
}

impl Refresh {
    pub const NONE: Refresh = Refresh {
        status: false,
        queue: false,
        library: false,
    };

    pub fn merge(self, other: Refresh) -> Refresh {
        Refresh {
            status: self.status || other.status,
            queue: self.queue || other.queue,
            library: self.library || other.library,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Refresh::NONE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet(BTreeSet<ChangeKind>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ChangeKind) -> bool {
        self.0.insert(kind)
    }

    pub fn contains(&self, kind: ChangeKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChangeKind> + '_ {
        self.0.iter().copied()
    }

    pub fn extend(&mut self, other: ChangeSet) {
        self.0.extend(other.0);
    }

    pub fn refresh(&self) -> Refresh {
        self.iter()
            .fold(Refresh::NONE, |acc, kind| acc.merge(kind.refresh()))
    }
}

impl FromIterator<ChangeKind> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = ChangeKind>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
