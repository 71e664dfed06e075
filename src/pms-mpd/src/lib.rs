//! Client engine for the Music Player Daemon protocol.
//!
//! [`Mpd`] keeps a single connection to the daemon and mirrors its playback
//! status, statistics, queue and library locally. Call [`Mpd::poll`] in a
//! loop to keep the mirror current.

pub mod client;
pub mod command;
pub mod connection;
pub mod decode;
pub mod error;
pub mod events;
pub mod idle;
pub mod songlist;
pub mod status;
pub mod transport;

pub use client::{Mpd, MpdOptions, PollOutcome, SyncOutcome};
pub use command::{Command, ReplayGainMode};
pub use connection::{Connection, ProtocolVersion, Reply, Terminal};
pub use error::{AckError, MpdError, MpdResult};
pub use events::{EngineEvent, EventBus};
pub use idle::{ChangeKind, ChangeSet, IdleState, Refresh};
pub use songlist::Songlist;
pub use status::{PlayState, Stats, Status};
