//! Connection lifecycle and the idle/command state machine.
//!
//! A [`Connection`] owns at most one framed stream. Connection-class errors
//! drop the stream on the spot; the engine above notices through
//! [`Connection::take_dropped`] and resets whatever it derived from it.

use crate::command::Command;
use crate::decode::{parse_int, split_pair};
use crate::error::{AckError, MpdError, MpdResult};
use crate::idle::{ChangeKind, ChangeSet, IdleState};
use crate::transport::{Line, LineTransport};
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const CLOSED_NOTICE: &str = "Connection to MPD server closed.";

/// Protocol version announced in the `OK MPD x.y.z` banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    /// Each of the three segments is read leniently; a missing or
    /// malformed one counts as zero. Only a wrong prefix yields `None`.
    pub fn from_banner(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("OK MPD ")?;
        let mut parts = rest.trim().splitn(3, '.').map(|part| {
            u32::try_from(parse_int(part).max(0)).unwrap_or(u32::MAX)
        });
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How a response ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Ok,
    Ack(AckError),
}

impl Terminal {
    pub fn is_ok(&self) -> bool {
        matches!(self, Terminal::Ok)
    }

    pub fn into_result(self) -> MpdResult<()> {
        match self {
            Terminal::Ok => Ok(()),
            Terminal::Ack(ack) => Err(MpdError::Ack(ack)),
        }
    }
}

/// One step of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Data(String),
    End(Terminal),
}

pub struct Connection<S> {
    transport: Option<LineTransport<S>>,
    host: String,
    port: u16,
    idle: IdleState,
    version: ProtocolVersion,
    last_error: Option<String>,
    response_timeout: Duration,
    /// Changes reported while leaving idle, not yet dispatched.
    pending: ChangeSet,
    dropped: bool,
}

impl<S> Connection<S> {
    pub fn new(response_timeout: Duration) -> Self {
        Self {
            transport: None,
            host: String::new(),
            port: 0,
            idle: IdleState::Active,
            version: ProtocolVersion::default(),
            last_error: None,
            response_timeout,
            pending: ChangeSet::new(),
            dropped: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn idle_state(&self) -> IdleState {
        self.idle
    }

    pub fn is_idle(&self) -> bool {
        self.idle == IdleState::Idle
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// Most recent error reported by the server or the socket.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Close the stream. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!(host = %self.host, port = self.port, "Disconnected from MPD server");
            self.last_error = Some(CLOSED_NOTICE.to_string());
            self.dropped = true;
        }
        self.idle = IdleState::Active;
        self.pending = ChangeSet::new();
    }

    /// Whether the stream was dropped since the last call.
    pub(crate) fn take_dropped(&mut self) -> bool {
        std::mem::take(&mut self.dropped)
    }

    pub(crate) fn take_pending(&mut self) -> ChangeSet {
        std::mem::take(&mut self.pending)
    }

    /// Record `err`, tearing the stream down for connection-class errors.
    fn fail(&mut self, err: MpdError) -> MpdError {
        if err.is_connection_error() {
            error!(host = %self.host, port = self.port, "MPD: {err}");
            self.disconnect();
        } else {
            warn!(host = %self.host, port = self.port, "MPD: {err}");
        }
        self.last_error = Some(err.to_string());
        err
    }

    fn transport_mut(&mut self) -> MpdResult<&mut LineTransport<S>> {
        self.transport.as_mut().ok_or(MpdError::NotConnected)
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Take ownership of an already-open stream and read the banner.
    ///
    /// A missing or malformed banner leaves the version at `0.0.0` and the
    /// connection open.
    pub async fn attach(&mut self, stream: S, host: &str, port: u16) -> MpdResult<ProtocolVersion> {
        self.disconnect();
        self.host = host.to_string();
        self.port = port;
        self.version = ProtocolVersion::default();
        self.transport = Some(LineTransport::new(stream));
        info!(host, port, "Connected to MPD server");

        let wait = self.response_timeout;
        let result = self.transport_mut()?.receive_line(wait).await;
        let banner = match result {
            Ok(Line::Data(line)) => Some(line),
            Ok(Line::Ack(line)) => {
                self.last_error = Some(line.clone());
                Some(line)
            }
            Ok(_) | Err(MpdError::EmptyLine) => None,
            Err(err) => return Err(self.fail(err)),
        };

        match banner.as_deref().and_then(ProtocolVersion::from_banner) {
            Some(version) => {
                self.version = version;
                debug!(%version, "MPD server protocol version");
            }
            None => warn!(banner = ?banner, "MPD server sent no valid banner"),
        }
        Ok(self.version)
    }

    async fn send_line(&mut self, line: &str) -> MpdResult<usize> {
        let result = self.transport_mut()?.send(line).await;
        result.map_err(|err| self.fail(err))
    }

    /// Send `idle`. Returns `false` when already idle.
    pub async fn enter_idle(&mut self) -> MpdResult<bool> {
        if self.is_idle() {
            return Ok(false);
        }
        self.send_line(&Command::Idle.to_string()).await?;
        self.idle = IdleState::Idle;
        Ok(true)
    }

    /// Send `noidle` and consume the server's answer. Changes it reports are
    /// kept for the next poll. Returns `false` when not idle.
    pub async fn leave_idle(&mut self) -> MpdResult<bool> {
        if !self.is_idle() {
            return Ok(false);
        }
        self.send_line(&Command::NoIdle.to_string()).await?;
        let changes = self.read_changes().await?;
        if !changes.is_empty() {
            debug!(?changes, "changes reported while leaving idle");
        }
        self.pending.extend(changes);
        Ok(true)
    }

    /// Read a `changed:` list up to its terminator.
    pub(crate) async fn read_changes(&mut self) -> MpdResult<ChangeSet> {
        let mut changes = ChangeSet::new();
        loop {
            match self.next_reply().await? {
                Reply::Data(line) => {
                    if let Some(("changed", name)) = split_pair(&line) {
                        match ChangeKind::from_protocol(name) {
                            Some(kind) => {
                                changes.insert(kind);
                            }
                            None => debug!(subsystem = name, "ignoring unknown change"),
                        }
                    }
                }
                Reply::End(_) => break,
            }
        }
        self.idle = IdleState::Active;
        Ok(changes)
    }

    /// Send a command, leaving idle first if needed.
    pub async fn command(&mut self, command: &Command) -> MpdResult<()> {
        if !self.is_connected() {
            return Err(MpdError::NotConnected);
        }
        self.leave_idle().await?;
        self.send_line(&command.to_string()).await?;
        Ok(())
    }

    /// Wait up to `wait` for the server to send something.
    pub async fn wait_readable(&mut self, wait: Duration) -> MpdResult<bool> {
        let result = self.transport_mut()?.wait_readable(wait).await;
        result.map_err(|err| self.fail(err))
    }

    /// Next response line. Silence past the response timeout is fatal.
    pub async fn next_reply(&mut self) -> MpdResult<Reply> {
        let wait = self.response_timeout;
        loop {
            let result = self.transport_mut()?.receive_line(wait).await;
            return match result {
                Ok(Line::Data(line)) => Ok(Reply::Data(line)),
                Ok(Line::Ok) => Ok(Reply::End(Terminal::Ok)),
                Ok(Line::Ack(line)) => {
                    let ack = AckError::parse(&line);
                    warn!(host = %self.host, port = self.port, "MPD: {ack}");
                    self.last_error = Some(line);
                    Ok(Reply::End(Terminal::Ack(ack)))
                }
                Ok(Line::NoData) => Err(self.fail(MpdError::ResponseTimeout(wait))),
                Err(MpdError::EmptyLine) => {
                    self.fail(MpdError::EmptyLine);
                    continue;
                }
                Err(err) => Err(self.fail(err)),
            };
        }
    }

    /// Send a command and discard its response body.
    pub async fn run_ok(&mut self, command: &Command) -> MpdResult<()> {
        self.command(command).await?;
        loop {
            if let Reply::End(terminal) = self.next_reply().await? {
                return terminal.into_result();
            }
        }
    }

    /// Send `password`. An empty password is accepted without a round trip.
    pub async fn authenticate(&mut self, password: &str) -> MpdResult<()> {
        if password.is_empty() {
            return Ok(());
        }
        self.run_ok(&Command::Password(password.to_string())).await?;
        info!("Password accepted by MPD server");
        Ok(())
    }
}

impl Connection<TcpStream> {
    /// Resolve `host`, open a TCP stream and read the banner. An existing
    /// connection is closed first.
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> MpdResult<ProtocolVersion> {
        self.disconnect();
        self.host = host.to_string();
        self.port = port;
        info!(host, port, "Connecting to MPD server");

        match open_stream(host, port, connect_timeout).await {
            Ok(stream) => self.attach(stream, host, port).await,
            Err(err) => Err(self.fail(err)),
        }
    }
}

async fn open_stream(host: &str, port: u16, wait: Duration) -> MpdResult<TcpStream> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| MpdError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        debug!(%addr, "trying MPD address");
        match timeout(wait, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(source)) => {
                last_err = Some(MpdError::Connect {
                    host: host.to_string(),
                    port,
                    source,
                })
            }
            Err(_) => {
                last_err = Some(MpdError::ConnectTimeout {
                    host: host.to_string(),
                    port,
                })
            }
        }
    }

    Err(last_err.unwrap_or_else(|| MpdError::NoAddress {
        host: host.to_string(),
        port,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::{Builder, Mock};

    const WAIT: Duration = Duration::from_millis(200);

    async fn attached(mock: Mock) -> Connection<Mock> {
        let mut conn = Connection::new(WAIT);
        conn.attach(mock, "localhost", 6600).await.unwrap();
        conn
    }

    #[test]
    fn parses_banner() {
        assert_eq!(
            ProtocolVersion::from_banner("OK MPD 0.23.5"),
            Some(ProtocolVersion {
                major: 0,
                minor: 23,
                patch: 5
            })
        );
        assert_eq!(ProtocolVersion::from_banner("HELLO"), None);
    }

    #[test]
    fn malformed_banner_segments_count_as_zero() {
        let version = |line| ProtocolVersion::from_banner(line).map(|v| v.to_string());
        assert_eq!(version("OK MPD 0.23").as_deref(), Some("0.23.0"));
        assert_eq!(version("OK MPD 0.23.x").as_deref(), Some("0.23.0"));
        assert_eq!(version("OK MPD 0.24.0-git").as_deref(), Some("0.24.0"));
        assert_eq!(version("OK MPD ").as_deref(), Some("0.0.0"));
    }

    #[tokio::test]
    async fn attach_keeps_dev_build_version() {
        let mock = Builder::new().read(b"OK MPD 0.24.0-git\n").build();
        let conn = attached(mock).await;
        assert_eq!(conn.protocol_version().to_string(), "0.24.0");
    }

    #[tokio::test]
    async fn attach_reads_banner() {
        let mock = Builder::new().read(b"OK MPD 0.21.4\n").build();
        let conn = attached(mock).await;
        assert!(conn.is_connected());
        assert_eq!(conn.protocol_version().to_string(), "0.21.4");
        assert_eq!(conn.idle_state(), IdleState::Active);
    }

    #[tokio::test]
    async fn malformed_banner_keeps_connection() {
        let mock = Builder::new().read(b"hello there\n").build();
        let conn = attached(mock).await;
        assert!(conn.is_connected());
        assert_eq!(conn.protocol_version(), ProtocolVersion::default());
    }

    #[tokio::test]
    async fn closed_before_banner_fails() {
        let mock = Builder::new().build();
        let mut conn = Connection::new(WAIT);
        let err = conn.attach(mock, "localhost", 6600).await.unwrap_err();
        assert!(matches!(err, MpdError::Closed));
        assert!(!conn.is_connected());
        assert!(conn.take_dropped());
    }

    #[tokio::test]
    async fn enter_idle_is_idempotent() {
        let mock = Builder::new()
            .read(b"OK MPD 0.23.5\n")
            .write(b"idle\n")
            .build();
        let mut conn = attached(mock).await;
        assert!(conn.enter_idle().await.unwrap());
        assert!(!conn.enter_idle().await.unwrap());
        assert!(conn.is_idle());
    }

    #[tokio::test]
    async fn leave_idle_when_active_sends_nothing() {
        let mock = Builder::new().read(b"OK MPD 0.23.5\n").build();
        let mut conn = attached(mock).await;
        assert!(!conn.leave_idle().await.unwrap());
    }

    #[tokio::test]
    async fn command_leaves_idle_and_keeps_changes() {
        let mock = Builder::new()
            .read(b"OK MPD 0.23.5\n")
            .write(b"idle\n")
            .write(b"noidle\n")
            .read(b"changed: mixer\nOK\n")
            .write(b"status\n")
            .build();
        let mut conn = attached(mock).await;
        conn.enter_idle().await.unwrap();
        conn.command(&Command::Status).await.unwrap();

        assert_eq!(conn.idle_state(), IdleState::Active);
        let pending = conn.take_pending();
        assert!(pending.contains(ChangeKind::Mixer));
        assert!(conn.take_pending().is_empty());
    }

    #[tokio::test]
    async fn command_without_connection_fails() {
        let mut conn: Connection<Mock> = Connection::new(WAIT);
        assert!(matches!(
            conn.command(&Command::Status).await,
            Err(MpdError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn ack_is_recorded_and_returned() {
        let mock = Builder::new()
            .read(b"OK MPD 0.23.5\n")
            .write(b"setvol 50\n")
            .read(b"ACK [52@0] {setvol} problems setting volume\n")
            .build();
        let mut conn = attached(mock).await;
        let err = conn.run_ok(&Command::SetVol(50)).await.unwrap_err();

        assert!(matches!(err, MpdError::Ack(ref ack) if ack.code == 52));
        assert_eq!(
            conn.last_error(),
            Some("ACK [52@0] {setvol} problems setting volume")
        );
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let mock = Builder::new()
            .read(b"OK MPD 0.23.5\n")
            .write(b"status\n")
            .read(b"volume: 5\n\nOK\n")
            .build();
        let mut conn = attached(mock).await;
        conn.command(&Command::Status).await.unwrap();
        assert_eq!(
            conn.next_reply().await.unwrap(),
            Reply::Data("volume: 5".into())
        );
        assert_eq!(conn.next_reply().await.unwrap(), Reply::End(Terminal::Ok));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn silence_is_fatal() {
        let mock = Builder::new()
            .read(b"OK MPD 0.23.5\n")
            .write(b"status\n")
            .wait(Duration::from_secs(5))
            .build();
        let mut conn = Connection::new(Duration::from_millis(20));
        conn.attach(mock, "localhost", 6600).await.unwrap();
        conn.command(&Command::Status).await.unwrap();

        let err = conn.next_reply().await.unwrap_err();
        assert!(matches!(err, MpdError::ResponseTimeout(_)));
        assert!(!conn.is_connected());
        assert!(conn.take_dropped());
    }

    #[tokio::test]
    async fn empty_password_skips_round_trip() {
        let mock = Builder::new().read(b"OK MPD 0.23.5\n").build();
        let mut conn = attached(mock).await;
        conn.authenticate("").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_password() {
        let mock = Builder::new()
            .read(b"OK MPD 0.23.5\n")
            .write(b"password \"hunter2\"\n")
            .read(b"ACK [3@0] {password} incorrect password\n")
            .build();
        let mut conn = attached(mock).await;
        let err = conn.authenticate("hunter2").await.unwrap_err();
        assert!(matches!(err, MpdError::Ack(ref ack) if ack.code == 3));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mock = Builder::new().read(b"OK MPD 0.23.5\n").build();
        let mut conn = attached(mock).await;
        conn.disconnect();
        conn.disconnect();
        assert!(!conn.is_connected());
        assert_eq!(conn.last_error(), Some(CLOSED_NOTICE));
        assert!(conn.take_dropped());
        assert!(!conn.take_dropped());
    }
}
