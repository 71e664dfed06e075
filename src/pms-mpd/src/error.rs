use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the MPD engine.
///
/// Connection-class errors tear the connection down before they are
/// returned; protocol-class errors leave it usable.
#[derive(Debug, Error)]
pub enum MpdError {
    #[error("not connected to MPD")]
    NotConnected,
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: std::io::Error,
    },
    #[error("no addresses found for {host}:{port}")]
    NoAddress { host: String, port: u16 },
    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },
    #[error("timed out connecting to {host}:{port}")]
    ConnectTimeout { host: String, port: u16 },
    #[error("connection to MPD server closed")]
    Closed,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no response from MPD within {0:?}")]
    ResponseTimeout(Duration),
    #[error("MPD sent an empty line")]
    EmptyLine,
    #[error("{0}")]
    Ack(AckError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type MpdResult<T> = Result<T, MpdError>;

impl MpdError {
    /// Whether this error means the socket can no longer be used.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MpdError::NotConnected
                | MpdError::Resolve { .. }
                | MpdError::NoAddress { .. }
                | MpdError::Connect { .. }
                | MpdError::ConnectTimeout { .. }
                | MpdError::Closed
                | MpdError::Io(_)
                | MpdError::ResponseTimeout(_)
        )
    }
}

/// A parsed `ACK [code@index] {command} message` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckError {
    pub code: u32,
    /// Index of the failing command inside a command list.
    pub index: u32,
    pub command: String,
    pub message: String,
    /// The line exactly as the server sent it.
    pub raw: String,
}

impl AckError {
    /// Parse an error line. Malformed lines still produce an error carrying
    /// the raw text.
    pub fn parse(line: &str) -> Self {
        let raw = line.to_string();
        let rest = line.strip_prefix("ACK").unwrap_or(line).trim_start();

        let (code, index, rest) = match rest
            .strip_prefix('[')
            .and_then(|r| r.split_once(']'))
        {
            Some((inner, tail)) => {
                let (code, index) = inner.split_once('@').unwrap_or((inner, "0"));
                (
                    code.trim().parse().unwrap_or(0),
                    index.trim().parse().unwrap_or(0),
                    tail.trim_start(),
                )
            }
            None => (0, 0, rest),
        };

        let (command, message) = match rest.strip_prefix('{').and_then(|r| r.split_once('}')) {
            Some((command, tail)) => (command.to_string(), tail.trim_start().to_string()),
            None => (String::new(), rest.to_string()),
        };

        Self {
            code,
            index,
            command,
            message,
            raw,
        }
    }
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ack() {
        let ack = AckError::parse("ACK [50@0] {play} No such song");
        assert_eq!(ack.code, 50);
        assert_eq!(ack.index, 0);
        assert_eq!(ack.command, "play");
        assert_eq!(ack.message, "No such song");
        assert_eq!(ack.to_string(), "ACK [50@0] {play} No such song");
    }

    #[test]
    fn parses_ack_with_empty_command() {
        let ack = AckError::parse("ACK [5@0] {} unknown command \"foo\"");
        assert_eq!(ack.code, 5);
        assert_eq!(ack.command, "");
        assert_eq!(ack.message, "unknown command \"foo\"");
    }

    #[test]
    fn malformed_ack_keeps_text() {
        let ack = AckError::parse("ACK something odd");
        assert_eq!(ack.code, 0);
        assert_eq!(ack.message, "something odd");
        assert_eq!(ack.raw, "ACK something odd");
    }

    #[test]
    fn classifies_errors() {
        assert!(MpdError::Closed.is_connection_error());
        assert!(MpdError::ResponseTimeout(Duration::from_secs(1)).is_connection_error());
        assert!(!MpdError::EmptyLine.is_connection_error());
        assert!(!MpdError::Ack(AckError::parse("ACK [2@0] {} x")).is_connection_error());
    }
}
