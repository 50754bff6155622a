//! Error types for the WebSocket engine
//!
//! Every error the engine reports is fatal to the session it occurred on.
//! [`Error::kind`] groups the variants into the handful of categories a
//! caller needs to decide what to do next, and [`Error::close_code`] gives
//! the status code the session puts in its Close frame when it aborts.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket error types
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed frame on the wire
    #[error("Invalid frame: {0}")]
    InvalidFrame(&'static str),
    /// Protocol violation (masking, fragmentation, control frame rules)
    #[error("Protocol error: {0}")]
    Protocol(&'static str),
    /// Invalid UTF-8 in a text message or close reason
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,
    /// Frame payload exceeds `max_frame_size`
    #[error("Frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge {
        /// Declared payload length
        size: u64,
        /// Configured ceiling
        limit: usize,
    },
    /// Reassembled or inflated message exceeds `max_message_size`
    #[error("Message too large (limit {limit} bytes)")]
    MessageTooLarge {
        /// Configured ceiling
        limit: usize,
    },
    /// Close frame carried a status code that may not appear on the wire
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),
    /// Compressed payload could not be inflated, or deflate failed
    #[error("Compression error: {0}")]
    Compression(String),
    /// No pong arrived for an outstanding ping
    #[error("No pong received within {0:?}")]
    HeartbeatTimeout(Duration),
    /// The session is closed (or closing) and cannot carry the request
    #[error("Connection closed")]
    ConnectionClosed,
    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Coarse classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed frame, illegal masking, fragmentation error, oversized frame
    ProtocolViolation,
    /// Ping went unanswered
    HeartbeatTimeout,
    /// Corrupt compressed payload
    CompressionError,
    /// The transport failed; the session went straight to `Closed`
    TransportFailure,
    /// Operation attempted on a closed session
    Closed,
    /// Configuration rejected at construction
    Config,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::TransportFailure,
            Error::InvalidFrame(_)
            | Error::Protocol(_)
            | Error::InvalidUtf8
            | Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::InvalidCloseCode(_) => ErrorKind::ProtocolViolation,
            Error::Compression(_) => ErrorKind::CompressionError,
            Error::HeartbeatTimeout(_) => ErrorKind::HeartbeatTimeout,
            Error::ConnectionClosed => ErrorKind::Closed,
            Error::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Status code sent to the peer when this error aborts the session
    pub fn close_code(&self) -> u16 {
        match self {
            Error::InvalidUtf8 => CloseReason::INVALID_PAYLOAD,
            Error::FrameTooLarge { .. } | Error::MessageTooLarge { .. } => CloseReason::POLICY,
            Error::HeartbeatTimeout(_) => CloseReason::GOING_AWAY,
            Error::InvalidFrame(_)
            | Error::Protocol(_)
            | Error::InvalidCloseCode(_)
            | Error::Compression(_) => CloseReason::PROTOCOL_ERROR,
            Error::Io(_) => CloseReason::ABNORMAL,
            Error::ConnectionClosed | Error::InvalidConfig(_) => CloseReason::INTERNAL,
        }
    }

    /// Close reason recorded for the session when this error aborts it
    pub(crate) fn close_reason(&self) -> CloseReason {
        let text = match self {
            Error::HeartbeatTimeout(_) => "ping timeout",
            Error::FrameTooLarge { .. } => "frame too large",
            Error::MessageTooLarge { .. } => "message too large",
            Error::InvalidUtf8 => "invalid utf-8",
            Error::Compression(_) => "corrupt compressed payload",
            Error::Io(_) => "transport failure",
            _ => "protocol error",
        };
        CloseReason::new(self.close_code(), text)
    }
}

/// Close frame reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Optional reason string
    pub reason: String,
}

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown, ping timeout)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data
    pub const UNSUPPORTED: u16 = 1003;
    /// No status received
    pub const NO_STATUS: u16 = 1005;
    /// Abnormal closure
    pub const ABNORMAL: u16 = 1006;
    /// Invalid frame payload
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation
    pub const POLICY: u16 = 1008;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;
    /// Mandatory extension
    pub const EXTENSION: u16 = 1010;
    /// Internal server error
    pub const INTERNAL: u16 = 1011;

    /// Create a new close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Reason recorded when a Close frame carried no status code
    pub fn no_status() -> Self {
        Self::new(Self::NO_STATUS, "")
    }

    /// Check if the code may be sent on the wire per RFC 6455
    pub fn is_valid_code(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::Protocol("x").kind(),
            ErrorKind::ProtocolViolation
        );
        assert_eq!(
            Error::FrameTooLarge { size: 10, limit: 1 }.kind(),
            ErrorKind::ProtocolViolation
        );
        assert_eq!(
            Error::Compression("bad".into()).kind(),
            ErrorKind::CompressionError
        );
        assert_eq!(
            Error::HeartbeatTimeout(Duration::from_millis(5)).kind(),
            ErrorKind::HeartbeatTimeout
        );
        let io = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(Error::from(io).kind(), ErrorKind::TransportFailure);
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(
            Error::FrameTooLarge { size: 10, limit: 1 }.close_code(),
            CloseReason::POLICY
        );
        assert_eq!(Error::InvalidUtf8.close_code(), CloseReason::INVALID_PAYLOAD);
        assert_eq!(
            Error::HeartbeatTimeout(Duration::from_secs(1)).close_code(),
            CloseReason::GOING_AWAY
        );
        assert_eq!(
            Error::Compression("bad".into()).close_code(),
            CloseReason::PROTOCOL_ERROR
        );
    }

    #[test]
    fn test_valid_codes() {
        assert!(CloseReason::is_valid_code(1000));
        assert!(CloseReason::is_valid_code(4999));
        assert!(!CloseReason::is_valid_code(1005));
        assert!(!CloseReason::is_valid_code(1006));
        assert!(!CloseReason::is_valid_code(999));
        assert!(!CloseReason::is_valid_code(5000));
    }

    #[test]
    fn test_display() {
        assert_eq!(CloseReason::new(1000, "bye").to_string(), "1000 (bye)");
        assert_eq!(CloseReason::no_status().to_string(), "1005");
    }
}
