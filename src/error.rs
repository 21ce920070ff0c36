//! Error types for the RAOP client core.

use std::io;

use crate::protocol::rtsp::Method;

/// Errors produced while parsing, negotiating, or streaming.
///
/// Each variant corresponds to one of the error kinds in the design:
/// container parsing is fatal or a recorded warning, network/protocol
/// failures unwind the session, and a handful of RAOP-specific
/// conditions (auth, receiver busy) get their own variant so callers
/// can react without string-matching a message.
#[derive(Debug, thiserror::Error)]
pub enum RaopError {
    /// The M4A container could not be parsed: a short read, a box-size
    /// mismatch, or a required field that never appeared.
    #[error("malformed M4A container at offset {offset}: {reason}")]
    ContainerMalformed {
        /// Reason for the failure.
        reason: String,
        /// Byte offset in the file where parsing stopped, if known.
        offset: u64,
    },

    /// A network I/O failure on either the control or audio channel.
    #[error("network I/O error: {0}")]
    NetworkIo(#[from] io::Error),

    /// A malformed status line, or a required header missing from a
    /// response (e.g. no `Session` after `SETUP`).
    #[error("protocol violation during {method}: {reason}")]
    ProtocolViolation {
        /// The RTSP method being processed when the violation was found.
        method: Method,
        /// Human-readable description.
        reason: String,
    },

    /// A second `401` was returned after already retrying with
    /// `Authorization` — the client does not retry a second time.
    #[error("authentication required but no credentials available")]
    AuthRequired,

    /// The `Authorization` header was rejected.
    #[error("authentication failed")]
    AuthFailed,

    /// The receiver answered `354 Low Bandwidth` (already playing to
    /// another source).
    #[error("receiver is busy (354 low bandwidth)")]
    TransientReceiverBusy,

    /// An allocation or buffer-growth failure.
    #[error("resource exhausted: {what}")]
    ResourceExhausted {
        /// What resource could not be obtained.
        what: String,
    },

    /// The requested seek time is out of range for the file.
    #[error("seek time {requested_secs}s is beyond duration {duration_secs}s")]
    SeekOutOfRange {
        /// The requested seek position, in seconds.
        requested_secs: f64,
        /// The total duration of the file, in seconds.
        duration_secs: f64,
    },
}

impl RaopError {
    /// Build a `ProtocolViolation` for a response whose `CSeq`,
    /// `Session`, or status line didn't parse.
    pub(crate) fn protocol(method: Method, reason: impl Into<String>) -> Self {
        RaopError::ProtocolViolation {
            method,
            reason: reason.into(),
        }
    }
}
