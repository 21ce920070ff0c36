//! RTSP-like control protocol: request builder, lazy response parser,
//! and the client that correlates one with the other over a
//! [`crate::net::ByteChannel`].

pub mod client;
pub mod headers;
pub mod request;
pub mod response;

pub use client::{AuthState, CommandOutcome, RtspClient};
pub use request::RtspRequest;
pub use response::{RtspResponse, StatusCode};

use std::fmt;

/// The seven RTSP-derived methods a RAOP session ever sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Announce,
    Setup,
    Record,
    SetParameter,
    Flush,
    Teardown,
}

impl Method {
    /// The literal uppercase method name as it appears on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Record => "RECORD",
            Method::SetParameter => "SET_PARAMETER",
            Method::Flush => "FLUSH",
            Method::Teardown => "TEARDOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
