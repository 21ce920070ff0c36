//! SDP body for ANNOUNCE.
//!
//! This client only ever sends one, fixed SDP shape — there is no
//! general-purpose parser or builder here, just the literal template
//! the RAOP handshake requires.

pub mod raop;

pub use raop::announce_sdp;
