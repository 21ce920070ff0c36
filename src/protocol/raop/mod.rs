//! RAOP method sequencing and Digest authentication.

pub mod auth;
pub mod pump;
pub mod session;

pub use pump::{PlaybackState, SharedPlayback};
pub use session::RaopSession;
