//! # raop-client
//!
//! A resource-frugal AirTunes (RAOP) client: parses Apple Lossless
//! audio out of a local M4A file and streams it to an AirPort Express
//! receiver without transcoding.
//!
//! ## Example
//!
//! ```rust,no_run
//! use raop_client::mp4::M4aFile;
//! use raop_client::protocol::raop::RaopSession;
//!
//! # async fn example() -> Result<(), raop_client::RaopError> {
//! let file = M4aFile::open("song.m4a")?;
//! let mut session = RaopSession::connect("192.168.1.10", 5000, file).await?;
//! session.play(0.0).await?;
//! session.wait().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Hash primitive used only for Digest authentication.
pub mod digest_md5;
/// Error types.
pub mod error;
/// M4A container parsing and sample cursor.
pub mod mp4;
/// Network abstraction layer.
pub mod net;
/// RTSP-like control protocol, RAOP sequencing, and SDP bodies.
pub mod protocol;

#[cfg(any(test, feature = "testing"))]
/// In-process mock RAOP receiver used by integration tests.
pub mod testing;

pub use error::RaopError;
pub use mp4::M4aFile;
pub use protocol::raop::RaopSession;
