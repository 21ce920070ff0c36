//! Wire-level protocol implementations: the RTSP-like control protocol,
//! its RAOP method sequencing, and the SDP body ANNOUNCE carries.

pub mod raop;
pub mod rtsp;
pub mod sdp;
