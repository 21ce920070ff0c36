//! Byte Channel — a bidirectional, stream-oriented TCP endpoint.
//!
//! This is the "external collaborator" from the design: a name/port to
//! bidirectional byte stream, with a `peek` primitive the response
//! parser needs to know whether more bytes are already sitting in the
//! kernel socket buffer before it grows its read buffer and asks again.

use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;

use crate::error::RaopError;

/// A blocking-in-spirit, async-in-practice TCP byte channel.
///
/// Used for both the RTSP control connection and the raw audio data
/// connection; the two are always separate `ByteChannel`s so that a
/// control-channel write (volume change) and an audio-channel write
/// (next frame) never contend for the same socket.
pub struct ByteChannel {
    stream: TcpStream,
}

impl ByteChannel {
    /// Open a TCP connection to `host:port`.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` if the connection cannot be
    /// established.
    pub async fn open(host: &str, port: u16) -> Result<Self, RaopError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }

    /// The local address this channel's socket is bound to — used to
    /// fill in the SDP origin line's `o=iTunes 1 O IN IP4 <local-ip>`.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` if the socket has no local
    /// address (should not happen for a connected stream).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, RaopError> {
        Ok(self.stream.local_addr()?)
    }

    /// Send all of `bytes` in one write, or fail without a partial send
    /// being acceptable to the caller (the underlying `write_all`
    /// either completes or returns an error; there is no way to observe
    /// a partial send from this API, matching the design's "on partial
    /// send the send operation fails" contract).
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` on any I/O failure.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), RaopError> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Receive up to `buf.len()` bytes into `buf`, returning how many
    /// were read. `0` means the peer closed the connection.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` on any I/O failure.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, RaopError> {
        use tokio::io::AsyncReadExt as _;
        let n = self.stream.read(buf).await?;
        Ok(n)
    }

    /// Is at least one byte readable right now, without consuming it?
    ///
    /// Used by the response receive loop to decide whether a short read
    /// (one that filled the buffer exactly) means "more is already
    /// here, grow and read again" or "that was the whole response".
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` if the peek itself fails.
    pub async fn peek(&self) -> Result<bool, RaopError> {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe).await {
            Ok(n) => Ok(n > 0),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Close the underlying socket.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
