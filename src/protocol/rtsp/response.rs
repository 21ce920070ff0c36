//! A single inbound response, parsed lazily.
//!
//! The response is kept as raw bytes; callers probe it for the one or
//! two header values they actually need instead of building a header
//! map up front. This avoids allocating a `HashMap` (and re-hashing
//! every header name) for a message that is thrown away after three or
//! four field reads.

use crate::error::RaopError;
use crate::net::ByteChannel;

use super::headers;

const RECEIVE_BUF_INITIAL_CAPACITY: usize = 1024;
const RECEIVE_BUF_GROWTH: usize = 512;

/// A three-digit RTSP/HTTP-style status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    #[must_use]
    pub fn is_ok(self) -> bool {
        self.0 == 200
    }

    #[must_use]
    pub fn is_success_class(self) -> bool {
        (200..300).contains(&self.0)
    }

    #[must_use]
    pub fn is_unauthorized(self) -> bool {
        self.0 == 401
    }

    #[must_use]
    pub fn is_low_bandwidth(self) -> bool {
        self.0 == 354
    }
}

/// An inbound response: the raw bytes received on the control channel,
/// plus on-demand parsing helpers.
pub struct RtspResponse {
    raw: Vec<u8>,
}

impl RtspResponse {
    /// Read one complete response from `channel`.
    ///
    /// Keeps reading until the header terminator (`\r\n\r\n`) plus
    /// `Content-Length` bytes of body have all arrived — a response can
    /// show up in as many TCP segments as the network cares to split it
    /// into, each carrying fewer bytes than the buffer holds. Once the
    /// header is known to need more room than the current buffer, the
    /// buffer grows to fit it directly; before the header terminator is
    /// even seen, it grows by 512 bytes at a time (gated on `peek`) so
    /// an unusually large set of headers doesn't require guessing a
    /// final size up front.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` on any read failure, or
    /// `RaopError::ProtocolViolation` if the peer closed the connection
    /// before sending anything.
    pub async fn receive(channel: &mut ByteChannel, method: super::Method) -> Result<Self, RaopError> {
        let mut buf = vec![0u8; RECEIVE_BUF_INITIAL_CAPACITY];
        let mut total = 0usize;

        loop {
            let n = channel.receive(&mut buf[total..]).await?;
            if n == 0 {
                if total == 0 {
                    return Err(RaopError::protocol(method, "connection closed before any response bytes arrived"));
                }
                break;
            }
            total += n;

            if let Some(needed) = completed_length(&buf[..total]) {
                if total >= needed {
                    break;
                }
                if needed > buf.len() {
                    buf.resize(needed, 0);
                }
                continue;
            }

            if total == buf.len() {
                if channel.peek().await? {
                    buf.resize(buf.len() + RECEIVE_BUF_GROWTH, 0);
                } else {
                    break;
                }
            }
        }

        buf.truncate(total);
        Ok(Self { raw: buf })
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    fn header_section(&self) -> &str {
        let end = find_subslice(&self.raw, b"\r\n\r\n").unwrap_or(self.raw.len());
        std::str::from_utf8(&self.raw[..end]).unwrap_or("")
    }

    /// Parse the status line: `"RTSP/<digit>.<digit> <code> ..."`.
    ///
    /// # Errors
    /// Returns `RaopError::ProtocolViolation` if the first nine bytes
    /// don't match the expected prefix or no digits follow it.
    pub fn status(&self, method: super::Method) -> Result<StatusCode, RaopError> {
        let bytes = &self.raw;
        if bytes.len() < 9
            || &bytes[0..5] != b"RTSP/"
            || !bytes[5].is_ascii_digit()
            || bytes[6] != b'.'
            || !bytes[7].is_ascii_digit()
            || bytes[8] != b' '
        {
            return Err(RaopError::protocol(method, "malformed status line"));
        }

        let mut i = 9;
        let mut code: u32 = 0;
        let mut any_digit = false;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            code = code * 10 + u32::from(bytes[i] - b'0');
            i += 1;
            any_digit = true;
        }
        if !any_digit {
            return Err(RaopError::protocol(method, "status line has no status code"));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(StatusCode(code as u16))
    }

    /// Find a header value by key (case-insensitive), optionally
    /// narrowed to a `;`-separated subkey within that value.
    ///
    /// For `subkey = Some(k)`: returns the text after `k=` up to the
    /// next `;`, or `Some("")` for a bare `k;` flag field, or `None` if
    /// `k` isn't present.
    #[must_use]
    pub fn find_header(&self, key: &str, subkey: Option<&str>) -> Option<&str> {
        let value = self.header_line_value(key)?;
        match subkey {
            None => Some(value),
            Some(sub) => value.split(';').map(str::trim).find_map(|field| {
                if let Some(rest) = field.strip_prefix(sub) {
                    if let Some(v) = rest.strip_prefix('=') {
                        Some(v)
                    } else if rest.is_empty() {
                        Some("")
                    } else {
                        None
                    }
                } else {
                    None
                }
            }),
        }
    }

    fn header_line_value(&self, key: &str) -> Option<&str> {
        for line in self.header_section().split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.len() > key.len() + 1
                && line.as_bytes()[..key.len()].eq_ignore_ascii_case(key.as_bytes())
                && line.as_bytes()[key.len()] == b':'
            {
                return Some(line[key.len() + 1..].trim_start());
            }
        }
        None
    }

    /// `CSeq` as a decimal `u32`.
    #[must_use]
    pub fn sequence_number(&self) -> Option<u32> {
        self.find_header(headers::CSEQ, None)?.trim().parse().ok()
    }

    /// `Session` as a hex `u32`.
    #[must_use]
    pub fn session(&self) -> Option<u32> {
        u32::from_str_radix(self.find_header(headers::SESSION, None)?.trim(), 16).ok()
    }

    /// `Transport;server_port` as a decimal `i16`.
    #[must_use]
    pub fn server_port(&self) -> Option<i16> {
        self.find_header(headers::TRANSPORT, Some("server_port"))?
            .trim()
            .parse()
            .ok()
    }

    /// Parse a `WWW-Authenticate: Digest realm="...", nonce="..."`
    /// challenge into `(realm, nonce)`.
    ///
    /// # Errors
    /// Returns `RaopError::ProtocolViolation` if the header is absent,
    /// doesn't start with `Digest `, or either field is missing or
    /// unterminated.
    pub fn auth_challenge(&self, method: super::Method) -> Result<(String, String), RaopError> {
        let value = self
            .find_header(headers::WWW_AUTHENTICATE, None)
            .ok_or_else(|| RaopError::protocol(method, "401 response missing WWW-Authenticate"))?;
        let rest = value
            .strip_prefix("Digest ")
            .ok_or_else(|| RaopError::protocol(method, "WWW-Authenticate is not a Digest challenge"))?;

        let mut realm = None;
        let mut nonce = None;
        for field in rest.split(',') {
            let field = field.trim();
            let Some(eq) = field.find('=') else { continue };
            let (name, quoted) = field.split_at(eq);
            let quoted = &quoted[1..];
            let unquoted = quoted
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| RaopError::protocol(method, "digest field not closed by a quote"))?;
            match name {
                "realm" => realm = Some(unquoted.to_string()),
                "nonce" => nonce = Some(unquoted.to_string()),
                _ => {}
            }
        }

        let realm = realm.ok_or_else(|| RaopError::protocol(method, "digest challenge missing realm"))?;
        let nonce = nonce.ok_or_else(|| RaopError::protocol(method, "digest challenge missing nonce"))?;
        Ok((realm, nonce))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// If `buf` contains a full header section, the total byte count the
/// response needs (header + `Content-Length` body bytes); `None` if the
/// header terminator hasn't arrived yet.
fn completed_length(buf: &[u8]) -> Option<usize> {
    let header_end = find_subslice(buf, b"\r\n\r\n")?;
    let header_str = std::str::from_utf8(&buf[..header_end]).unwrap_or("");
    let mut content_length = 0usize;
    for line in header_str.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case(headers::CONTENT_LENGTH) {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    Some(header_end + 4 + content_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::rtsp::Method;

    fn response(s: &str) -> RtspResponse {
        RtspResponse::from_bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn parses_status_line() {
        let r = response("RTSP/1.0 200 OK\r\nCSeq: 3\r\n\r\n");
        assert!(r.status(Method::Options).unwrap().is_ok());
    }

    #[test]
    fn rejects_malformed_status_line() {
        let r = response("HTTP/1.1 200 OK\r\n\r\n");
        assert!(r.status(Method::Options).is_err());
    }

    #[test]
    fn finds_header_case_insensitively() {
        let r = response("RTSP/1.0 200 OK\r\ncseq: 7\r\nSession: 1A2B\r\n\r\n");
        assert_eq!(r.sequence_number(), Some(7));
        assert_eq!(r.session(), Some(0x1A2B));
    }

    #[test]
    fn extracts_transport_server_port_subkey() {
        let r = response(
            "RTSP/1.0 200 OK\r\nTransport: RTP/AVP/TCP;unicast;server_port=6000\r\n\r\n",
        );
        assert_eq!(r.server_port(), Some(6000));
    }

    #[test]
    fn extracts_bare_subkey_flag() {
        let r = response("RTSP/1.0 200 OK\r\nTransport: RTP/AVP/TCP;unicast\r\n\r\n");
        assert_eq!(r.find_header("Transport", Some("unicast")), Some(""));
    }

    #[test]
    fn parses_digest_challenge() {
        let r = response(
            "RTSP/1.0 401 Unauthorized\r\nWWW-Authenticate: Digest realm=\"airtunes\", nonce=\"abc123\"\r\n\r\n",
        );
        let (realm, nonce) = r.auth_challenge(Method::Options).unwrap();
        assert_eq!(realm, "airtunes");
        assert_eq!(nonce, "abc123");
    }

    #[tokio::test]
    async fn receives_a_response_split_across_two_segments() {
        use crate::net::ByteChannel;
        use tokio::io::AsyncWriteExt as _;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let body = "RTSP/1.0 200 OK\r\nCSeq: 1\r\nSession: 1234ABCD\r\nTransport: RTP/AVP/TCP;unicast;server_port=6000\r\n\r\n";
        let (first, second) = body.as_bytes().split_at(10);

        let server = tokio::spawn({
            let first = first.to_vec();
            let second = second.to_vec();
            async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                stream.write_all(&first).await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                stream.write_all(&second).await.unwrap();
            }
        });

        let mut channel = ByteChannel::open(&addr.ip().to_string(), addr.port()).await.unwrap();
        let response = RtspResponse::receive(&mut channel, Method::Setup).await.unwrap();
        assert_eq!(response.session(), Some(0x1234_ABCD));
        assert_eq!(response.server_port(), Some(6000));

        server.await.unwrap();
    }

    #[test]
    fn rejects_challenge_missing_nonce() {
        let r = response(
            "RTSP/1.0 401 Unauthorized\r\nWWW-Authenticate: Digest realm=\"airtunes\"\r\n\r\n",
        );
        assert!(r.auth_challenge(Method::Options).is_err());
    }

    proptest::proptest! {
        #[test]
        fn header_value_round_trips(
            name in "[A-Za-z][A-Za-z-]{0,15}",
            value in "[!-~]{0,40}",
        ) {
            let raw = format!("RTSP/1.0 200 OK\r\n{name}: {value}\r\n\r\n");
            let r = response(&raw);
            proptest::prop_assert_eq!(r.find_header(&name, None), Some(value.as_str()));
        }
    }
}
