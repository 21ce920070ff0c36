//! A single outbound request: method, target, a growing header-line
//! buffer, and an optional body.

use super::Method;

const HEADER_BUF_INITIAL_CAPACITY: usize = 1024;
const HEADER_BUF_GROWTH: usize = 512;

/// A reusable request builder. `reset` clears it back to one method
/// with no headers or body while keeping the allocated buffers, the
/// way the client reuses one request object across the whole session.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    method: Method,
    target: String,
    header_lines: String,
    body: Vec<u8>,
}

impl RtspRequest {
    /// Start a fresh request for `method` against `target` (`*` for
    /// `OPTIONS`, the session URL otherwise).
    #[must_use]
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            header_lines: String::with_capacity(HEADER_BUF_INITIAL_CAPACITY),
            body: Vec::new(),
        }
    }

    /// Reset to `method`/`target` with empty headers and body, reusing
    /// the header buffer's existing allocation.
    pub fn reset(&mut self, method: Method, target: impl Into<String>) {
        self.method = method;
        self.target = target.into();
        self.header_lines.clear();
        self.body.clear();
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Append `"<name>: <value>\r\n"`, growing the header buffer by
    /// [`HEADER_BUF_GROWTH`] at a time if it would overflow its current
    /// capacity.
    pub fn add_header(&mut self, name: &str, value: &str) {
        let needed = name.len() + value.len() + 4;
        if self.header_lines.capacity() - self.header_lines.len() < needed {
            self.header_lines
                .reserve(needed.max(HEADER_BUF_GROWTH));
        }
        self.header_lines.push_str(name);
        self.header_lines.push_str(": ");
        self.header_lines.push_str(value);
        self.header_lines.push_str("\r\n");
    }

    /// Replace the body and append `Content-Type`/`Content-Length`
    /// header lines for it.
    pub fn set_content(&mut self, bytes: Vec<u8>, mime: &str) {
        let len = bytes.len();
        self.body = bytes;
        self.add_header(super::headers::CONTENT_TYPE, mime);
        self.add_header(super::headers::CONTENT_LENGTH, &len.to_string());
    }

    /// Serialize to `"<METHOD> <target> RTSP/1.0\r\n<headers>\r\n<body>"`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.method.as_str().len() + self.target.len() + 16 + self.header_lines.len() + self.body.len(),
        );
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(b" RTSP/1.0\r\n");
        out.extend_from_slice(self.header_lines.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_options_with_star_target() {
        let mut req = RtspRequest::new(Method::Options, "*");
        req.add_header("CSeq", "1");
        let bytes = req.encode();
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.starts_with("OPTIONS * RTSP/1.0\r\n"));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn set_content_appends_type_and_length() {
        let mut req = RtspRequest::new(Method::Announce, "rtsp://192.168.1.10/1");
        req.set_content(b"v=0\r\n".to_vec(), "application/sdp");
        let s = String::from_utf8(req.encode()).unwrap();
        assert!(s.contains("Content-Type: application/sdp\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("v=0\r\n"));
    }

    #[test]
    fn reset_clears_headers_and_body_but_keeps_capacity() {
        let mut req = RtspRequest::new(Method::Options, "*");
        req.add_header("CSeq", "1");
        req.set_content(b"hello".to_vec(), "text/parameters");
        let cap_before = req.header_lines.capacity();

        req.reset(Method::Setup, "rtsp://192.168.1.10/1");
        assert_eq!(req.method(), Method::Setup);
        assert!(req.header_lines.is_empty());
        assert!(req.body.is_empty());
        assert_eq!(req.header_lines.capacity(), cap_before);
    }
}
