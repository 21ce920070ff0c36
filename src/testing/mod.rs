//! In-process mock RAOP receiver.
//!
//! Speaks just enough of the control protocol to drive the seven-method
//! handshake end to end, plus a TCP audio sink that records every framed
//! packet it receives. Used by the integration tests under `tests/`;
//! exposed outside unit tests via the `testing` feature so those tests
//! (separate binaries) can reach it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::protocol::raop::auth;

pub mod fixture;

const REALM: &str = "airtunes";
const NONCE: &str = "abc123";
const SESSION_ID: u32 = 0x1234_ABCD;

/// One control request the mock server parsed off the wire, kept for
/// assertions (CSeq ordering, the `Authorization` retry, volume bodies).
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    /// The request-line method, e.g. `"OPTIONS"`.
    pub method: String,
    /// The request-line target, e.g. `"*"` or `"rtsp://127.0.0.1:5000/1"`.
    pub target: String,
    /// Header names as written on the wire, mapped to their values.
    pub headers: HashMap<String, String>,
    /// The request body, if any (`Content-Length` bytes).
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted behavior for one mock session. Default is the happy path.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockRaopConfig {
    /// Answer the first OPTIONS with a 401 Digest challenge; the retry
    /// (carrying `Authorization`) is answered normally.
    pub challenge_first_options: bool,
    /// Answer SETUP with 354 (receiver busy) instead of completing it.
    /// No audio connection will ever be accepted in this mode.
    pub busy_on_setup: bool,
}

#[derive(Default)]
struct State {
    requests: Vec<ReceivedRequest>,
    audio_bytes: Vec<u8>,
    challenged_once: bool,
}

/// A running mock receiver: an RTSP control listener plus a TCP audio
/// sink, both bound to ephemeral localhost ports.
pub struct MockRaopServer {
    control_addr: SocketAddr,
    state: Arc<Mutex<State>>,
    control_task: JoinHandle<()>,
    audio_task: JoinHandle<()>,
}

impl MockRaopServer {
    /// Bind both listeners and start accepting in the background. Only
    /// the first control connection and the first audio connection are
    /// served — a real session never opens more than one of each.
    ///
    /// # Errors
    /// Returns the underlying I/O error if either ephemeral port fails
    /// to bind.
    pub async fn start(config: MockRaopConfig) -> std::io::Result<Self> {
        let control_listener = TcpListener::bind("127.0.0.1:0").await?;
        let audio_listener = TcpListener::bind("127.0.0.1:0").await?;
        let control_addr = control_listener.local_addr()?;
        let audio_port = audio_listener.local_addr()?.port();

        let state = Arc::new(Mutex::new(State::default()));

        let control_state = Arc::clone(&state);
        let control_task = tokio::task::spawn(async move {
            if let Ok((stream, _)) = control_listener.accept().await {
                serve_control(stream, control_state, config, audio_port).await;
            }
        });

        let audio_state = Arc::clone(&state);
        let audio_task = tokio::task::spawn(async move {
            if let Ok((stream, _)) = audio_listener.accept().await {
                record_audio(stream, audio_state).await;
            }
        });

        Ok(Self { control_addr, state, control_task, audio_task })
    }

    /// The address a client should connect to for the control channel.
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// `control_addr().ip()` as a string, for `RaopSession::connect`.
    #[must_use]
    pub fn host(&self) -> String {
        self.control_addr.ip().to_string()
    }

    /// `control_addr().port()`, for `RaopSession::connect`.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.control_addr.port()
    }

    /// Snapshot of every control request handled so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// All bytes the audio sink has received so far.
    #[must_use]
    pub fn audio_bytes(&self) -> Vec<u8> {
        self.state.lock().unwrap().audio_bytes.clone()
    }

    /// Wait for both background tasks to finish (the control task exits
    /// once TEARDOWN is handled or the client closes the socket).
    pub async fn join(self) {
        let _ = self.control_task.await;
        let _ = self.audio_task.await;
    }
}

async fn serve_control(
    mut stream: TcpStream,
    state: Arc<Mutex<State>>,
    config: MockRaopConfig,
    audio_port: u16,
) {
    let mut buffer = Vec::new();
    let mut temp = [0u8; 4096];

    loop {
        let n = match stream.read(&mut temp).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&temp[..n]);

        while let Some((request, consumed)) = try_parse(&buffer) {
            buffer.drain(..consumed);
            let cseq = request.header("CSeq").unwrap_or("0").to_string();
            let response = respond(&request, &cseq, &state, &config, audio_port);
            let teardown = request.method.eq_ignore_ascii_case("TEARDOWN");
            state.lock().unwrap().requests.push(request);
            if stream.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            if teardown {
                return;
            }
        }
    }
}

async fn record_audio(mut stream: TcpStream, state: Arc<Mutex<State>>) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => state.lock().unwrap().audio_bytes.extend_from_slice(&buf[..n]),
        }
    }
}

fn try_parse(data: &[u8]) -> Option<(ReceivedRequest, usize)> {
    let header_end = data.windows(4).position(|w| w == b"\r\n\r\n")?;
    let header_len = header_end + 4;
    let header_str = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = header_str.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = HashMap::new();
    let mut content_length = 0usize;
    for line in lines {
        let (name, value) = line.split_once(':')?;
        let (name, value) = (name.trim().to_string(), value.trim().to_string());
        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = value.parse().unwrap_or(0);
        }
        headers.insert(name, value);
    }

    if data.len() < header_len + content_length {
        return None;
    }
    let body = data[header_len..header_len + content_length].to_vec();
    Some((ReceivedRequest { method, target, headers, body }, header_len + content_length))
}

fn respond(
    request: &ReceivedRequest,
    cseq: &str,
    state: &Arc<Mutex<State>>,
    config: MockRaopConfig,
    audio_port: u16,
) -> String {
    if request.method.eq_ignore_ascii_case("OPTIONS") && config.challenge_first_options {
        let already_challenged = state.lock().unwrap().challenged_once;
        if !already_challenged && request.header("Authorization").is_none() {
            state.lock().unwrap().challenged_once = true;
            return status_line(401, "Unauthorized", cseq)
                + &format!("WWW-Authenticate: Digest realm=\"{REALM}\", nonce=\"{NONCE}\"\r\n\r\n");
        }
    }

    if request.method.eq_ignore_ascii_case("SETUP") && config.busy_on_setup {
        return status_line(354, "RTSP Low Bandwidth", cseq) + "\r\n";
    }

    match request.method.to_ascii_uppercase().as_str() {
        "OPTIONS" | "ANNOUNCE" | "RECORD" | "SET_PARAMETER" => status_line(200, "OK", cseq) + "\r\n",
        "SETUP" => {
            status_line(200, "OK", cseq)
                + &format!("Session: {SESSION_ID:08X}\r\n")
                + &format!(
                    "Transport: RTP/AVP/TCP;unicast;interleaved=0-1;mode=record;server_port={audio_port}\r\n\r\n"
                )
        }
        "FLUSH" | "TEARDOWN" => status_line(200, "OK", cseq) + "\r\n",
        _ => status_line(200, "OK", cseq) + "\r\n",
    }
}

fn status_line(code: u16, reason: &str, cseq: &str) -> String {
    format!("RTSP/1.0 {code} {reason}\r\nCSeq: {cseq}\r\n")
}

/// The Digest `response` a correctly-behaving client should send back
/// for the fixed `REALM`/`NONCE` this mock challenges with — used by
/// integration tests to assert the retried OPTIONS without duplicating
/// the MD5 chain inline.
#[must_use]
pub fn expected_challenge_response(method: &str, uri: &str) -> String {
    let m = match method.to_ascii_uppercase().as_str() {
        "OPTIONS" => crate::protocol::rtsp::Method::Options,
        "ANNOUNCE" => crate::protocol::rtsp::Method::Announce,
        "SETUP" => crate::protocol::rtsp::Method::Setup,
        "RECORD" => crate::protocol::rtsp::Method::Record,
        "SET_PARAMETER" => crate::protocol::rtsp::Method::SetParameter,
        "FLUSH" => crate::protocol::rtsp::Method::Flush,
        _ => crate::protocol::rtsp::Method::Teardown,
    };
    auth::response_hex(m, uri, REALM, NONCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn happy_path_handshake_completes_and_teardown_closes_connection() {
        let server = MockRaopServer::start(MockRaopConfig::default()).await.unwrap();
        let mut client = TcpStream::connect(server.control_addr()).await.unwrap();

        for (method, target) in [
            ("OPTIONS", "*"),
            ("ANNOUNCE", "rtsp://127.0.0.1/1"),
            ("SETUP", "rtsp://127.0.0.1/1"),
            ("RECORD", "rtsp://127.0.0.1/1"),
            ("SET_PARAMETER", "rtsp://127.0.0.1/1"),
            ("FLUSH", "rtsp://127.0.0.1/1"),
            ("TEARDOWN", "rtsp://127.0.0.1/1"),
        ] {
            let req = format!("{method} {target} RTSP/1.0\r\nCSeq: 1\r\n\r\n");
            client.write_all(req.as_bytes()).await.unwrap();
            let mut buf = [0u8; 1024];
            let n = client.read(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("RTSP/1.0 200"));
        }

        server.join().await;
    }

    #[tokio::test]
    async fn challenges_first_options_only() {
        let config = MockRaopConfig { challenge_first_options: true, ..Default::default() };
        let server = MockRaopServer::start(config).await.unwrap();
        let mut client = TcpStream::connect(server.control_addr()).await.unwrap();

        client
            .write_all(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        let n = client.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(text.starts_with("RTSP/1.0 401"));
        assert!(text.contains("nonce=\"abc123\""));

        let response = expected_challenge_response("OPTIONS", "rtsp://127.0.0.1/1");
        let auth_header = format!(
            "Authorization: Digest username=\"iTunes\", realm=\"airtunes\", nonce=\"abc123\", uri=\"rtsp://127.0.0.1/1\", response=\"{response}\"\r\n"
        );
        let retry = format!("OPTIONS * RTSP/1.0\r\nCSeq: 2\r\n{auth_header}\r\n");
        client.write_all(retry.as_bytes()).await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("RTSP/1.0 200"));

        drop(client);
        server.join().await;
    }

    #[tokio::test]
    async fn busy_on_setup_reports_354_and_no_audio_connection() {
        let config = MockRaopConfig { busy_on_setup: true, ..Default::default() };
        let server = MockRaopServer::start(config).await.unwrap();
        let mut client = TcpStream::connect(server.control_addr()).await.unwrap();

        client
            .write_all(b"SETUP rtsp://127.0.0.1/1 RTSP/1.0\r\nCSeq: 1\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        let n = client.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("RTSP/1.0 354"));
    }
}
