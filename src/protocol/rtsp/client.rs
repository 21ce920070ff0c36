//! Correlates one request with one response over the control channel;
//! owns the `CSeq` counter and drives the Digest retry.

use crate::error::RaopError;
use crate::net::ByteChannel;
use crate::protocol::raop::auth;

use super::request::RtspRequest;
use super::response::{RtspResponse, StatusCode};
use super::{Method, headers};

/// Digest authentication state, updated only here as responses are
/// analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    NotRequested,
    ChallengePending { realm: String, nonce: String },
    Authenticated { realm: String, nonce: String },
}

/// What a successful [`RtspClient::send`] call handed back, for the
/// session engine to act on (`SETUP`'s session id and audio port).
#[derive(Debug, Clone, Copy)]
pub struct CommandOutcome {
    pub status: StatusCode,
    pub session_id: Option<u32>,
    pub server_port: Option<i16>,
}

/// Owns the control channel and a reusable request object.
pub struct RtspClient {
    channel: ByteChannel,
    cseq: u32,
    request: RtspRequest,
    auth_state: AuthState,
}

impl RtspClient {
    #[must_use]
    pub fn new(channel: ByteChannel) -> Self {
        Self {
            channel,
            cseq: 0,
            request: RtspRequest::new(Method::Options, "*"),
            auth_state: AuthState::NotRequested,
        }
    }

    #[must_use]
    pub fn auth_state(&self) -> &AuthState {
        &self.auth_state
    }

    /// Send `method` against `target`, retrying once with a Digest
    /// `Authorization` header if the receiver answers `401`.
    ///
    /// `session_id` must be `Some` for `RECORD`/`FLUSH`/`TEARDOWN`, which
    /// carry a `Session` header; `body` supplies the content (SDP for
    /// `ANNOUNCE`, the volume line for `SET_PARAMETER`).
    ///
    /// `target` is the request-line target (`*` for `OPTIONS`, the
    /// session URL otherwise); `auth_uri` is always the session URL —
    /// Digest's `uri` field names the resource being authenticated for,
    /// not the literal request line.
    ///
    /// # Errors
    /// `RaopError::TransientReceiverBusy` on `354`; `RaopError::NetworkIo`
    /// on any channel failure; `RaopError::ProtocolViolation` on a
    /// malformed response, an unexpected status, a second `401`, or a
    /// missing `session_id` for a method that requires one.
    pub async fn send(
        &mut self,
        method: Method,
        target: &str,
        auth_uri: &str,
        session_id: Option<u32>,
        body: Option<(Vec<u8>, &str)>,
    ) -> Result<CommandOutcome, RaopError> {
        loop {
            self.request.reset(method, target);
            self.add_method_headers(method, session_id)?;

            self.cseq += 1;
            self.request.add_header(headers::CSEQ, &self.cseq.to_string());

            match &self.auth_state {
                AuthState::Authenticated { realm, nonce } | AuthState::ChallengePending { realm, nonce } => {
                    let header = auth::build_authorization_header(method, auth_uri, realm, nonce);
                    self.request.add_header(headers::AUTHORIZATION, &header);
                }
                AuthState::NotRequested => {}
            }

            if let Some((bytes, mime)) = &body {
                self.request.set_content(bytes.clone(), mime);
            }

            self.channel.send(&self.request.encode()).await?;
            let response = RtspResponse::receive(&mut self.channel, method).await?;
            let status = response.status(method)?;

            if status.is_unauthorized() {
                if matches!(self.auth_state, AuthState::ChallengePending { .. }) {
                    return Err(RaopError::protocol(
                        method,
                        "second 401 after already retrying with Authorization",
                    ));
                }
                let (realm, nonce) = response.auth_challenge(method)?;
                self.auth_state = AuthState::ChallengePending { realm, nonce };
                continue;
            }

            if status.is_low_bandwidth() {
                return Err(RaopError::TransientReceiverBusy);
            }
            if !status.is_success_class() {
                return Err(RaopError::protocol(method, format!("unexpected status {}", status.0)));
            }
            if !status.is_ok() {
                tracing::warn!(%method, status = status.0, "non-200 success status");
            }

            match response.sequence_number() {
                Some(got) if got == self.cseq => {}
                Some(got) => tracing::warn!(sent = self.cseq, got, "CSeq mismatch"),
                None => tracing::warn!(%method, "response missing CSeq"),
            }

            if let AuthState::ChallengePending { realm, nonce } = &self.auth_state {
                self.auth_state = AuthState::Authenticated {
                    realm: realm.clone(),
                    nonce: nonce.clone(),
                };
            }

            return Ok(CommandOutcome {
                status,
                session_id: response.session(),
                server_port: response.server_port(),
            });
        }
    }

    fn add_method_headers(&mut self, method: Method, session_id: Option<u32>) -> Result<(), RaopError> {
        match method {
            Method::Options | Method::Announce | Method::SetParameter => {}
            Method::Setup => {
                self.request.add_header(
                    headers::TRANSPORT,
                    "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record",
                );
            }
            Method::Record => {
                let sid = require_session_id(method, session_id)?;
                self.request.add_header(headers::SESSION, &format!("{sid:x}"));
                self.request.add_header(headers::RANGE, "npt=0-");
                self.request.add_header(headers::RTP_INFO, "seq=0;rtptime=0");
            }
            Method::Flush => {
                let sid = require_session_id(method, session_id)?;
                self.request.add_header(headers::SESSION, &format!("{sid:x}"));
                self.request.add_header(headers::RTP_INFO, "seq=0;rtptime=0");
            }
            Method::Teardown => {
                let sid = require_session_id(method, session_id)?;
                self.request.add_header(headers::SESSION, &format!("{sid:x}"));
            }
        }
        Ok(())
    }

    /// Release the underlying channel.
    pub async fn close(self) {
        self.channel.close().await;
    }
}

fn require_session_id(method: Method, session_id: Option<u32>) -> Result<u32, RaopError> {
    session_id.ok_or_else(|| RaopError::protocol(method, "this method requires an established session id"))
}
