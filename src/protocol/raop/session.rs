//! The RAOP state machine: sequences the seven RTSP methods, owns both
//! connections, spawns the audio pump, and answers volume/stop/wait
//! from the foreground while the pump streams in the background.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::RaopError;
use crate::mp4::M4aFile;
use crate::net::ByteChannel;
use crate::protocol::rtsp::{Method, RtspClient};
use crate::protocol::sdp;

use super::pump::{self, PlaybackState, SharedPlayback};

/// A volume at or above this is "unmuted"; below it, the receiver is
/// told `-144` regardless of the nominal value.
const MUTE_THRESHOLD: f64 = 0.01;
/// The default, unattenuated volume a freshly opened session starts at.
const DEFAULT_VOLUME: f64 = 30.0;

/// A connected, not-yet-playing (or currently playing) RAOP session.
pub struct RaopSession {
    client: RtspClient,
    session_url: String,
    remote_host: String,
    local_ip: String,
    session_id: Option<u32>,
    volume: f64,
    file: Arc<M4aFile>,
    shared: Arc<SharedPlayback>,
    pump_handle: Option<JoinHandle<Result<(), RaopError>>>,
}

impl RaopSession {
    /// Open the control channel to `remote_host:control_port` and
    /// prepare a session for `file`. The session path is fixed to `1`
    /// for AirPort Express compatibility.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` if the control connection cannot
    /// be established.
    pub async fn connect(remote_host: &str, control_port: u16, file: M4aFile) -> Result<Self, RaopError> {
        let control_channel = ByteChannel::open(remote_host, control_port).await?;
        let local_ip = control_channel.local_addr()?.ip().to_string();

        Ok(Self {
            client: RtspClient::new(control_channel),
            session_url: format!("rtsp://{remote_host}/1"),
            remote_host: remote_host.to_string(),
            local_ip,
            session_id: None,
            volume: DEFAULT_VOLUME,
            file: Arc::new(file),
            shared: SharedPlayback::new(),
            pump_handle: None,
        })
    }

    /// Current playback position, accounting for the receiver's
    /// buffering lag. Zero before the first `play`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.shared.progress_secs()
    }

    #[must_use]
    pub fn playback_state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Run OPTIONS → ANNOUNCE → SETUP → RECORD → SET_PARAMETER, open
    /// the audio channel, and spawn the pump starting at `start_time`
    /// seconds into the file.
    ///
    /// # Errors
    /// Any control-channel failure or protocol violation aborts before
    /// the pump is spawned; no audio channel is opened on a fatal
    /// response.
    pub async fn play(&mut self, start_time: f64) -> Result<(), RaopError> {
        self.client
            .send(Method::Options, "*", &self.session_url, self.session_id, None)
            .await?;

        let descriptor = self.file.descriptor();
        let sdp_body = sdp::announce_sdp(&self.local_ip, &self.remote_host, descriptor.timescale);
        self.client
            .send(
                Method::Announce,
                &self.session_url,
                &self.session_url,
                self.session_id,
                Some((sdp_body.into_bytes(), "application/sdp")),
            )
            .await?;

        let setup = self
            .client
            .send(Method::Setup, &self.session_url, &self.session_url, self.session_id, None)
            .await?;
        if let Some(session_id) = setup.session_id {
            self.session_id = Some(session_id);
        }
        let server_port = setup
            .server_port
            .ok_or_else(|| RaopError::protocol(Method::Setup, "SETUP response missing Transport;server_port"))?;
        #[allow(clippy::cast_sign_loss)]
        let audio_channel = ByteChannel::open(&self.remote_host, server_port as u16).await?;

        self.client
            .send(Method::Record, &self.session_url, &self.session_url, self.session_id, None)
            .await?;

        let volume_body = render_volume(self.volume);
        self.client
            .send(
                Method::SetParameter,
                &self.session_url,
                &self.session_url,
                self.session_id,
                Some((volume_body.into_bytes(), "text/parameters")),
            )
            .await?;

        let cursor = self.file.cursor()?;
        let shared = Arc::clone(&self.shared);
        let duration_secs = descriptor.duration_secs();
        self.pump_handle = Some(tokio::task::spawn(pump::run(
            cursor,
            audio_channel,
            shared,
            start_time,
            duration_secs,
        )));

        Ok(())
    }

    /// Send an updated volume. If the pump is running this is
    /// transmitted immediately on the control channel, concurrently
    /// with the pump writing audio frames; otherwise it just updates
    /// the value `play` will send next time.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo`/`ProtocolViolation` if the
    /// control channel round-trip fails while streaming.
    pub async fn set_volume(&mut self, volume: f64) -> Result<(), RaopError> {
        self.volume = volume;
        if self.shared.state() == PlaybackState::Streaming {
            let body = render_volume(self.volume);
            self.client
                .send(
                    Method::SetParameter,
                    &self.session_url,
                    &self.session_url,
                    self.session_id,
                    Some((body.into_bytes(), "text/parameters")),
                )
                .await?;
        }
        Ok(())
    }

    /// Cooperative stop: flip the playback state, join the pump, then
    /// FLUSH and TEARDOWN. Tolerates a session that never played.
    ///
    /// # Errors
    /// Returns a control-channel error from FLUSH or TEARDOWN; the pump
    /// join itself never fails the call (a pump panic is logged, not
    /// propagated — the session is being torn down regardless).
    pub async fn stop(&mut self) -> Result<(), RaopError> {
        self.shared.set_state(PlaybackState::Stopping);
        self.join_pump().await;

        if self.session_id.is_some() {
            self.client
                .send(Method::Flush, &self.session_url, &self.session_url, self.session_id, None)
                .await?;
            self.client
                .send(Method::Teardown, &self.session_url, &self.session_url, self.session_id, None)
                .await?;
        }
        Ok(())
    }

    /// Wait for the pump to finish on its own (end of file). Tolerates
    /// a session that never played.
    pub async fn wait(&mut self) {
        self.join_pump().await;
    }

    async fn join_pump(&mut self) {
        let Some(handle) = self.pump_handle.take() else {
            return;
        };
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "audio pump exited with an error"),
            Err(e) => tracing::warn!(error = %e, "audio pump task panicked"),
        }
    }

    /// Release the control channel. Call after `stop`/`wait`.
    pub async fn close(self) {
        self.client.close().await;
    }
}

/// `v = -30 + volume` for `volume >= 0.01`, else `-144`, rendered as
/// the literal `"volume: %.1f\r\n"` body.
fn render_volume(volume: f64) -> String {
    let v = if volume >= MUTE_THRESHOLD { -30.0 + volume } else { -144.0 };
    format!("volume: {v:.1}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muted_volume_sends_negative_144() {
        assert_eq!(render_volume(0.0), "volume: -144.0\r\n");
    }

    #[test]
    fn max_volume_sends_zero_attenuation() {
        assert_eq!(render_volume(30.0), "volume: 0.0\r\n");
    }

    #[test]
    fn just_above_mute_threshold_is_nearly_full_attenuation() {
        assert_eq!(render_volume(0.01), "volume: -30.0\r\n");
    }

    #[test]
    fn mid_range_volume() {
        assert_eq!(render_volume(20.0), "volume: -10.0\r\n");
    }

    fn parse_db(body: &str) -> f64 {
        body.strip_prefix("volume: ").unwrap().trim_end().parse().unwrap()
    }

    proptest::proptest! {
        #[test]
        fn volume_to_db_mapping_is_monotonic(a in 0.01f64..30.0, b in 0.01f64..30.0) {
            let da = parse_db(&render_volume(a));
            let db = parse_db(&render_volume(b));
            if a < b {
                proptest::prop_assert!(da <= db);
            } else if a > b {
                proptest::prop_assert!(da >= db);
            }
        }
    }
}
