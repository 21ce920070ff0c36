//! Audio Pump: the background task that reads samples, frames them,
//! and writes them to the audio channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::error::RaopError;
use crate::mp4::M4aCursor;
use crate::net::ByteChannel;

const FRAME_HEADER_LEN: usize = 16;
const RECEIVER_BUFFER_LAG: Duration = Duration::from_secs(2);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The session's play/stop state, shared lock-free between the
/// controller and the pump task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Streaming,
    Stopping,
}

impl PlaybackState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Streaming,
            2 => PlaybackState::Stopping,
            _ => PlaybackState::Idle,
        }
    }
}

/// `playback_state`, `pump_joinable`, and the pump's progress estimate
/// — the only state the controller and the pump both touch. Plain
/// atomics; neither side ever needs to observe the other's write
/// happen-before anything else (see the concurrency design notes).
pub struct SharedPlayback {
    state: AtomicU8,
    pump_joinable: AtomicBool,
    progress_millis: AtomicI64,
}

impl SharedPlayback {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(PlaybackState::Idle as u8),
            pump_joinable: AtomicBool::new(false),
            progress_millis: AtomicI64::new(0),
        })
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, s: PlaybackState) {
        self.state.store(s as u8, Ordering::Relaxed);
    }

    pub fn mark_joinable(&self, v: bool) {
        self.pump_joinable.store(v, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_joinable(&self) -> bool {
        self.pump_joinable.load(Ordering::Relaxed)
    }

    /// Elapsed playback position in seconds, clipped to non-negative.
    #[must_use]
    pub fn progress_secs(&self) -> f64 {
        (self.progress_millis.load(Ordering::Relaxed).max(0) as f64) / 1000.0
    }

    fn set_progress_secs(&self, secs: f64) {
        #[allow(clippy::cast_possible_truncation)]
        let millis = (secs.max(0.0) * 1000.0) as i64;
        self.progress_millis.store(millis, Ordering::Relaxed);
    }
}

/// Run the pump to completion: seek, stream every remaining sample,
/// then wait out the receiver's playback buffer before exiting.
///
/// # Errors
/// Returns `RaopError::NetworkIo` on any audio-channel write failure,
/// or a cursor error if `start_time` is out of range.
pub async fn run(
    mut cursor: M4aCursor,
    mut audio_channel: ByteChannel,
    shared: Arc<SharedPlayback>,
    start_time: f64,
    file_duration_secs: f64,
) -> Result<(), RaopError> {
    cursor.seek_to_time(start_time)?;
    let playing_time_offset = Instant::now() + RECEIVER_BUFFER_LAG;

    shared.set_state(PlaybackState::Streaming);
    shared.set_progress_secs(start_time);

    let mut scratch = Vec::new();
    while shared.state() == PlaybackState::Streaming && cursor.has_more()? {
        let sample_size = cursor.next_sample(&mut scratch)?;
        let mut packet = Vec::with_capacity(FRAME_HEADER_LEN + sample_size as usize);
        packet.extend_from_slice(&frame_header(sample_size));
        packet.extend_from_slice(&scratch[..sample_size as usize]);
        audio_channel.send(&packet).await?;

        shared.set_progress_secs(elapsed_since(playing_time_offset) + start_time);
    }

    // Only drain-wait on natural exhaustion; an explicit stop should
    // exit promptly instead of waiting out the buffer.
    if !cursor.has_more()? {
        let mut remaining = (file_duration_secs - shared.progress_secs() + 1.0).max(0.0);
        while remaining > 0.0 && shared.state() == PlaybackState::Streaming {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            remaining -= DRAIN_POLL_INTERVAL.as_secs_f64();
        }
    }

    shared.set_state(PlaybackState::Stopping);
    shared.mark_joinable(true);
    audio_channel.close().await;
    Ok(())
}

/// Signed elapsed seconds from `since` to now — negative if `since` is
/// still in the future, unlike `Instant::duration_since`, which
/// saturates at zero in either direction.
fn elapsed_since(since: Instant) -> f64 {
    let now = Instant::now();
    let forward = now.saturating_duration_since(since).as_secs_f64();
    let backward = since.saturating_duration_since(now).as_secs_f64();
    forward - backward
}

fn frame_header(sample_size: u32) -> [u8; FRAME_HEADER_LEN] {
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0] = 0x24;
    header[1] = 0x00;
    #[allow(clippy::cast_possible_truncation)]
    let len = (sample_size + 12) as u16;
    header[2..4].copy_from_slice(&len.to_be_bytes());
    header[4] = 0xF0;
    header[5] = 0xFF;
    header
}
