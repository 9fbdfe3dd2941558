//! Pause/resume time accounting
//!
//! Pausing freezes every clock the session drives (captions, watchdog,
//! backend, video) and banks the elapsed time; resuming restarts them with
//! whatever is left.

use crate::audio::PlaybackHandle;
use crate::playback::caption_scheduler::CaptionScheduler;
use crate::playback::session::PlaybackSession;
use crate::playback::video::AuxiliaryVideoCoordinator;
use crate::playback::watchdog::WatchdogGuard;
use narrator_common::events::SessionState;
use narrator_common::time;
use tokio::time::Instant;
use tracing::debug;

/// Session-scoped components paused and resumed together
pub struct PlaybackParts<'a> {
    pub captions: &'a CaptionScheduler,
    pub watchdog: &'a WatchdogGuard,
    pub video: &'a AuxiliaryVideoCoordinator,
}

pub struct PauseResumeController {
    /// Floor for the remaining time after resume
    epsilon_seconds: f64,
}

impl PauseResumeController {
    pub fn new(epsilon_seconds: f64) -> Self {
        Self { epsilon_seconds }
    }

    /// Pause a `Playing` session; returns false (no-op) otherwise
    pub fn pause(
        &self,
        session: &mut PlaybackSession,
        handle: Option<&dyn PlaybackHandle>,
        parts: &PlaybackParts<'_>,
    ) -> bool {
        if session.state != SessionState::Playing {
            return false;
        }

        let elapsed = session.accumulate(Instant::now());
        parts.captions.cancel();
        parts.watchdog.clear();
        session.guard_deadline = None;
        if let Some(handle) = handle {
            handle.pause();
        }
        parts.video.pause();

        // Playing -> Paused is always legal
        session.state = SessionState::Paused;
        debug!(
            "Paused session {} at {:.3}s of {:.3}s",
            session.id, elapsed, session.duration_seconds
        );
        true
    }

    /// Resume a `Paused` session; returns the remaining seconds, or None
    /// (no-op) when nothing is paused
    pub fn resume(
        &self,
        session: &mut PlaybackSession,
        handle: Option<&dyn PlaybackHandle>,
        parts: &PlaybackParts<'_>,
    ) -> Option<f64> {
        if session.state != SessionState::Paused {
            return None;
        }

        let remaining = session.remaining(self.epsilon_seconds);

        // Reveal what is left from wherever the cursor stopped
        let cursor = parts
            .captions
            .cursor()
            .get()
            .clamp(session.start_index, session.end_index());
        let from = cursor - session.start_index;
        parts
            .captions
            .schedule(session.id, remaining, &session.sentences[from..], cursor);

        parts
            .watchdog
            .arm(session.id, time::seconds_to_duration(remaining), "resume");
        session.guard_deadline = parts.watchdog.deadline();
        session.begin_playing(Instant::now());

        if let Some(handle) = handle {
            let seek = handle.supports_seek().then_some(session.elapsed_seconds);
            handle.resume(seek);
        }
        parts.video.start();

        session.state = SessionState::Playing;
        debug!(
            "Resumed session {} with {:.3}s remaining",
            session.id, remaining
        );
        Some(remaining)
    }
}
