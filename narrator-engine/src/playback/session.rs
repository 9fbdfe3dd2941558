//! Playback session state
//!
//! A session is one narration utterance. It owns its time accounting;
//! the engine owns the session.

use crate::error::{Error, Result};
use crate::playback::types::{CaptionLine, SessionSnapshot};
use narrator_common::events::{BackendKind, SessionState};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub backend: BackendKind,
    pub sentences: Vec<CaptionLine>,
    pub start_index: usize,
    pub duration_seconds: f64,
    /// Duration came from the backend rather than an estimate
    pub duration_authoritative: bool,
    /// Playing time accumulated before `last_resumed_at`
    pub elapsed_seconds: f64,
    pub state: SessionState,
    /// When the watchdog will force completion
    pub guard_deadline: Option<Instant>,
    pub last_resumed_at: Option<Instant>,
}

impl PlaybackSession {
    pub fn new(sentences: Vec<CaptionLine>, start_index: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend: BackendKind::Synthetic,
            sentences,
            start_index,
            duration_seconds: 0.0,
            duration_authoritative: false,
            elapsed_seconds: 0.0,
            state: SessionState::Idle,
            guard_deadline: None,
            last_resumed_at: None,
        }
    }

    /// Caption index one past this session's last sentence
    pub fn end_index(&self) -> usize {
        self.start_index + self.sentences.len()
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidState(format!(
                "session {}: {} -> {} not allowed",
                self.id, self.state, next
            )));
        }
        let old = self.state;
        self.state = next;
        Ok(old)
    }

    /// Mark playback as running from `now`
    pub fn begin_playing(&mut self, now: Instant) {
        self.last_resumed_at = Some(now);
    }

    /// Fold the running interval into `elapsed_seconds`
    ///
    /// Keeps `elapsed <= duration`.
    pub fn accumulate(&mut self, now: Instant) -> f64 {
        if let Some(resumed) = self.last_resumed_at.take() {
            let ran = now.saturating_duration_since(resumed).as_secs_f64();
            self.elapsed_seconds = (self.elapsed_seconds + ran).min(self.duration_seconds);
        }
        self.elapsed_seconds
    }

    /// Elapsed time including the running interval, without mutating
    pub fn elapsed_at(&self, now: Instant) -> f64 {
        let running = self
            .last_resumed_at
            .map(|r| now.saturating_duration_since(r).as_secs_f64())
            .unwrap_or(0.0);
        (self.elapsed_seconds + running).min(self.duration_seconds)
    }

    /// Time left to play, never below `epsilon`
    pub fn remaining(&self, epsilon: f64) -> f64 {
        (self.duration_seconds - self.elapsed_seconds).max(epsilon)
    }

    /// Replace an estimated duration with an authoritative one
    pub fn set_authoritative_duration(&mut self, duration: f64) {
        self.duration_seconds = duration.max(0.0);
        self.duration_authoritative = true;
        self.elapsed_seconds = self.elapsed_seconds.min(self.duration_seconds);
    }

    /// Grow an estimated duration that playback is about to outrun
    ///
    /// When `position + margin` passes the estimate, the estimate becomes
    /// `position + margin`. Authoritative durations never change. Returns
    /// whether the duration grew.
    pub fn extend_estimate(&mut self, position: f64, margin: f64) -> bool {
        if self.duration_authoritative || position + margin <= self.duration_seconds {
            return false;
        }
        self.duration_seconds = position + margin;
        true
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            backend: self.backend,
            duration_seconds: self.duration_seconds,
            duration_authoritative: self.duration_authoritative,
            elapsed_seconds: self.elapsed_at(now),
            start_index: self.start_index,
            sentence_count: self.sentences.len(),
        }
    }
}
