//! Request, outcome and snapshot types

use crate::audio::AudioPayload;
use crate::error::{Error, Result};
use narrator_common::events::{BackendKind, EndReason, SessionState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One caption line
///
/// Deserializes from either a bare string or `{ "text", "role" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CaptionLineRepr")]
pub struct CaptionLine {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CaptionLineRepr {
    Plain(String),
    Full { text: String, role: Option<String> },
}

impl From<CaptionLineRepr> for CaptionLine {
    fn from(repr: CaptionLineRepr) -> Self {
        match repr {
            CaptionLineRepr::Plain(text) => Self { text, role: None },
            CaptionLineRepr::Full { text, role } => Self { text, role },
        }
    }
}

impl CaptionLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: None,
        }
    }

    pub fn with_role(text: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: Some(role.into()),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

impl From<&str> for CaptionLine {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// A narration to play
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    /// Full narration text (TTS input and synthetic estimate)
    pub text: String,
    /// Pre-synthesized audio; looked up in the cache / fetched when absent
    pub audio: Option<AudioPayload>,
    /// Caption lines revealed during this narration
    pub sentences: Vec<CaptionLine>,
    /// Absolute caption index of `sentences[0]`
    pub start_index: usize,
    /// Start partway into the clip (resuming an interrupted narration)
    pub resume_at_seconds: Option<f64>,
}

impl NarrationRequest {
    /// Request for `text` split into the given caption lines
    pub fn new<S: Into<CaptionLine>>(
        text: impl Into<String>,
        sentences: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            text: text.into(),
            audio: None,
            sentences: sentences.into_iter().map(Into::into).collect(),
            start_index: 0,
            resume_at_seconds: None,
        }
    }

    pub fn with_audio(mut self, audio: AudioPayload) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn starting_at(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn resume_at(mut self, seconds: f64) -> Self {
        self.resume_at_seconds = Some(seconds);
        self
    }

    /// Reject requests that cannot be narrated
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidRequest("narration text is empty".to_string()));
        }
        if self.sentences.is_empty() {
            return Err(Error::InvalidRequest(
                "narration has no caption sentences".to_string(),
            ));
        }
        if let Some(offset) = self.resume_at_seconds {
            if !offset.is_finite() || offset < 0.0 {
                return Err(Error::InvalidRequest(format!(
                    "resume offset must be a non-negative number, got {}",
                    offset
                )));
            }
        }
        Ok(())
    }
}

/// How a narration ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackOutcome {
    pub session_id: Uuid,
    /// Reached the end (naturally or via the watchdog)
    pub completed: bool,
    /// Cut short by `stop` or a newer narration
    pub skipped: bool,
    pub backend: BackendKind,
    pub end_reason: EndReason,
}

impl PlaybackOutcome {
    pub fn new(session_id: Uuid, backend: BackendKind, end_reason: EndReason) -> Self {
        Self {
            session_id,
            completed: end_reason.terminal_state() == SessionState::Completed,
            skipped: end_reason.is_skip(),
            backend,
            end_reason,
        }
    }

    /// Outcome after every audio backend failed and captions ran synthetic
    pub fn degraded(session_id: Uuid, end_reason: EndReason) -> Self {
        Self {
            session_id,
            completed: false,
            skipped: end_reason.is_skip(),
            backend: BackendKind::Synthetic,
            end_reason,
        }
    }
}

/// Active session details for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub backend: BackendKind,
    pub duration_seconds: f64,
    pub duration_authoritative: bool,
    pub elapsed_seconds: f64,
    pub start_index: usize,
    pub sentence_count: usize,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub in_flight: usize,
}

/// Read-only engine state
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub session: Option<SessionSnapshot>,
    pub caption_cursor: usize,
    pub muted: bool,
    pub decode_context_running: bool,
    pub watchdog_interventions: u64,
    pub cache: CacheStats,
}
