//! Playback-related type definitions
//!
//! Supporting types for narration session lifecycle, backend selection and
//! error reporting.

use serde::{Deserialize, Serialize};

/// Narration session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, nothing requested yet
    Idle,
    /// Resolving payload / starting a backend
    Loading,
    /// Audio (or synthetic clock) running
    Playing,
    /// Paused; sentences and caption offset retained
    Paused,
    /// Finished naturally or force-completed by the watchdog
    Completed,
    /// Stopped or superseded by a newer narration
    Aborted,
    /// Backend failed mid-playback
    Failed,
}

impl SessionState {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        )
    }

    /// Whether `self -> next` is a legal lifecycle transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Playing)
                | (Loading, Aborted)
                | (Loading, Failed)
                | (Playing, Paused)
                | (Playing, Completed)
                | (Playing, Aborted)
                | (Playing, Failed)
                | (Paused, Playing)
                | (Paused, Aborted)
                | (Paused, Completed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Playback backend capability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Decodes an in-memory payload; precise duration once decoded
    StreamingDecode,
    /// Media-element style playback; duration may arrive late
    BufferedElement,
    /// No audio; duration estimated from word count
    Synthetic,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::StreamingDecode => write!(f, "streaming_decode"),
            BackendKind::BufferedElement => write!(f, "buffered_element"),
            BackendKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Error taxonomy carried by `NarrationError` events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Payload could not be decoded
    DecodeFailure,
    /// Backend refused to start without a fresh user gesture
    AutoplayRejected,
    /// TTS fetch failed
    NetworkFailure,
    /// Watchdog had to force completion
    StuckPlayback,
    /// Empty text or sentences
    InvalidRequest,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::DecodeFailure => "decode-failure",
            ErrorCode::AutoplayRejected => "autoplay-rejected",
            ErrorCode::NetworkFailure => "network-failure",
            ErrorCode::StuckPlayback => "stuck-playback",
            ErrorCode::InvalidRequest => "invalid-request",
        };
        write!(f, "{}", s)
    }
}

/// Why a narration session ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// Backend reported the end of playback
    Natural,
    /// Watchdog deadline passed without a completion signal
    Watchdog,
    /// Caller stopped the narration
    Stopped,
    /// A newer narration replaced this one
    Superseded,
    /// Backend failed after playback began
    BackendFailure,
}

impl EndReason {
    /// Session state a session settles in for this reason
    pub fn terminal_state(&self) -> SessionState {
        match self {
            EndReason::Natural | EndReason::Watchdog => SessionState::Completed,
            EndReason::Stopped | EndReason::Superseded => SessionState::Aborted,
            EndReason::BackendFailure => SessionState::Failed,
        }
    }

    /// Ended by caller action rather than by playback
    pub fn is_skip(&self) -> bool {
        matches!(self, EndReason::Stopped | EndReason::Superseded)
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndReason::Natural => "natural",
            EndReason::Watchdog => "watchdog",
            EndReason::Stopped => "stopped",
            EndReason::Superseded => "superseded",
            EndReason::BackendFailure => "backend-failure",
        };
        write!(f, "{}", s)
    }
}
