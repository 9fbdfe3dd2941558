//! Caption-only playback
//!
//! Used when no audio payload exists or every audio backend failed. There
//! is nothing to hear, so the duration is an estimate and completion comes
//! from a clock.

use crate::audio::backend::{BackendStart, StartParams};
use crate::audio::clock::{ClockHandle, ClockSpec};
use narrator_common::events::BackendKind;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticBackend;

impl SyntheticBackend {
    pub fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    /// Start a silent clock of `duration_seconds`
    pub fn start(&self, duration_seconds: f64, params: StartParams) -> BackendStart {
        debug!(
            "Starting synthetic playback: {:.3}s from {:.3}s",
            duration_seconds, params.offset_seconds
        );
        let (handle, signals) = ClockHandle::start(ClockSpec {
            duration_seconds,
            offset_seconds: params.offset_seconds,
            muted: params.muted,
            seekable: true,
            duration_known: true,
        });
        BackendStart { handle, signals }
    }
}
