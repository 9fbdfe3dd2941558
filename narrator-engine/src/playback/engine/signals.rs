//! Backend signal handling and the watchdog listener
//!
//! **Responsibilities:**
//! - Per-session driver: turns `BackendSignal`s into session updates
//!   (authoritative duration, progress re-arms, natural end, failure)
//! - Engine-wide listener: force-completes sessions on `WatchdogTrip`

use super::core::EngineInner;
use crate::audio::BackendSignal;
use crate::error::Error;
use crate::playback::watchdog::WatchdogTrip;
use narrator_common::events::{EndReason, ErrorCode, NarrationEvent, SessionState};
use narrator_common::time;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Drive one session from its backend's signals until it ends
pub(super) fn spawn_session_driver(
    inner: Arc<EngineInner>,
    session_id: Uuid,
    mut signals: mpsc::UnboundedReceiver<BackendSignal>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                _ = cancel.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            match signal {
                BackendSignal::DurationKnown(duration) => {
                    on_duration_known(&inner, session_id, duration).await;
                }
                BackendSignal::Progress { position_seconds } => {
                    on_progress(&inner, session_id, position_seconds).await;
                }
                BackendSignal::Ended => {
                    inner.finish(session_id, EndReason::Natural).await;
                    break;
                }
                BackendSignal::Failed(reason) => {
                    warn!("Backend failed mid-playback for {}: {}", session_id, reason);
                    inner.emit_error(
                        Some(session_id),
                        &Error::Decode(reason.clone()),
                        reason,
                    );
                    inner.finish(session_id, EndReason::BackendFailure).await;
                    break;
                }
            }
        }
        debug!("Signal driver for {} exiting", session_id);
    });
}

/// Replace the estimate with the backend's duration and re-time captions
async fn on_duration_known(inner: &EngineInner, session_id: Uuid, duration: f64) {
    let mut guard = inner.active.lock().await;
    let Some(active) = guard.as_mut().filter(|a| a.session.id == session_id) else {
        return;
    };
    let session = &mut active.session;
    if session.duration_authoritative {
        return;
    }

    debug!(
        "Narration {} duration known: {:.3}s (estimated {:.3}s)",
        session_id, duration, session.duration_seconds
    );
    session.set_authoritative_duration(duration);

    if session.state != SessionState::Playing {
        // Paused sessions pick the new duration up on resume
        return;
    }
    inner
        .captions
        .correct_duration(session.duration_seconds - active.caption_origin);

    let remaining = session.duration_seconds - session.elapsed_at(Instant::now());
    inner.watchdog.replace(
        session_id,
        time::seconds_to_duration(remaining),
        "duration known",
    );
    session.guard_deadline = inner.watchdog.deadline();
}

/// Push the watchdog deadline along with reported progress
///
/// Progress past an estimated duration means the estimate was short: it
/// grows with the position, and the deadline moves out with it.
async fn on_progress(inner: &EngineInner, session_id: Uuid, position_seconds: f64) {
    let mut guard = inner.active.lock().await;
    let Some(active) = guard.as_mut().filter(|a| a.session.id == session_id) else {
        return;
    };
    let session = &mut active.session;
    if session.state != SessionState::Playing {
        return;
    }

    let margin = inner.settings.watchdog_tolerance().as_secs_f64();
    let extended = session.extend_estimate(position_seconds, margin);
    let remaining = time::seconds_to_duration(session.duration_seconds - position_seconds);
    if extended {
        debug!(
            "Narration {} still playing at {:.3}s; estimate now {:.3}s",
            session_id, position_seconds, session.duration_seconds
        );
        inner.watchdog.replace(session_id, remaining, "progress");
    } else {
        inner.watchdog.arm(session_id, remaining, "progress");
    }
    session.guard_deadline = inner.watchdog.deadline();
}

/// Listen for watchdog trips for the lifetime of the engine
pub(super) fn spawn_watchdog_listener(
    inner: Weak<EngineInner>,
    mut trips: mpsc::UnboundedReceiver<WatchdogTrip>,
) {
    tokio::spawn(async move {
        while let Some(trip) = trips.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            handle_trip(&inner, trip).await;
        }
    });
}

async fn handle_trip(inner: &EngineInner, trip: WatchdogTrip) {
    let is_current = inner
        .active
        .lock()
        .await
        .as_ref()
        .map(|a| a.session.id == trip.session_id && a.session.state == SessionState::Playing)
        .unwrap_or(false);
    if !is_current {
        debug!("Ignoring watchdog trip for inactive session {}", trip.session_id);
        return;
    }

    let total = inner.interventions.fetch_add(1, Ordering::SeqCst) + 1;
    warn!(
        "Watchdog completing stuck narration {} (armed by '{}'); {} interventions so far",
        trip.session_id, trip.reason, total
    );
    inner.bus.emit_lossy(NarrationEvent::WatchdogIntervention {
        session_id: trip.session_id,
        reason: trip.reason.clone(),
        interventions_total: total,
        timestamp: time::now(),
    });
    inner.bus.emit_lossy(NarrationEvent::NarrationError {
        session_id: Some(trip.session_id),
        code: ErrorCode::StuckPlayback,
        reason: format!("watchdog: {}", trip.reason),
        timestamp: time::now(),
    });
    inner.finish(trip.session_id, EndReason::Watchdog).await;
}
