//! Forward-progress watchdog
//!
//! A narration must never hang the lesson. The guard is armed with the
//! time playback is expected to take; if the session is still running at
//! `remaining + tolerance`, the guard reports a [`WatchdogTrip`] and the
//! engine force-completes the session.
//!
//! Only one guard record exists at a time; the last accepted arm wins.
//! Bursty re-arms for the same session that would only push the deadline
//! later are coalesced.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Guard fired for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogTrip {
    pub session_id: Uuid,
    pub reason: String,
}

/// Result of [`WatchdogGuard::arm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed,
    /// Skipped; the existing deadline stands
    Coalesced,
}

#[derive(Debug)]
struct GuardRecord {
    session_id: Uuid,
    reason: String,
    deadline: Instant,
    armed_at: Instant,
    timer: CancellationToken,
}

#[derive(Debug, Default)]
struct GuardInner {
    record: Option<GuardRecord>,
    generation: u64,
}

pub struct WatchdogGuard {
    tolerance: Duration,
    coalesce_window: Duration,
    trips: mpsc::UnboundedSender<WatchdogTrip>,
    inner: Arc<Mutex<GuardInner>>,
}

fn lock_inner(inner: &Mutex<GuardInner>) -> MutexGuard<'_, GuardInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl WatchdogGuard {
    pub fn new(
        tolerance: Duration,
        coalesce_window: Duration,
        trips: mpsc::UnboundedSender<WatchdogTrip>,
    ) -> Self {
        Self {
            tolerance,
            coalesce_window,
            trips,
            inner: Default::default(),
        }
    }

    /// Arm for `session_id`, expecting playback to take `remaining`
    pub fn arm(&self, session_id: Uuid, remaining: Duration, reason: &str) -> ArmOutcome {
        self.arm_with(session_id, remaining, reason, true)
    }

    /// Arm without coalescing
    ///
    /// For authoritative corrections (a late-known duration) that must
    /// move the deadline even right after another arm.
    pub fn replace(&self, session_id: Uuid, remaining: Duration, reason: &str) -> ArmOutcome {
        self.arm_with(session_id, remaining, reason, false)
    }

    fn arm_with(
        &self,
        session_id: Uuid,
        remaining: Duration,
        reason: &str,
        coalesce: bool,
    ) -> ArmOutcome {
        let now = Instant::now();
        let deadline = now + remaining + self.tolerance;
        let mut inner = lock_inner(&self.inner);

        if let Some(record) = inner.record.as_ref().filter(|_| coalesce) {
            if record.session_id == session_id
                && deadline >= record.deadline
                && now.saturating_duration_since(record.armed_at) < self.coalesce_window
            {
                debug!(
                    "Watchdog arm coalesced ({}); keeping deadline set by '{}'",
                    reason, record.reason
                );
                return ArmOutcome::Coalesced;
            }
        }

        if let Some(old) = inner.record.take() {
            old.timer.cancel();
        }
        inner.generation += 1;
        let generation = inner.generation;
        let timer = CancellationToken::new();
        inner.record = Some(GuardRecord {
            session_id,
            reason: reason.to_string(),
            deadline,
            armed_at: now,
            timer: timer.clone(),
        });
        drop(inner);

        debug!(
            "Watchdog armed for {} ({}): fires in {}ms",
            session_id,
            reason,
            (remaining + self.tolerance).as_millis()
        );

        let shared = Arc::clone(&self.inner);
        let trips = self.trips.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let fired = {
                        let mut inner = lock_inner(&shared);
                        if inner.generation == generation {
                            inner.generation += 1;
                            inner.record.take()
                        } else {
                            None
                        }
                    };
                    if let Some(record) = fired {
                        let _ = trips.send(WatchdogTrip {
                            session_id: record.session_id,
                            reason: record.reason,
                        });
                    }
                }
            }
        });

        ArmOutcome::Armed
    }

    /// Disarm; a pending trip will not be sent
    pub fn clear(&self) {
        let mut inner = lock_inner(&self.inner);
        if let Some(record) = inner.record.take() {
            record.timer.cancel();
            debug!("Watchdog cleared for {}", record.session_id);
        }
        inner.generation += 1;
    }

    pub fn deadline(&self) -> Option<Instant> {
        lock_inner(&self.inner).record.as_ref().map(|r| r.deadline)
    }

    pub fn is_armed(&self) -> bool {
        lock_inner(&self.inner).record.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> (WatchdogGuard, mpsc::UnboundedReceiver<WatchdogTrip>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            WatchdogGuard::new(Duration::from_millis(500), Duration::from_millis(1500), tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_remaining_plus_tolerance() {
        let (guard, mut rx) = guard();
        let id = Uuid::new_v4();
        let started = Instant::now();

        assert_eq!(guard.arm(id, Duration::from_secs(2), "narration start"), ArmOutcome::Armed);
        let trip = rx.recv().await.unwrap();

        assert_eq!(trip.session_id, id);
        assert_eq!(trip.reason, "narration start");
        assert!(started.elapsed() >= Duration::from_millis(2500));
        assert!(started.elapsed() < Duration::from_millis(2510));
        assert!(!guard.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_prevents_trip() {
        let (guard, mut rx) = guard();
        guard.arm(Uuid::new_v4(), Duration::from_secs(1), "start");
        guard.clear();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_rearm_within_window_is_coalesced() {
        let (guard, mut rx) = guard();
        let id = Uuid::new_v4();

        guard.arm(id, Duration::from_secs(1), "start");
        let first_deadline = guard.deadline().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(guard.arm(id, Duration::from_secs(3), "progress"), ArmOutcome::Coalesced);
        assert_eq!(guard.deadline(), Some(first_deadline));

        let trip = rx.recv().await.unwrap();
        assert_eq!(trip.reason, "start");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_extends_deadline_within_window() {
        let (guard, mut rx) = guard();
        let id = Uuid::new_v4();
        let started = Instant::now();

        guard.arm(id, Duration::from_secs(1), "estimate");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            guard.replace(id, Duration::from_secs(3), "duration known"),
            ArmOutcome::Armed
        );

        let trip = rx.recv().await.unwrap();
        assert_eq!(trip.reason, "duration known");
        assert!(started.elapsed() >= Duration::from_millis(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_deadline_always_applies() {
        let (guard, mut rx) = guard();
        let id = Uuid::new_v4();
        let started = Instant::now();

        guard.arm(id, Duration::from_secs(10), "estimate");
        assert_eq!(guard.arm(id, Duration::from_secs(1), "duration known"), ArmOutcome::Armed);

        let trip = rx.recv().await.unwrap();
        assert_eq!(trip.reason, "duration known");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_outside_window_applies() {
        let (guard, _rx) = guard();
        let id = Uuid::new_v4();

        guard.arm(id, Duration::from_secs(5), "start");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(guard.arm(id, Duration::from_secs(5), "resume"), ArmOutcome::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_replaces_record() {
        let (guard, mut rx) = guard();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        guard.arm(first, Duration::from_secs(1), "first");
        assert_eq!(guard.arm(second, Duration::from_secs(2), "second"), ArmOutcome::Armed);

        let trip = rx.recv().await.unwrap();
        assert_eq!(trip.session_id, second);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
