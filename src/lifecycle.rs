//! Persists the in-flight session while the app is backgrounded.
//!
//! A snapshot is a best-effort convenience: write failures are logged and
//! dropped, read failures look exactly like "no snapshot". A snapshot that is
//! too old, or was taken for a different session length, is discarded and the
//! caller starts fresh.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::breathing::BreathingPhase;
use crate::store::KeyValueStore;
use crate::timer::{SessionState, StateParts};

pub const SNAPSHOT_KEY: &str = "quickcalm.session";

/// Wire shape of the persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub remaining_seconds: u32,
    pub current_phase: BreathingPhase,
    pub phase_remaining_seconds: u32,
    pub is_paused: bool,
    pub is_in_countdown: bool,
    pub countdown_seconds: u32,
    pub is_session_active: bool,
    #[serde(default)]
    pub cycle_count: u32,
    /// Configured session length in minutes.
    pub duration: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn capture(state: &SessionState, timestamp: DateTime<Utc>) -> Self {
        let parts = state.parts();
        Self {
            remaining_seconds: parts.remaining_secs,
            current_phase: parts.phase,
            phase_remaining_seconds: parts.phase_remaining_secs,
            is_paused: parts.is_paused,
            is_in_countdown: parts.is_in_countdown,
            countdown_seconds: parts.countdown_secs,
            is_session_active: parts.is_session_active,
            cycle_count: parts.cycle_count,
            duration: parts.duration_minutes,
            timestamp,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp)
    }

    pub fn into_state(self) -> Option<SessionState> {
        SessionState::from_parts(StateParts {
            duration_minutes: self.duration,
            remaining_secs: self.remaining_seconds,
            phase: self.current_phase,
            phase_remaining_secs: self.phase_remaining_seconds,
            cycle_count: self.cycle_count,
            is_paused: self.is_paused,
            is_in_countdown: self.is_in_countdown,
            countdown_secs: self.countdown_seconds,
            is_session_active: self.is_session_active,
        })
    }
}

#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
    max_age: Duration,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    /// Write the snapshot. Failures are logged and swallowed.
    pub async fn save(&self, state: &SessionState, now: DateTime<Utc>) {
        let snapshot = SessionSnapshot::capture(state, now);
        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Failed to serialize session snapshot: {err}");
                return;
            }
        };

        match self.store.set(SNAPSHOT_KEY, payload).await {
            Ok(()) => info!(
                "Saved session snapshot ({}s remaining, {})",
                snapshot.remaining_seconds,
                snapshot.current_phase.as_str()
            ),
            Err(err) => warn!("Failed to save session snapshot: {err:#}"),
        }
    }

    pub async fn restore(&self, requested_duration: u32) -> Option<SessionState> {
        self.restore_at(requested_duration, Utc::now()).await
    }

    /// Load the snapshot as of `now`. Stale or mismatched snapshots are
    /// removed and reported as absent.
    pub async fn restore_at(
        &self,
        requested_duration: u32,
        now: DateTime<Utc>,
    ) -> Option<SessionState> {
        let raw = match self.store.get(SNAPSHOT_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("Failed to read session snapshot: {err:#}");
                return None;
            }
        };

        let snapshot: SessionSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Discarding unreadable session snapshot: {err}");
                self.clear().await;
                return None;
            }
        };

        let age = snapshot.age(now);
        if age > self.max_age {
            info!(
                "Discarding session snapshot older than {}s ({}s)",
                self.max_age.num_seconds(),
                age.num_seconds()
            );
            self.clear().await;
            return None;
        }

        if snapshot.duration != requested_duration {
            info!(
                "Discarding session snapshot for {} min (requested {} min)",
                snapshot.duration, requested_duration
            );
            self.clear().await;
            return None;
        }

        let state = snapshot.into_state();
        if state.is_none() {
            self.clear().await;
        }
        state
    }

    pub async fn clear(&self) {
        if let Err(err) = self.store.remove(SNAPSHOT_KEY).await {
            warn!("Failed to clear session snapshot: {err:#}");
        }
    }
}
