use serde::{Deserialize, Serialize};

use crate::breathing::BreathingPhase;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Completed,
    FinishedEarly,
}

/// Everything the session core reports to its host (UI, audio cues, tests).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    CountdownTick {
        seconds_left: u32,
    },
    SessionStarted {
        session_id: String,
        total_seconds: u32,
    },
    Tick {
        remaining_seconds: u32,
    },
    PhaseChanged {
        phase: BreathingPhase,
        duration_secs: u32,
    },
    PhaseTick {
        remaining_in_phase: u32,
    },
    Paused,
    Resumed,
    Restored {
        remaining_seconds: u32,
        phase: BreathingPhase,
    },
    SessionEnded {
        session_id: String,
        reason: EndReason,
        cycle_count: u32,
    },
}

impl SessionEvent {
    pub fn phase_changed(phase: BreathingPhase) -> Self {
        SessionEvent::PhaseChanged {
            phase,
            duration_secs: phase.duration_secs(),
        }
    }

    /// Events that mark a new second and get a haptic pulse.
    pub fn is_pulse(&self) -> bool {
        matches!(
            self,
            SessionEvent::CountdownTick { .. } | SessionEvent::Tick { .. }
        )
    }
}
