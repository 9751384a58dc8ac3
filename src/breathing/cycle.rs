//! Breathing cycle driver.
//!
//! A per-second state machine over inhale -> hold -> exhale -> inhale. The
//! driver owns no timer: the session ticker calls [`BreathingCycle::tick`]
//! once per elapsed second. It has no terminal state of its own and knows
//! nothing about the total session length.

use serde::{Deserialize, Serialize};

use super::phase::BreathingPhase;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CycleStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Result of one driver tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStep {
    /// Countdown after the decrement, `None` when nothing was decremented
    /// (a restored phase that was already at zero).
    pub phase_tick: Option<u32>,
    /// Phase entered on this tick, if the previous one elapsed.
    pub entered: Option<BreathingPhase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreathingCycle {
    status: CycleStatus,
    phase: BreathingPhase,
    phase_remaining_secs: u32,
    cycle_count: u32,
}

impl Default for BreathingCycle {
    fn default() -> Self {
        Self {
            status: CycleStatus::Idle,
            phase: BreathingPhase::Inhale,
            phase_remaining_secs: BreathingPhase::Inhale.duration_secs(),
            cycle_count: 0,
        }
    }
}

impl BreathingCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a driver from persisted values. The countdown is clamped to
    /// the phase length. The driver comes back paused; call `resume`.
    pub fn restore(phase: BreathingPhase, phase_remaining_secs: u32, cycle_count: u32) -> Self {
        Self {
            status: CycleStatus::Paused,
            phase,
            phase_remaining_secs: phase_remaining_secs.min(phase.duration_secs()),
            cycle_count,
        }
    }

    pub fn status(&self) -> CycleStatus {
        self.status
    }

    pub fn phase(&self) -> BreathingPhase {
        self.phase
    }

    pub fn phase_remaining_secs(&self) -> u32 {
        self.phase_remaining_secs
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    /// Enter the first inhale. Returns the entered phase, or `None` if the
    /// driver was already started.
    pub fn start(&mut self) -> Option<BreathingPhase> {
        if self.status != CycleStatus::Idle {
            return None;
        }
        *self = Self {
            status: CycleStatus::Running,
            ..Self::default()
        };
        Some(self.phase)
    }

    pub fn pause(&mut self) -> bool {
        if self.status != CycleStatus::Running {
            return false;
        }
        self.status = CycleStatus::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.status != CycleStatus::Paused {
            return false;
        }
        self.status = CycleStatus::Running;
        true
    }

    pub fn stop(&mut self) {
        self.status = CycleStatus::Stopped;
    }

    /// Advance by one elapsed second. Ignored unless running.
    pub fn tick(&mut self) -> Option<CycleStep> {
        if self.status != CycleStatus::Running {
            return None;
        }

        let phase_tick = if self.phase_remaining_secs > 0 {
            self.phase_remaining_secs -= 1;
            Some(self.phase_remaining_secs)
        } else {
            None
        };

        let entered = if self.phase_remaining_secs == 0 {
            Some(self.advance())
        } else {
            None
        };

        Some(CycleStep {
            phase_tick,
            entered,
        })
    }

    fn advance(&mut self) -> BreathingPhase {
        let next = self.phase.next();
        if next == BreathingPhase::Inhale {
            self.cycle_count = self.cycle_count.saturating_add(1);
        }
        self.phase = next;
        self.phase_remaining_secs = next.duration_secs();
        next
    }
}
