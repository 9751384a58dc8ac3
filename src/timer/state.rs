use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::breathing::{BreathingCycle, BreathingPhase};

use super::countdown::{SessionTimer, TimerTick};
use super::events::{EndReason, SessionEvent};

/// Requested session length. Validated against the allowed set once and then
/// immutable for the lifetime of the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    duration_minutes: u32,
}

impl SessionConfig {
    pub fn new(duration_minutes: u32, allowed: &[u32]) -> Result<Self> {
        if !allowed.contains(&duration_minutes) {
            bail!("session duration {duration_minutes} min is not one of {allowed:?}");
        }
        Ok(Self { duration_minutes })
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn total_seconds(&self) -> u32 {
        self.duration_minutes.saturating_mul(60)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStage {
    #[default]
    Idle,
    /// Pre-roll before the breathing session begins.
    Countdown,
    Breathing,
    Ended,
}

/// Transition a tick hands back to the controller for side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    CountdownFinished,
    Completed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub events: Vec<SessionEvent>,
    pub transition: Option<StageTransition>,
}

/// Everything that changes during one session. Only the controller mutates
/// it, one tick or command at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    stage: SessionStage,
    duration_minutes: u32,
    countdown_secs: u32,
    timer: SessionTimer,
    breathing: BreathingCycle,
    is_paused: bool,
}

/// Raw values needed to rebuild a [`SessionState`] verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateParts {
    pub duration_minutes: u32,
    pub remaining_secs: u32,
    pub phase: BreathingPhase,
    pub phase_remaining_secs: u32,
    pub cycle_count: u32,
    pub is_paused: bool,
    pub is_in_countdown: bool,
    pub countdown_secs: u32,
    pub is_session_active: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts. `None` when the parts describe a
    /// session that is neither counting down nor breathing.
    pub fn from_parts(parts: StateParts) -> Option<Self> {
        let stage = if parts.is_in_countdown {
            SessionStage::Countdown
        } else if parts.is_session_active && parts.remaining_secs > 0 {
            SessionStage::Breathing
        } else {
            return None;
        };

        let mut timer = SessionTimer::new();
        let mut breathing = BreathingCycle::new();
        if stage == SessionStage::Breathing {
            timer = SessionTimer::restore(parts.remaining_secs);
            breathing =
                BreathingCycle::restore(parts.phase, parts.phase_remaining_secs, parts.cycle_count);
            if !parts.is_paused {
                timer.resume();
                breathing.resume();
            }
        }

        Some(Self {
            stage,
            duration_minutes: parts.duration_minutes,
            countdown_secs: parts.countdown_secs,
            timer,
            breathing,
            is_paused: parts.is_paused,
        })
    }

    pub fn parts(&self) -> StateParts {
        StateParts {
            duration_minutes: self.duration_minutes,
            remaining_secs: self.remaining_seconds(),
            phase: self.current_phase(),
            phase_remaining_secs: self.phase_remaining_seconds(),
            cycle_count: self.cycle_count(),
            is_paused: self.is_paused,
            is_in_countdown: self.is_in_countdown(),
            countdown_secs: self.countdown_secs,
            is_session_active: self.stage == SessionStage::Breathing,
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn remaining_seconds(&self) -> u32 {
        match self.stage {
            SessionStage::Countdown => self.duration_minutes.saturating_mul(60),
            _ => self.timer.remaining_secs(),
        }
    }

    pub fn current_phase(&self) -> BreathingPhase {
        self.breathing.phase()
    }

    pub fn phase_remaining_seconds(&self) -> u32 {
        self.breathing.phase_remaining_secs()
    }

    pub fn cycle_count(&self) -> u32 {
        self.breathing.cycle_count()
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// True from the start of the pre-roll until the session ends.
    pub fn is_active(&self) -> bool {
        matches!(self.stage, SessionStage::Countdown | SessionStage::Breathing)
    }

    pub fn is_in_countdown(&self) -> bool {
        self.stage == SessionStage::Countdown
    }

    pub fn countdown_seconds(&self) -> u32 {
        self.countdown_secs
    }

    /// Enter the pre-roll. A zero-length pre-roll finishes on the first tick.
    pub fn begin_countdown(&mut self, config: SessionConfig, preroll_secs: u32) -> SessionEvent {
        *self = Self {
            stage: SessionStage::Countdown,
            duration_minutes: config.duration_minutes(),
            countdown_secs: preroll_secs,
            ..Self::default()
        };
        SessionEvent::CountdownTick {
            seconds_left: preroll_secs,
        }
    }

    /// Start the session timer and breathing cycle together.
    pub fn begin(&mut self, config: SessionConfig) -> Vec<SessionEvent> {
        *self = Self {
            stage: SessionStage::Breathing,
            duration_minutes: config.duration_minutes(),
            ..Self::default()
        };
        self.timer.start(config.total_seconds());

        let mut events = Vec::with_capacity(1);
        if let Some(phase) = self.breathing.start() {
            events.push(SessionEvent::phase_changed(phase));
        }
        events
    }

    /// Advance by one elapsed second.
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.is_paused {
            return outcome;
        }

        match self.stage {
            SessionStage::Idle | SessionStage::Ended => {}
            SessionStage::Countdown => {
                self.countdown_secs = self.countdown_secs.saturating_sub(1);
                outcome.events.push(SessionEvent::CountdownTick {
                    seconds_left: self.countdown_secs,
                });
                if self.countdown_secs == 0 {
                    outcome.transition = Some(StageTransition::CountdownFinished);
                }
            }
            SessionStage::Breathing => match self.timer.tick() {
                TimerTick::Ignored => {}
                TimerTick::Remaining(remaining_seconds) => {
                    outcome.events.push(SessionEvent::Tick { remaining_seconds });
                    if let Some(step) = self.breathing.tick() {
                        if let Some(remaining_in_phase) = step.phase_tick {
                            outcome
                                .events
                                .push(SessionEvent::PhaseTick { remaining_in_phase });
                        }
                        if let Some(phase) = step.entered {
                            outcome.events.push(SessionEvent::phase_changed(phase));
                        }
                    }
                }
                TimerTick::Completed => {
                    outcome.events.push(SessionEvent::Tick {
                        remaining_seconds: 0,
                    });
                    self.finish();
                    outcome.transition = Some(StageTransition::Completed);
                }
            },
        }

        outcome
    }

    pub fn pause(&mut self) -> bool {
        if !self.is_active() || self.is_paused {
            return false;
        }
        self.is_paused = true;
        self.timer.pause();
        self.breathing.pause();
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.is_active() || !self.is_paused {
            return false;
        }
        self.is_paused = false;
        self.timer.resume();
        self.breathing.resume();
        true
    }

    /// Mark the session over. Returns false if it had already ended or
    /// never started.
    pub fn finish(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.stage = SessionStage::Ended;
        self.timer.stop();
        self.breathing.stop();
        true
    }

    pub fn end_event(&self, session_id: &str, reason: EndReason) -> SessionEvent {
        SessionEvent::SessionEnded {
            session_id: session_id.to_string(),
            reason,
            cycle_count: self.cycle_count(),
        }
    }
}
