use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    /// Terminal: reached zero or stopped early.
    Stopped,
}

/// Outcome of a single [`SessionTimer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// Timer is not running; nothing changed.
    Ignored,
    Remaining(u32),
    /// Reached zero on this tick. Delivered exactly once.
    Completed,
}

/// Whole-session countdown at one-second resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimer {
    status: TimerStatus,
    remaining_secs: u32,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timer rebuilt from persisted values, left paused.
    pub fn restore(remaining_secs: u32) -> Self {
        Self {
            status: if remaining_secs == 0 {
                TimerStatus::Stopped
            } else {
                TimerStatus::Paused
            },
            remaining_secs,
        }
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn is_stopped(&self) -> bool {
        self.status == TimerStatus::Stopped
    }

    pub fn start(&mut self, total_secs: u32) {
        self.remaining_secs = total_secs;
        self.status = if total_secs == 0 {
            TimerStatus::Stopped
        } else {
            TimerStatus::Running
        };
    }

    pub fn tick(&mut self) -> TimerTick {
        if self.status != TimerStatus::Running {
            return TimerTick::Ignored;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            // Inert before anyone reacts, so a late tick can't fire twice.
            self.status = TimerStatus::Stopped;
            TimerTick::Completed
        } else {
            TimerTick::Remaining(self.remaining_secs)
        }
    }

    pub fn pause(&mut self) -> bool {
        if self.status != TimerStatus::Running {
            return false;
        }
        self.status = TimerStatus::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.status != TimerStatus::Paused {
            return false;
        }
        self.status = TimerStatus::Running;
        true
    }

    pub fn stop(&mut self) {
        self.status = TimerStatus::Stopped;
    }
}
