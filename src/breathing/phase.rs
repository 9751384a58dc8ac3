use serde::{Deserialize, Serialize};

/// One step of the 4-7-8 breathing pattern.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BreathingPhase {
    #[default]
    Inhale,
    Hold,
    Exhale,
}

impl BreathingPhase {
    pub const ALL: [BreathingPhase; 3] = [
        BreathingPhase::Inhale,
        BreathingPhase::Hold,
        BreathingPhase::Exhale,
    ];

    /// Fixed length of the phase in whole seconds.
    pub fn duration_secs(self) -> u32 {
        match self {
            BreathingPhase::Inhale => 4,
            BreathingPhase::Hold => 7,
            BreathingPhase::Exhale => 8,
        }
    }

    /// Phase that follows this one; exhale wraps back to inhale.
    pub fn next(self) -> Self {
        match self {
            BreathingPhase::Inhale => BreathingPhase::Hold,
            BreathingPhase::Hold => BreathingPhase::Exhale,
            BreathingPhase::Exhale => BreathingPhase::Inhale,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BreathingPhase::Inhale => "inhale",
            BreathingPhase::Hold => "hold",
            BreathingPhase::Exhale => "exhale",
        }
    }

    /// Seconds in one full inhale/hold/exhale cycle.
    pub fn cycle_secs() -> u32 {
        Self::ALL.iter().map(|phase| phase.duration_secs()).sum()
    }
}
