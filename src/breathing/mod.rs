pub mod cycle;
pub mod phase;

pub use cycle::{BreathingCycle, CycleStatus, CycleStep};
pub use phase::BreathingPhase;
