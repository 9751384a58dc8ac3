pub mod controller;
pub mod countdown;
pub mod events;
pub mod state;

pub use controller::{Capabilities, SessionController, SessionView};
pub use countdown::{SessionTimer, TimerStatus, TimerTick};
pub use events::{EndReason, SessionEvent};
pub use state::{SessionConfig, SessionStage, SessionState, StageTransition, StateParts, TickOutcome};
