//! Round-robin instruction blocks and the timers that drive them.

pub mod executor;
pub mod scheduler;

pub use executor::{SequencedBlockExecutor, StepOutcome, DEFAULT_COOLDOWN, DEFAULT_MIN_INTERVAL};
pub use scheduler::{Scheduler, TimerHandle};
