//! ycbot-cron: scheduled auto-shutdown.
//!
//! A `Schedule` is a start-of-day time plus a repeat period. `AutoShutdown`
//! owns at most one background loop that sweeps expired instances at every
//! firing time the schedule yields.

pub mod schedule;
pub mod scheduler;

pub use schedule::{Period, Schedule, ScheduleParseError, compute_next_fire_time};
pub use scheduler::{AutoShutdown, CycleOutcome, CycleReport};
