//! Auto-shutdown schedule and firing-time arithmetic.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use thiserror::Error;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleParseError {
    #[error("invalid start time `{0}`, expected HH:MM")]
    InvalidStart(String),
    #[error("invalid period `{0}`, expected HH:MM or 24:00")]
    InvalidPeriod(String),
    #[error("expected two lines: start time and period")]
    MissingPeriod,
}

/// Repeat period between firings.
///
/// `24:00` is once per calendar day. `00:00` is kept as written but fires
/// every minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    minutes: u32,
}

impl Period {
    pub const DAILY: Self = Self {
        minutes: MINUTES_PER_DAY,
    };
    pub const CONTINUOUS: Self = Self { minutes: 0 };

    pub fn parse(s: &str) -> Result<Self, ScheduleParseError> {
        let s = s.trim();
        if s == "24:00" {
            return Ok(Self::DAILY);
        }
        let time = NaiveTime::parse_from_str(s, "%H:%M")
            .map_err(|_| ScheduleParseError::InvalidPeriod(s.to_string()))?;
        Ok(Self {
            minutes: time.hour() * 60 + time.minute(),
        })
    }

    /// Whether this is the `00:00` every-minute period.
    pub fn is_continuous(&self) -> bool {
        self.minutes == 0
    }

    /// Minutes between firings as used by the scheduler.
    pub fn effective_minutes(&self) -> i64 {
        if self.is_continuous() {
            1
        } else {
            i64::from(self.minutes)
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

/// When the auto-shutdown loop fires: from `start` each day, every `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub start: NaiveTime,
    pub period: Period,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(0, 1, 0).unwrap_or_default(),
            period: Period::DAILY,
        }
    }
}

impl Schedule {
    pub fn parse(start: &str, period: &str) -> Result<Self, ScheduleParseError> {
        let start = start.trim();
        let start = NaiveTime::parse_from_str(start, "%H:%M")
            .map_err(|_| ScheduleParseError::InvalidStart(start.to_string()))?;
        Ok(Self {
            start,
            period: Period::parse(period)?,
        })
    }

    /// Parse a two-line reply: start time on the first line, period on the second.
    pub fn parse_lines(text: &str) -> Result<Self, ScheduleParseError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let start = lines
            .next()
            .ok_or_else(|| ScheduleParseError::InvalidStart(String::new()))?;
        let period = lines.next().ok_or(ScheduleParseError::MissingPeriod)?;
        Self::parse(start, period)
    }

    pub fn next_fire_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        compute_next_fire_time(now, self.start, self.period)
    }

    /// Start time as `HH:MM`.
    pub fn start_label(&self) -> String {
        self.start.format("%H:%M").to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start {}, every {}", self.start_label(), self.period)
    }
}

/// The first firing instant strictly after `now`.
///
/// Firings are `start` today plus whole multiples of the period. Before
/// today's start the next firing is today's start.
///
/// The every-minute period departs from that rule: before today's start it
/// keeps counting from yesterday's start, so it fires within a minute rather
/// than idling until `start`.
pub fn compute_next_fire_time(
    now: NaiveDateTime,
    start: NaiveTime,
    period: Period,
) -> NaiveDateTime {
    let start_today = now.date().and_time(start);

    let anchor = if now >= start_today {
        start_today
    } else if period.is_continuous() {
        start_today - TimeDelta::days(1)
    } else {
        return start_today;
    };

    let minutes = period.effective_minutes();
    let periods_passed = (now - anchor).num_seconds() / (minutes * 60);
    anchor + TimeDelta::minutes((periods_passed + 1) * minutes)
}
