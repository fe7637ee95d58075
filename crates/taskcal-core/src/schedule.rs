//! Sequential day scheduling.
//!
//! A batch shares one start date and start time. Each entry starts where the
//! previous one ended plus its break; the date never rolls over.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;
use crate::task::TaskDraft;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Calendar identifier used when a task has no explicit target.
pub const PRIMARY_CALENDAR_ID: &str = "primary";

/// Wall-clock time of day with minute resolution, rendered as `HH:mm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour >= 24 || minute >= 60 {
            return Err(ValidationError::InvalidTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(ClockTime((hour * 60 + minute) as u16))
    }

    pub fn from_minutes_of_day(minutes: u32) -> Self {
        ClockTime((minutes % MINUTES_PER_DAY) as u16)
    }

    pub fn minutes_of_day(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes_of_day() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes_of_day() % 60
    }

    /// Advance by `minutes`, wrapping at midnight.
    pub fn wrapping_add(self, minutes: u64) -> Self {
        let total = u64::from(self.minutes_of_day()) + minutes;
        ClockTime((total % u64::from(MINUTES_PER_DAY)) as u16)
    }

    pub fn to_naive_time(self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or_default()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        ClockTime::new(hour, minute).map_err(|_| invalid())
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// One task to place on the day, before it has a start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub title: String,
    pub description: Option<String>,
    pub duration: u32,
    pub break_after: u32,
    pub calendar_id: Option<String>,
}

impl ScheduleEntry {
    pub fn new(title: impl Into<String>, duration: u32, break_after: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            duration,
            break_after,
            calendar_id: None,
        }
    }
}

/// Output of [`build_schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub drafts: Vec<TaskDraft>,
    /// Minutes from midnight of the start date to the end of the last task.
    pub end_offset_minutes: u64,
}

impl Schedule {
    /// Whether the last task ends after midnight of the start date.
    ///
    /// Start times of such tasks have wrapped around to the early hours of
    /// the same date.
    pub fn overflows(&self) -> bool {
        self.end_offset_minutes > u64::from(MINUTES_PER_DAY)
    }

    /// Fail with `ScheduleOverflow` when the batch does not fit in the day.
    pub fn ensure_fits_day(&self) -> Result<(), ValidationError> {
        if self.overflows() {
            return Err(ValidationError::ScheduleOverflow {
                total_minutes: u32::try_from(self.end_offset_minutes).unwrap_or(u32::MAX),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub fn into_drafts(self) -> Vec<TaskDraft> {
        self.drafts
    }
}

/// Assign start times by walking a running clock from `start_time`.
///
/// Entry `i` starts at `start + sum(d_j + b_j for j < i)` modulo 24h.
pub fn build_schedule(
    entries: &[ScheduleEntry],
    date: NaiveDate,
    start_time: ClockTime,
) -> Schedule {
    let mut clock = start_time;
    let mut elapsed: u64 = 0;
    let mut end_offset = u64::from(start_time.minutes_of_day());
    let mut drafts = Vec::with_capacity(entries.len());

    for entry in entries {
        drafts.push(TaskDraft {
            title: entry.title.clone(),
            description: entry.description.clone(),
            duration: entry.duration,
            break_after: entry.break_after,
            date,
            start_time: clock,
            calendar_id: entry
                .calendar_id
                .clone()
                .unwrap_or_else(|| PRIMARY_CALENDAR_ID.to_string()),
            calendar_name: None,
            calendar_color: None,
        });

        end_offset = u64::from(start_time.minutes_of_day()) + elapsed + u64::from(entry.duration);
        let step = u64::from(entry.duration) + u64::from(entry.break_after);
        elapsed += step;
        clock = clock.wrapping_add(step);
    }

    let schedule = Schedule {
        drafts,
        end_offset_minutes: end_offset,
    };
    if schedule.overflows() {
        tracing::warn!(
            end_offset_minutes = schedule.end_offset_minutes,
            "schedule runs past midnight; start times wrapped within {date}"
        );
    }
    schedule
}
