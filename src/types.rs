//! Core types for the dashboard
//!
//! This module defines the data that flows from the record feed through
//! aggregation into the charts: parsed records, per-day aggregates, sleep
//! windows, and the selected date range.

use chrono::{DateTime, Days, FixedOffset, Months, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DashboardError;

/// Format of calendar-day keys (`DD-MM-YYYY`, zero padded)
pub const DAY_KEY_FORMAT: &str = "%d-%m-%Y";

/// Store key under which detected sleep sessions are saved
pub const SLEEP_CYCLE_KEY: &str = "sleepCycle";

/// Metric types the default dashboard charts
pub const STEP_COUNT: &str = "StepCount";
pub const DISTANCE_WALKING_RUNNING: &str = "DistanceWalkingRunning";
pub const FLIGHTS_CLIMBED: &str = "FlightsClimbed";
pub const SLEEP_ANALYSIS: &str = "SleepAnalysis";

/// A single parsed health record. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Normalized metric type (vendor prefix stripped), e.g. "StepCount"
    #[serde(rename = "type")]
    pub metric: String,
    /// Numeric value; absent for category records such as sleep
    pub value: Option<f64>,
    pub start_date: DateTime<FixedOffset>,
    pub end_date: DateTime<FixedOffset>,
    pub creation_date: DateTime<FixedOffset>,
}

impl Record {
    /// Calendar day of the record start, in the record's own offset
    pub fn day(&self) -> NaiveDate {
        self.start_date.date_naive()
    }

    /// Calendar-day key of the record start
    pub fn day_key(&self) -> String {
        day_key(self.day())
    }
}

/// One calendar day of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayEntry<T> {
    /// Calendar-day key (`DD-MM-YYYY`)
    pub key: String,
    pub value: T,
}

impl<T> DayEntry<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Day this entry belongs to, reconstructed from its key
    pub fn date(&self) -> Result<NaiveDate, DashboardError> {
        date_from_key(&self.key)
    }
}

/// Sum of one metric type for one calendar day
pub type DayAggregate = DayEntry<f64>;

/// Sleep sessions attributed to one calendar day (never empty)
pub type SleepDayAggregate = DayEntry<Vec<SleepWindow>>;

/// One detected sleep session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// Hours slept, rounded to two decimals
    pub slept: f64,
}

/// Granularity by which the selected window moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeUnit {
    Week,
    Month,
}

impl RangeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeUnit::Week => "week",
            RangeUnit::Month => "month",
        }
    }

    /// Subtract one unit, calendar aware (month ends clamp)
    pub fn subtract_from(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            RangeUnit::Week => date.checked_sub_days(Days::new(7)),
            RangeUnit::Month => date.checked_sub_months(Months::new(1)),
        }
    }

    /// Add one unit, calendar aware (month ends clamp)
    pub fn add_to(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            RangeUnit::Week => date.checked_add_days(Days::new(7)),
            RangeUnit::Month => date.checked_add_months(Months::new(1)),
        }
    }

    /// Shift one unit in the given direction
    pub fn shift(&self, date: NaiveDate, direction: Direction) -> Option<NaiveDate> {
        match direction {
            Direction::Previous => self.subtract_from(date),
            Direction::Next => self.add_to(date),
        }
    }
}

impl fmt::Display for RangeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeUnit {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "week" => Ok(RangeUnit::Week),
            "month" => Ok(RangeUnit::Month),
            other => Err(DashboardError::InvalidConfig(format!(
                "unknown range unit '{}'",
                other
            ))),
        }
    }
}

/// Navigation direction for the date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Previous,
    Next,
}

/// Selected date window. `start_date < end_date` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub range_type: RangeUnit,
}

impl DateRange {
    /// Build a range, rejecting zero or negative width
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        range_type: RangeUnit,
    ) -> Result<Self, DashboardError> {
        if start_date >= end_date {
            return Err(DashboardError::DegenerateRange {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
            range_type,
        })
    }

    /// Inclusive on both ends
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Number of calendar days covered, both ends included
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// Set of hours of the day (0-23)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourSpread {
    mask: u32,
}

impl HourSpread {
    /// Hours from `start` forward to `end`, wrapping past midnight.
    ///
    /// `[21, 3]` covers 21, 22, 23, 0, 1, 2 and 3.
    pub fn circular(start: u32, end: u32) -> Result<Self, DashboardError> {
        check_hour(start)?;
        check_hour(end)?;
        let mut mask = 0u32;
        let mut hour = start;
        loop {
            mask |= 1 << hour;
            if hour == end {
                break;
            }
            hour = (hour + 1) % 24;
        }
        Ok(Self { mask })
    }

    /// Hours from `start` up to `end` without wrapping; empty if `start > end`
    pub fn forward(start: u32, end: u32) -> Result<Self, DashboardError> {
        check_hour(start)?;
        check_hour(end)?;
        let mask = (start..=end).fold(0u32, |mask, hour| mask | (1 << hour));
        Ok(Self { mask })
    }

    pub fn contains(&self, hour: u32) -> bool {
        hour < 24 && self.mask & (1 << hour) != 0
    }

    /// Member hours in clock order
    pub fn hours(&self) -> Vec<u32> {
        (0..24).filter(|hour| self.contains(*hour)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }
}

fn check_hour(hour: u32) -> Result<(), DashboardError> {
    if hour >= 24 {
        return Err(DashboardError::InvalidConfig(format!(
            "hour {} is outside the 24h clock",
            hour
        )));
    }
    Ok(())
}

/// Calendar-day key for a date
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

/// Reconstruct the date a calendar-day key names
pub fn date_from_key(key: &str) -> Result<NaiveDate, DashboardError> {
    NaiveDate::parse_from_str(key, DAY_KEY_FORMAT)
        .map_err(|e| DashboardError::DateParseError(format!("invalid day key '{}': {}", key, e)))
}

/// Local hour of a timestamp in its own offset
pub fn local_hour(timestamp: &DateTime<FixedOffset>) -> u32 {
    timestamp.hour()
}
