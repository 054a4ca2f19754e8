//! Per-day aggregation and sleep-cycle derivation
//!
//! The free functions here are pure transforms over records and per-day
//! datasets. [`Aggregator`] wraps the ones with side effects: storing results
//! in the shared data store and announcing the default range on the bus.

use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::context::{DashboardContext, Dataset};
use crate::error::DashboardError;
use crate::events::{Event, DEFAULT_RANGE_SET};
use crate::types::{
    local_hour, DateRange, DayAggregate, DayEntry, HourSpread, RangeUnit, Record,
    SleepDayAggregate, SleepWindow, SLEEP_ANALYSIS, SLEEP_CYCLE_KEY,
};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Hour windows a sleep record must start and end in to count as a night's sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepThresholds {
    /// Accepted bedtime hours, wrapping past midnight (e.g. `[21, 3]`)
    pub min_threshold: [u32; 2],
    /// Accepted wake hours, not wrapping (e.g. `[5, 11]`)
    pub max_threshold: [u32; 2],
}

impl Default for SleepThresholds {
    fn default() -> Self {
        Self {
            min_threshold: [21, 3],
            max_threshold: [5, 11],
        }
    }
}

impl SleepThresholds {
    pub fn bedtime_spread(&self) -> Result<HourSpread, DashboardError> {
        HourSpread::circular(self.min_threshold[0], self.min_threshold[1])
    }

    pub fn wake_spread(&self) -> Result<HourSpread, DashboardError> {
        HourSpread::forward(self.max_threshold[0], self.max_threshold[1])
    }

    /// Start times at or before this hour are drawn on the day after the reference
    pub fn past_midnight_hour(&self) -> u32 {
        self.max_threshold[0]
    }
}

/// Round to `decimals` places, half away from zero.
///
/// The shift is done on the decimal representation so values such as `1.005`
/// round as written rather than as their binary approximation.
pub fn round(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let shifted: f64 = match format!("{}e{}", value, decimals).parse() {
        Ok(v) => v,
        Err(_) => return value,
    };
    let rounded = shifted.round();
    let result: f64 = format!("{}e-{}", rounded, decimals)
        .parse()
        .unwrap_or(value);
    // collapse -0
    if result == 0.0 {
        0.0
    } else {
        result
    }
}

/// Sum record values per calendar day.
///
/// Days appear in the order they are first seen in `records`. Absent values
/// are skipped, so a day holding only absent values sums to 0.
pub fn merge_per_day<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<DayAggregate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut days: Vec<DayAggregate> = Vec::new();

    for record in records {
        let key = record.day_key();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                index.insert(key.clone(), days.len());
                days.push(DayEntry::new(key, 0.0));
                days.len() - 1
            }
        };
        if let Some(value) = record.value {
            days[slot].value += value;
        }
    }

    days
}

/// Keep entries whose day lies in `[start_date, end_date]`, both inclusive.
///
/// The day is reconstructed from each entry key; entries with unreadable keys
/// are dropped.
pub fn filter_data_on_date<T: Clone>(
    start_date: NaiveDate,
    end_date: NaiveDate,
    data: &[DayEntry<T>],
) -> Vec<DayEntry<T>> {
    data.iter()
        .filter(|entry| match entry.date() {
            Ok(day) => day >= start_date && day <= end_date,
            Err(e) => {
                tracing::warn!(key = %entry.key, error = %e, "skipping entry with bad day key");
                false
            }
        })
        .cloned()
        .collect()
}

/// Detect sleep sessions and group them by the day they started.
///
/// A record is kept when its start hour is in `bedtime` and its end hour is in
/// `wake`. Days left without a session are omitted.
pub fn sleep_cycle_per_day<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    bedtime: &HourSpread,
    wake: &HourSpread,
) -> Vec<SleepDayAggregate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut days: Vec<SleepDayAggregate> = Vec::new();

    for record in records {
        let key = record.day_key();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                index.insert(key.clone(), days.len());
                days.push(DayEntry::new(key, Vec::new()));
                days.len() - 1
            }
        };

        let start_hour = local_hour(&record.start_date);
        let end_hour = local_hour(&record.end_date);
        if bedtime.contains(start_hour) && wake.contains(end_hour) {
            days[slot].value.push(SleepWindow {
                start: record.start_date,
                end: record.end_date,
                slept: hours_between(&record.start_date, &record.end_date),
            });
        }
    }

    days.retain(|day| !day.value.is_empty());
    days
}

/// Hours between two timestamps, rounded to two decimals
pub fn hours_between(start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>) -> f64 {
    let millis = (*end - *start).num_milliseconds() as f64;
    round(millis / MILLIS_PER_HOUR, 2)
}

/// Hour and minute of a timestamp, in its own offset
fn hour_minute(timestamp: &DateTime<FixedOffset>) -> NaiveTime {
    let time = timestamp.time();
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

fn on_day(reference: NaiveDate, next_day: bool, time: NaiveTime) -> NaiveDateTime {
    let day = if next_day {
        reference.succ_opt().unwrap_or(reference)
    } else {
        reference
    };
    day.and_time(time)
}

/// Place a bedtime on the clock axis anchored at `reference`.
///
/// Times at or before `past_midnight_hour` land on the following day so an
/// evening-to-morning axis stays increasing.
pub fn project_start(
    timestamp: &DateTime<FixedOffset>,
    reference: NaiveDate,
    past_midnight_hour: u32,
) -> NaiveDateTime {
    let next_day = local_hour(timestamp) <= past_midnight_hour;
    on_day(reference, next_day, hour_minute(timestamp))
}

/// Place a wake time on the clock axis; wake times always land on the following day
pub fn project_end(timestamp: &DateTime<FixedOffset>, reference: NaiveDate) -> NaiveDateTime {
    on_day(reference, true, hour_minute(timestamp))
}

/// Earliest projected bedtime across every sleep window
pub fn min_time(
    data: &[SleepDayAggregate],
    past_midnight_hour: u32,
    reference: NaiveDate,
) -> Option<NaiveDateTime> {
    data.iter()
        .flat_map(|day| day.value.iter())
        .map(|window| project_start(&window.start, reference, past_midnight_hour))
        .min()
}

/// Latest projected wake time across every sleep window
pub fn max_time(data: &[SleepDayAggregate], reference: NaiveDate) -> Option<NaiveDateTime> {
    data.iter()
        .flat_map(|day| day.value.iter())
        .map(|window| project_end(&window.end, reference))
        .max()
}

/// Window of one `unit` ending at `reference`
pub fn default_range(reference: NaiveDate, unit: RangeUnit) -> Result<DateRange, DashboardError> {
    let start = unit
        .subtract_from(reference)
        .ok_or(DashboardError::DegenerateRange {
            start: reference,
            end: reference,
        })?;
    DateRange::new(start, reference, unit)
}

/// Earliest day named by the dataset keys
pub fn min_date<T>(data: &[DayEntry<T>]) -> Option<NaiveDate> {
    data.iter().filter_map(|entry| entry.date().ok()).min()
}

/// Latest day named by the dataset keys
pub fn max_date<T>(data: &[DayEntry<T>]) -> Option<NaiveDate> {
    data.iter().filter_map(|entry| entry.date().ok()).max()
}

pub fn max_value(data: &[DayAggregate]) -> Option<f64> {
    data.iter().map(|entry| entry.value).reduce(f64::max)
}

pub fn mean_value(data: &[DayAggregate]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let sum: f64 = data.iter().map(|entry| entry.value).sum();
    Some(sum / data.len() as f64)
}

/// Distinct metric types in first-seen order
pub fn metric_types(records: &[Record]) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for record in records {
        if !types.iter().any(|t| t == &record.metric) {
            types.push(record.metric.clone());
        }
    }
    types
}

/// Records of a single metric type
pub fn records_of_type<'a>(records: &'a [Record], metric: &str) -> Vec<&'a Record> {
    records.iter().filter(|r| r.metric == metric).collect()
}

/// Aggregation with store and bus side effects
pub struct Aggregator {
    ctx: Rc<DashboardContext>,
}

impl Aggregator {
    pub fn new(ctx: Rc<DashboardContext>) -> Self {
        Self { ctx }
    }

    /// Sum `metric` records per day and store the result under `metric`
    pub fn merge_data_per_day(&self, records: &[Record], metric: &str) -> Vec<DayAggregate> {
        let days = merge_per_day(records_of_type(records, metric));
        tracing::debug!(metric, days = days.len(), "merged records per day");
        self.ctx.save(metric, Dataset::Daily(days.clone()));
        days
    }

    /// Detect sleep sessions in the sleep records and store them under `sleepCycle`
    pub fn create_sleep_cycle_per_day(
        &self,
        records: &[Record],
        thresholds: &SleepThresholds,
    ) -> Result<Vec<SleepDayAggregate>, DashboardError> {
        let bedtime = thresholds.bedtime_spread()?;
        let wake = thresholds.wake_spread()?;
        let selected = records_of_type(records, SLEEP_ANALYSIS);
        let count = selected.len();
        let days = sleep_cycle_per_day(selected, &bedtime, &wake);
        tracing::debug!(
            records = count,
            days = days.len(),
            "derived sleep cycles"
        );
        self.ctx.save(SLEEP_CYCLE_KEY, Dataset::Sleep(days.clone()));
        Ok(days)
    }

    /// Compute the default window and announce it on the bus
    pub fn default_range(
        &self,
        reference: NaiveDate,
        unit: RangeUnit,
    ) -> Result<DateRange, DashboardError> {
        let range = default_range(reference, unit)?;
        tracing::info!(
            start = %range.start_date,
            end = %range.end_date,
            unit = %unit,
            "default range computed"
        );
        self.ctx
            .emit(DEFAULT_RANGE_SET, Event::DefaultRangeSet(range))?;
        Ok(range)
    }
}
