//! Sleep-cycle chart
//!
//! Each night is a floating bar from bedtime to wake time on a clock axis
//! running evening to morning. Times are projected onto a single reference
//! night (the last day of the window the data was first loaded with), so
//! every night shares the same axis. The axis is computed once from the full
//! dataset and stays put while the window moves.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::aggregate::{max_time, min_time, project_end, project_start, round, SleepThresholds};
use crate::charts::{bar_x, day_ticks, deviation_label};
use crate::config::{ChartConfig, Layout};
use crate::context::OriginalDataStore;
use crate::coordinator::{ChartView, RenderLink, RenderStep};
use crate::error::DashboardError;
use crate::events::ChartStage;
use crate::render::{AxesFrame, BarGeometry, Highlight, MeanLine, Tick};
use crate::scale::{midnight, TimeScale};
use crate::types::{DateRange, SleepDayAggregate, SleepWindow};

/// Axes, then bars, then the bedtime and wake mean lines, each stage
/// announced on the chart's own topic.
const SLEEP_CHAIN: &[RenderLink] = &[
    RenderLink {
        trigger: ChartStage::DomainSet,
        steps: &[RenderStep::Axes],
        completes: Some(ChartStage::AxisDrawn),
    },
    RenderLink {
        trigger: ChartStage::AxisDrawn,
        steps: &[RenderStep::Bars],
        completes: Some(ChartStage::BarsDrawn),
    },
    RenderLink {
        trigger: ChartStage::BarsDrawn,
        steps: &[RenderStep::MeanLines],
        completes: None,
    },
];

const CLOCK_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone)]
pub struct SleepView {
    layout: Layout,
    thresholds: SleepThresholds,
    y_label: String,
    start: NaiveDate,
    end: NaiveDate,
    /// Night every sleep window is projected onto
    reference: NaiveDate,
    /// Earliest bedtime and latest wake time on the reference night
    clock: (NaiveDateTime, NaiveDateTime),
    x: TimeScale,
    y: TimeScale,
}

impl SleepView {
    pub fn new(config: &ChartConfig, layout: Layout, thresholds: SleepThresholds) -> Self {
        let clock = (midnight(NaiveDate::MIN), midnight(NaiveDate::MIN));
        Self {
            layout,
            thresholds,
            y_label: config.y_label.clone(),
            start: NaiveDate::MIN,
            end: NaiveDate::MIN,
            reference: NaiveDate::MIN,
            clock,
            x: TimeScale::for_days(NaiveDate::MIN, NaiveDate::MIN, layout.time_range()),
            y: TimeScale::new(clock, (0.0, layout.inner_height())),
        }
    }

    /// Clock axis domain, earliest bedtime first
    pub fn clock(&self) -> (NaiveDateTime, NaiveDateTime) {
        self.clock
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    /// Mean hours slept per night over `data`
    pub fn mean_slept(data: &[SleepDayAggregate]) -> Option<f64> {
        if data.is_empty() {
            return None;
        }
        let total: f64 = data
            .iter()
            .map(|day| day.value.iter().map(|w| w.slept).sum::<f64>())
            .sum();
        Some(total / data.len() as f64)
    }

    /// Mean bedtime (first session of each night) on the reference night
    pub fn mean_bedtime(&self, data: &[SleepDayAggregate]) -> Option<NaiveDateTime> {
        let times = data
            .iter()
            .filter_map(|day| day.value.first())
            .map(|w| self.project_start(w));
        mean_time(times, midnight(self.reference))
    }

    /// Mean wake time (last session of each night) on the reference night
    pub fn mean_wake(&self, data: &[SleepDayAggregate]) -> Option<NaiveDateTime> {
        let times = data
            .iter()
            .filter_map(|day| day.value.last())
            .map(|w| project_end(&w.end, self.reference));
        mean_time(times, midnight(self.reference))
    }

    fn project_start(&self, window: &SleepWindow) -> NaiveDateTime {
        project_start(
            &window.start,
            self.reference,
            self.thresholds.past_midnight_hour(),
        )
    }

    fn window_bar(&self, key: &str, day: NaiveDate, window: &SleepWindow) -> BarGeometry {
        let top = self.y.to_px(self.project_start(window));
        let bottom = self.y.to_px(project_end(&window.end, self.reference));
        BarGeometry {
            key: key.to_string(),
            x: bar_x(&self.x, day, &self.layout),
            y: top,
            width: self.layout.bar_width,
            height: bottom - top,
            radius: self.layout.bar_width / 2.0,
            fill: None,
        }
    }

    /// Axis when there is no sleep data: threshold bedtime to threshold wake hour
    fn fallback_clock(&self) -> (NaiveDateTime, NaiveDateTime) {
        let at = |day: NaiveDate, hour: u32| {
            day.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
        };
        let next = self.reference.succ_opt().unwrap_or(self.reference);
        (
            at(self.reference, self.thresholds.min_threshold[0]),
            at(next, self.thresholds.max_threshold[1]),
        )
    }
}

fn floor_hour(t: NaiveDateTime) -> NaiveDateTime {
    t.date()
        .and_time(NaiveTime::from_hms_opt(t.hour(), 0, 0).unwrap_or(NaiveTime::MIN))
}

fn ceil_hour(t: NaiveDateTime) -> NaiveDateTime {
    let floor = floor_hour(t);
    if floor == t {
        t
    } else {
        floor + Duration::hours(1)
    }
}

fn mean_time(
    times: impl Iterator<Item = NaiveDateTime>,
    base: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let offsets: Vec<i64> = times.map(|t| (t - base).num_milliseconds()).collect();
    if offsets.is_empty() {
        return None;
    }
    let mean = offsets.iter().sum::<i64>() as f64 / offsets.len() as f64;
    Some(base + Duration::milliseconds(mean.round() as i64))
}

impl ChartView for SleepView {
    type Value = Vec<SleepWindow>;

    const KIND: &'static str = "SleepCycle";
    const CHAIN: &'static [RenderLink] = SLEEP_CHAIN;

    fn dataset(
        store: &OriginalDataStore,
        key: &str,
    ) -> Result<Vec<SleepDayAggregate>, DashboardError> {
        Ok(store.sleep(key)?.to_vec())
    }

    /// Fix the reference night and the clock axis from the full dataset
    fn prepare(&mut self, full: &[SleepDayAggregate], range: &DateRange) {
        self.reference = range.end_date;
        let past_midnight = self.thresholds.past_midnight_hour();
        self.clock = match (
            min_time(full, past_midnight, self.reference),
            max_time(full, self.reference),
        ) {
            (Some(min), Some(max)) => (floor_hour(min), ceil_hour(max)),
            _ => self.fallback_clock(),
        };
        tracing::debug!(
            reference = %self.reference,
            from = %self.clock.0,
            to = %self.clock.1,
            "sleep clock axis"
        );
    }

    fn set_domain(&mut self, _data: &[SleepDayAggregate], range: &DateRange) {
        self.start = range.start_date;
        self.end = range.end_date;
        self.x = TimeScale::for_days(self.start, self.end, self.layout.time_range());
        self.y = TimeScale::new(self.clock, (0.0, self.layout.inner_height()));
    }

    /// Day ticks as `dd/mm`, clock ticks every two hours
    fn axes(&self) -> AxesFrame {
        let mut y_ticks = Vec::new();
        let mut tick = ceil_hour(self.clock.0);
        if tick.hour() % 2 == 1 {
            tick += Duration::hours(1);
        }
        while tick <= self.clock.1 {
            y_ticks.push(Tick {
                position: self.y.to_px(tick),
                label: tick.format(CLOCK_FORMAT).to_string(),
            });
            tick += Duration::hours(2);
        }
        AxesFrame {
            x_ticks: day_ticks(
                &self.x,
                self.start,
                self.end,
                self.layout.margin.left,
                Some("%d/%m"),
            ),
            y_ticks,
            y_label: self.y_label.clone(),
            x_axis_offset: self.layout.inner_height(),
        }
    }

    fn bars(&self, data: &[SleepDayAggregate]) -> Vec<BarGeometry> {
        let mut bars = Vec::new();
        for entry in data {
            let Ok(day) = entry.date() else {
                continue;
            };
            for window in &entry.value {
                bars.push(self.window_bar(&entry.key, day, window));
            }
        }
        bars
    }

    fn mean_lines(&self, data: &[SleepDayAggregate]) -> Vec<MeanLine> {
        let (x1, x2) = self.layout.mean_line_span();
        let mut lines = Vec::new();
        if let Some(bedtime) = self.mean_bedtime(data) {
            lines.push(MeanLine {
                name: "bedtime".to_string(),
                x1,
                x2,
                y: self.y.to_px(bedtime),
                label: bedtime.format(CLOCK_FORMAT).to_string(),
            });
        }
        if let Some(wake) = self.mean_wake(data) {
            lines.push(MeanLine {
                name: "wake".to_string(),
                x1,
                x2,
                y: self.y.to_px(wake),
                label: wake.format(CLOCK_FORMAT).to_string(),
            });
        }
        lines
    }

    fn bar_center(&self, entry: &SleepDayAggregate) -> Option<f64> {
        let day = entry.date().ok()?;
        Some(bar_x(&self.x, day, &self.layout) + self.layout.bar_width / 2.0)
    }

    /// Label is the first session's hours slept against the visible mean
    /// per night, to one decimal: `+6.7% (8)`.
    fn highlight(
        &self,
        entry: &SleepDayAggregate,
        data: &[SleepDayAggregate],
    ) -> Option<Highlight> {
        let first = entry.value.first()?;
        let mean = Self::mean_slept(data)?;
        let percent = if mean == 0.0 {
            None
        } else {
            Some(round((first.slept / mean) * 100.0 - 100.0, 1))
        };
        Some(Highlight {
            key: entry.key.clone(),
            x: self.bar_center(entry)? + self.layout.margin.left,
            y: self.y.to_px(self.project_start(first)) + 10.0,
            label: deviation_label(percent, first.slept),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DayEntry, RangeUnit};
    use chrono::{DateTime, FixedOffset};
    use pretty_assertions::assert_eq;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn night(key: &str, start: &str, end: &str, slept: f64) -> SleepDayAggregate {
        DayEntry::new(
            key,
            vec![SleepWindow {
                start: ts(start),
                end: ts(end),
                slept,
            }],
        )
    }

    fn data() -> Vec<SleepDayAggregate> {
        vec![
            night("01-01-2024", "2024-01-01T23:00:00+00:00", "2024-01-02T07:00:00+00:00", 8.0),
            night("02-01-2024", "2024-01-02T22:00:00+00:00", "2024-01-03T05:00:00+00:00", 7.0),
        ]
    }

    /// 180px plot height: 20px per hour over a 22:00-07:00 axis
    fn view_with(full: &[SleepDayAggregate]) -> SleepView {
        let layout = Layout {
            height: 220.0,
            ..Layout::default()
        };
        let mut view = SleepView::new(
            &ChartConfig::sleep("sleep", "Sleep"),
            layout,
            SleepThresholds::default(),
        );
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 8), RangeUnit::Week).unwrap();
        view.prepare(full, &range);
        view.set_domain(full, &range);
        view
    }

    #[test]
    fn test_clock_axis_from_full_dataset() {
        let view = view_with(&data());
        assert_eq!(view.reference(), date(2024, 1, 8));
        assert_eq!(
            view.clock(),
            (
                date(2024, 1, 8).and_hms_opt(22, 0, 0).unwrap(),
                date(2024, 1, 9).and_hms_opt(7, 0, 0).unwrap(),
            )
        );
    }

    #[test]
    fn test_clock_axis_rounds_out_to_hours() {
        let full = vec![night(
            "01-01-2024",
            "2024-01-01T22:40:00+00:00",
            "2024-01-02T06:10:00+00:00",
            7.5,
        )];
        let view = view_with(&full);
        assert_eq!(
            view.clock(),
            (
                date(2024, 1, 8).and_hms_opt(22, 0, 0).unwrap(),
                date(2024, 1, 9).and_hms_opt(7, 0, 0).unwrap(),
            )
        );
    }

    #[test]
    fn test_floating_bars() {
        let data = data();
        let view = view_with(&data);
        let bars = view.bars(&data);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].key, "01-01-2024");
        assert_eq!(bars[0].x, 26.5);
        assert_eq!(bars[0].y, 20.0);
        assert_eq!(bars[0].height, 160.0);
        assert_eq!(bars[0].radius, 3.5);
        assert_eq!(bars[1].y, 0.0);
        assert_eq!(bars[1].height, 140.0);
    }

    #[test]
    fn test_mean_lines() {
        let data = data();
        let view = view_with(&data);
        let lines = view.mean_lines(&data);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, "bedtime");
        assert_eq!(lines[0].label, "22:30");
        assert_eq!(lines[0].y, 10.0);
        assert_eq!(lines[1].name, "wake");
        assert_eq!(lines[1].label, "06:00");
        assert_eq!(lines[1].y, 160.0);

        assert!(view.mean_lines(&[]).is_empty());
    }

    #[test]
    fn test_hover_label_against_mean_slept() {
        let data = data();
        let view = view_with(&data);
        assert_eq!(SleepView::mean_slept(&data), Some(7.5));

        let long = view.highlight(&data[0], &data).unwrap();
        assert_eq!(long.label, "+6.7% (8)");
        assert_eq!(long.x, 50.0);
        assert_eq!(long.y, 30.0);

        let short = view.highlight(&data[1], &data).unwrap();
        assert_eq!(short.label, "-6.7% (7)");
    }

    #[test]
    fn test_clock_ticks_every_two_hours() {
        let view = view_with(&data());
        let axes = view.axes();
        let labels: Vec<&str> = axes.y_ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["22:00", "00:00", "02:00", "04:00", "06:00"]);
        let positions: Vec<f64> = axes.y_ticks.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0.0, 40.0, 80.0, 120.0, 160.0]);
        assert_eq!(axes.x_ticks[0].label, "01/01");
        assert_eq!(axes.x_ticks.len(), 8);
    }

    #[test]
    fn test_empty_dataset_uses_threshold_axis() {
        let view = view_with(&[]);
        assert_eq!(
            view.clock(),
            (
                date(2024, 1, 8).and_hms_opt(21, 0, 0).unwrap(),
                date(2024, 1, 9).and_hms_opt(11, 0, 0).unwrap(),
            )
        );
        assert!(view.bars(&[]).is_empty());
        assert!(view.mean_lines(&[]).is_empty());
        assert_eq!(SleepView::mean_slept(&[]), None);
    }
}
