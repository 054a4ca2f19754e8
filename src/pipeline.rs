//! Dashboard orchestration
//!
//! [`Dashboard`] is the application root. It owns the shared context, wires
//! the range controller and one coordinator per configured chart onto the
//! bus, and runs the load sequence:
//!
//! 1. aggregate each bar metric per day and derive sleep cycles
//! 2. compute and announce the default range (the controller adopts it)
//! 3. announce that data is mapped (every chart filters and renders)
//!
//! After loading, unit selection, navigation and hover are forwarded onto
//! the bus; the charts react on their own.

use std::rc::Rc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::aggregate::{max_date, Aggregator};
use crate::charts::build_chart;
use crate::config::DashboardConfig;
use crate::context::DashboardContext;
use crate::coordinator::Chart;
use crate::error::DashboardError;
use crate::events::{Event, HoverPoint, BAR_HOVER, BAR_UNHOVER, DATA_MAPPED};
use crate::range::RangeController;
use crate::render::SharedRenderer;
use crate::schema::RecordAdapter;
use crate::types::{
    DateRange, DayAggregate, Direction, RangeUnit, Record, SleepDayAggregate, SLEEP_CYCLE_KEY,
};

/// Wired dashboard: context, range control and charts
pub struct Dashboard {
    config: DashboardConfig,
    ctx: Rc<DashboardContext>,
    aggregator: Aggregator,
    range: Rc<RangeController>,
    charts: Vec<Rc<dyn Chart>>,
    loaded: bool,
}

impl Dashboard {
    /// Validate `config` and subscribe every component. Charts draw onto
    /// `renderer`.
    pub fn new(config: DashboardConfig, renderer: SharedRenderer) -> Result<Self, DashboardError> {
        config.validate()?;

        let ctx = Rc::new(DashboardContext::new());
        let range = RangeController::new(&config.range_target, ctx.clone())?;
        let charts = config
            .charts
            .iter()
            .map(|chart| {
                build_chart(
                    chart,
                    &config.layout,
                    &config.sleep,
                    ctx.clone(),
                    range.clone(),
                    renderer.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(charts = charts.len(), range = %config.range_target, "dashboard wired");
        Ok(Self {
            aggregator: Aggregator::new(ctx.clone()),
            config,
            ctx,
            range,
            charts,
            loaded: false,
        })
    }

    /// Aggregate `records`, select the default range and render every chart.
    ///
    /// Records are loaded once per dashboard. A failed load clears the store
    /// and leaves the dashboard loadable.
    pub fn load(&mut self, records: &[Record]) -> Result<DateRange, DashboardError> {
        if self.loaded {
            return Err(DashboardError::AlreadyLoaded);
        }
        if records.is_empty() {
            return Err(DashboardError::NoRecords);
        }

        match self.map_records(records) {
            Ok(range) => {
                self.loaded = true;
                Ok(range)
            }
            Err(e) => {
                warn!(error = %e, "dashboard load failed, store cleared");
                self.ctx.reset_store();
                Err(e)
            }
        }
    }

    fn map_records(&self, records: &[Record]) -> Result<DateRange, DashboardError> {
        let mut metrics = self.config.bar_metrics();
        let mut latest: Option<NaiveDate> = None;
        for metric in &metrics {
            let days = self.aggregator.merge_data_per_day(records, metric);
            latest = latest.max(max_date(&days));
        }
        if self.config.has_sleep_chart() {
            let cycles = self
                .aggregator
                .create_sleep_cycle_per_day(records, &self.config.sleep)?;
            latest = latest.max(max_date(&cycles));
            metrics.push(SLEEP_CYCLE_KEY.to_string());
        }

        let reference = match self.config.reference_date {
            Some(date) => date,
            None => latest
                .or_else(|| records.iter().map(Record::day).max())
                .ok_or(DashboardError::NoRecords)?,
        };

        let range = self
            .aggregator
            .default_range(reference, self.config.default_unit)?;
        info!(
            records = records.len(),
            datasets = metrics.len(),
            %reference,
            "dashboard data loaded"
        );
        self.ctx.emit(DATA_MAPPED, Event::DataMapped { metrics })?;
        Ok(range)
    }

    /// Parse a record feed (JSON array, NDJSON or Apple Health XML) and load it
    pub fn load_feed(&mut self, input: &str) -> Result<DateRange, DashboardError> {
        let records = RecordAdapter::load(input)?;
        self.load(&records)
    }

    pub fn select_unit(&self, unit: RangeUnit) -> Result<DateRange, DashboardError> {
        self.range.select_unit(unit)
    }

    pub fn navigate(&self, direction: Direction) -> Result<DateRange, DashboardError> {
        self.range.navigate(direction)
    }

    pub fn previous(&self) -> Result<DateRange, DashboardError> {
        self.range.previous()
    }

    pub fn next(&self) -> Result<DateRange, DashboardError> {
        self.range.next()
    }

    /// Hover the bar for day `key` on chart `target`; every chart showing
    /// that day highlights it. Unknown charts are ignored.
    pub fn hover(&self, target: &str, key: &str) -> Result<(), DashboardError> {
        let Some(chart) = self.chart(target) else {
            debug!(chart = target, "hover on unknown chart");
            return Ok(());
        };
        let point = HoverPoint {
            key: key.to_string(),
            source: target.to_string(),
            x: chart.bar_center(key),
        };
        self.ctx.emit(BAR_HOVER, Event::BarHover(point))
    }

    pub fn unhover(&self) -> Result<(), DashboardError> {
        self.ctx.emit(BAR_UNHOVER, Event::BarUnhover)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn context(&self) -> &Rc<DashboardContext> {
        &self.ctx
    }

    pub fn range_controller(&self) -> &Rc<RangeController> {
        &self.range
    }

    /// Currently selected window
    pub fn range(&self) -> Option<DateRange> {
        self.range.range()
    }

    pub fn charts(&self) -> &[Rc<dyn Chart>] {
        &self.charts
    }

    pub fn chart(&self, target: &str) -> Option<&Rc<dyn Chart>> {
        self.charts.iter().find(|chart| chart.target() == target)
    }

    /// Full per-day dataset of a bar metric
    pub fn daily(&self, metric: &str) -> Result<Vec<DayAggregate>, DashboardError> {
        Ok(self.ctx.store().daily(metric)?.to_vec())
    }

    /// Full sleep-cycle dataset
    pub fn sleep_cycles(&self) -> Result<Vec<SleepDayAggregate>, DashboardError> {
        Ok(self.ctx.store().sleep(SLEEP_CYCLE_KEY)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChartConfig;
    use crate::coordinator::ChartState;
    use crate::events::handler;
    use crate::render::FrameRecorder;
    use crate::schema::TIMESTAMP_FORMAT;
    use crate::types::STEP_COUNT;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(metric: &str, value: Option<f64>, start: &str, end: &str) -> Record {
        let parse = |s: &str| DateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap();
        Record {
            metric: metric.to_string(),
            value,
            start_date: parse(start),
            end_date: parse(end),
            creation_date: parse(end),
        }
    }

    fn records() -> Vec<Record> {
        vec![
            record(
                "StepCount",
                Some(100.0),
                "2024-01-01 08:00:00 +0100",
                "2024-01-01 08:05:00 +0100",
            ),
            record(
                "StepCount",
                Some(150.0),
                "2024-01-08 09:00:00 +0100",
                "2024-01-08 09:05:00 +0100",
            ),
            record(
                "StepCount",
                Some(50.0),
                "2024-01-08 18:00:00 +0100",
                "2024-01-08 18:05:00 +0100",
            ),
            record(
                "DistanceWalkingRunning",
                Some(0.8),
                "2024-01-02 08:00:00 +0100",
                "2024-01-02 08:30:00 +0100",
            ),
            record(
                "SleepAnalysis",
                None,
                "2024-01-01 23:10:00 +0100",
                "2024-01-02 06:40:00 +0100",
            ),
            // daytime nap: not a night's sleep
            record(
                "SleepAnalysis",
                None,
                "2024-01-03 14:00:00 +0100",
                "2024-01-03 15:00:00 +0100",
            ),
        ]
    }

    fn dashboard() -> (Dashboard, Rc<RefCell<FrameRecorder>>) {
        let recorder = FrameRecorder::shared();
        let dashboard = Dashboard::new(DashboardConfig::default(), recorder.clone()).unwrap();
        (dashboard, recorder)
    }

    #[test]
    fn test_load_renders_every_chart() {
        let (mut dashboard, recorder) = dashboard();
        let range = dashboard.load(&records()).unwrap();

        assert_eq!(range.start_date, date(2024, 1, 1));
        assert_eq!(range.end_date, date(2024, 1, 8));
        assert_eq!(dashboard.range(), Some(range));
        assert!(dashboard
            .charts()
            .iter()
            .all(|chart| chart.state() == ChartState::Ready));

        let recorder = recorder.borrow();
        assert_eq!(
            recorder.ops("steps"),
            vec!["define_gradient", "draw_axes", "draw_bars", "draw_mean_lines"]
        );
        assert_eq!(
            recorder.ops("sleep"),
            vec!["draw_axes", "draw_bars", "draw_mean_lines"]
        );
        assert_eq!(recorder.last_bars("steps").map(|b| b.len()), Some(2));
        assert_eq!(recorder.last_bars("flights").map(|b| b.len()), Some(0));
        assert_eq!(recorder.last_bars("sleep").map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_load_stores_full_datasets() {
        let (mut dashboard, _) = dashboard();
        dashboard.load(&records()).unwrap();

        let steps = dashboard.daily(STEP_COUNT).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].key, "08-01-2024");
        assert_eq!(steps[1].value, 200.0);

        let sleep = dashboard.sleep_cycles().unwrap();
        assert_eq!(sleep.len(), 1);
        assert_eq!(sleep[0].key, "01-01-2024");
        assert_eq!(sleep[0].value[0].slept, 7.5);
    }

    #[test]
    fn test_load_errors() {
        let (mut dashboard, _) = dashboard();
        assert!(matches!(dashboard.load(&[]), Err(DashboardError::NoRecords)));
        assert!(!dashboard.is_loaded());

        dashboard.load(&records()).unwrap();
        assert!(matches!(
            dashboard.load(&records()),
            Err(DashboardError::AlreadyLoaded)
        ));
    }

    #[test]
    fn test_configured_reference_date() {
        let config = DashboardConfig {
            reference_date: Some(date(2024, 1, 3)),
            default_unit: RangeUnit::Month,
            ..DashboardConfig::default()
        };
        let mut dashboard = Dashboard::new(config, FrameRecorder::shared()).unwrap();
        let range = dashboard.load(&records()).unwrap();
        assert_eq!(range.start_date, date(2023, 12, 3));
        assert_eq!(range.end_date, date(2024, 1, 3));

        let steps = dashboard.chart("steps").unwrap();
        assert_eq!(steps.visible_keys(), vec!["01-01-2024"]);
    }

    #[test]
    fn test_navigation_updates_charts() {
        let (mut dashboard, recorder) = dashboard();
        dashboard.load(&records()).unwrap();
        recorder.borrow_mut().take();

        let next = dashboard.next().unwrap();
        assert_eq!(next.start_date, date(2024, 1, 8));
        assert_eq!(next.end_date, date(2024, 1, 15));
        let steps = dashboard.chart("steps").unwrap();
        assert_eq!(steps.visible_keys(), vec!["08-01-2024"]);
        assert_eq!(steps.state(), ChartState::Ready);
        assert!(dashboard.chart("sleep").unwrap().visible_keys().is_empty());
        assert_eq!(recorder.borrow().last_bars("steps").map(|b| b.len()), Some(1));

        dashboard.previous().unwrap();
        let month = dashboard.select_unit(RangeUnit::Month).unwrap();
        assert_eq!(month.start_date, date(2023, 12, 8));
        assert_eq!(dashboard.range_controller().active_unit(), Some(RangeUnit::Month));
        assert_eq!(steps.visible_keys(), vec!["01-01-2024", "08-01-2024"]);
    }

    #[test]
    fn test_navigation_before_load() {
        let (dashboard, _) = dashboard();
        assert!(matches!(
            dashboard.next(),
            Err(DashboardError::NoRangeSelected)
        ));
    }

    #[test]
    fn test_hover_highlights_same_day_everywhere() {
        let (mut dashboard, recorder) = dashboard();
        dashboard.load(&records()).unwrap();

        dashboard.hover("steps", "01-01-2024").unwrap();
        let steps = dashboard.chart("steps").unwrap().highlights();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].label, "-33% (100)");
        assert_eq!(dashboard.chart("sleep").unwrap().highlights().len(), 1);
        assert!(dashboard.chart("distance").unwrap().highlights().is_empty());

        dashboard.unhover().unwrap();
        assert!(dashboard
            .charts()
            .iter()
            .all(|chart| chart.highlights().is_empty()));
        assert!(recorder.borrow().active_highlights("steps").is_empty());

        // unknown chart: nothing happens
        dashboard.hover("nope", "01-01-2024").unwrap();
        assert!(dashboard.chart("steps").unwrap().highlights().is_empty());
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let (mut dashboard, _) = dashboard();
        let failing = handler(|_| Err(DashboardError::UnknownDataset("Foo".to_string())));
        dashboard.context().bus().on(DATA_MAPPED, failing.clone());

        assert!(matches!(
            dashboard.load(&records()),
            Err(DashboardError::UnknownDataset(_))
        ));
        assert!(!dashboard.is_loaded());
        assert!(dashboard.context().store().keys().is_empty());

        dashboard.context().bus().off(DATA_MAPPED, &failing);
        dashboard.load(&records()).unwrap();
        assert!(dashboard.is_loaded());
        assert_eq!(dashboard.daily(STEP_COUNT).unwrap().len(), 2);
        assert!(dashboard
            .charts()
            .iter()
            .all(|chart| chart.state() == ChartState::Ready));
    }

    #[test]
    fn test_sleep_chart_on_bar_metric_is_rejected() {
        let config = DashboardConfig {
            charts: vec![ChartConfig {
                metric: "Foo".to_string(),
                ..ChartConfig::sleep("sleep", "Sleep")
            }],
            ..DashboardConfig::default()
        };
        let err = Dashboard::new(config, FrameRecorder::shared())
            .map(|_| ())
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = DashboardConfig {
            charts: vec![
                ChartConfig::bar("steps", STEP_COUNT, "Steps"),
                ChartConfig::bar("steps", STEP_COUNT, "Steps again"),
            ],
            ..DashboardConfig::default()
        };
        let err = Dashboard::new(config, FrameRecorder::shared())
            .map(|_| ())
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_load_feed() {
        let feed = r#"[
            {"type":"HKQuantityTypeIdentifierStepCount","value":"42",
             "startDate":"2024-02-10 10:00:00 +0000","endDate":"2024-02-10 10:10:00 +0000",
             "creationDate":"2024-02-10 10:11:00 +0000"}
        ]"#;
        let (mut dashboard, _) = dashboard();
        let range = dashboard.load_feed(feed).unwrap();
        assert_eq!(range.end_date, date(2024, 2, 10));
        assert_eq!(dashboard.daily(STEP_COUNT).unwrap()[0].value, 42.0);
    }
}
