//! Chart coordination state machine
//!
//! A [`ChartCoordinator`] keeps one chart in step with the bus:
//!
//! ```text
//! Uninitialized --data mapped--> DataLoaded --domain computed--> DomainSet
//!                                                 ^                 |
//!                              range selected /   |                 | render chain
//!                              range navigated    |                 v
//!                                                 +-------------- Ready
//! ```
//!
//! The render chain is a fixed list of [`RenderLink`]s. Each link is triggered
//! by one of the chart's own stage topics, runs its render steps and may emit
//! the stage that triggers the next link. A stage event that is not the next
//! expected one, or that arrives outside `DomainSet`, is ignored.
//!
//! What is drawn is delegated to a [`ChartView`], which owns the scales and
//! turns the filtered dataset into pixel geometry.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::aggregate::filter_data_on_date;
use crate::context::{DashboardContext, OriginalDataStore};
use crate::error::DashboardError;
use crate::events::{
    chart_topic, handler, ChartStage, Event, HoverPoint, BAR_HOVER, BAR_UNHOVER, DATA_MAPPED,
    RANGE_NAVIGATED, RANGE_SELECTED,
};
use crate::range::RangeController;
use crate::render::{AxesFrame, BarGeometry, Gradient, Highlight, MeanLine, Renderer, SharedRenderer};
use crate::types::{DateRange, DayEntry};

/// Lifecycle of a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartState {
    Uninitialized,
    DataLoaded,
    DomainSet,
    Ready,
}

/// A unit of rendering work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStep {
    Gradient,
    Axes,
    Bars,
    MeanLines,
}

/// One stage of a chart's render chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLink {
    pub trigger: ChartStage,
    pub steps: &'static [RenderStep],
    /// Stage announced once the steps have run
    pub completes: Option<ChartStage>,
}

/// Chart-specific scales and geometry
pub trait ChartView: 'static {
    /// Per-day value of the dataset this chart shows
    type Value: Clone + fmt::Debug + 'static;

    const KIND: &'static str;
    const CHAIN: &'static [RenderLink];

    /// Full, unfiltered dataset stored under `key`
    fn dataset(
        store: &OriginalDataStore,
        key: &str,
    ) -> Result<Vec<DayEntry<Self::Value>>, DashboardError>;

    /// Called once with the full dataset when data is first mapped
    fn prepare(&mut self, _full: &[DayEntry<Self::Value>], _range: &DateRange) {}

    /// Recompute scale domains for the visible data
    fn set_domain(&mut self, data: &[DayEntry<Self::Value>], range: &DateRange);

    fn gradient(&self) -> Option<Gradient> {
        None
    }

    fn axes(&self) -> AxesFrame;

    fn bars(&self, data: &[DayEntry<Self::Value>]) -> Vec<BarGeometry>;

    fn mean_lines(&self, data: &[DayEntry<Self::Value>]) -> Vec<MeanLine>;

    /// Horizontal centre of the bar drawn for `entry`
    fn bar_center(&self, entry: &DayEntry<Self::Value>) -> Option<f64>;

    /// Highlight and label for a hovered entry
    fn highlight(
        &self,
        entry: &DayEntry<Self::Value>,
        data: &[DayEntry<Self::Value>],
    ) -> Option<Highlight>;
}

/// Object-safe view of a running chart, used by the dashboard root
pub trait Chart {
    fn kind(&self) -> &'static str;
    fn target(&self) -> &str;
    fn metric(&self) -> &str;
    fn state(&self) -> ChartState;
    /// Window the visible data was filtered to
    fn window(&self) -> Option<DateRange>;
    /// Day keys of the visible data, in dataset order
    fn visible_keys(&self) -> Vec<String>;
    fn highlights(&self) -> Vec<Highlight>;
    fn bar_center(&self, key: &str) -> Option<f64>;
}

struct ChartInner<V: ChartView> {
    state: ChartState,
    view: V,
    data: Vec<DayEntry<V::Value>>,
    window: Option<DateRange>,
    next_link: usize,
    highlights: Vec<Highlight>,
}

impl<V: ChartView> ChartInner<V> {
    fn find(&self, key: &str) -> Option<&DayEntry<V::Value>> {
        self.data.iter().find(|entry| entry.key == key)
    }

    fn run_step(&self, step: RenderStep, target: &str, renderer: &mut dyn Renderer) {
        match step {
            RenderStep::Gradient => {
                if let Some(gradient) = self.view.gradient() {
                    renderer.define_gradient(target, &gradient);
                }
            }
            RenderStep::Axes => renderer.draw_axes(target, &self.view.axes()),
            RenderStep::Bars => renderer.draw_bars(target, &self.view.bars(&self.data)),
            RenderStep::MeanLines => {
                renderer.draw_mean_lines(target, &self.view.mean_lines(&self.data))
            }
        }
    }
}

/// Drives one chart from bus events
pub struct ChartCoordinator<V: ChartView> {
    target: String,
    metric: String,
    ctx: Rc<DashboardContext>,
    range: Rc<RangeController>,
    renderer: SharedRenderer,
    inner: RefCell<ChartInner<V>>,
}

impl<V: ChartView> ChartCoordinator<V> {
    /// Build a chart on surface `target` showing the dataset stored under
    /// `metric`, and subscribe it to the bus.
    pub fn new(
        target: &str,
        metric: &str,
        view: V,
        ctx: Rc<DashboardContext>,
        range: Rc<RangeController>,
        renderer: SharedRenderer,
    ) -> Result<Rc<Self>, DashboardError> {
        if target.trim().is_empty() {
            return Err(DashboardError::MissingTarget(V::KIND.to_string()));
        }

        let chart = Rc::new(Self {
            target: target.to_string(),
            metric: metric.to_string(),
            ctx,
            range,
            renderer,
            inner: RefCell::new(ChartInner {
                state: ChartState::Uninitialized,
                view,
                data: Vec::new(),
                window: None,
                next_link: 0,
                highlights: Vec::new(),
            }),
        });

        Self::subscribe(&chart, DATA_MAPPED, |chart, _| chart.handle_data_mapped());
        Self::subscribe(&chart, RANGE_SELECTED, |chart, _| chart.handle_range_change());
        Self::subscribe(&chart, RANGE_NAVIGATED, |chart, _| chart.handle_range_change());
        Self::subscribe(&chart, BAR_HOVER, |chart, event| {
            if let Event::BarHover(point) = event {
                chart.handle_hover(point);
            }
            Ok(())
        });
        Self::subscribe(&chart, BAR_UNHOVER, |chart, _| {
            chart.handle_unhover();
            Ok(())
        });

        let mut triggers: Vec<ChartStage> = Vec::new();
        for link in V::CHAIN {
            if !triggers.contains(&link.trigger) {
                triggers.push(link.trigger);
            }
        }
        for stage in triggers {
            Self::subscribe(&chart, chart_topic(target, stage), move |chart, event| {
                match event {
                    Event::Stage { stage: announced, .. } if *announced == stage => {
                        chart.advance(stage)
                    }
                    _ => Ok(()),
                }
            });
        }

        tracing::debug!(kind = V::KIND, chart = target, metric, "chart created");
        Ok(chart)
    }

    fn subscribe<F>(chart: &Rc<Self>, topic: impl Into<String>, f: F)
    where
        F: Fn(&Self, &mut Event) -> Result<(), DashboardError> + 'static,
    {
        let weak = Rc::downgrade(chart);
        chart.ctx.bus().on(
            topic,
            handler(move |event| match weak.upgrade() {
                Some(chart) => f(&chart, event),
                None => Ok(()),
            }),
        );
    }

    /// First data arrival: keep the full dataset's derived state, then filter
    fn handle_data_mapped(&self) -> Result<(), DashboardError> {
        if self.state() != ChartState::Uninitialized {
            tracing::debug!(chart = %self.target, "data already mapped, ignoring");
            return Ok(());
        }
        let window = self.range.range().ok_or(DashboardError::NoRangeSelected)?;
        let full = V::dataset(&self.ctx.store(), &self.metric)?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.view.prepare(&full, &window);
            inner.data = filter_data_on_date(window.start_date, window.end_date, &full);
            inner.window = Some(window);
            inner.state = ChartState::DataLoaded;
        }
        tracing::debug!(chart = %self.target, state = ?ChartState::DataLoaded, "chart transition");
        self.set_domain()
    }

    /// Re-filter from the store with the controller's current window
    fn handle_range_change(&self) -> Result<(), DashboardError> {
        if self.state() == ChartState::Uninitialized {
            return Ok(());
        }
        let window = self.range.range().ok_or(DashboardError::NoRangeSelected)?;
        let full = V::dataset(&self.ctx.store(), &self.metric)?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.data = filter_data_on_date(window.start_date, window.end_date, &full);
            inner.window = Some(window);
        }
        self.set_domain()
    }

    fn set_domain(&self) -> Result<(), DashboardError> {
        {
            let mut inner = self.inner.borrow_mut();
            let window = inner.window.ok_or(DashboardError::NoRangeSelected)?;
            let ChartInner { view, data, .. } = &mut *inner;
            view.set_domain(data, &window);
            inner.state = ChartState::DomainSet;
            inner.next_link = 0;
            tracing::debug!(
                chart = %self.target,
                entries = inner.data.len(),
                state = ?ChartState::DomainSet,
                "chart transition"
            );
        }
        self.emit_stage(ChartStage::DomainSet)
    }

    fn emit_stage(&self, stage: ChartStage) -> Result<(), DashboardError> {
        self.ctx.emit(
            &chart_topic(&self.target, stage),
            Event::Stage {
                chart: self.target.clone(),
                stage,
            },
        )
    }

    /// Run the next link of the render chain if `stage` triggers it
    fn advance(&self, stage: ChartStage) -> Result<(), DashboardError> {
        let completes = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ChartState::DomainSet {
                tracing::debug!(chart = %self.target, ?stage, state = ?inner.state, "stage ignored");
                return Ok(());
            }
            let Some(link) = V::CHAIN.get(inner.next_link) else {
                return Ok(());
            };
            if link.trigger != stage {
                tracing::debug!(chart = %self.target, ?stage, expected = ?link.trigger, "stage out of order");
                return Ok(());
            }

            {
                let mut renderer = self.renderer.borrow_mut();
                for step in link.steps {
                    inner.run_step(*step, &self.target, &mut *renderer);
                }
            }

            inner.next_link += 1;
            if inner.next_link == V::CHAIN.len() {
                inner.state = ChartState::Ready;
                tracing::debug!(chart = %self.target, state = ?ChartState::Ready, "chart transition");
            }
            link.completes
        };

        match completes {
            Some(next) => self.emit_stage(next),
            None => Ok(()),
        }
    }

    fn handle_hover(&self, point: &HoverPoint) {
        let mut inner = self.inner.borrow_mut();
        let Some(entry) = inner.find(&point.key) else {
            tracing::debug!(chart = %self.target, key = %point.key, "no bar for hovered day");
            return;
        };
        let Some(highlight) = inner.view.highlight(entry, &inner.data) else {
            return;
        };
        self.renderer.borrow_mut().highlight(&self.target, &highlight);
        inner.highlights.push(highlight);
    }

    fn handle_unhover(&self) {
        self.inner.borrow_mut().highlights.clear();
        self.renderer.borrow_mut().clear_highlights(&self.target);
    }

    /// Run a closure against the view, e.g. to read chart statistics
    pub fn with_view<R>(&self, f: impl FnOnce(&V, &[DayEntry<V::Value>]) -> R) -> R {
        let inner = self.inner.borrow();
        f(&inner.view, &inner.data)
    }

    /// Visible (filtered) entries
    pub fn data(&self) -> Vec<DayEntry<V::Value>> {
        self.inner.borrow().data.clone()
    }
}

impl<V: ChartView> Chart for ChartCoordinator<V> {
    fn kind(&self) -> &'static str {
        V::KIND
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn metric(&self) -> &str {
        &self.metric
    }

    fn state(&self) -> ChartState {
        self.inner.borrow().state
    }

    fn window(&self) -> Option<DateRange> {
        self.inner.borrow().window
    }

    fn visible_keys(&self) -> Vec<String> {
        self.inner
            .borrow()
            .data
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    fn highlights(&self) -> Vec<Highlight> {
        self.inner.borrow().highlights.clone()
    }

    fn bar_center(&self, key: &str) -> Option<f64> {
        let inner = self.inner.borrow();
        inner.find(key).and_then(|entry| inner.view.bar_center(entry))
    }
}

impl<V: ChartView> fmt::Debug for ChartCoordinator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChartCoordinator")
            .field("kind", &V::KIND)
            .field("target", &self.target)
            .field("metric", &self.metric)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Dataset;
    use crate::events::DEFAULT_RANGE_SET;
    use crate::render::FrameRecorder;
    use crate::types::RangeUnit;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    /// Minimal view: one bar per day at x = day of month
    struct ProbeView {
        domains_set: usize,
    }

    const PROBE_CHAIN: &[RenderLink] = &[
        RenderLink {
            trigger: ChartStage::DomainSet,
            steps: &[RenderStep::Axes],
            completes: Some(ChartStage::AxisDrawn),
        },
        RenderLink {
            trigger: ChartStage::AxisDrawn,
            steps: &[RenderStep::Bars, RenderStep::MeanLines],
            completes: Some(ChartStage::BarsDrawn),
        },
    ];

    impl ChartView for ProbeView {
        type Value = f64;
        const KIND: &'static str = "ProbeChart";
        const CHAIN: &'static [RenderLink] = PROBE_CHAIN;

        fn dataset(
            store: &OriginalDataStore,
            key: &str,
        ) -> Result<Vec<DayEntry<f64>>, DashboardError> {
            Ok(store.daily(key)?.to_vec())
        }

        fn set_domain(&mut self, _data: &[DayEntry<f64>], _range: &DateRange) {
            self.domains_set += 1;
        }

        fn axes(&self) -> AxesFrame {
            AxesFrame {
                x_ticks: Vec::new(),
                y_ticks: Vec::new(),
                y_label: String::new(),
                x_axis_offset: 0.0,
            }
        }

        fn bars(&self, data: &[DayEntry<f64>]) -> Vec<BarGeometry> {
            data.iter()
                .map(|entry| BarGeometry {
                    key: entry.key.clone(),
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: entry.value,
                    radius: 0.0,
                    fill: None,
                })
                .collect()
        }

        fn mean_lines(&self, _data: &[DayEntry<f64>]) -> Vec<MeanLine> {
            Vec::new()
        }

        fn bar_center(&self, entry: &DayEntry<f64>) -> Option<f64> {
            Some(entry.value)
        }

        fn highlight(&self, entry: &DayEntry<f64>, _data: &[DayEntry<f64>]) -> Option<Highlight> {
            Some(Highlight {
                key: entry.key.clone(),
                x: 0.0,
                y: 0.0,
                label: format!("({})", entry.value),
            })
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        ctx: Rc<DashboardContext>,
        range: Rc<RangeController>,
        recorder: Rc<RefCell<FrameRecorder>>,
        chart: Rc<ChartCoordinator<ProbeView>>,
    }

    fn fixture() -> Fixture {
        let ctx = Rc::new(DashboardContext::new());
        ctx.save(
            "StepCount",
            Dataset::Daily(vec![
                DayEntry::new("31-12-2023", 1.0),
                DayEntry::new("02-01-2024", 2.0),
                DayEntry::new("08-01-2024", 3.0),
                DayEntry::new("12-01-2024", 4.0),
            ]),
        );
        let range = RangeController::new("time-filter", ctx.clone()).unwrap();
        let recorder = FrameRecorder::shared();
        let chart = ChartCoordinator::new(
            "probe",
            "StepCount",
            ProbeView { domains_set: 0 },
            ctx.clone(),
            range.clone(),
            recorder.clone(),
        )
        .unwrap();
        Fixture {
            ctx,
            range,
            recorder,
            chart,
        }
    }

    fn load(f: &Fixture) {
        let window = DateRange::new(date(2024, 1, 1), date(2024, 1, 8), RangeUnit::Week).unwrap();
        f.ctx
            .emit(DEFAULT_RANGE_SET, Event::DefaultRangeSet(window))
            .unwrap();
        f.ctx
            .emit(DATA_MAPPED, Event::DataMapped { metrics: Vec::new() })
            .unwrap();
    }

    #[test]
    fn test_missing_target_fails_fast() {
        let ctx = Rc::new(DashboardContext::new());
        let range = RangeController::new("time-filter", ctx.clone()).unwrap();
        let err = ChartCoordinator::new(
            "",
            "StepCount",
            ProbeView { domains_set: 0 },
            ctx,
            range,
            FrameRecorder::shared(),
        )
        .unwrap_err();
        assert!(matches!(err, DashboardError::MissingTarget(ref kind) if kind == "ProbeChart"));
    }

    #[test]
    fn test_data_mapped_runs_whole_chain() {
        let f = fixture();
        assert_eq!(f.chart.state(), ChartState::Uninitialized);
        load(&f);

        assert_eq!(f.chart.state(), ChartState::Ready);
        assert_eq!(f.chart.visible_keys(), vec!["02-01-2024", "08-01-2024"]);
        assert_eq!(
            f.recorder.borrow().ops("probe"),
            vec!["draw_axes", "draw_bars", "draw_mean_lines"]
        );
    }

    #[test]
    fn test_data_mapped_only_once() {
        let f = fixture();
        load(&f);
        f.ctx
            .emit(DATA_MAPPED, Event::DataMapped { metrics: Vec::new() })
            .unwrap();
        assert_eq!(f.chart.with_view(|view, _| view.domains_set), 1);
        assert_eq!(f.recorder.borrow().ops("probe").len(), 3);
    }

    #[test]
    fn test_out_of_order_stage_is_ignored() {
        let f = fixture();
        load(&f);
        f.recorder.borrow_mut().take();

        // Ready: a stray axis/drawn must not redraw bars
        f.ctx
            .emit(
                &chart_topic("probe", ChartStage::AxisDrawn),
                Event::Stage {
                    chart: "probe".into(),
                    stage: ChartStage::AxisDrawn,
                },
            )
            .unwrap();
        assert!(f.recorder.borrow().commands().is_empty());
        assert_eq!(f.chart.state(), ChartState::Ready);
    }

    #[test]
    fn test_navigation_refilters_from_store() {
        let f = fixture();
        load(&f);

        f.range.next().unwrap();
        assert_eq!(f.chart.state(), ChartState::Ready);
        assert_eq!(f.chart.visible_keys(), vec!["08-01-2024", "12-01-2024"]);
        assert_eq!(
            f.chart.window().map(|w| w.start_date),
            Some(date(2024, 1, 8))
        );

        f.range.previous().unwrap();
        f.range.previous().unwrap();
        assert_eq!(f.chart.visible_keys(), vec!["31-12-2023"]);
        assert_eq!(f.chart.with_view(|view, _| view.domains_set), 4);
    }

    #[test]
    fn test_range_events_before_data_are_ignored() {
        let f = fixture();
        let window = DateRange::new(date(2024, 1, 1), date(2024, 1, 8), RangeUnit::Week).unwrap();
        f.range.adopt(window).unwrap();
        f.range.next().unwrap();
        assert_eq!(f.chart.state(), ChartState::Uninitialized);
        assert!(f.recorder.borrow().commands().is_empty());
    }

    #[test]
    fn test_hover_and_unhover() {
        let f = fixture();
        load(&f);

        let hover = |key: &str| {
            f.ctx
                .emit(
                    BAR_HOVER,
                    Event::BarHover(HoverPoint {
                        key: key.to_string(),
                        source: "other".to_string(),
                        x: None,
                    }),
                )
                .unwrap()
        };

        // not visible: no-op
        hover("12-01-2024");
        assert!(f.chart.highlights().is_empty());

        hover("08-01-2024");
        let highlights = f.chart.highlights();
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].label, "(3)");
        assert_eq!(f.chart.bar_center("08-01-2024"), Some(3.0));

        f.ctx.emit(BAR_UNHOVER, Event::BarUnhover).unwrap();
        assert!(f.chart.highlights().is_empty());
        assert!(f.recorder.borrow().active_highlights("probe").is_empty());
    }

    #[test]
    fn test_unknown_dataset_aborts_load() {
        let ctx = Rc::new(DashboardContext::new());
        let range = RangeController::new("time-filter", ctx.clone()).unwrap();
        let _chart = ChartCoordinator::new(
            "probe",
            "Missing",
            ProbeView { domains_set: 0 },
            ctx.clone(),
            range.clone(),
            FrameRecorder::shared(),
        )
        .unwrap();
        let window = DateRange::new(date(2024, 1, 1), date(2024, 1, 8), RangeUnit::Week).unwrap();
        range.adopt(window).unwrap();

        let result = ctx.emit(DATA_MAPPED, Event::DataMapped { metrics: Vec::new() });
        assert!(matches!(result, Err(DashboardError::UnknownDataset(_))));
    }

    #[test]
    fn test_dropped_chart_unsubscribes_silently() {
        let f = fixture();
        let Fixture { ctx, chart, .. } = f;
        drop(chart);
        let window = DateRange::new(date(2024, 1, 1), date(2024, 1, 8), RangeUnit::Week).unwrap();
        ctx.emit(DEFAULT_RANGE_SET, Event::DefaultRangeSet(window))
            .unwrap();
        assert!(ctx
            .emit(DATA_MAPPED, Event::DataMapped { metrics: Vec::new() })
            .is_ok());
    }
}
