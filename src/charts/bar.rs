//! Daily bar chart

use chrono::NaiveDate;

use crate::aggregate::{max_value, mean_value, round};
use crate::charts::{bar_x, day_ticks, deviation_label};
use crate::config::{ChartConfig, Layout};
use crate::context::OriginalDataStore;
use crate::coordinator::{ChartView, RenderLink, RenderStep};
use crate::error::DashboardError;
use crate::events::ChartStage;
use crate::render::{AxesFrame, BarGeometry, Gradient, GradientStop, Highlight, MeanLine, Tick};
use crate::scale::{LinearScale, TimeScale};
use crate::types::{DateRange, DayAggregate};

/// Gradient, axes, bars and mean line are all drawn on domain set; the
/// chart then announces `bars/drawn` for anyone downstream.
const BAR_CHAIN: &[RenderLink] = &[RenderLink {
    trigger: ChartStage::DomainSet,
    steps: &[
        RenderStep::Gradient,
        RenderStep::Axes,
        RenderStep::Bars,
        RenderStep::MeanLines,
    ],
    completes: Some(ChartStage::BarsDrawn),
}];

/// Scales and styling of a daily bar chart
#[derive(Debug, Clone)]
pub struct BarView {
    layout: Layout,
    gradient_id: String,
    y_label: String,
    y_ticks: usize,
    start_color: String,
    stop_color: String,
    start: NaiveDate,
    end: NaiveDate,
    x: TimeScale,
    y: LinearScale,
}

impl BarView {
    pub fn new(config: &ChartConfig, layout: Layout) -> Self {
        Self {
            layout,
            gradient_id: format!("gradient-{}", config.target.trim_start_matches('#')),
            y_label: config.y_label.clone(),
            y_ticks: config.y_ticks,
            start_color: config.gradient_start_color.clone(),
            stop_color: config.gradient_stop_color.clone(),
            start: NaiveDate::MIN,
            end: NaiveDate::MIN,
            x: TimeScale::for_days(NaiveDate::MIN, NaiveDate::MIN, layout.time_range()),
            y: LinearScale::new((0.0, 0.0), (layout.inner_height(), 0.0)).rounded(),
        }
    }

    pub fn gradient_id(&self) -> &str {
        &self.gradient_id
    }

    pub fn x_scale(&self) -> &TimeScale {
        &self.x
    }

    pub fn y_scale(&self) -> &LinearScale {
        &self.y
    }

    fn bar(&self, entry: &DayAggregate) -> Option<BarGeometry> {
        let day = entry.date().ok()?;
        let y = self.y.to_px(entry.value);
        Some(BarGeometry {
            key: entry.key.clone(),
            x: bar_x(&self.x, day, &self.layout),
            y,
            width: self.layout.bar_width,
            height: self.layout.inner_height() - y,
            radius: 0.0,
            fill: Some(self.gradient_id.clone()),
        })
    }
}

impl ChartView for BarView {
    type Value = f64;

    const KIND: &'static str = "BarChart";
    const CHAIN: &'static [RenderLink] = BAR_CHAIN;

    fn dataset(store: &OriginalDataStore, key: &str) -> Result<Vec<DayAggregate>, DashboardError> {
        Ok(store.daily(key)?.to_vec())
    }

    /// Time domain is the window; value domain is `[0, max]` of the visible data
    fn set_domain(&mut self, data: &[DayAggregate], range: &DateRange) {
        self.start = range.start_date;
        self.end = range.end_date;
        self.x = TimeScale::for_days(self.start, self.end, self.layout.time_range());
        let max = max_value(data).unwrap_or(0.0);
        self.y = LinearScale::new((0.0, max), (self.layout.inner_height(), 0.0)).rounded();
    }

    fn gradient(&self) -> Option<Gradient> {
        Some(Gradient {
            id: self.gradient_id.clone(),
            y1: self.layout.inner_height(),
            y2: 0.0,
            stops: vec![
                GradientStop {
                    offset: 0.0,
                    color: self.start_color.clone(),
                },
                GradientStop {
                    offset: 0.5,
                    color: self.stop_color.clone(),
                },
            ],
        })
    }

    fn axes(&self) -> AxesFrame {
        let y_ticks = self
            .y
            .ticks(self.y_ticks)
            .into_iter()
            .map(|value| Tick {
                position: self.y.to_px(value),
                label: round(value, 2).to_string(),
            })
            .collect();
        AxesFrame {
            x_ticks: day_ticks(&self.x, self.start, self.end, self.layout.margin.left, None),
            y_ticks,
            y_label: self.y_label.clone(),
            x_axis_offset: self.layout.inner_height(),
        }
    }

    fn bars(&self, data: &[DayAggregate]) -> Vec<BarGeometry> {
        data.iter().filter_map(|entry| self.bar(entry)).collect()
    }

    fn mean_lines(&self, data: &[DayAggregate]) -> Vec<MeanLine> {
        let Some(mean) = mean_value(data) else {
            return Vec::new();
        };
        let (x1, x2) = self.layout.mean_line_span();
        vec![MeanLine {
            name: "mean".to_string(),
            x1,
            x2,
            y: self.y.to_px(mean),
            label: round(mean, 2).to_string(),
        }]
    }

    fn bar_center(&self, entry: &DayAggregate) -> Option<f64> {
        let day = entry.date().ok()?;
        Some(bar_x(&self.x, day, &self.layout) + self.layout.bar_width / 2.0)
    }

    /// Label is the deviation from the visible mean, both rounded to cents,
    /// as a whole percent: `+33% (200)`.
    fn highlight(&self, entry: &DayAggregate, data: &[DayAggregate]) -> Option<Highlight> {
        let value = round(entry.value, 2);
        let mean = round(mean_value(data)?, 2);
        let percent = if mean == 0.0 {
            None
        } else {
            Some(round((value / mean) * 100.0 - 100.0, 0))
        };
        Some(Highlight {
            key: entry.key.clone(),
            x: self.bar_center(entry)? + self.layout.margin.left,
            y: self.y.to_px(entry.value) + 10.0,
            label: deviation_label(percent, value),
        })
    }
}
