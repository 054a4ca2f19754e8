//! Dashboard configuration
//!
//! Everything a dashboard needs before data arrives: the surfaces to draw on,
//! the chart layout, which metric each chart shows, the default range unit and
//! the sleep detection thresholds. Defaults reproduce the stock dashboard of
//! three activity bar charts plus a sleep chart.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::SleepThresholds;
use crate::error::DashboardError;
use crate::types::{
    RangeUnit, DISTANCE_WALKING_RUNNING, FLIGHTS_CLIMBED, SLEEP_CYCLE_KEY, STEP_COUNT,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            top: 20.0,
            right: 60.0,
            bottom: 20.0,
            left: 20.0,
        }
    }
}

/// Pixel layout shared by every chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Surface width
    pub width: f64,
    /// Surface height
    pub height: f64,
    pub margin: Margin,
    pub bar_width: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 200.0,
            margin: Margin::default(),
            bar_width: 7.0,
        }
    }
}

impl Layout {
    /// Plot width inside the margins
    pub fn inner_width(&self) -> f64 {
        self.width - self.margin.left - self.margin.right
    }

    /// Plot height inside the margins
    pub fn inner_height(&self) -> f64 {
        self.height - self.margin.top - self.margin.bottom
    }

    /// Pixel range of the time axis
    pub fn time_range(&self) -> (f64, f64) {
        (10.0, self.inner_width() - self.margin.right)
    }

    /// Horizontal extent of mean lines
    pub fn mean_line_span(&self) -> (f64, f64) {
        (
            self.margin.left,
            self.inner_width() - self.margin.left - 10.0,
        )
    }

    fn validate(&self) -> Result<(), DashboardError> {
        if self.bar_width <= 0.0 {
            return Err(DashboardError::InvalidConfig(
                "bar_width must be positive".to_string(),
            ));
        }
        let (x0, x1) = self.time_range();
        if self.inner_height() <= 0.0 || x1 <= x0 {
            return Err(DashboardError::InvalidConfig(format!(
                "layout {}x{} leaves no room inside the margins",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// One bar per day, height = daily sum
    Bar,
    /// Floating bars from bedtime to wake time
    Sleep,
}

/// One chart on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub kind: ChartKind,
    /// Rendering surface identifier; also prefixes the chart's stage topics
    pub target: String,
    /// Store key of the dataset the chart shows
    pub metric: String,
    #[serde(default)]
    pub y_label: String,
    #[serde(default = "default_y_ticks")]
    pub y_ticks: usize,
    #[serde(default = "default_gradient_start")]
    pub gradient_start_color: String,
    #[serde(default = "default_gradient_stop")]
    pub gradient_stop_color: String,
}

fn default_y_ticks() -> usize {
    5
}

fn default_gradient_start() -> String {
    "#ff0".to_string()
}

fn default_gradient_stop() -> String {
    "#f00".to_string()
}

impl ChartConfig {
    pub fn bar(target: &str, metric: &str, y_label: &str) -> Self {
        Self {
            kind: ChartKind::Bar,
            target: target.to_string(),
            metric: metric.to_string(),
            y_label: y_label.to_string(),
            y_ticks: default_y_ticks(),
            gradient_start_color: default_gradient_start(),
            gradient_stop_color: default_gradient_stop(),
        }
    }

    pub fn sleep(target: &str, y_label: &str) -> Self {
        Self {
            kind: ChartKind::Sleep,
            target: target.to_string(),
            metric: SLEEP_CYCLE_KEY.to_string(),
            y_label: y_label.to_string(),
            y_ticks: 3,
            gradient_start_color: default_gradient_start(),
            gradient_stop_color: default_gradient_stop(),
        }
    }
}

/// Full dashboard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Surface of the time-filter control
    pub range_target: String,
    pub default_unit: RangeUnit,
    /// Window end for the default range; latest data day when absent
    pub reference_date: Option<NaiveDate>,
    pub layout: Layout,
    pub sleep: SleepThresholds,
    pub charts: Vec<ChartConfig>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            range_target: "time-filter".to_string(),
            default_unit: RangeUnit::Week,
            reference_date: None,
            layout: Layout::default(),
            sleep: SleepThresholds::default(),
            charts: vec![
                ChartConfig::bar("steps", STEP_COUNT, "Steps"),
                ChartConfig::bar("distance", DISTANCE_WALKING_RUNNING, "Distance (km)"),
                ChartConfig::bar("flights", FLIGHTS_CLIMBED, "Flights climbed"),
                ChartConfig::sleep("sleep", "Sleep"),
            ],
        }
    }
}

impl DashboardConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, DashboardError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Metrics the bar charts need aggregated, in chart order
    pub fn bar_metrics(&self) -> Vec<String> {
        let mut metrics: Vec<String> = Vec::new();
        for chart in self.charts.iter().filter(|c| c.kind == ChartKind::Bar) {
            if !metrics.contains(&chart.metric) {
                metrics.push(chart.metric.clone());
            }
        }
        metrics
    }

    pub fn has_sleep_chart(&self) -> bool {
        self.charts.iter().any(|c| c.kind == ChartKind::Sleep)
    }

    pub fn validate(&self) -> Result<(), DashboardError> {
        if self.range_target.trim().is_empty() {
            return Err(DashboardError::MissingTarget("RangeController".to_string()));
        }
        self.layout.validate()?;

        let wake = self.sleep.wake_spread()?;
        self.sleep.bedtime_spread()?;
        if wake.is_empty() {
            return Err(DashboardError::InvalidConfig(format!(
                "max_threshold {:?} selects no hours",
                self.sleep.max_threshold
            )));
        }

        let mut targets: HashSet<&str> = HashSet::new();
        for chart in &self.charts {
            let target = chart.target.trim();
            if target.is_empty() {
                return Err(DashboardError::MissingTarget(format!("{:?} chart", chart.kind)));
            }
            if target.contains('/') {
                return Err(DashboardError::InvalidConfig(format!(
                    "chart target '{}' may not contain '/'",
                    target
                )));
            }
            if !targets.insert(target) {
                return Err(DashboardError::InvalidConfig(format!(
                    "duplicate chart target '{}'",
                    target
                )));
            }
            if chart.metric.trim().is_empty() {
                return Err(DashboardError::InvalidConfig(format!(
                    "chart '{}' has no metric",
                    target
                )));
            }
            match chart.kind {
                ChartKind::Sleep if chart.metric != SLEEP_CYCLE_KEY => {
                    return Err(DashboardError::InvalidConfig(format!(
                        "sleep chart '{}' must show '{}', not '{}'",
                        target, SLEEP_CYCLE_KEY, chart.metric
                    )));
                }
                ChartKind::Bar if chart.metric == SLEEP_CYCLE_KEY => {
                    return Err(DashboardError::InvalidConfig(format!(
                        "bar chart '{}' cannot show '{}'",
                        target, SLEEP_CYCLE_KEY
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
