//! Chart views
//!
//! - `bar`: one gradient-filled bar per day with a mean line
//! - `sleep`: floating bars from bedtime to wake time on a clock axis

pub mod bar;
pub mod sleep;

use std::rc::Rc;

use chrono::NaiveDate;

use crate::aggregate::SleepThresholds;
use crate::config::{ChartConfig, ChartKind, Layout};
use crate::context::DashboardContext;
use crate::coordinator::{Chart, ChartCoordinator};
use crate::error::DashboardError;
use crate::range::RangeController;
use crate::render::{SharedRenderer, Tick};
use crate::scale::TimeScale;

pub use bar::BarView;
pub use sleep::SleepView;

/// Build and subscribe the chart described by `config`
pub fn build_chart(
    config: &ChartConfig,
    layout: &Layout,
    thresholds: &SleepThresholds,
    ctx: Rc<DashboardContext>,
    range: Rc<RangeController>,
    renderer: SharedRenderer,
) -> Result<Rc<dyn Chart>, DashboardError> {
    let chart = match config.kind {
        ChartKind::Bar => ChartCoordinator::new(
            &config.target,
            &config.metric,
            BarView::new(config, *layout),
            ctx,
            range,
            renderer,
        )? as Rc<dyn Chart>,
        ChartKind::Sleep => ChartCoordinator::new(
            &config.target,
            &config.metric,
            SleepView::new(config, *layout, *thresholds),
            ctx,
            range,
            renderer,
        )? as Rc<dyn Chart>,
    };
    Ok(chart)
}

/// One tick per calendar day of `[start, end]`, offset by the left margin
pub(crate) fn day_ticks(
    x: &TimeScale,
    start: NaiveDate,
    end: NaiveDate,
    offset: f64,
    format: Option<&str>,
) -> Vec<Tick> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| Tick {
            position: x.date_to_px(day) + offset,
            label: format
                .map(|f| day.format(f).to_string())
                .unwrap_or_default(),
        })
        .collect()
}

/// Left edge of the bar for `day`
pub(crate) fn bar_x(x: &TimeScale, day: NaiveDate, layout: &Layout) -> f64 {
    x.date_to_px(day) + layout.margin.left - layout.bar_width / 2.0
}

/// Signed percent label, e.g. `+12% (1120)` or `-3.5% (7.2)`
pub(crate) fn deviation_label(percent: Option<f64>, value: f64) -> String {
    match percent {
        Some(p) if p < 0.0 => format!("{}% ({})", p, value),
        Some(p) => format!("+{}% ({})", p, value),
        None => format!("({})", value),
    }
}
