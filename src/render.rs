//! Renderer boundary
//!
//! Coordinators never draw. They derive per-entry pixel geometry from their
//! scales and hand it to a [`Renderer`]. [`FrameRecorder`] is the reference
//! renderer: it records every call as a serializable [`RenderCommand`], which
//! is what the CLI prints and what the tests inspect.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// One stop of a vertical gradient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f64,
    pub color: String,
}

/// Vertical gradient fill, in user space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    pub id: String,
    pub y1: f64,
    pub y2: f64,
    pub stops: Vec<GradientStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Pixel position along the axis
    pub position: f64,
    pub label: String,
}

/// Both axes of a chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxesFrame {
    pub x_ticks: Vec<Tick>,
    pub y_ticks: Vec<Tick>,
    pub y_label: String,
    /// Offset of the x axis from the top of the plot area
    pub x_axis_offset: f64,
}

/// Rectangle for one bar. A day key may own several bars (sleep sessions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarGeometry {
    pub key: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Corner radius; 0 for square bars
    pub radius: f64,
    /// Gradient id used as fill, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

/// Horizontal dashed mean line with its text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanLine {
    pub name: String,
    pub x1: f64,
    pub x2: f64,
    pub y: f64,
    pub label: String,
}

/// Active bar plus its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub key: String,
    pub x: f64,
    pub y: f64,
    pub label: String,
}

/// Drawing surface for chart output.
///
/// `chart` is the target identifier of the calling chart. Implementations
/// replace whatever they previously drew for that chart and element kind.
pub trait Renderer {
    fn define_gradient(&mut self, chart: &str, gradient: &Gradient);
    fn draw_axes(&mut self, chart: &str, axes: &AxesFrame);
    fn draw_bars(&mut self, chart: &str, bars: &[BarGeometry]);
    /// An empty slice removes the chart's mean lines
    fn draw_mean_lines(&mut self, chart: &str, lines: &[MeanLine]);
    fn highlight(&mut self, chart: &str, highlight: &Highlight);
    fn clear_highlights(&mut self, chart: &str);
}

/// Renderer shared by every chart of a dashboard
pub type SharedRenderer = Rc<RefCell<dyn Renderer>>;

/// A recorded renderer call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderCommand {
    DefineGradient { chart: String, gradient: Gradient },
    DrawAxes { chart: String, axes: AxesFrame },
    DrawBars { chart: String, bars: Vec<BarGeometry> },
    DrawMeanLines { chart: String, lines: Vec<MeanLine> },
    Highlight { chart: String, highlight: Highlight },
    ClearHighlights { chart: String },
}

impl RenderCommand {
    pub fn chart(&self) -> &str {
        match self {
            RenderCommand::DefineGradient { chart, .. }
            | RenderCommand::DrawAxes { chart, .. }
            | RenderCommand::DrawBars { chart, .. }
            | RenderCommand::DrawMeanLines { chart, .. }
            | RenderCommand::Highlight { chart, .. }
            | RenderCommand::ClearHighlights { chart } => chart,
        }
    }

    /// Operation name as serialized
    pub fn op(&self) -> &'static str {
        match self {
            RenderCommand::DefineGradient { .. } => "define_gradient",
            RenderCommand::DrawAxes { .. } => "draw_axes",
            RenderCommand::DrawBars { .. } => "draw_bars",
            RenderCommand::DrawMeanLines { .. } => "draw_mean_lines",
            RenderCommand::Highlight { .. } => "highlight",
            RenderCommand::ClearHighlights { .. } => "clear_highlights",
        }
    }
}

/// Renderer that records calls in order
#[derive(Debug, Default, Clone)]
pub struct FrameRecorder {
    commands: Vec<RenderCommand>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Drain everything recorded so far
    pub fn take(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn for_chart(&self, chart: &str) -> impl DoubleEndedIterator<Item = &RenderCommand> + '_ {
        let chart = chart.to_string();
        self.commands.iter().filter(move |c| c.chart() == chart)
    }

    /// Operation names for one chart, in call order
    pub fn ops(&self, chart: &str) -> Vec<&'static str> {
        self.for_chart(chart).map(RenderCommand::op).collect()
    }

    /// Bars of the most recent `draw_bars` call for a chart
    pub fn last_bars(&self, chart: &str) -> Option<&[BarGeometry]> {
        self.for_chart(chart).rev().find_map(|c| match c {
            RenderCommand::DrawBars { bars, .. } => Some(bars.as_slice()),
            _ => None,
        })
    }

    /// Lines of the most recent `draw_mean_lines` call for a chart
    pub fn last_mean_lines(&self, chart: &str) -> Option<&[MeanLine]> {
        self.for_chart(chart).rev().find_map(|c| match c {
            RenderCommand::DrawMeanLines { lines, .. } => Some(lines.as_slice()),
            _ => None,
        })
    }

    /// Highlights drawn for a chart since its last clear
    pub fn active_highlights(&self, chart: &str) -> Vec<&Highlight> {
        let mut active = Vec::new();
        for command in self.for_chart(chart) {
            match command {
                RenderCommand::Highlight { highlight, .. } => active.push(highlight),
                RenderCommand::ClearHighlights { .. } => active.clear(),
                _ => {}
            }
        }
        active
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.commands)
    }
}

impl Renderer for FrameRecorder {
    fn define_gradient(&mut self, chart: &str, gradient: &Gradient) {
        self.commands.push(RenderCommand::DefineGradient {
            chart: chart.to_string(),
            gradient: gradient.clone(),
        });
    }

    fn draw_axes(&mut self, chart: &str, axes: &AxesFrame) {
        self.commands.push(RenderCommand::DrawAxes {
            chart: chart.to_string(),
            axes: axes.clone(),
        });
    }

    fn draw_bars(&mut self, chart: &str, bars: &[BarGeometry]) {
        self.commands.push(RenderCommand::DrawBars {
            chart: chart.to_string(),
            bars: bars.to_vec(),
        });
    }

    fn draw_mean_lines(&mut self, chart: &str, lines: &[MeanLine]) {
        self.commands.push(RenderCommand::DrawMeanLines {
            chart: chart.to_string(),
            lines: lines.to_vec(),
        });
    }

    fn highlight(&mut self, chart: &str, highlight: &Highlight) {
        self.commands.push(RenderCommand::Highlight {
            chart: chart.to_string(),
            highlight: highlight.clone(),
        });
    }

    fn clear_highlights(&mut self, chart: &str) {
        self.commands.push(RenderCommand::ClearHighlights {
            chart: chart.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn highlight(key: &str) -> Highlight {
        Highlight {
            key: key.to_string(),
            x: 0.0,
            y: 0.0,
            label: String::new(),
        }
    }

    #[test]
    fn test_recorder_tracks_highlights_per_chart() {
        let mut recorder = FrameRecorder::new();
        recorder.highlight("steps", &highlight("01-01-2024"));
        recorder.highlight("flights", &highlight("01-01-2024"));
        recorder.clear_highlights("steps");
        recorder.highlight("steps", &highlight("02-01-2024"));

        let steps: Vec<&str> = recorder
            .active_highlights("steps")
            .iter()
            .map(|h| h.key.as_str())
            .collect();
        assert_eq!(steps, vec!["02-01-2024"]);
        assert_eq!(recorder.active_highlights("flights").len(), 1);
        assert_eq!(
            recorder.ops("steps"),
            vec!["highlight", "clear_highlights", "highlight"]
        );
    }

    #[test]
    fn test_shared_recorder_as_dyn_renderer() {
        let recorder = FrameRecorder::shared();
        let renderer: SharedRenderer = recorder.clone();
        renderer.borrow_mut().draw_bars("steps", &[]);
        assert_eq!(recorder.borrow().last_bars("steps"), Some(&[][..]));
        assert!(recorder.borrow().last_bars("sleep").is_none());
    }

    #[test]
    fn test_command_serializes_with_op_tag() {
        let command = RenderCommand::ClearHighlights {
            chart: "steps".to_string(),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["op"], "clear_highlights");
        assert_eq!(json["chart"], "steps");
    }
}
