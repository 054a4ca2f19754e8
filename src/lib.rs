//! Vitals Dash - event-driven core of a personal health-metrics dashboard
//!
//! Raw health records (steps, distance, flights climbed, sleep analysis) are
//! aggregated per calendar day, a date window is selected, and a set of
//! charts is kept in step with that window over a publish/subscribe bus:
//! record feed → per-day aggregation → default range → chart render chains.
//!
//! ## Modules
//!
//! - **Data**: `schema` (record feeds), `aggregate` (per-day sums, sleep cycles)
//! - **Coordination**: `events`, `context`, `range`, `coordinator`
//! - **Charts**: `charts`, `scale`, `render` (the drawing boundary)
//! - **Wiring**: `config`, `pipeline`

pub mod aggregate;
pub mod charts;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod range;
pub mod render;
pub mod scale;
pub mod schema;
pub mod types;

pub use config::DashboardConfig;
pub use context::DashboardContext;
pub use coordinator::{Chart, ChartState};
pub use error::DashboardError;
pub use pipeline::Dashboard;
pub use range::RangeController;
pub use render::{FrameRecorder, RenderCommand, Renderer, SharedRenderer};
pub use schema::{RawRecord, RecordAdapter};

/// Crate version reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "vitals-dash";
