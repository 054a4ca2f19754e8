//! Error types for the dashboard core

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while loading, configuring or driving the dashboard
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Failed to parse record feed: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid XML: {0}")]
    XmlError(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Record feed contains no records")]
    NoRecords,

    #[error("No target surface given to {0}")]
    MissingTarget(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No dataset stored under '{0}'")]
    UnknownDataset(String),

    #[error("Degenerate date range: {start} is not before {end}")]
    DegenerateRange { start: NaiveDate, end: NaiveDate },

    #[error("No date range has been selected yet")]
    NoRangeSelected,

    #[error("Dashboard data was already loaded")]
    AlreadyLoaded,
}

impl DashboardError {
    /// Whether this error belongs to the load stage (malformed feed)
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            DashboardError::ParseError(_)
                | DashboardError::JsonError(_)
                | DashboardError::XmlError(_)
                | DashboardError::DateParseError(_)
                | DashboardError::NoRecords
        )
    }

    /// Whether the dashboard was driven out of order (load twice, navigate
    /// before load)
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            DashboardError::AlreadyLoaded | DashboardError::NoRangeSelected
        )
    }

    /// Whether this error comes from construction-time configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DashboardError::MissingTarget(_)
                | DashboardError::InvalidConfig(_)
                | DashboardError::UnknownDataset(_)
        )
    }
}
