//! Raw health record shape
//!
//! Records arrive either as JSON objects or as `<Record .../>` elements of an
//! Apple Health `export.xml`, where every field is an attribute:
//!
//! ```xml
//! <Record type="HKQuantityTypeIdentifierStepCount" value="120"
//!         startDate="2024-01-01 08:00:00 +0100" endDate="2024-01-01 08:05:00 +0100"
//!         creationDate="2024-01-01 08:06:00 +0100"/>
//! ```
//!
//! One struct reads both: JSON keys are the attribute names without `@`.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::DashboardError;
use crate::types::Record;

/// Timestamp format of the feed, e.g. `2024-01-01 08:00:00 +0100`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Vendor prefixes stripped from record types
pub const TYPE_PREFIXES: [&str; 2] = ["HKQuantityTypeIdentifier", "HKCategoryTypeIdentifier"];

/// A value as written in the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Numeric value, or `None` for category values such as
    /// `HKCategoryValueSleepAnalysisAsleep`
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) if n.is_finite() => Some(*n),
            RawValue::Number(_) => None,
            RawValue::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

/// One record before parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "type", alias = "@type")]
    pub record_type: String,
    #[serde(default, alias = "@value", skip_serializing_if = "Option::is_none")]
    pub value: Option<RawValue>,
    #[serde(rename = "startDate", alias = "@startDate")]
    pub start_date: String,
    #[serde(rename = "endDate", alias = "@endDate")]
    pub end_date: String,
    #[serde(rename = "creationDate", alias = "@creationDate")]
    pub creation_date: String,
    #[serde(
        rename = "sourceName",
        alias = "@sourceName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_name: Option<String>,
    #[serde(
        default,
        alias = "@unit",
        skip_serializing_if = "Option::is_none"
    )]
    pub unit: Option<String>,
}

/// Root element of an Apple Health export
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthData {
    #[serde(rename = "Record", default)]
    pub records: Vec<RawRecord>,
}

impl RawRecord {
    /// Metric type with vendor prefixes removed
    pub fn metric(&self) -> String {
        normalize_type(&self.record_type)
    }

    /// Parse into a typed record. `index` is the record's position in the
    /// feed, used in error messages.
    pub fn to_record(&self, index: usize) -> Result<Record, DashboardError> {
        Ok(Record {
            metric: self.metric(),
            value: self.value.as_ref().and_then(RawValue::as_number),
            start_date: parse_timestamp(&self.start_date, "startDate", index)?,
            end_date: parse_timestamp(&self.end_date, "endDate", index)?,
            creation_date: parse_timestamp(&self.creation_date, "creationDate", index)?,
        })
    }

    /// Check the record without converting it
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.record_type.trim().is_empty() {
            return Err(ValidationError::MissingType);
        }
        let fields = [
            ("startDate", &self.start_date),
            ("endDate", &self.end_date),
            ("creationDate", &self.creation_date),
        ];
        for (field, value) in fields {
            if DateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).is_err() {
                return Err(ValidationError::InvalidTimestamp {
                    field,
                    value: value.clone(),
                });
            }
        }
        let start = DateTime::parse_from_str(self.start_date.trim(), TIMESTAMP_FORMAT);
        let end = DateTime::parse_from_str(self.end_date.trim(), TIMESTAMP_FORMAT);
        if let (Ok(start), Ok(end)) = (start, end) {
            if end < start {
                return Err(ValidationError::EndBeforeStart);
            }
        }
        Ok(())
    }
}

/// Strip vendor prefixes: `HKQuantityTypeIdentifierStepCount` -> `StepCount`
pub fn normalize_type(raw: &str) -> String {
    TYPE_PREFIXES
        .iter()
        .fold(raw.to_string(), |acc, prefix| acc.replace(prefix, ""))
}

fn parse_timestamp(
    value: &str,
    field: &str,
    index: usize,
) -> Result<DateTime<FixedOffset>, DashboardError> {
    DateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        DashboardError::DateParseError(format!(
            "record {}: invalid {} '{}': {}",
            index, field, value, e
        ))
    })
}

/// Problems found in a raw record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Record has no type")]
    MissingType,

    #[error("Invalid {field} timestamp '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("endDate is before startDate")]
    EndBeforeStart,
}
