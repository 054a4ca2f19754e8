//! Reading record feeds
//!
//! Three encodings are accepted: a JSON array of records, NDJSON (one record
//! per line) and an Apple Health `export.xml`. Other elements of the export
//! (`ExportDate`, `Me`, `Workout`, ...) are skipped.

use tracing::debug;

use crate::error::DashboardError;
use crate::schema::raw_record::*;
use crate::types::Record;

/// Feed encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    JsonArray,
    Ndjson,
    Xml,
}

impl FeedFormat {
    /// Guess the encoding from the first non-blank character
    pub fn detect(input: &str) -> Self {
        match input.trim_start().chars().next() {
            Some('<') => FeedFormat::Xml,
            Some('[') => FeedFormat::JsonArray,
            _ => FeedFormat::Ndjson,
        }
    }
}

/// Adapter for turning raw feeds into typed records
pub struct RecordAdapter;

impl RecordAdapter {
    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<Vec<RawRecord>, DashboardError> {
        let records: Vec<RawRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON), skipping blank lines
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawRecord>, DashboardError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(DashboardError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse the `<Record>` elements of an Apple Health export
    pub fn parse_xml(xml: &str) -> Result<Vec<RawRecord>, DashboardError> {
        let data: HealthData =
            quick_xml::de::from_str(xml).map_err(|e| DashboardError::XmlError(e.to_string()))?;
        Ok(data.records)
    }

    /// Parse a feed in whichever encoding it appears to use
    pub fn parse_auto(input: &str) -> Result<Vec<RawRecord>, DashboardError> {
        let format = FeedFormat::detect(input);
        debug!(?format, bytes = input.len(), "parsing record feed");
        match format {
            FeedFormat::Xml => Self::parse_xml(input),
            FeedFormat::JsonArray => Self::parse_array(input),
            FeedFormat::Ndjson => Self::parse_ndjson(input),
        }
    }

    /// Convert raw records to typed records. The first bad timestamp fails
    /// the whole feed.
    pub fn to_records(raw: &[RawRecord]) -> Result<Vec<Record>, DashboardError> {
        raw.iter()
            .enumerate()
            .map(|(index, record)| record.to_record(index))
            .collect()
    }

    /// Parse and convert in one go
    pub fn load(input: &str) -> Result<Vec<Record>, DashboardError> {
        let raw = Self::parse_auto(input)?;
        Self::to_records(&raw)
    }

    /// Validate a batch of records, returning only the failures
    pub fn validate_records(raw: &[RawRecord]) -> Vec<ValidationResult> {
        raw.iter()
            .enumerate()
            .filter_map(|(index, record)| {
                record.validate().err().map(|error| ValidationResult {
                    index,
                    record_type: record.record_type.clone(),
                    error,
                })
            })
            .collect()
    }
}

/// A record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub record_type: String,
    pub error: ValidationError,
}
