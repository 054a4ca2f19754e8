//! Shared dashboard context
//!
//! One `DashboardContext` is built by the application root and handed to every
//! component as `Rc<DashboardContext>`. It owns the event bus and the store of
//! unfiltered datasets, which charts re-filter on every range change.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;

use serde::Serialize;

use crate::error::DashboardError;
use crate::events::{Event, EventBus};
use crate::types::{DayAggregate, SleepDayAggregate};

/// A full, unfiltered dataset for one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Dataset {
    Daily(Vec<DayAggregate>),
    Sleep(Vec<SleepDayAggregate>),
}

impl Dataset {
    pub fn len(&self) -> usize {
        match self {
            Dataset::Daily(entries) => entries.len(),
            Dataset::Sleep(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Day keys in stored order
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Dataset::Daily(entries) => entries.iter().map(|e| e.key.as_str()).collect(),
            Dataset::Sleep(entries) => entries.iter().map(|e| e.key.as_str()).collect(),
        }
    }
}

/// Unfiltered per-day datasets keyed by metric type.
///
/// Written once per metric per load; read by charts on every filter event.
#[derive(Debug, Default, Clone, Serialize)]
pub struct OriginalDataStore {
    datasets: HashMap<String, Dataset>,
}

impl OriginalDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, key: impl Into<String>, dataset: Dataset) {
        let key = key.into();
        if self.datasets.contains_key(&key) {
            tracing::warn!(key = %key, "replacing stored dataset");
        }
        self.datasets.insert(key, dataset);
    }

    pub fn get(&self, key: &str) -> Option<&Dataset> {
        self.datasets.get(key)
    }

    /// Per-day sums stored under `key`
    pub fn daily(&self, key: &str) -> Result<&[DayAggregate], DashboardError> {
        match self.datasets.get(key) {
            Some(Dataset::Daily(entries)) => Ok(entries),
            _ => Err(DashboardError::UnknownDataset(key.to_string())),
        }
    }

    /// Sleep sessions stored under `key`
    pub fn sleep(&self, key: &str) -> Result<&[SleepDayAggregate], DashboardError> {
        match self.datasets.get(key) {
            Some(Dataset::Sleep(entries)) => Ok(entries),
            _ => Err(DashboardError::UnknownDataset(key.to_string())),
        }
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.datasets.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.datasets.clear();
    }
}

/// Bus and data store shared by the range controller and every chart
#[derive(Debug, Default)]
pub struct DashboardContext {
    bus: EventBus,
    store: RefCell<OriginalDataStore>,
}

impl DashboardContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Convenience for `bus().emit`
    pub fn emit(&self, topic: &str, mut event: Event) -> Result<(), DashboardError> {
        self.bus.emit(topic, &mut event)
    }

    pub fn store(&self) -> Ref<'_, OriginalDataStore> {
        self.store.borrow()
    }

    pub fn save(&self, key: impl Into<String>, dataset: Dataset) {
        self.store.borrow_mut().save(key, dataset);
    }

    /// Drop every stored dataset before a reload
    pub fn reset_store(&self) {
        self.store.borrow_mut().clear();
    }
}
