//! Named-topic publish/subscribe bus
//!
//! The bus is synchronous and single threaded. `emit` runs every handler
//! registered for a topic, in registration order, before it returns, and hands
//! each one the same `&mut Event`. A handler that mutates the payload changes
//! what later handlers see. A handler that fails stops the emission and the
//! error is returned to the emitter.
//!
//! Registering the same handler twice is allowed and makes it run twice.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::DashboardError;
use crate::types::{DateRange, Direction, RangeUnit};

/// Raw records were mapped and aggregated into the data store
pub const DATA_MAPPED: &str = "data/load/done";
/// The aggregator computed a default date range
pub const DEFAULT_RANGE_SET: &str = "date/range/default";
/// A range unit (week/month) was selected
pub const RANGE_SELECTED: &str = "timefilter/select";
/// The selected window moved one unit back or forward
pub const RANGE_NAVIGATED: &str = "timefilter/nav";
/// A bar was hovered in any chart
pub const BAR_HOVER: &str = "bar/on/mouseover";
/// The pointer left a bar in any chart
pub const BAR_UNHOVER: &str = "bar/on/mouseleave";

/// Per-chart stage topic, e.g. `steps/domain/set`
pub fn chart_topic(target: &str, stage: ChartStage) -> String {
    format!("{}/{}", target, stage.suffix())
}

/// Stage notifications emitted by a single chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartStage {
    DomainSet,
    AxisDrawn,
    BarsDrawn,
}

impl ChartStage {
    pub fn suffix(&self) -> &'static str {
        match self {
            ChartStage::DomainSet => "domain/set",
            ChartStage::AxisDrawn => "axis/drawn",
            ChartStage::BarsDrawn => "bars/drawn",
        }
    }
}

/// Point under the pointer when a bar is hovered
#[derive(Debug, Clone, PartialEq)]
pub struct HoverPoint {
    /// Calendar-day key of the hovered bar
    pub key: String,
    /// Target of the chart the pointer is over
    pub source: String,
    /// Horizontal pixel position, when known
    pub x: Option<f64>,
}

/// Payloads carried on the bus, one shape per topic
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DataMapped { metrics: Vec<String> },
    DefaultRangeSet(DateRange),
    RangeSelected { unit: RangeUnit },
    RangeNavigated { direction: Direction },
    Stage { chart: String, stage: ChartStage },
    BarHover(HoverPoint),
    BarUnhover,
}

/// Subscriber callback
pub type Handler = Rc<dyn Fn(&mut Event) -> Result<(), DashboardError>>;

/// Wrap a closure as a handler
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Event) -> Result<(), DashboardError> + 'static,
{
    Rc::new(f)
}

/// Topic registry
#[derive(Default)]
pub struct EventBus {
    handlers: RefCell<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic. No uniqueness check is made.
    pub fn on(&self, topic: impl Into<String>, handler: Handler) {
        self.handlers
            .borrow_mut()
            .entry(topic.into())
            .or_default()
            .push(handler);
    }

    /// Remove the first registration of `handler` on `topic`, if any
    pub fn off(&self, topic: &str, handler: &Handler) {
        let mut handlers = self.handlers.borrow_mut();
        if let Some(list) = handlers.get_mut(topic) {
            if let Some(pos) = list.iter().position(|h| Rc::ptr_eq(h, handler)) {
                list.remove(pos);
            }
        }
    }

    /// Run the handlers of `topic` in registration order.
    ///
    /// Handlers registered for the topic when `emit` is called are the ones
    /// that run; the registry is not borrowed while they execute, so handlers
    /// may emit or subscribe themselves.
    pub fn emit(&self, topic: &str, event: &mut Event) -> Result<(), DashboardError> {
        let snapshot: Vec<Handler> = match self.handlers.borrow().get(topic) {
            Some(list) => list.clone(),
            None => return Ok(()),
        };
        tracing::debug!(topic, handlers = snapshot.len(), "emit");
        for handler in snapshot {
            handler(event)?;
        }
        Ok(())
    }

    /// Number of registrations on a topic
    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.borrow().get(topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.borrow();
        let mut topics: Vec<(&String, usize)> =
            handlers.iter().map(|(topic, list)| (topic, list.len())).collect();
        topics.sort();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn test_duplicate_registration_runs_twice_with_same_payload() {
        let bus = EventBus::new();
        let seen: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_in = seen.clone();
        let h = handler(move |event| {
            seen_in.borrow_mut().push(event as *const Event as usize);
            Ok(())
        });
        bus.on("T", h.clone());
        bus.on("T", h);

        let mut event = Event::BarUnhover;
        bus.emit("T", &mut event).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0], &event as *const Event as usize);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.on("T", handler(move |_| {
                order.borrow_mut().push(i);
                Ok(())
            }));
        }
        bus.emit("T", &mut Event::BarUnhover).unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_mutation_is_visible_to_later_handlers() {
        let bus = EventBus::new();
        bus.on("T", handler(|event| {
            if let Event::DataMapped { metrics } = event {
                metrics.retain(|m| m != "drop-me");
            }
            Ok(())
        }));
        let observed = Rc::new(RefCell::new(Vec::new()));
        let observed_in = observed.clone();
        bus.on("T", handler(move |event| {
            if let Event::DataMapped { metrics } = event {
                *observed_in.borrow_mut() = metrics.clone();
            }
            Ok(())
        }));

        let mut event = Event::DataMapped {
            metrics: vec!["StepCount".into(), "drop-me".into()],
        };
        bus.emit("T", &mut event).unwrap();
        assert_eq!(*observed.borrow(), vec!["StepCount".to_string()]);
    }

    #[test]
    fn test_failing_handler_aborts_remaining() {
        let bus = EventBus::new();
        let ran = Rc::new(Cell::new(false));
        bus.on("T", handler(|_| Err(DashboardError::NoRangeSelected)));
        let ran_in = ran.clone();
        bus.on("T", handler(move |_| {
            ran_in.set(true);
            Ok(())
        }));

        let result = bus.emit("T", &mut Event::BarUnhover);
        assert!(matches!(result, Err(DashboardError::NoRangeSelected)));
        assert!(!ran.get());
    }

    #[test]
    fn test_off_removes_first_registration_only() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));
        let count_in = count.clone();
        let h = handler(move |_| {
            count_in.set(count_in.get() + 1);
            Ok(())
        });
        bus.on("T", h.clone());
        bus.on("T", h.clone());
        bus.off("T", &h);
        assert_eq!(bus.handler_count("T"), 1);

        bus.emit("T", &mut Event::BarUnhover).unwrap();
        assert_eq!(count.get(), 1);

        // Unknown topic and unregistered handler are no-ops
        let other = handler(|_| Ok(()));
        bus.off("T", &other);
        bus.off("missing", &h);
        assert_eq!(bus.handler_count("T"), 1);
    }

    #[test]
    fn test_emit_without_subscribers_is_ignored() {
        let bus = EventBus::new();
        assert!(bus.emit("nobody/listens", &mut Event::BarUnhover).is_ok());
    }

    #[test]
    fn test_handlers_may_emit_reentrantly() {
        let bus = Rc::new(EventBus::new());
        let inner_ran = Rc::new(Cell::new(false));
        let inner_flag = inner_ran.clone();
        bus.on("inner", handler(move |_| {
            inner_flag.set(true);
            Ok(())
        }));
        let weak = Rc::downgrade(&bus);
        bus.on("outer", handler(move |_| {
            if let Some(bus) = weak.upgrade() {
                bus.emit("inner", &mut Event::BarUnhover)?;
            }
            Ok(())
        }));

        bus.emit("outer", &mut Event::BarUnhover).unwrap();
        assert!(inner_ran.get());
    }

    #[test]
    fn test_chart_topic_names() {
        assert_eq!(chart_topic("steps", ChartStage::DomainSet), "steps/domain/set");
        assert_eq!(chart_topic("sleep", ChartStage::BarsDrawn), "sleep/bars/drawn");
    }
}
