//! Date-range control
//!
//! The range controller owns the selected date window. Charts read it through
//! the accessors; only the controller writes it, either by adopting the
//! default range announced on the bus or in response to unit selection and
//! prev/next navigation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::NaiveDate;

use crate::context::DashboardContext;
use crate::error::DashboardError;
use crate::events::{handler, Event, DEFAULT_RANGE_SET, RANGE_NAVIGATED, RANGE_SELECTED};
use crate::types::{DateRange, Direction, RangeUnit};

/// Selected window and unit
pub struct RangeController {
    target: String,
    ctx: Rc<DashboardContext>,
    selected: RefCell<Option<DateRange>>,
}

impl RangeController {
    /// Create a controller bound to the time-filter surface `target` and
    /// subscribe it to default-range announcements.
    pub fn new(target: &str, ctx: Rc<DashboardContext>) -> Result<Rc<Self>, DashboardError> {
        if target.trim().is_empty() {
            return Err(DashboardError::MissingTarget("RangeController".to_string()));
        }

        let controller = Rc::new(Self {
            target: target.to_string(),
            ctx,
            selected: RefCell::new(None),
        });

        let weak: Weak<RangeController> = Rc::downgrade(&controller);
        controller.ctx.bus().on(
            DEFAULT_RANGE_SET,
            handler(move |event| {
                let Some(controller) = weak.upgrade() else {
                    return Ok(());
                };
                if let Event::DefaultRangeSet(range) = event {
                    controller.adopt(*range)?;
                }
                Ok(())
            }),
        );

        Ok(controller)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Current window, if one has been adopted yet
    pub fn range(&self) -> Option<DateRange> {
        *self.selected.borrow()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.range().map(|r| r.start_date)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.range().map(|r| r.end_date)
    }

    /// Unit of the current window (the active pill)
    pub fn active_unit(&self) -> Option<RangeUnit> {
        self.range().map(|r| r.range_type)
    }

    /// Take a range as-is after checking it is not degenerate
    pub fn adopt(&self, range: DateRange) -> Result<(), DashboardError> {
        let checked = DateRange::new(range.start_date, range.end_date, range.range_type)
            .map_err(|e| {
                tracing::warn!(error = %e, "rejecting announced range");
                e
            })?;
        tracing::info!(
            start = %checked.start_date,
            end = %checked.end_date,
            unit = %checked.range_type,
            "range adopted"
        );
        *self.selected.borrow_mut() = Some(checked);
        Ok(())
    }

    /// Switch to `unit`, keeping the end date, and announce the selection
    pub fn select_unit(&self, unit: RangeUnit) -> Result<DateRange, DashboardError> {
        let current = self.range().ok_or(DashboardError::NoRangeSelected)?;
        let start = unit
            .subtract_from(current.end_date)
            .ok_or(DashboardError::DegenerateRange {
                start: current.start_date,
                end: current.end_date,
            })?;
        let next = DateRange::new(start, current.end_date, unit)?;
        *self.selected.borrow_mut() = Some(next);
        tracing::debug!(unit = %unit, start = %next.start_date, "range unit selected");

        self.ctx.emit(RANGE_SELECTED, Event::RangeSelected { unit })?;
        Ok(next)
    }

    /// Move both ends one unit of the current unit and announce the move.
    ///
    /// A move that would leave an empty or inverted window is rejected and the
    /// selection is left untouched.
    pub fn navigate(&self, direction: Direction) -> Result<DateRange, DashboardError> {
        let current = self.range().ok_or(DashboardError::NoRangeSelected)?;
        let unit = current.range_type;
        let degenerate = || DashboardError::DegenerateRange {
            start: current.start_date,
            end: current.end_date,
        };
        let start = unit.shift(current.start_date, direction).ok_or_else(degenerate)?;
        let end = unit.shift(current.end_date, direction).ok_or_else(degenerate)?;
        let next = DateRange::new(start, end, unit)?;
        *self.selected.borrow_mut() = Some(next);
        tracing::debug!(?direction, start = %next.start_date, end = %next.end_date, "range navigated");

        self.ctx
            .emit(RANGE_NAVIGATED, Event::RangeNavigated { direction })?;
        Ok(next)
    }

    pub fn previous(&self) -> Result<DateRange, DashboardError> {
        self.navigate(Direction::Previous)
    }

    pub fn next(&self) -> Result<DateRange, DashboardError> {
        self.navigate(Direction::Next)
    }
}

impl std::fmt::Debug for RangeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeController")
            .field("target", &self.target)
            .field("selected", &self.range())
            .finish()
    }
}
