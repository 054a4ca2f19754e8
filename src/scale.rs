//! Scale functions mapping data into pixel space
//!
//! These are the `time -> pixel` and `value -> pixel` functions handed to the
//! renderer. Degenerate domains are widened so a scale never divides by zero.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Linear map from a closed numeric domain onto a pixel range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub domain: (f64, f64),
    pub range: (f64, f64),
    /// Round output to whole pixels
    pub round: bool,
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        let (d0, mut d1) = domain;
        if (d1 - d0).abs() < 1e-12 {
            d1 = d0 + 1.0;
        }
        Self {
            domain: (d0, d1),
            range,
            round: false,
        }
    }

    /// Same scale, rounding to whole pixels
    pub fn rounded(mut self) -> Self {
        self.round = true;
        self
    }

    #[inline]
    pub fn to_px(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let px = r0 + (value - d0) * (r1 - r0) / (d1 - d0);
        if self.round {
            px.round()
        } else {
            px
        }
    }

    /// Round tick values inside the domain, stepping by 1, 2 or 5 times a
    /// power of ten so that roughly `count` ticks fit.
    pub fn ticks(&self, count: usize) -> Vec<f64> {
        let (d0, d1) = self.domain;
        let (lo, hi) = if d0 <= d1 { (d0, d1) } else { (d1, d0) };
        if count == 0 || !lo.is_finite() || !hi.is_finite() {
            return Vec::new();
        }
        let step = tick_step(lo, hi, count);
        if !(step.is_finite() && step > 0.0) {
            return vec![lo];
        }
        let first = (lo / step).ceil() as i64;
        let last = (hi / step).floor() as i64;
        (first..=last)
            .map(|i| {
                // divide by the inverse for sub-unit steps to avoid 0.30000000000000004
                if step >= 1.0 {
                    i as f64 * step
                } else {
                    i as f64 / (1.0 / step)
                }
            })
            .collect()
    }
}

fn tick_step(lo: f64, hi: f64, count: usize) -> f64 {
    let raw = (hi - lo) / count as f64;
    let mut step = 10f64.powf(raw.log10().floor());
    let error = raw / step;
    if error >= 50f64.sqrt() {
        step *= 10.0;
    } else if error >= 10f64.sqrt() {
        step *= 5.0;
    } else if error >= 2f64.sqrt() {
        step *= 2.0;
    }
    step
}

/// Linear map from timestamps onto a pixel range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    pub domain: (NaiveDateTime, NaiveDateTime),
    pub range: (f64, f64),
}

impl TimeScale {
    pub fn new(domain: (NaiveDateTime, NaiveDateTime), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    /// Scale spanning two calendar days, midnight to midnight
    pub fn for_days(start: NaiveDate, end: NaiveDate, range: (f64, f64)) -> Self {
        Self::new((midnight(start), midnight(end)), range)
    }

    #[inline]
    pub fn to_px(&self, at: NaiveDateTime) -> f64 {
        let (t0, t1) = self.domain;
        let (r0, r1) = self.range;
        let span = (t1 - t0).num_milliseconds() as f64;
        let span = if span.abs() < 1.0 { 1.0 } else { span };
        let offset = (at - t0).num_milliseconds() as f64;
        r0 + offset * (r1 - r0) / span
    }

    pub fn date_to_px(&self, date: NaiveDate) -> f64 {
        self.to_px(midnight(date))
    }
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_linear_scale_inverted_range() {
        // value axis: 0 at the bottom (160px), max at the top (0px)
        let y = LinearScale::new((0.0, 200.0), (160.0, 0.0)).rounded();
        assert_eq!(y.to_px(0.0), 160.0);
        assert_eq!(y.to_px(200.0), 0.0);
        assert_eq!(y.to_px(100.0), 80.0);
    }

    #[test]
    fn test_linear_scale_degenerate_domain() {
        let y = LinearScale::new((0.0, 0.0), (160.0, 0.0));
        assert!(y.to_px(0.0).is_finite());
        assert_eq!(y.to_px(0.0), 160.0);
    }

    #[test]
    fn test_linear_ticks() {
        let y = LinearScale::new((0.0, 100.0), (100.0, 0.0));
        assert_eq!(y.ticks(5), vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);
        assert_eq!(y.ticks(1), vec![0.0, 100.0]);
        assert!(y.ticks(0).is_empty());

        let steps = LinearScale::new((0.0, 12_345.0), (160.0, 0.0));
        assert_eq!(steps.ticks(5), vec![0.0, 2000.0, 4000.0, 6000.0, 8000.0, 10000.0, 12000.0]);

        // widened degenerate domain gets sub-unit steps without float noise
        let empty = LinearScale::new((0.0, 0.0), (160.0, 0.0));
        assert_eq!(empty.ticks(5), vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);
    }

    #[test]
    fn test_time_scale_days() {
        let x = TimeScale::for_days(date(2024, 1, 1), date(2024, 1, 8), (10.0, 710.0));
        assert_eq!(x.date_to_px(date(2024, 1, 1)), 10.0);
        assert_eq!(x.date_to_px(date(2024, 1, 8)), 710.0);
        assert_eq!(x.date_to_px(date(2024, 1, 2)), 110.0);
    }
}
