//! Relative-date ranges.
//!
//! Each relative-date operator resolves to a closed `[start, end]` range of
//! local wall-clock times in the configured timezone: start at 00:00:00 of
//! the first day, end at 23:59:59 of the last. Weeks start on Monday.

use std::fmt::Write;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::types::DatePeriod;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Computes the first and last calendar day of `period`.
///
/// `days` is only read by [`DatePeriod::LastDays`] and [`DatePeriod::NextDays`].
/// Returns `None` if the range leaves the representable calendar.
pub fn period_days(period: DatePeriod, today: NaiveDate, days: u64) -> Option<(NaiveDate, NaiveDate)> {
    let monday = today.checked_sub_days(Days::new(u64::from(
        today.weekday().num_days_from_monday(),
    )))?;
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
    let year_start = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;

    match period {
        DatePeriod::Today => Some((today, today)),
        DatePeriod::Yesterday => {
            let day = today.pred_opt()?;
            Some((day, day))
        }
        DatePeriod::ThisWeek => Some((monday, monday.checked_add_days(Days::new(6))?)),
        DatePeriod::LastWeek => Some((monday.checked_sub_days(Days::new(7))?, monday.pred_opt()?)),
        DatePeriod::ThisMonth => Some((
            month_start,
            month_start.checked_add_months(Months::new(1))?.pred_opt()?,
        )),
        DatePeriod::LastMonth => Some((
            month_start.checked_sub_months(Months::new(1))?,
            month_start.pred_opt()?,
        )),
        DatePeriod::ThisYear => Some((year_start, NaiveDate::from_ymd_opt(today.year(), 12, 31)?)),
        DatePeriod::LastYear => Some((
            NaiveDate::from_ymd_opt(today.year() - 1, 1, 1)?,
            year_start.pred_opt()?,
        )),
        DatePeriod::LastDays => Some((today.checked_sub_days(Days::new(days))?, today)),
        DatePeriod::NextDays => Some((today, today.checked_add_days(Days::new(days))?)),
    }
}

/// Resolves `period` to formatted range endpoints.
pub fn date_range(
    period: DatePeriod,
    days: u64,
    now: DateTime<Utc>,
    timezone: Tz,
    format: &str,
) -> Option<(String, String)> {
    let today = now.with_timezone(&timezone).date_naive();
    let (first, last) = period_days(period, today, days)?;

    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
    let start = first.and_time(NaiveTime::MIN);
    let end = last.and_time(end_of_day);

    let mut low = String::new();
    let mut high = String::new();
    write!(low, "{}", start.format(format)).ok()?;
    write!(high, "{}", end.format(format)).ok()?;
    Some((low, high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    fn wednesday() -> DateTime<Utc> {
        // 2024-03-13 is a Wednesday
        Utc.with_ymd_and_hms(2024, 3, 13, 15, 30, 0).unwrap()
    }

    fn range(period: DatePeriod, days: u64) -> (String, String) {
        date_range(period, days, wednesday(), chrono_tz::UTC, FORMAT).unwrap()
    }

    #[test]
    fn test_today() {
        assert_eq!(
            range(DatePeriod::Today, 0),
            ("2024-03-13 00:00:00".to_string(), "2024-03-13 23:59:59".to_string())
        );
    }

    #[test]
    fn test_yesterday() {
        assert_eq!(range(DatePeriod::Yesterday, 0).0, "2024-03-12 00:00:00");
    }

    #[test]
    fn test_weeks_start_on_monday() {
        assert_eq!(
            range(DatePeriod::ThisWeek, 0),
            ("2024-03-11 00:00:00".to_string(), "2024-03-17 23:59:59".to_string())
        );
        assert_eq!(
            range(DatePeriod::LastWeek, 0),
            ("2024-03-04 00:00:00".to_string(), "2024-03-10 23:59:59".to_string())
        );
    }

    #[test]
    fn test_months_handle_leap_february() {
        assert_eq!(range(DatePeriod::ThisMonth, 0).1, "2024-03-31 23:59:59");
        assert_eq!(
            range(DatePeriod::LastMonth, 0),
            ("2024-02-01 00:00:00".to_string(), "2024-02-29 23:59:59".to_string())
        );
    }

    #[test]
    fn test_years() {
        assert_eq!(
            range(DatePeriod::LastYear, 0),
            ("2023-01-01 00:00:00".to_string(), "2023-12-31 23:59:59".to_string())
        );
        assert_eq!(range(DatePeriod::ThisYear, 0).1, "2024-12-31 23:59:59");
    }

    #[test]
    fn test_day_offsets() {
        assert_eq!(
            range(DatePeriod::LastDays, 7),
            ("2024-03-06 00:00:00".to_string(), "2024-03-13 23:59:59".to_string())
        );
        assert_eq!(range(DatePeriod::NextDays, 3).1, "2024-03-16 23:59:59");
    }

    #[test]
    fn test_timezone_shifts_today() {
        // 15:30 UTC is already the next day in Auckland.
        let (low, _) = date_range(
            DatePeriod::Today,
            0,
            wednesday(),
            chrono_tz::Pacific::Auckland,
            FORMAT,
        )
        .unwrap();
        assert_eq!(low, "2024-03-14 00:00:00");
    }

    #[test]
    fn test_overflow_returns_none() {
        assert!(date_range(DatePeriod::LastDays, u64::MAX, wednesday(), chrono_tz::UTC, FORMAT).is_none());
    }

    #[test]
    fn test_fixed_clock() {
        assert_eq!(FixedClock(wednesday()).now(), wednesday());
    }
}
