//! Organization calendar

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Wall clock time in the organization's calendar
    fn now_local(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now_local().date()
    }
}

/// Clock following a fixed UTC offset, or the host zone when none is set
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationClock {
    offset: Option<FixedOffset>,
}

impl OrganizationClock {
    pub fn new(offset: Option<FixedOffset>) -> Self {
        Self { offset }
    }
}

impl Clock for OrganizationClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

/// Season label ("2024-2025") of a date; seasons start in September
pub fn season_of(date: NaiveDate) -> String {
    use chrono::Datelike;

    let start_year = if date.month() >= 9 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start_year, start_year + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_boundaries() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(season_of(d(2025, 6, 20)), "2024-2025");
        assert_eq!(season_of(d(2025, 8, 31)), "2024-2025");
        assert_eq!(season_of(d(2025, 9, 1)), "2025-2026");
    }

    #[test]
    fn test_fixed_offset_clock() {
        let clock = OrganizationClock::new(FixedOffset::east_opt(2 * 3600));
        let utc = clock.now_utc().naive_utc();
        let local = clock.now_local();
        let diff = (local - utc).num_minutes();
        assert!((119..=121).contains(&diff), "offset was {} minutes", diff);
    }
}
