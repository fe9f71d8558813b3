//! Month calendar generation for the attendance header block.

use chrono::{Datelike, Local, NaiveDate};
use tracing::debug;

use crate::spec::SpecCalendar;

/// Number of days in `month` of `year` (the day before the 1st of next month).
///
/// `None` when `month` is outside `1..=12` or the date is not representable.
pub fn calculate_days_in_month(year: i32, month: u32) -> Option<u32> {
    if !(1..=12).contains(&month) {
        return None;
    }
    let (n_year_next, n_month_next) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };

    NaiveDate::from_ymd_opt(n_year_next, n_month_next, 1)
        .and_then(|date| date.pred_opt())
        .map(|date| date.day())
}

/// Build the calendar for the month containing `reference_date`.
pub fn generate_calendar(reference_date: NaiveDate) -> SpecCalendar {
    let n_year = reference_date.year();
    let n_month = reference_date.month();
    // December of the last representable year has no following month.
    let n_days = calculate_days_in_month(n_year, n_month).unwrap_or(31);

    let day_labels = (1..=n_days)
        .map(|n_day| format!("{n_month}月{n_day}日"))
        .collect::<Vec<_>>();

    debug!(year = n_year, month = n_month, days = n_days, "generated calendar");

    SpecCalendar {
        year: n_year,
        month: n_month,
        days_in_month: n_days,
        header_label: format!("{n_year}年{n_month}月份"),
        day_labels,
    }
}

/// Build the calendar for the host's current local month.
pub fn generate_calendar_for_today() -> SpecCalendar {
    generate_calendar(Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive_date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn test_days_in_month_follow_month_length_and_leap_years() {
        assert_eq!(calculate_days_in_month(2023, 2), Some(28));
        assert_eq!(calculate_days_in_month(2024, 2), Some(29));
        assert_eq!(calculate_days_in_month(1900, 2), Some(28));
        assert_eq!(calculate_days_in_month(2000, 2), Some(29));
        assert_eq!(calculate_days_in_month(2024, 4), Some(30));
        assert_eq!(calculate_days_in_month(2024, 1), Some(31));
        assert_eq!(calculate_days_in_month(2024, 12), Some(31));
    }

    #[test]
    fn test_days_in_month_rejects_out_of_range_month() {
        assert_eq!(calculate_days_in_month(2024, 0), None);
        assert_eq!(calculate_days_in_month(2024, 13), None);
        assert_eq!(calculate_days_in_month(i32::MAX, 12), None);
    }

    #[test]
    fn test_generate_calendar_labels_april() {
        let calendar = generate_calendar(derive_date(2024, 4, 17));

        assert_eq!(calendar.year, 2024);
        assert_eq!(calendar.month, 4);
        assert_eq!(calendar.days_in_month, 30);
        assert_eq!(calendar.header_label, "2024年4月份");
        assert_eq!(calendar.day_labels.len(), 30);
        assert_eq!(calendar.day_labels.first().map(String::as_str), Some("4月1日"));
        assert_eq!(calendar.day_labels.last().map(String::as_str), Some("4月30日"));
    }

    #[test]
    fn test_generate_calendar_uses_only_year_and_month() {
        assert_eq!(
            generate_calendar(derive_date(2023, 2, 1)),
            generate_calendar(derive_date(2023, 2, 28))
        );
        assert_eq!(generate_calendar(derive_date(2024, 2, 10)).day_labels.len(), 29);
        assert_eq!(
            generate_calendar(derive_date(2024, 12, 31)).header_label,
            "2024年12月份"
        );
    }

    #[test]
    fn test_generate_calendar_for_today_matches_month_length() {
        let calendar = generate_calendar_for_today();
        assert_eq!(
            Some(calendar.day_labels.len() as u32),
            calculate_days_in_month(calendar.year, calendar.month)
        );
    }
}
