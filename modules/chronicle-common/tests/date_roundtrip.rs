//! Property tests for ParsedDate → DateRange lowering.

use chronicle_common::dates::{DatePrecision, ParsedDate};
use chrono::Datelike;
use proptest::prelude::*;

fn base(precision: DatePrecision, year: i32) -> ParsedDate {
    ParsedDate {
        original_text: format!("{year}"),
        display_text: format!("{year}"),
        precision,
        start_year: Some(year),
        start_month: None,
        start_day: None,
        end_year: None,
        end_month: None,
        end_day: None,
        is_bce: year < 0,
    }
}

proptest! {
    #[test]
    fn year_precision_expands_to_calendar_year(year in -3000i32..3000) {
        prop_assume!(year != 0);
        let range = base(DatePrecision::Year, year).to_date_range().unwrap();
        prop_assert!(range.start <= range.end);
        prop_assert_eq!(range.start.year(), year);
        prop_assert_eq!(range.start.month(), 1);
        prop_assert_eq!(range.start.day(), 1);
        prop_assert_eq!(range.end.year(), year);
        prop_assert_eq!(range.end.month(), 12);
        prop_assert_eq!(range.end.day(), 31);
    }

    #[test]
    fn decade_precision_spans_ten_years(year in -3000i32..2990) {
        prop_assume!(year != 0);
        let range = base(DatePrecision::Decade, year).to_date_range().unwrap();
        prop_assert!(range.start <= range.end);
        prop_assert_eq!(range.end.year() - range.start.year(), 9);
    }

    #[test]
    fn month_precision_stays_within_month(year in -3000i32..3000, month in 1u32..=12) {
        prop_assume!(year != 0);
        let mut d = base(DatePrecision::Month, year);
        d.start_month = Some(month);
        let range = d.to_date_range().unwrap();
        prop_assert!(range.start <= range.end);
        prop_assert_eq!(range.start.month(), month);
        prop_assert_eq!(range.end.month(), month);
        prop_assert_eq!(range.start.day(), 1);
        prop_assert!(range.end.day() >= 28);
    }

    #[test]
    fn day_precision_is_a_point(year in -3000i32..3000, month in 1u32..=12, day in 1u32..=31) {
        prop_assume!(year != 0);
        let mut d = base(DatePrecision::Day, year);
        d.start_month = Some(month);
        d.start_day = Some(day);
        let range = d.to_date_range().unwrap();
        prop_assert_eq!(range.start, range.end);
    }

    #[test]
    fn arbitrary_bounds_never_invert(
        sy in -3000i32..3000, sm in 1u32..=12, sd in 1u32..=31,
        ey in -3000i32..3000, em in 1u32..=12, ed in 1u32..=31,
    ) {
        prop_assume!(sy != 0 && ey != 0);
        let mut d = base(DatePrecision::Day, sy);
        d.start_month = Some(sm);
        d.start_day = Some(sd);
        d.end_year = Some(ey);
        d.end_month = Some(em);
        d.end_day = Some(ed);
        let range = d.to_date_range().unwrap();
        prop_assert!(range.start <= range.end);
    }

    #[test]
    fn bce_years_stay_negative(year in -3000i32..-1) {
        let range = base(DatePrecision::Year, year).to_date_range().unwrap();
        prop_assert!(range.start.year() < 0);
        prop_assert!(range.end.year() < 0);
    }
}
