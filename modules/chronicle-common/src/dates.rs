//! Structured historical dates.
//!
//! A [`ParsedDate`] is the LLM date parser's structured output: a precision
//! level, optional start/end components, and a BCE flag. BCE years are
//! negative integers throughout (proleptic Gregorian, matching chrono).
//! A [`ParsedDate`] can be lowered to a concrete [`DateRange`] honoring its
//! precision; too-vague inputs stay `precision=unknown` and lower to `None`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Day,
    Month,
    Year,
    Decade,
    Century,
    Millennium,
    Era,
    Unknown,
}

impl std::fmt::Display for DatePrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DatePrecision::Day => "day",
            DatePrecision::Month => "month",
            DatePrecision::Year => "year",
            DatePrecision::Decade => "decade",
            DatePrecision::Century => "century",
            DatePrecision::Millennium => "millennium",
            DatePrecision::Era => "era",
            DatePrecision::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DatePrecision {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "decade" => Ok(Self::Decade),
            "century" => Ok(Self::Century),
            "millennium" => Ok(Self::Millennium),
            "era" => Ok(Self::Era),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown DatePrecision: {other}")),
        }
    }
}

/// Structured output of the date parser. Field layout is the wire schema the
/// LLM is asked to produce; see the date-parser prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedDate {
    pub original_text: String,
    pub display_text: String,
    pub precision: DatePrecision,
    pub start_year: Option<i32>,
    pub start_month: Option<u32>,
    pub start_day: Option<u32>,
    pub end_year: Option<i32>,
    pub end_month: Option<u32>,
    pub end_day: Option<u32>,
    #[serde(default)]
    pub is_bce: bool,
}

impl ParsedDate {
    /// A `precision=unknown` value carrying only the raw text.
    pub fn unknown(original_text: impl Into<String>) -> Self {
        let original_text = original_text.into();
        Self {
            display_text: original_text.clone(),
            original_text,
            precision: DatePrecision::Unknown,
            start_year: None,
            start_month: None,
            start_day: None,
            end_year: None,
            end_month: None,
            end_day: None,
            is_bce: false,
        }
    }

    /// The year used for merger indexing: start year, falling back to end year.
    pub fn event_year(&self) -> Option<i32> {
        self.start_year.or(self.end_year)
    }

    /// Lower to a concrete range honoring precision. Returns `None` when no
    /// start year is known. If the computed bounds are inverted they are
    /// swapped (and logged) rather than rejected.
    pub fn to_date_range(&self) -> Option<DateRange> {
        if self.precision == DatePrecision::Unknown {
            return None;
        }
        let start_year = self.start_year?;

        let start_month = self.start_month.unwrap_or(1).clamp(1, 12);
        let start_day = self.start_day.unwrap_or(1);
        let start = clamped_date(start_year, start_month, start_day);

        let default_end_year = match self.precision {
            DatePrecision::Decade => start_year + 9,
            _ => start_year,
        };
        let end_year = self.end_year.unwrap_or(default_end_year);

        let end = match self.precision {
            DatePrecision::Day if self.end_year.is_none() => start,
            DatePrecision::Month if self.end_year.is_none() && self.end_month.is_none() => {
                last_day_of_month(start_year, start_month)
            }
            _ => {
                let end_month = self.end_month.unwrap_or(12).clamp(1, 12);
                match self.end_day {
                    Some(d) => clamped_date(end_year, end_month, d),
                    None => last_day_of_month(end_year, end_month),
                }
            }
        };

        if start > end {
            warn!(
                original = %self.original_text,
                %start,
                %end,
                "inverted date range, swapping bounds"
            );
            return Some(DateRange { start: end, end: start });
        }
        Some(DateRange { start, end })
    }

    /// Midnight-UTC timestamp of the range start, when representable.
    pub fn start_timestamp(&self) -> Option<DateTime<Utc>> {
        let range = self.to_date_range()?;
        range.start.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
    }
}

/// Clamp day-of-month into validity for (year, month).
fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.max(1);
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| last_day_of_month(year, month))
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month >= 12 { (year + 1, 1) } else { (year, month + 1) };
    // The first of any month always exists in the proleptic calendar.
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .map(|d| d.pred_opt().unwrap_or(d))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default())
}

/// Concrete inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn start_year(&self) -> i32 {
        self.start.year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(precision: DatePrecision) -> ParsedDate {
        ParsedDate {
            original_text: "test".into(),
            display_text: "test".into(),
            precision,
            start_year: None,
            start_month: None,
            start_day: None,
            end_year: None,
            end_month: None,
            end_day: None,
            is_bce: false,
        }
    }

    #[test]
    fn year_precision_expands_to_full_year() {
        let mut d = parsed(DatePrecision::Year);
        d.start_year = Some(1969);
        let range = d.to_date_range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(1969, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
    }

    #[test]
    fn month_precision_expands_to_end_of_month() {
        let mut d = parsed(DatePrecision::Month);
        d.start_year = Some(1944);
        d.start_month = Some(2);
        let range = d.to_date_range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(1944, 2, 1).unwrap());
        // 1944 is a leap year
        assert_eq!(range.end, NaiveDate::from_ymd_opt(1944, 2, 29).unwrap());
    }

    #[test]
    fn day_precision_has_equal_bounds() {
        let mut d = parsed(DatePrecision::Day);
        d.start_year = Some(1969);
        d.start_month = Some(7);
        d.start_day = Some(20);
        let range = d.to_date_range().unwrap();
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn decade_precision_spans_ten_years() {
        let mut d = parsed(DatePrecision::Decade);
        d.start_year = Some(1960);
        let range = d.to_date_range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(1960, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
    }

    #[test]
    fn century_uses_provided_bounds() {
        // 19th century CE: 1801..1900
        let mut d = parsed(DatePrecision::Century);
        d.start_year = Some(1801);
        d.end_year = Some(1900);
        let range = d.to_date_range().unwrap();
        assert_eq!(range.start.year(), 1801);
        assert_eq!(range.end, NaiveDate::from_ymd_opt(1900, 12, 31).unwrap());
    }

    #[test]
    fn bce_century_has_negative_years() {
        // 5th century BCE: -500 .. -401
        let mut d = parsed(DatePrecision::Century);
        d.start_year = Some(-500);
        d.end_year = Some(-401);
        d.is_bce = true;
        let range = d.to_date_range().unwrap();
        assert_eq!(range.start.year(), -500);
        assert_eq!(range.end.year(), -401);
        assert!(range.start < range.end);
    }

    #[test]
    fn unknown_precision_has_no_range() {
        assert!(parsed(DatePrecision::Unknown).to_date_range().is_none());
        let mut d = parsed(DatePrecision::Year);
        d.start_year = None;
        assert!(d.to_date_range().is_none());
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let mut d = parsed(DatePrecision::Day);
        d.start_year = Some(1970);
        d.start_month = Some(5);
        d.start_day = Some(2);
        d.end_year = Some(1970);
        d.end_month = Some(5);
        d.end_day = Some(1);
        let range = d.to_date_range().unwrap();
        assert!(range.start <= range.end);
    }

    #[test]
    fn overlaps_and_contains() {
        let a = DateRange {
            start: NaiveDate::from_ymd_opt(1939, 9, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(1945, 9, 2).unwrap(),
        };
        let b = DateRange {
            start: NaiveDate::from_ymd_opt(1944, 6, 6).unwrap(),
            end: NaiveDate::from_ymd_opt(1944, 6, 6).unwrap(),
        };
        let c = DateRange {
            start: NaiveDate::from_ymd_opt(1950, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(1953, 12, 31).unwrap(),
        };
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(a.contains_date(NaiveDate::from_ymd_opt(1941, 12, 7).unwrap()));
        assert!(!a.contains_date(NaiveDate::from_ymd_opt(1938, 1, 1).unwrap()));
    }

    #[test]
    fn event_year_falls_back_to_end_year() {
        let mut d = parsed(DatePrecision::Year);
        d.end_year = Some(476);
        assert_eq!(d.event_year(), Some(476));
        d.start_year = Some(410);
        assert_eq!(d.event_year(), Some(410));
    }

    #[test]
    fn start_timestamp_is_midnight_utc() {
        let mut d = parsed(DatePrecision::Day);
        d.start_year = Some(1969);
        d.start_month = Some(7);
        d.start_day = Some(20);
        let ts = d.start_timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "1969-07-20T00:00:00+00:00");
    }

    #[test]
    fn out_of_range_day_is_clamped() {
        let mut d = parsed(DatePrecision::Day);
        d.start_year = Some(2001);
        d.start_month = Some(2);
        d.start_day = Some(31);
        let range = d.to_date_range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2001, 2, 28).unwrap());
    }
}
