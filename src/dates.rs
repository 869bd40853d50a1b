use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};

use crate::record::Value;

// Serial 0 in spreadsheet dates, accounting for the 1900 leap year bug.
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial <= 0.0 {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_days(Days::new(serial.round() as u64))
}

/// Parse a date as it shows up in carrier spreadsheets or API payloads.
pub fn parse_excel_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => from_excel_serial(*n),
        Value::Text(s) => parse_date_text(s),
        _ => None,
    }
}

pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // DD/MM/YYYY is what the Spanish sheets use.
    let parts: Vec<&str> = text.split('/').map(str::trim).collect();
    if let [day, month, year] = parts[..] {
        return NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?);
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
}

pub fn is_upcoming(date: NaiveDate, days: u64, today: NaiveDate) -> bool {
    match today.checked_add_days(Days::new(days)) {
        Some(limit) => date >= today && date <= limit,
        None => date >= today,
    }
}

pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Optional start/end bounds sent as `start_date`/`end_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// One month back to one month ahead of `today`.
    pub fn default_around(today: NaiveDate) -> Self {
        Self {
            start: today.checked_sub_months(Months::new(1)).or(Some(today)),
            end: today.checked_add_months(Months::new(1)).or(Some(today)),
        }
    }

    /// Parse `YYYY-MM-DD..YYYY-MM-DD`, either side may be left empty.
    pub fn parse(input: &str) -> Option<Self> {
        let (start, end) = input.split_once("..")?;
        let side = |s: &str| -> Option<Option<NaiveDate>> {
            let s = s.trim();
            if s.is_empty() {
                Some(None)
            } else {
                parse_date_text(s).map(Some)
            }
        };
        Some(Self {
            start: side(start)?,
            end: side(end)?,
        })
    }

    pub fn label(&self) -> String {
        let side = |d: Option<NaiveDate>| d.map(iso).unwrap_or_default();
        format!("{}..{}", side(self.start), side(self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_serial_numbers() {
        assert_eq!(parse_excel_date(&Value::Number(45292.0)), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_excel_date(&Value::Number(25569.0)), Some(ymd(1970, 1, 1)));
        assert_eq!(parse_excel_date(&Value::Number(0.0)), None);
    }

    #[test]
    fn parses_text_formats() {
        assert_eq!(parse_excel_date(&Value::from("15/03/2025")), Some(ymd(2025, 3, 15)));
        assert_eq!(parse_excel_date(&Value::from("2025-03-15")), Some(ymd(2025, 3, 15)));
        assert_eq!(
            parse_excel_date(&Value::from("2025-03-15T10:30:00")),
            Some(ymd(2025, 3, 15))
        );
        assert_eq!(parse_excel_date(&Value::from(" 5 / 3 /2025")), Some(ymd(2025, 3, 5)));
        assert_eq!(parse_excel_date(&Value::from("31/02/2025")), None);
        assert_eq!(parse_excel_date(&Value::from("1/2/3/2025")), None);
        assert_eq!(parse_excel_date(&Value::from("15/03")), None);
        assert_eq!(parse_excel_date(&Value::from("")), None);
        assert_eq!(parse_excel_date(&Value::Null), None);
    }

    #[test]
    fn upcoming_window_is_inclusive() {
        let today = ymd(2025, 1, 10);
        assert!(is_upcoming(today, 30, today));
        assert!(is_upcoming(ymd(2025, 2, 9), 30, today));
        assert!(!is_upcoming(ymd(2025, 2, 10), 30, today));
        assert!(!is_upcoming(ymd(2025, 1, 9), 30, today));
    }

    #[test]
    fn default_range_spans_two_months() {
        let range = DateRange::default_around(ymd(2025, 3, 31));
        assert_eq!(range.start, Some(ymd(2025, 2, 28)));
        assert_eq!(range.end, Some(ymd(2025, 4, 30)));
        assert_eq!(range.label(), "2025-02-28..2025-04-30");
    }

    #[test]
    fn parses_ranges() {
        assert_eq!(
            DateRange::parse("2025-01-01..").unwrap(),
            DateRange {
                start: Some(ymd(2025, 1, 1)),
                end: None
            }
        );
        assert!(DateRange::parse("2025-01-01").is_none());
        assert!(DateRange::parse("x..y").is_none());
    }
}
