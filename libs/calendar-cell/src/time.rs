// libs/calendar-cell/src/time.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};

/// Injected time source so past/future boundary checks stay deterministic
/// under test. Services default to [`SystemClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Parses "HH:MM" to minutes since midnight. Malformed input maps to 0 rather
/// than erroring; callers wanting strictness validate with [`is_valid_time`]
/// first.
pub fn time_to_minutes(text: &str) -> u32 {
    if !is_valid_time(text) {
        return 0;
    }

    let hours: u32 = text[0..2].parse().unwrap_or(0);
    let minutes: u32 = text[3..5].parse().unwrap_or(0);
    hours * 60 + minutes
}

/// True iff text is exactly "HH:MM" with HH in 00-23 and MM in 00-59.
pub fn is_valid_time(text: &str) -> bool {
    if text.len() != 5 || text.as_bytes()[2] != b':' {
        return false;
    }
    NaiveTime::parse_from_str(text, "%H:%M").is_ok()
}

/// Half-open interval overlap on minute offsets: [start, end) ranges overlap
/// iff start_a < end_b && end_a > start_b.
pub fn minutes_overlap(start_a: u32, end_a: u32, start_b: u32, end_b: u32) -> bool {
    start_a < end_b && end_a > start_b
}

/// Overlap test on "HH:MM" strings.
pub fn spans_overlap(start_a: &str, end_a: &str, start_b: &str, end_b: &str) -> bool {
    minutes_overlap(
        time_to_minutes(start_a),
        time_to_minutes(end_a),
        time_to_minutes(start_b),
        time_to_minutes(end_b),
    )
}

/// 0 = Sunday .. 6 = Saturday, matching the weekly template convention.
pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

pub fn day_name(date: NaiveDate) -> String {
    match date.weekday() {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
    .to_string()
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

pub fn month_first_day(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn month_last_day(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))
}

/// Shifts a (year, month) pair by a signed number of months.
pub fn shift_month(year: i32, month: u32, offset: i32) -> (i32, u32) {
    let zero_based = year * 12 + (month as i32 - 1) + offset;
    let shifted_year = zero_based.div_euclid(12);
    let shifted_month = zero_based.rem_euclid(12) as u32 + 1;
    (shifted_year, shifted_month)
}
