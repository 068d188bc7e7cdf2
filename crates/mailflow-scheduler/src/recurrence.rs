//! Recurrence arithmetic — computes a task's next eligible run time.
//!
//! Monthly adds one calendar month with the day-of-month clamped to the
//! target month's length (Jan 31 → Feb 28, or Feb 29 in leap years);
//! December rolls to January of the following year.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::task::Recurrence;

/// Compute the run time following `current` under `recurrence`.
///
/// `once` returns the instant unchanged; the caller deactivates the task.
pub fn compute_next_run(current: DateTime<Utc>, recurrence: Recurrence) -> DateTime<Utc> {
    match recurrence {
        Recurrence::Once => current,
        Recurrence::Daily => current + Duration::days(1),
        Recurrence::Weekly => current + Duration::days(7),
        Recurrence::Monthly => add_one_month(current),
    }
}

fn add_one_month(current: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if current.month() == 12 {
        (current.year() + 1, 1)
    } else {
        (current.year(), current.month() + 1)
    };
    let day = current.day().min(days_in_month(year, month));

    Utc.with_ymd_and_hms(
        year,
        month,
        day,
        current.hour(),
        current.minute(),
        current.second(),
    )
    .single()
    // Unreachable for UTC with a clamped day; keep the schedule moving anyway.
    .unwrap_or(current + Duration::days(31))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
