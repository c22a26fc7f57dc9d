// ⏰ Temporal Model - Timestamps and slot spacing of the EDC export
//
// The export is written in local wall-clock time with a fixed 15 minute
// cadence. Only two kinds of discontinuity are legal:
// 1. Midnight: 23:45 -> 00:00 (minutes-of-day drop by 1425)
// 2. Daylight saving: spring skips 02:00-02:59 (01:45 -> 03:00, +75 minutes),
//    autumn repeats 02:00-02:59 (02:45 -> 02:00, -45 minutes)
// Anything else means rows are missing or duplicated and the whole document
// cannot be trusted.

use crate::error::{EdcError, Result};
use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::info;

/// Length of one slot in the export
pub const SLOT_MINUTES: i64 = 15;

/// Offset from the start of the last slot to the document's `date_to`
pub const SLOT_END_OFFSET_MINUTES: i64 = 14;

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

// ============================================================================
// SPACING
// ============================================================================

/// How two consecutive rows relate in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    /// Regular 15 minute step
    Regular,

    /// 23:45 -> 00:00
    DayBreak,

    /// Clocks moved forward, one hour of rows is missing
    DstSpringForward,

    /// Clocks moved back, one hour of rows is repeated
    DstFallBack,
}

fn minutes_of_day(time: &NaiveDateTime) -> i64 {
    i64::from(time.hour()) * 60 + i64::from(time.minute())
}

/// Validate the gap between two consecutive row timestamps
pub fn check_spacing(
    previous: &NaiveDateTime,
    current: &NaiveDateTime,
    line: usize,
) -> Result<Spacing> {
    let minutes = minutes_of_day(current) - minutes_of_day(previous);

    let spacing = match minutes {
        SLOT_MINUTES => Spacing::Regular,
        -1425 => Spacing::DayBreak,
        75 if current.hour() == 3 => Spacing::DstSpringForward,
        -45 if current.hour() == 2 => Spacing::DstFallBack,
        _ => {
            return Err(EdcError::UnexpectedTimeGap {
                line,
                minutes,
                at: *current,
            })
        }
    };

    if matches!(spacing, Spacing::DstSpringForward | Spacing::DstFallBack) {
        info!(at = %current, ?spacing, "daylight saving transition in export");
    }

    Ok(spacing)
}

// ============================================================================
// PARSING & FORMATTING
// ============================================================================

/// Parse the `dd.mm.yyyy` date and `hh:mm` time columns
pub fn parse_timestamp(date: &str, time: &str, line: usize) -> Result<NaiveDateTime> {
    let joined = format!("{} {}", date.trim(), time.trim());
    NaiveDateTime::parse_from_str(&joined, DATE_TIME_FORMAT)
        .map_err(|_| EdcError::InvalidTimestamp { line, value: joined })
}

/// End of a slot as printed in the "Cas do" column
pub fn slot_end(start: &NaiveDateTime) -> NaiveDateTime {
    *start + Duration::minutes(SLOT_MINUTES)
}

/// Inclusive end of the document given the start of its last slot
pub fn document_end(last_start: &NaiveDateTime) -> NaiveDateTime {
    *last_start + Duration::minutes(SLOT_END_OFFSET_MINUTES)
}

/// Number of calendar days touched by [from, to]
pub fn calendar_days(from: &NaiveDateTime, to: &NaiveDateTime) -> i64 {
    (to.date() - from.date()).num_days() + 1
}

// ============================================================================
// TESTS
// ============================================================================
