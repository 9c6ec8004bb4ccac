use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::ScheduleError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// `end <= start` is a caller error; out-of-range timestamps and absurd
/// widths are bounds violations.
pub(crate) fn validate_range(start: Ms, end: Ms) -> Result<TimeRange, ScheduleError> {
    if end <= start {
        return Err(ScheduleError::InvalidRange { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(ScheduleError::LimitExceeded("timestamp out of range"));
    }
    let range = TimeRange::new(start, end);
    if range.duration_ms() > MAX_RANGE_DURATION_MS {
        return Err(ScheduleError::LimitExceeded("range too wide"));
    }
    Ok(range)
}

/// The interval index: every approved reservation overlapping `range`
/// (half-open), optionally excluding one id: self-exclusion when
/// re-validating an edit or a re-approval against the rest of the book.
/// Pure read; the caller's guard provides the consistent snapshot.
pub(crate) fn approved_conflicts<'a>(
    rs: &'a ResourceState,
    range: &TimeRange,
    exclude: Option<Ulid>,
) -> Vec<&'a Reservation> {
    rs.overlapping(range)
        .filter(|r| r.status == ReservationStatus::Approved && Some(r.id) != exclude)
        .collect()
}

/// Guard form: first approved overlap → `SlotConflict` carrying its id.
pub(crate) fn check_slot_free(
    rs: &ResourceState,
    range: &TimeRange,
    exclude: Option<Ulid>,
) -> Result<(), ScheduleError> {
    if let Some(hit) = approved_conflicts(rs, range, exclude).first() {
        return Err(ScheduleError::SlotConflict(hit.id));
    }
    Ok(())
}
