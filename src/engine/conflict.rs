use ulid::Ulid;

use crate::model::{BlockedInterval, Ms, WeekSchedule};

use super::availability::overlaps;
use super::EngineError;

pub(crate) fn validate_instant(instant: Ms) -> Result<(), EngineError> {
    use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&instant) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Validate one proposed appointment against a snapshot of the barber's day.
///
/// Checks run in a fixed order and the first violation wins:
/// day off → outside hours → overlapping active appointment → blocked
/// interval. `booked` carries the active appointment intervals for the
/// business date as (id, start_min, end_min). Pure; the caller holds
/// whatever lock makes the snapshot trustworthy.
pub fn check_bookable(
    schedule: &WeekSchedule,
    weekday: u8,
    start_min: u16,
    duration_min: u16,
    booked: &[(Ulid, u16, u16)],
    blocks: &[&BlockedInterval],
) -> Result<(), EngineError> {
    let Some(window) = schedule.effective_window(weekday) else {
        return Err(EngineError::ClosedDay { weekday });
    };

    let end_min = start_min + duration_min;
    if start_min < window.open_min || end_min > window.close_min {
        return Err(EngineError::OutsideHours {
            open_min: window.open_min,
            close_min: window.close_min,
        });
    }

    for &(id, b_start, b_end) in booked {
        if overlaps(start_min, end_min, b_start, b_end) {
            return Err(EngineError::SlotTaken(id));
        }
    }

    for block in blocks {
        if block.all_day || (start_min >= block.start_min && start_min < block.end_min) {
            return Err(EngineError::SlotBlocked(block.id));
        }
    }

    Ok(())
}
