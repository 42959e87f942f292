use serde::Serialize;

use crate::model::{BlockedInterval, WeekSchedule};

// ── Slot Resolution Algorithm ─────────────────────────────────────

/// One candidate start time. Past and conflicting candidates stay in the
/// list marked unavailable — callers can always render the full grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub minute: u16,
    pub available: bool,
}

/// Resolver result. `day_off` and `blocked` are explicit so callers can tell
/// "closed" apart from "fully booked".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub day_off: bool,
    pub blocked: bool,
    pub slots: Vec<Slot>,
}

impl DayAvailability {
    fn day_off() -> Self {
        Self { day_off: true, blocked: false, slots: Vec::new() }
    }

    fn blocked() -> Self {
        Self { day_off: false, blocked: true, slots: Vec::new() }
    }
}

/// Half-open interval overlap in minute space.
pub fn overlaps(a_start: u16, a_end: u16, b_start: u16, b_end: u16) -> bool {
    a_start < b_end && b_start < a_end
}

/// Compute the slot grid for one barber-day.
///
/// `booked` is the active (PENDING/CONFIRMED) appointment intervals on that
/// business date as minute spans. `now_min` is the current business-time
/// minute when the queried date is today, `None` otherwise.
///
/// Candidates step at the schedule's fixed granularity from open to
/// `close - duration` inclusive; the step never scales with the service
/// duration, so starts can sit closer together than the service is long.
pub fn day_slots(
    schedule: &WeekSchedule,
    weekday: u8,
    blocks: &[&BlockedInterval],
    booked: &[(u16, u16)],
    duration_min: u16,
    now_min: Option<u16>,
) -> DayAvailability {
    let Some(window) = schedule.effective_window(weekday) else {
        return DayAvailability::day_off();
    };

    if blocks.iter().any(|b| b.all_day) {
        return DayAvailability::blocked();
    }

    let mut slots = Vec::new();
    let mut minute = window.open_min;
    while minute + duration_min <= window.close_min {
        let end = minute + duration_min;

        let taken = booked
            .iter()
            .any(|&(b_start, b_end)| overlaps(minute, end, b_start, b_end));
        let in_block = blocks
            .iter()
            .any(|b| minute >= b.start_min && minute < b.end_min);
        let past = now_min.is_some_and(|now| minute < now);

        slots.push(Slot {
            minute,
            available: !taken && !in_block && !past,
        });
        minute += schedule.slot_minutes;
    }

    DayAvailability { day_off: false, blocked: false, slots }
}
