use chrono::NaiveDate;
use ulid::Ulid;

use crate::clock::format_hhmm;
use crate::model::{AppointmentStatus, WaitlistStatus};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The weekday is a day off with no override.
    ClosedDay { weekday: u8 },
    /// The proposed interval does not fit the effective working window.
    OutsideHours { open_min: u16, close_min: u16 },
    /// Overlaps an active appointment.
    SlotTaken(Ulid),
    /// Falls inside a blocked interval.
    SlotBlocked(Ulid),
    InvalidSchedule(&'static str),
    InvalidBlock(&'static str),
    InvalidStatusChange {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    InvalidWaitlistChange {
        from: WaitlistStatus,
        to: WaitlistStatus,
    },
    /// A WAITING waitlist entry already exists for this (date, phone).
    AlreadyWaiting { date: NaiveDate },
    LimitExceeded(&'static str),
    WalError(String),
}

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::ClosedDay { weekday } => {
                let name = WEEKDAY_NAMES
                    .get(usize::from(*weekday))
                    .copied()
                    .unwrap_or("that day");
                write!(f, "closed on {name}")
            }
            EngineError::OutsideHours { open_min, close_min } => {
                write!(
                    f,
                    "outside business hours: open {}, close {}",
                    format_hhmm(*open_min),
                    format_hhmm(*close_min)
                )
            }
            EngineError::SlotTaken(id) => write!(f, "slot taken by appointment {id}"),
            EngineError::SlotBlocked(id) => write!(f, "slot falls in blocked interval {id}"),
            EngineError::InvalidSchedule(msg) => write!(f, "invalid schedule: {msg}"),
            EngineError::InvalidBlock(msg) => write!(f, "invalid blocked interval: {msg}"),
            EngineError::InvalidStatusChange { from, to } => {
                write!(f, "appointment cannot move from {from} to {to}")
            }
            EngineError::InvalidWaitlistChange { from, to } => {
                write!(f, "waitlist entry cannot move from {from} to {to}")
            }
            EngineError::AlreadyWaiting { date } => {
                write!(f, "already on the waitlist for {date}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
