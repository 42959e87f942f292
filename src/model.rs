use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only absolute time type.
pub type Ms = i64;

pub const MS_PER_MINUTE: Ms = 60_000;
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock window inside one day, minutes from midnight, half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub open_min: u16,
    pub close_min: u16,
}

/// A barber's weekly working pattern. Weekday indices are 0 = Sunday.
///
/// An override on a weekday replaces the default window; a weekday cannot be
/// both overridden and a day off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSchedule {
    pub open_min: u16,
    pub close_min: u16,
    /// Fixed candidate-slot step. Independent of service duration.
    pub slot_minutes: u16,
    pub days_off: [bool; 7],
    pub overrides: [Option<DayWindow>; 7],
}

impl WeekSchedule {
    pub fn new(open_min: u16, close_min: u16, slot_minutes: u16) -> Self {
        Self {
            open_min,
            close_min,
            slot_minutes,
            days_off: [false; 7],
            overrides: [None; 7],
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        use crate::limits::{MAX_SLOT_MINUTES, MIN_SLOT_MINUTES};
        if self.open_min >= self.close_min || self.close_min > MINUTES_PER_DAY {
            return Err("open time must be before close time");
        }
        if self.slot_minutes < MIN_SLOT_MINUTES || self.slot_minutes > MAX_SLOT_MINUTES {
            return Err("slot granularity out of range");
        }
        for weekday in 0..7 {
            if let Some(window) = self.overrides[weekday] {
                if window.open_min >= window.close_min || window.close_min > MINUTES_PER_DAY {
                    return Err("override open time must be before close time");
                }
                if self.days_off[weekday] {
                    return Err("weekday cannot be both a day off and overridden");
                }
            }
        }
        Ok(())
    }

    /// The working window for a weekday: override first, then the default
    /// unless the day is off. `None` means closed all day.
    pub fn effective_window(&self, weekday: u8) -> Option<DayWindow> {
        let weekday = usize::from(weekday);
        if let Some(window) = self.overrides[weekday] {
            return Some(window);
        }
        if self.days_off[weekday] {
            return None;
        }
        Some(DayWindow {
            open_min: self.open_min,
            close_min: self.close_min,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Pending and Confirmed appointments occupy their slot.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Transitions move forward only; terminal states never change.
    pub fn can_become(self, next: Self) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Confirmed => next.is_terminal(),
            Self::Completed | Self::Cancelled | Self::NoShow => false,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingOrigin {
    Client,
    Barber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub client_id: Ulid,
    pub service_id: Ulid,
    pub start: Ms,
    /// Captured from the service at booking time; the interval never changes
    /// afterwards even if the catalog does.
    pub duration_min: u16,
    pub status: AppointmentStatus,
    pub booked_by: BookingOrigin,
}

impl Appointment {
    pub fn end(&self) -> Ms {
        self.start + Ms::from(self.duration_min) * MS_PER_MINUTE
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    /// Integer minor currency units.
    pub price: i64,
    pub duration_min: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub name: String,
    /// Identity key — one client per phone.
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedInterval {
    pub id: Ulid,
    pub date: NaiveDate,
    pub all_day: bool,
    pub start_min: u16,
    pub end_min: u16,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitlistStatus {
    Waiting,
    Notified,
    Booked,
    Expired,
}

impl WaitlistStatus {
    pub fn can_become(self, next: Self) -> bool {
        match self {
            Self::Waiting => matches!(next, Self::Notified | Self::Booked | Self::Expired),
            Self::Notified => matches!(next, Self::Booked | Self::Expired),
            Self::Booked | Self::Expired => false,
        }
    }
}

impl std::fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "WAITING",
            Self::Notified => "NOTIFIED",
            Self::Booked => "BOOKED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Ulid,
    pub date: NaiveDate,
    pub service_id: Ulid,
    pub name: String,
    pub phone: String,
    pub status: WaitlistStatus,
    pub notified: bool,
    pub created_at: Ms,
}

/// Per-barber mutable state. Lives behind the barber's RwLock; appointments
/// stay sorted by start so day windows are a partition-point scan.
#[derive(Debug, Clone)]
pub struct BarberState {
    pub id: Ulid,
    pub display_name: String,
    pub phone: Option<String>,
    pub schedule: WeekSchedule,
    /// All appointments ever booked, sorted by `start`. Terminal rows are
    /// kept for history and filtered out of conflict checks.
    pub appointments: Vec<Appointment>,
    pub blocks: Vec<BlockedInterval>,
}

impl BarberState {
    pub fn new(
        id: Ulid,
        display_name: String,
        phone: Option<String>,
        schedule: WeekSchedule,
    ) -> Self {
        Self {
            id,
            display_name,
            phone,
            schedule,
            appointments: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Insert keeping sort order by start.
    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.start, |a| a.start)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn appointment_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    /// Appointments whose interval overlaps `[window_start, window_end)`.
    /// Binary search skips everything starting at or after the window end.
    pub fn appointments_in(
        &self,
        window_start: Ms,
        window_end: Ms,
    ) -> impl Iterator<Item = &Appointment> {
        let right_bound = self.appointments.partition_point(|a| a.start < window_end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.end() > window_start)
    }

    pub fn blocks_on(&self, date: NaiveDate) -> impl Iterator<Item = &BlockedInterval> {
        self.blocks.iter().filter(move |b| b.date == date)
    }

    pub fn remove_block(&mut self, id: Ulid) -> Option<BlockedInterval> {
        let pos = self.blocks.iter().position(|b| b.id == id)?;
        Some(self.blocks.remove(pos))
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BarberRegistered {
        id: Ulid,
        display_name: String,
        phone: Option<String>,
        schedule: WeekSchedule,
    },
    ScheduleUpdated {
        barber_id: Ulid,
        schedule: WeekSchedule,
    },
    ServiceAdded {
        id: Ulid,
        name: String,
        price: i64,
        duration_min: u16,
    },
    ServiceUpdated {
        id: Ulid,
        name: String,
        price: i64,
        duration_min: u16,
    },
    ClientRegistered {
        id: Ulid,
        name: String,
        phone: String,
        email: Option<String>,
    },
    BlockAdded {
        id: Ulid,
        barber_id: Ulid,
        date: NaiveDate,
        all_day: bool,
        start_min: u16,
        end_min: u16,
        reason: Option<String>,
    },
    BlockRemoved {
        id: Ulid,
        barber_id: Ulid,
    },
    AppointmentBooked {
        id: Ulid,
        barber_id: Ulid,
        client_id: Ulid,
        service_id: Ulid,
        start: Ms,
        duration_min: u16,
        booked_by: BookingOrigin,
    },
    AppointmentStatusChanged {
        id: Ulid,
        barber_id: Ulid,
        status: AppointmentStatus,
    },
    WaitlistJoined {
        id: Ulid,
        date: NaiveDate,
        service_id: Ulid,
        name: String,
        phone: String,
        created_at: Ms,
    },
    WaitlistStatusChanged {
        id: Ulid,
        status: WaitlistStatus,
        notified: bool,
    },
}

/// Extract the owning barber id from barber-scoped events.
pub fn event_barber_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ScheduleUpdated { barber_id, .. }
        | Event::BlockAdded { barber_id, .. }
        | Event::BlockRemoved { barber_id, .. }
        | Event::AppointmentBooked { barber_id, .. }
        | Event::AppointmentStatusChanged { barber_id, .. } => Some(*barber_id),
        Event::BarberRegistered { .. }
        | Event::ServiceAdded { .. }
        | Event::ServiceUpdated { .. }
        | Event::ClientRegistered { .. }
        | Event::WaitlistJoined { .. }
        | Event::WaitlistStatusChanged { .. } => None,
    }
}
