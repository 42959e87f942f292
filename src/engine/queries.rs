use chrono::NaiveDate;
use serde::Serialize;
use ulid::Ulid;

use crate::clock::{format_hhmm, now_ms, weekday_of_date};
use crate::model::*;
use crate::observability;

use super::availability::{self, DayAvailability};
use super::{active_minute_spans, Engine, EngineError, SharedBarberState};

/// Appointment joined with its client, service, and barber for the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: Ulid,
    pub barber_id: Ulid,
    pub barber_name: String,
    pub client_name: String,
    pub client_phone: String,
    pub service_id: Ulid,
    pub service_name: String,
    pub start: Ms,
    /// Business-timezone renderings of `start`.
    pub date: String,
    pub time: String,
    pub duration_min: u16,
    pub status: AppointmentStatus,
    pub booked_by: BookingOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarberInfo {
    pub id: Ulid,
    pub display_name: String,
    pub phone: Option<String>,
    pub schedule: WeekSchedule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockView {
    pub id: Ulid,
    pub barber_id: Ulid,
    pub date: NaiveDate,
    pub all_day: bool,
    pub start_min: u16,
    pub end_min: u16,
    pub reason: Option<String>,
}

impl Engine {
    /// The slot grid for one barber-day, using the service's *current*
    /// duration. Distinguishes day-off and blocked from fully booked.
    pub async fn day_slots(
        &self,
        barber_id: Ulid,
        date: NaiveDate,
        service_id: Ulid,
    ) -> Result<DayAvailability, EngineError> {
        let service = self
            .services
            .get(&service_id)
            .map(|s| s.value().clone())
            .ok_or(EngineError::NotFound(service_id))?;
        let bs = self
            .get_barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let guard = bs.read().await;

        let weekday = weekday_of_date(date);
        let day_start = self.clock.day_start(date);
        let booked: Vec<(u16, u16)> = active_minute_spans(&guard, day_start)
            .into_iter()
            .map(|(_, start, end)| (start, end))
            .collect();
        let blocks: Vec<&BlockedInterval> = guard.blocks_on(date).collect();

        let now = now_ms();
        let now_min =
            (self.clock.business_date(now) == date).then(|| self.clock.minute_of_day(now));

        metrics::counter!(observability::SLOT_QUERIES_TOTAL).increment(1);
        Ok(availability::day_slots(
            &guard.schedule,
            weekday,
            &blocks,
            &booked,
            service.duration_min,
            now_min,
        ))
    }

    pub async fn get_appointment(&self, id: Ulid) -> Result<AppointmentView, EngineError> {
        let barber_id = self
            .barber_of_appointment(&id)
            .ok_or(EngineError::NotFound(id))?;
        let bs = self
            .get_barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let guard = bs.read().await;
        let appointment = guard.appointment(id).ok_or(EngineError::NotFound(id))?;
        Ok(self.assemble_view(barber_id, &guard.display_name, appointment))
    }

    pub async fn list_appointments(
        &self,
        barber_id: Option<Ulid>,
        date: Option<NaiveDate>,
        status: Option<AppointmentStatus>,
    ) -> Vec<AppointmentView> {
        let shared: Vec<(Ulid, SharedBarberState)> = self
            .barbers
            .iter()
            .filter(|e| barber_id.is_none_or(|id| *e.key() == id))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut views = Vec::new();
        for (id, bs) in shared {
            let guard = bs.read().await;
            for appointment in &guard.appointments {
                if let Some(d) = date {
                    if self.clock.business_date(appointment.start) != d {
                        continue;
                    }
                }
                if let Some(s) = status {
                    if appointment.status != s {
                        continue;
                    }
                }
                views.push(self.assemble_view(id, &guard.display_name, appointment));
            }
        }
        views.sort_by_key(|v| v.start);
        views
    }

    pub async fn list_blocks(
        &self,
        barber_id: Option<Ulid>,
        date: Option<NaiveDate>,
    ) -> Vec<BlockView> {
        let shared: Vec<(Ulid, SharedBarberState)> = self
            .barbers
            .iter()
            .filter(|e| barber_id.is_none_or(|id| *e.key() == id))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut views = Vec::new();
        for (id, bs) in shared {
            let guard = bs.read().await;
            for block in &guard.blocks {
                if date.is_none_or(|d| block.date == d) {
                    views.push(BlockView {
                        id: block.id,
                        barber_id: id,
                        date: block.date,
                        all_day: block.all_day,
                        start_min: block.start_min,
                        end_min: block.end_min,
                        reason: block.reason.clone(),
                    });
                }
            }
        }
        views.sort_by_key(|v| (v.date, v.start_min));
        views
    }

    pub async fn list_barbers(&self) -> Vec<BarberInfo> {
        let shared: Vec<SharedBarberState> =
            self.barbers.iter().map(|e| e.value().clone()).collect();
        let mut infos = Vec::with_capacity(shared.len());
        for bs in shared {
            let guard = bs.read().await;
            infos.push(BarberInfo {
                id: guard.id,
                display_name: guard.display_name.clone(),
                phone: guard.phone.clone(),
                schedule: guard.schedule.clone(),
            });
        }
        infos.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        infos
    }

    pub fn list_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> =
            self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub fn get_service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn get_client(&self, id: &Ulid) -> Option<Client> {
        self.clients.get(id).map(|e| e.value().clone())
    }

    pub fn get_waitlist_entry(&self, id: &Ulid) -> Option<WaitlistEntry> {
        self.waitlist.get(id).map(|e| e.value().clone())
    }

    pub fn list_waitlist(
        &self,
        date: Option<NaiveDate>,
        status: Option<WaitlistStatus>,
    ) -> Vec<WaitlistEntry> {
        let mut entries: Vec<WaitlistEntry> = self
            .waitlist
            .iter()
            .filter(|e| date.is_none_or(|d| e.date == d))
            .filter(|e| status.is_none_or(|s| e.status == s))
            .map(|e| e.value().clone())
            .collect();
        // Newest first, matching the dashboard's reading order.
        entries.sort_by_key(|e| std::cmp::Reverse((e.created_at, e.id)));
        entries
    }

    pub(super) fn assemble_view(
        &self,
        barber_id: Ulid,
        barber_name: &str,
        appointment: &Appointment,
    ) -> AppointmentView {
        let client = self.get_client(&appointment.client_id);
        let service = self.get_service(&appointment.service_id);
        AppointmentView {
            id: appointment.id,
            barber_id,
            barber_name: barber_name.to_string(),
            client_name: client.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
            client_phone: client.map(|c| c.phone).unwrap_or_default(),
            service_id: appointment.service_id,
            service_name: service.map(|s| s.name).unwrap_or_default(),
            start: appointment.start,
            date: self.clock.date_str(appointment.start),
            time: format_hhmm(self.clock.minute_of_day(appointment.start)),
            duration_min: appointment.duration_min,
            status: appointment.status,
            booked_by: appointment.booked_by,
        }
    }
}
