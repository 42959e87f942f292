use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::clock::{format_hhmm, now_ms};
use crate::limits::*;
use crate::model::*;
use crate::notify;
use crate::observability;

use super::conflict::{check_bookable, validate_instant};
use super::{active_minute_spans, CancellationPolicy, Engine, EngineError, WalCommand};

/// Input to the booking transaction. `start` is the absolute instant; the
/// caller converts wall-clock input through the business clock first.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub barber_id: Ulid,
    pub service_id: Ulid,
    pub start: Ms,
    pub client_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub booked_by: BookingOrigin,
}

impl Engine {
    // ── Barbers & schedules ──────────────────────────────────

    pub async fn register_barber(
        &self,
        id: Ulid,
        display_name: &str,
        phone: Option<String>,
        schedule: WeekSchedule,
    ) -> Result<(), EngineError> {
        if self.barbers.len() >= MAX_BARBERS {
            return Err(EngineError::LimitExceeded("too many barbers"));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() || display_name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("barber name length"));
        }
        schedule.validate().map_err(EngineError::InvalidSchedule)?;
        if self.barbers.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::BarberRegistered {
            id,
            display_name: display_name.to_string(),
            phone: phone.clone(),
            schedule: schedule.clone(),
        };
        self.wal_append(&event).await?;
        let bs = BarberState::new(id, display_name.to_string(), phone, schedule);
        self.barbers
            .insert(id, std::sync::Arc::new(tokio::sync::RwLock::new(bs)));
        Ok(())
    }

    pub async fn update_schedule(
        &self,
        barber_id: Ulid,
        schedule: WeekSchedule,
    ) -> Result<(), EngineError> {
        schedule.validate().map_err(EngineError::InvalidSchedule)?;
        let bs = self
            .get_barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let mut guard = bs.write().await;
        let event = Event::ScheduleUpdated { barber_id, schedule };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Service catalog ──────────────────────────────────────

    pub async fn add_service(
        &self,
        id: Ulid,
        name: &str,
        price: i64,
        duration_min: u16,
    ) -> Result<(), EngineError> {
        if self.services.len() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("service name length"));
        }
        if duration_min == 0 || duration_min > MAX_SERVICE_MINUTES {
            return Err(EngineError::LimitExceeded("service duration"));
        }
        if self.services.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::ServiceAdded {
            id,
            name: name.to_string(),
            price,
            duration_min,
        };
        self.wal_append(&event).await?;
        self.apply_global(&event);
        Ok(())
    }

    pub async fn update_service(
        &self,
        id: Ulid,
        name: &str,
        price: i64,
        duration_min: u16,
    ) -> Result<(), EngineError> {
        if !self.services.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("service name length"));
        }
        if duration_min == 0 || duration_min > MAX_SERVICE_MINUTES {
            return Err(EngineError::LimitExceeded("service duration"));
        }
        let event = Event::ServiceUpdated {
            id,
            name: name.to_string(),
            price,
            duration_min,
        };
        self.wal_append(&event).await?;
        self.apply_global(&event);
        Ok(())
    }

    /// First-boot catalog so a fresh install can take bookings immediately.
    pub async fn seed_default_services(&self) -> Result<(), EngineError> {
        if !self.services.is_empty() {
            return Ok(());
        }
        let defaults: [(&str, i64, u16); 4] = [
            ("Classic Cut", 35_000, 30),
            ("Fade & Line-Up", 40_000, 45),
            ("Beard Trim", 25_000, 15),
            ("Cut & Beard", 55_000, 60),
        ];
        for (name, price, duration_min) in defaults {
            self.add_service(Ulid::new(), name, price, duration_min).await?;
        }
        tracing::info!("seeded default service catalog");
        Ok(())
    }

    // ── Identity store ───────────────────────────────────────

    /// Idempotent lookup-or-create keyed by phone. Two concurrent calls with
    /// the same new phone resolve to one client (directory gate).
    pub async fn find_or_create_client(
        &self,
        name: &str,
        phone: &str,
        email: Option<String>,
    ) -> Result<Ulid, EngineError> {
        let phone = phone.trim();
        if phone.is_empty() || phone.len() > MAX_PHONE_LEN {
            return Err(EngineError::LimitExceeded("phone length"));
        }
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("client name length"));
        }

        if let Some(existing) = self.clients_by_phone.get(phone) {
            return Ok(*existing.value());
        }

        let _gate = self.directory_gate.lock().await;
        // Re-check: another request may have registered this phone while we
        // waited for the gate.
        if let Some(existing) = self.clients_by_phone.get(phone) {
            return Ok(*existing.value());
        }
        if self.clients.len() >= MAX_CLIENTS {
            return Err(EngineError::LimitExceeded("too many clients"));
        }

        let id = Ulid::new();
        let event = Event::ClientRegistered {
            id,
            name: name.to_string(),
            phone: phone.to_string(),
            email,
        };
        self.wal_append(&event).await?;
        self.apply_global(&event);
        Ok(id)
    }

    // ── Booking transaction ──────────────────────────────────

    /// The write path: resolve client, validate under the barber's write
    /// lock, WAL-append, apply, then fire-and-forget notifications.
    pub async fn book(&self, req: BookingRequest) -> Result<super::AppointmentView, EngineError> {
        let started = std::time::Instant::now();
        let result = self.book_inner(req, false).await;
        metrics::histogram!(observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "confirmed",
            Err(EngineError::SlotTaken(_) | EngineError::SlotBlocked(_)) => "conflict",
            Err(EngineError::ClosedDay { .. } | EngineError::OutsideHours { .. }) => "rejected",
            Err(_) => "error",
        };
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn book_inner(
        &self,
        req: BookingRequest,
        quiet: bool,
    ) -> Result<super::AppointmentView, EngineError> {
        validate_instant(req.start)?;
        let service = self
            .services
            .get(&req.service_id)
            .map(|s| s.value().clone())
            .ok_or(EngineError::NotFound(req.service_id))?;

        let client_id = self
            .find_or_create_client(&req.client_name, &req.phone, req.email.clone())
            .await?;

        let bs = self
            .get_barber(&req.barber_id)
            .ok_or(EngineError::NotFound(req.barber_id))?;
        let mut guard = bs.write().await;
        if guard.appointments.len() >= MAX_APPOINTMENTS_PER_BARBER {
            return Err(EngineError::LimitExceeded("too many appointments on barber"));
        }

        let date = self.clock.business_date(req.start);
        let weekday = self.clock.weekday_index(req.start);
        let start_min = self.clock.minute_of_day(req.start);
        let day_start = self.clock.day_start(date);

        {
            let booked = active_minute_spans(&guard, day_start);
            let blocks: Vec<&BlockedInterval> = guard.blocks_on(date).collect();
            check_bookable(
                &guard.schedule,
                weekday,
                start_min,
                service.duration_min,
                &booked,
                &blocks,
            )?;
        }

        let id = Ulid::new();
        let event = Event::AppointmentBooked {
            id,
            barber_id: req.barber_id,
            client_id,
            service_id: req.service_id,
            start: req.start,
            duration_min: service.duration_min,
            booked_by: req.booked_by,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let barber_name = guard.display_name.clone();
        let barber_phone = guard.phone.clone();
        let appointment = guard.appointment(id).cloned().expect("just inserted");
        drop(guard);

        // The booking is durable; delivery failures from here on are logged
        // and counted, never surfaced to the caller.
        if !quiet {
            let date_str = self.clock.date_str(req.start);
            let time_str = format_hhmm(start_min);
            self.notify_best_effort(
                &req.phone,
                notify::confirmation_message(
                    &req.client_name,
                    &service.name,
                    &date_str,
                    &time_str,
                    &self.shop_name,
                ),
            );
            if let Some(barber_phone) = barber_phone {
                self.notify_best_effort(
                    &barber_phone,
                    notify::barber_alert_message(&req.client_name, &service.name, &date_str, &time_str),
                );
            }
        }

        Ok(self.assemble_view(req.barber_id, &barber_name, &appointment))
    }

    // ── Status changes & cancellation cascade ────────────────

    pub async fn update_appointment_status(
        &self,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<super::AppointmentView, EngineError> {
        let (barber_id, mut guard) = self.resolve_appointment_write(&id).await?;
        let current = guard
            .appointment(id)
            .ok_or(EngineError::NotFound(id))?
            .status;
        if !current.can_become(status) {
            return Err(EngineError::InvalidStatusChange { from: current, to: status });
        }

        let event = Event::AppointmentStatusChanged { id, barber_id, status };
        self.persist_and_apply(&mut guard, &event).await?;

        let barber_name = guard.display_name.clone();
        let barber_phone = guard.phone.clone();
        let updated = guard.appointment(id).cloned().expect("still present");
        drop(guard);

        if status == AppointmentStatus::Cancelled {
            metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
            self.run_cancellation_cascade(barber_id, barber_phone, &updated)
                .await;
        }

        Ok(self.assemble_view(barber_id, &barber_name, &updated))
    }

    /// Reacts to a CANCELLED transition. Never fails the triggering request:
    /// every error here is logged and swallowed.
    async fn run_cancellation_cascade(
        &self,
        barber_id: Ulid,
        barber_phone: Option<String>,
        cancelled: &Appointment,
    ) {
        let date_str = self.clock.date_str(cancelled.start);
        let time_str = format_hhmm(self.clock.minute_of_day(cancelled.start));
        let client_name = self
            .clients
            .get(&cancelled.client_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "Client".to_string());
        let service_name = self
            .services
            .get(&cancelled.service_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "service".to_string());

        if let Some(barber_phone) = barber_phone {
            self.notify_best_effort(
                &barber_phone,
                notify::cancellation_alert_message(&client_name, &service_name, &date_str, &time_str),
            );
        }

        match self.policy {
            CancellationPolicy::NotifyWaitlist => {
                let date = self.clock.business_date(cancelled.start);
                self.notify_waiting_entries(date).await;
            }
            CancellationPolicy::AutoPromote => {
                if let Err(e) = self
                    .promote_from_waitlist(barber_id, cancelled.start, cancelled.service_id)
                    .await
                {
                    tracing::warn!("waitlist promotion failed: {e}");
                }
            }
        }
    }

    /// Notify-only policy: every WAITING entry for the date gets a
    /// "slot freed" message and moves to NOTIFIED.
    async fn notify_waiting_entries(&self, date: NaiveDate) {
        let _gate = self.waitlist_gate.lock().await;
        let waiting: Vec<WaitlistEntry> = self
            .waitlist
            .iter()
            .filter(|e| e.date == date && e.status == WaitlistStatus::Waiting)
            .map(|e| e.value().clone())
            .collect();

        for entry in waiting {
            let event = Event::WaitlistStatusChanged {
                id: entry.id,
                status: WaitlistStatus::Notified,
                notified: true,
            };
            if let Err(e) = self.wal_append(&event).await {
                tracing::warn!("waitlist notify skipped for {}: {e}", entry.id);
                continue;
            }
            self.apply_global(&event);
            metrics::counter!(observability::WAITLIST_NOTIFICATIONS_TOTAL).increment(1);
            self.notify_best_effort(
                &entry.phone,
                notify::slot_freed_message(&entry.name, &date.to_string(), &self.shop_name),
            );
        }
    }

    // ── Waitlist promoter ────────────────────────────────────

    /// Book the best WAITING entry into the freed slot. Same-service entries
    /// win, oldest first; otherwise the oldest entry for the date. Runs under
    /// the waitlist gate so racing cancellations promote at most once per
    /// entry, and re-validates through the booking transaction — if the slot
    /// was re-taken meanwhile the entry simply stays WAITING.
    pub async fn promote_from_waitlist(
        &self,
        barber_id: Ulid,
        freed_start: Ms,
        freed_service_id: Ulid,
    ) -> Result<Option<Ulid>, EngineError> {
        let _gate = self.waitlist_gate.lock().await;
        let date = self.clock.business_date(freed_start);

        let mut candidates: Vec<WaitlistEntry> = self
            .waitlist
            .iter()
            .filter(|e| e.date == date && e.status == WaitlistStatus::Waiting)
            .map(|e| e.value().clone())
            .collect();
        candidates.sort_by_key(|e| (e.created_at, e.id));

        let entry = candidates
            .iter()
            .find(|e| e.service_id == freed_service_id)
            .or_else(|| candidates.first())
            .cloned();
        let Some(entry) = entry else {
            return Ok(None);
        };

        let request = BookingRequest {
            barber_id,
            service_id: entry.service_id,
            start: freed_start,
            client_name: entry.name.clone(),
            phone: entry.phone.clone(),
            email: None,
            booked_by: BookingOrigin::Barber,
        };

        match self.book_inner(request, true).await {
            Ok(view) => {
                let event = Event::WaitlistStatusChanged {
                    id: entry.id,
                    status: WaitlistStatus::Booked,
                    notified: true,
                };
                self.wal_append(&event).await?;
                self.apply_global(&event);
                metrics::counter!(observability::PROMOTIONS_TOTAL).increment(1);
                self.notify_best_effort(
                    &entry.phone,
                    notify::promotion_message(
                        &entry.name,
                        &view.service_name,
                        &view.date,
                        &view.time,
                        &self.shop_name,
                    ),
                );
                Ok(Some(entry.id))
            }
            Err(
                e @ (EngineError::SlotTaken(_)
                | EngineError::SlotBlocked(_)
                | EngineError::ClosedDay { .. }
                | EngineError::OutsideHours { .. }),
            ) => {
                tracing::warn!("freed slot no longer bookable, leaving {} waiting: {e}", entry.id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ── Waitlist membership ──────────────────────────────────

    pub async fn join_waitlist(
        &self,
        date: NaiveDate,
        service_id: Ulid,
        name: &str,
        phone: &str,
    ) -> Result<WaitlistEntry, EngineError> {
        let name = name.trim();
        let phone = phone.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("name length"));
        }
        if phone.is_empty() || phone.len() > MAX_PHONE_LEN {
            return Err(EngineError::LimitExceeded("phone length"));
        }
        if !self.services.contains_key(&service_id) {
            return Err(EngineError::NotFound(service_id));
        }

        let _gate = self.waitlist_gate.lock().await;
        if self.waitlist.len() >= MAX_WAITLIST_ENTRIES {
            return Err(EngineError::LimitExceeded("waitlist full"));
        }
        let duplicate = self
            .waitlist
            .iter()
            .any(|e| e.date == date && e.phone == phone && e.status == WaitlistStatus::Waiting);
        if duplicate {
            return Err(EngineError::AlreadyWaiting { date });
        }

        let id = Ulid::new();
        let event = Event::WaitlistJoined {
            id,
            date,
            service_id,
            name: name.to_string(),
            phone: phone.to_string(),
            created_at: now_ms(),
        };
        self.wal_append(&event).await?;
        self.apply_global(&event);
        Ok(self
            .waitlist
            .get(&id)
            .map(|e| e.value().clone())
            .expect("just inserted"))
    }

    pub async fn update_waitlist_status(
        &self,
        id: Ulid,
        status: WaitlistStatus,
    ) -> Result<WaitlistEntry, EngineError> {
        let _gate = self.waitlist_gate.lock().await;
        let current = self
            .waitlist
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        if !current.status.can_become(status) {
            return Err(EngineError::InvalidWaitlistChange { from: current.status, to: status });
        }
        let notified = current.notified || status == WaitlistStatus::Notified;
        let event = Event::WaitlistStatusChanged { id, status, notified };
        self.wal_append(&event).await?;
        self.apply_global(&event);
        Ok(self
            .waitlist
            .get(&id)
            .map(|e| e.value().clone())
            .expect("still present"))
    }

    // ── Blocked intervals ────────────────────────────────────

    pub async fn add_block(
        &self,
        barber_id: Ulid,
        date: NaiveDate,
        all_day: bool,
        start_min: u16,
        end_min: u16,
        reason: Option<String>,
    ) -> Result<BlockedInterval, EngineError> {
        // All-day blocks normalize to the full day regardless of input times.
        let (start_min, end_min) = if all_day { (0, MINUTES_PER_DAY) } else { (start_min, end_min) };
        if start_min >= end_min || end_min > MINUTES_PER_DAY {
            return Err(EngineError::InvalidBlock("start time must be before end time"));
        }
        if let Some(ref reason) = reason {
            if reason.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("reason length"));
            }
        }

        let bs = self
            .get_barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let mut guard = bs.write().await;
        if guard.blocks.len() >= MAX_BLOCKS_PER_BARBER {
            return Err(EngineError::LimitExceeded("too many blocked intervals"));
        }

        let id = Ulid::new();
        let event = Event::BlockAdded {
            id,
            barber_id,
            date,
            all_day,
            start_min,
            end_min,
            reason,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard
            .blocks
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .expect("just inserted"))
    }

    pub async fn remove_block(&self, id: Ulid) -> Result<(), EngineError> {
        let barber_id = self
            .block_to_barber
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let bs = self
            .get_barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let mut guard = bs.write().await;
        let event = Event::BlockRemoved { id, barber_id };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Notifications ────────────────────────────────────────

    /// Fire-and-forget: normalize the phone, spawn the send, count failures.
    pub(super) fn notify_best_effort(&self, phone: &str, message: String) {
        let notifier = self.notifier.clone();
        let phone = notify::normalize_phone(phone, &self.country_code);
        tokio::spawn(async move {
            metrics::counter!(observability::NOTIFICATIONS_TOTAL).increment(1);
            if let Err(e) = notifier.send(&phone, &message).await {
                metrics::counter!(observability::NOTIFICATION_FAILURES_TOTAL).increment(1);
                tracing::warn!(%phone, "notification send failed: {e}");
            }
        });
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for service in self.services.iter() {
            events.push(Event::ServiceAdded {
                id: service.id,
                name: service.name.clone(),
                price: service.price,
                duration_min: service.duration_min,
            });
        }
        for client in self.clients.iter() {
            events.push(Event::ClientRegistered {
                id: client.id,
                name: client.name.clone(),
                phone: client.phone.clone(),
                email: client.email.clone(),
            });
        }

        let barbers: Vec<super::SharedBarberState> =
            self.barbers.iter().map(|e| e.value().clone()).collect();
        for bs in barbers {
            let guard = bs.read().await;
            events.push(Event::BarberRegistered {
                id: guard.id,
                display_name: guard.display_name.clone(),
                phone: guard.phone.clone(),
                schedule: guard.schedule.clone(),
            });
            for block in &guard.blocks {
                events.push(Event::BlockAdded {
                    id: block.id,
                    barber_id: guard.id,
                    date: block.date,
                    all_day: block.all_day,
                    start_min: block.start_min,
                    end_min: block.end_min,
                    reason: block.reason.clone(),
                });
            }
            for appointment in &guard.appointments {
                events.push(Event::AppointmentBooked {
                    id: appointment.id,
                    barber_id: guard.id,
                    client_id: appointment.client_id,
                    service_id: appointment.service_id,
                    start: appointment.start,
                    duration_min: appointment.duration_min,
                    booked_by: appointment.booked_by,
                });
                if appointment.status != AppointmentStatus::Confirmed {
                    events.push(Event::AppointmentStatusChanged {
                        id: appointment.id,
                        barber_id: guard.id,
                        status: appointment.status,
                    });
                }
            }
        }

        for entry in self.waitlist.iter() {
            events.push(Event::WaitlistJoined {
                id: entry.id,
                date: entry.date,
                service_id: entry.service_id,
                name: entry.name.clone(),
                phone: entry.phone.clone(),
                created_at: entry.created_at,
            });
            if entry.status != WaitlistStatus::Waiting {
                events.push(Event::WaitlistStatusChanged {
                    id: entry.id,
                    status: entry.status,
                    notified: entry.notified,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
