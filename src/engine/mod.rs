mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{day_slots, DayAvailability, Slot};
pub use conflict::check_bookable;
pub use error::EngineError;
pub use mutations::BookingRequest;
pub use queries::{AppointmentView, BarberInfo, BlockView};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::clock::BusinessClock;
use crate::model::*;
use crate::notify::Notifier;
use crate::wal::Wal;

pub type SharedBarberState = Arc<RwLock<BarberState>>;

/// What the Cancellation Cascade does with the waitlist. Exactly one policy
/// is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationPolicy {
    /// Mark WAITING entries NOTIFIED and send a "slot freed" message.
    NotifyWaitlist,
    /// Book the best WAITING entry into the freed slot.
    AutoPromote,
}

impl std::str::FromStr for CancellationPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "notify" => Ok(Self::NotifyWaitlist),
            "promote" => Ok(Self::AutoPromote),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub clock: BusinessClock,
    pub policy: CancellationPolicy,
    pub shop_name: String,
    /// Default country code for phone normalization, e.g. "57".
    pub country_code: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clock: BusinessClock::from_offset_minutes(-300).expect("valid default offset"),
            policy: CancellationPolicy::AutoPromote,
            shop_name: "Chairtime".into(),
            country_code: "57".into(),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    /// One lock per barber: the booking read-validate-write path serializes
    /// here, and only here.
    pub barbers: DashMap<Ulid, SharedBarberState>,
    pub(super) services: DashMap<Ulid, Service>,
    pub(super) clients: DashMap<Ulid, Client>,
    pub(super) clients_by_phone: DashMap<String, Ulid>,
    pub(super) waitlist: DashMap<Ulid, WaitlistEntry>,
    /// Reverse lookups: appointment/block id → barber id.
    pub(super) appointment_to_barber: DashMap<Ulid, Ulid>,
    pub(super) block_to_barber: DashMap<Ulid, Ulid>,
    /// Serializes waitlist writes: racing cancellations cannot double-promote
    /// one entry, and racing joins cannot duplicate a (date, phone) pair.
    pub(super) waitlist_gate: Mutex<()>,
    /// Serializes client creation so one phone never maps to two clients.
    pub(super) directory_gate: Mutex<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub clock: BusinessClock,
    pub(super) policy: CancellationPolicy,
    pub(super) shop_name: String,
    pub(super) country_code: String,
}

/// Apply a barber-scoped event directly to a BarberState (no locking — the
/// caller holds the lock).
fn apply_to_barber(
    bs: &mut BarberState,
    event: &Event,
    appointment_index: &DashMap<Ulid, Ulid>,
    block_index: &DashMap<Ulid, Ulid>,
) {
    match event {
        Event::ScheduleUpdated { schedule, .. } => {
            bs.schedule = schedule.clone();
        }
        Event::BlockAdded {
            id,
            barber_id,
            date,
            all_day,
            start_min,
            end_min,
            reason,
        } => {
            bs.blocks.push(BlockedInterval {
                id: *id,
                date: *date,
                all_day: *all_day,
                start_min: *start_min,
                end_min: *end_min,
                reason: reason.clone(),
            });
            block_index.insert(*id, *barber_id);
        }
        Event::BlockRemoved { id, .. } => {
            bs.remove_block(*id);
            block_index.remove(id);
        }
        Event::AppointmentBooked {
            id,
            barber_id,
            client_id,
            service_id,
            start,
            duration_min,
            booked_by,
        } => {
            bs.insert_appointment(Appointment {
                id: *id,
                client_id: *client_id,
                service_id: *service_id,
                start: *start,
                duration_min: *duration_min,
                status: AppointmentStatus::Confirmed,
                booked_by: *booked_by,
            });
            appointment_index.insert(*id, *barber_id);
        }
        Event::AppointmentStatusChanged { id, status, .. } => {
            if let Some(appointment) = bs.appointment_mut(*id) {
                appointment.status = *status;
            }
        }
        // Registration and global events are handled at the map level.
        _ => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            barbers: DashMap::new(),
            services: DashMap::new(),
            clients: DashMap::new(),
            clients_by_phone: DashMap::new(),
            waitlist: DashMap::new(),
            appointment_to_barber: DashMap::new(),
            block_to_barber: DashMap::new(),
            waitlist_gate: Mutex::new(()),
            directory_gate: Mutex::new(()),
            wal_tx,
            notifier,
            clock: config.clock,
            policy: config.policy,
            shop_name: config.shop_name,
            country_code: config.country_code,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because this runs inside an async context.
        for event in &events {
            match event {
                Event::BarberRegistered { id, display_name, phone, schedule } => {
                    let bs = BarberState::new(*id, display_name.clone(), phone.clone(), schedule.clone());
                    engine.barbers.insert(*id, Arc::new(RwLock::new(bs)));
                }
                other => {
                    if let Some(barber_id) = event_barber_id(other) {
                        if let Some(entry) = engine.barbers.get(&barber_id) {
                            let bs_arc = entry.value().clone();
                            let mut guard = bs_arc.try_write().expect("replay: uncontended write");
                            apply_to_barber(
                                &mut guard,
                                other,
                                &engine.appointment_to_barber,
                                &engine.block_to_barber,
                            );
                        }
                    } else {
                        engine.apply_global(other);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Apply a non-barber-scoped event to the engine-level maps. Used by
    /// replay and by the live mutation paths.
    pub(super) fn apply_global(&self, event: &Event) {
        match event {
            Event::ServiceAdded { id, name, price, duration_min }
            | Event::ServiceUpdated { id, name, price, duration_min } => {
                self.services.insert(
                    *id,
                    Service {
                        id: *id,
                        name: name.clone(),
                        price: *price,
                        duration_min: *duration_min,
                    },
                );
            }
            Event::ClientRegistered { id, name, phone, email } => {
                self.clients.insert(
                    *id,
                    Client {
                        id: *id,
                        name: name.clone(),
                        phone: phone.clone(),
                        email: email.clone(),
                    },
                );
                // First registration for a phone wins; duplicates can only
                // appear in a WAL written before the directory gate existed.
                self.clients_by_phone.entry(phone.clone()).or_insert(*id);
            }
            Event::WaitlistJoined { id, date, service_id, name, phone, created_at } => {
                self.waitlist.insert(
                    *id,
                    WaitlistEntry {
                        id: *id,
                        date: *date,
                        service_id: *service_id,
                        name: name.clone(),
                        phone: phone.clone(),
                        status: WaitlistStatus::Waiting,
                        notified: false,
                        created_at: *created_at,
                    },
                );
            }
            Event::WaitlistStatusChanged { id, status, notified } => {
                if let Some(mut entry) = self.waitlist.get_mut(id) {
                    entry.status = *status;
                    entry.notified = *notified;
                }
            }
            _ => {}
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_barber(&self, id: &Ulid) -> Option<SharedBarberState> {
        self.barbers.get(id).map(|e| e.value().clone())
    }

    pub fn barber_of_appointment(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_to_barber
            .get(appointment_id)
            .map(|e| *e.value())
    }

    /// WAL-append + apply in one call, under the caller's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        bs: &mut BarberState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_barber(bs, event, &self.appointment_to_barber, &self.block_to_barber);
        Ok(())
    }

    /// Lookup appointment → barber, get the barber, acquire its write lock.
    pub(super) async fn resolve_appointment_write(
        &self,
        appointment_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<BarberState>), EngineError> {
        let barber_id = self
            .barber_of_appointment(appointment_id)
            .ok_or(EngineError::NotFound(*appointment_id))?;
        let bs = self
            .get_barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let guard = bs.write_owned().await;
        Ok((barber_id, guard))
    }
}

/// Active (slot-occupying) appointment intervals for one business day, as
/// (id, start_min, end_min). `day_start` is business midnight of the date.
pub(super) fn active_minute_spans(bs: &BarberState, day_start: Ms) -> Vec<(Ulid, u16, u16)> {
    let day_end = day_start + Ms::from(MINUTES_PER_DAY) * MS_PER_MINUTE;
    bs.appointments_in(day_start, day_end)
        .filter(|a| a.is_active())
        .map(|a| {
            // Bookings never cross business midnight (the hours check caps
            // them at close), so the subtraction cannot go negative.
            let start_min = ((a.start - day_start) / MS_PER_MINUTE) as u16;
            (a.id, start_min, start_min + a.duration_min)
        })
        .collect()
}
