use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use super::*;
use crate::clock::{parse_hhmm, weekday_of_date};
use crate::notify::LogNotifier;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("chairtime_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn engine_with(name: &str, policy: CancellationPolicy) -> Engine {
    let config = EngineConfig { policy, ..EngineConfig::default() };
    Engine::new(test_wal_path(name), Arc::new(LogNotifier), config).unwrap()
}

fn engine(name: &str) -> Engine {
    engine_with(name, CancellationPolicy::AutoPromote)
}

/// A weekday in the far future with the default schedule fully open.
fn open_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

fn at(engine: &Engine, date: NaiveDate, time: &str) -> Ms {
    engine.clock.instant(date, parse_hhmm(time).unwrap())
}

/// Register a 09:00-19:00 barber on a 15-minute grid plus a 30-minute service.
async fn setup_shop(engine: &Engine) -> (Ulid, Ulid) {
    let barber_id = Ulid::new();
    engine
        .register_barber(barber_id, "Ana", Some("3000000001".into()), WeekSchedule::new(540, 1140, 15))
        .await
        .unwrap();
    let service_id = Ulid::new();
    engine
        .add_service(service_id, "Classic Cut", 35_000, 30)
        .await
        .unwrap();
    (barber_id, service_id)
}

fn request(barber_id: Ulid, service_id: Ulid, start: Ms, phone: &str) -> BookingRequest {
    BookingRequest {
        barber_id,
        service_id,
        start,
        client_name: "Test Client".into(),
        phone: phone.into(),
        email: None,
        booked_by: BookingOrigin::Client,
    }
}

fn available_times(result: &DayAvailability) -> Vec<u16> {
    result
        .slots
        .iter()
        .filter(|s| s.available)
        .map(|s| s.minute)
        .collect()
}

// ── Availability resolver ────────────────────────────────

#[tokio::test]
async fn resolver_full_grid_open_day() {
    let engine = engine("grid.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;

    let result = engine.day_slots(barber_id, open_date(), service_id).await.unwrap();
    assert!(!result.day_off);
    assert!(!result.blocked);
    // 09:00 through 18:30 every 15 minutes for a 30-minute service.
    assert_eq!(result.slots.len(), 39);
    assert_eq!(result.slots[0].minute, 540);
    assert_eq!(result.slots.last().unwrap().minute, 1110);
    assert!(result.slots.iter().all(|s| s.available));
}

#[tokio::test]
async fn resolver_flags_day_off() {
    let engine = engine("day_off.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;

    let date = open_date();
    let mut schedule = WeekSchedule::new(540, 1140, 15);
    schedule.days_off[usize::from(weekday_of_date(date))] = true;
    engine.update_schedule(barber_id, schedule).await.unwrap();

    let result = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(result.day_off);
    assert!(!result.blocked);
    assert!(result.slots.is_empty());
}

#[tokio::test]
async fn resolver_flags_all_day_block() {
    let engine = engine("all_day_block.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    engine
        .add_block(barber_id, date, true, 0, 0, Some("family day".into()))
        .await
        .unwrap();

    let result = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(result.blocked);
    assert!(!result.day_off);
    assert!(result.slots.is_empty());
}

#[tokio::test]
async fn resolver_unknown_ids() {
    let engine = engine("resolver_unknown.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;

    let err = engine
        .day_slots(Ulid::new(), open_date(), service_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let err = engine
        .day_slots(barber_id, open_date(), Ulid::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── Booking transaction ──────────────────────────────────

#[tokio::test]
async fn booking_roundtrip_marks_slot_taken() {
    let engine = engine("roundtrip.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    let before = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(before.slots.iter().any(|s| s.minute == 600 && s.available));

    let view = engine
        .book(request(barber_id, service_id, at(&engine, date, "10:00"), "3001112233"))
        .await
        .unwrap();
    assert_eq!(view.status, AppointmentStatus::Confirmed);
    assert_eq!(view.time, "10:00");

    let after = engine.day_slots(barber_id, date, service_id).await.unwrap();
    let ten = after.slots.iter().find(|s| s.minute == 600).unwrap();
    assert!(!ten.available);
    // Overlapping candidates flip too; adjacent ones stay open.
    let nine_forty_five = after.slots.iter().find(|s| s.minute == 585).unwrap();
    assert!(!nine_forty_five.available);
    let ten_thirty = after.slots.iter().find(|s| s.minute == 630).unwrap();
    assert!(ten_thirty.available);
}

#[tokio::test]
async fn overlapping_booking_is_slot_taken() {
    let engine = engine("overlap.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    engine
        .book(request(barber_id, service_id, at(&engine, date, "10:00"), "3001112233"))
        .await
        .unwrap();

    let err = engine
        .book(request(barber_id, service_id, at(&engine, date, "10:15"), "3009998877"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotTaken(_)));
}

#[tokio::test]
async fn boundary_last_slot_books_one_step_later_does_not() {
    let engine = engine("boundary.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    engine
        .book(request(barber_id, service_id, at(&engine, date, "18:30"), "3001112233"))
        .await
        .unwrap();

    let err = engine
        .book(request(barber_id, service_id, at(&engine, date, "18:45"), "3009998877"))
        .await
        .unwrap_err();
    match err {
        EngineError::OutsideHours { open_min, close_min } => {
            assert_eq!(open_min, 540);
            assert_eq!(close_min, 1140);
        }
        other => panic!("expected OutsideHours, got {other}"),
    }
}

#[tokio::test]
async fn booking_on_day_off_is_closed_day() {
    let engine = engine("closed.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    let mut schedule = WeekSchedule::new(540, 1140, 15);
    schedule.days_off[usize::from(weekday_of_date(date))] = true;
    engine.update_schedule(barber_id, schedule).await.unwrap();

    let err = engine
        .book(request(barber_id, service_id, at(&engine, date, "10:00"), "3001112233"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ClosedDay { .. }));
}

#[tokio::test]
async fn override_reopens_day_off_with_its_own_hours() {
    let engine = engine("override.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();
    let weekday = usize::from(weekday_of_date(date));

    let mut schedule = WeekSchedule::new(540, 1140, 15);
    schedule.overrides[weekday] = Some(DayWindow { open_min: 600, close_min: 840 });
    engine.update_schedule(barber_id, schedule).await.unwrap();

    // Inside the override window.
    engine
        .book(request(barber_id, service_id, at(&engine, date, "10:00"), "3001112233"))
        .await
        .unwrap();

    // Before the override opens — the error carries the override's hours.
    let err = engine
        .book(request(barber_id, service_id, at(&engine, date, "09:00"), "3009998877"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::OutsideHours { open_min: 600, close_min: 840 }
    ));
}

#[tokio::test]
async fn booking_inside_block_rejected() {
    let engine = engine("block_booking.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    engine
        .add_block(barber_id, date, false, 720, 780, Some("lunch".into()))
        .await
        .unwrap();

    let err = engine
        .book(request(barber_id, service_id, at(&engine, date, "12:30"), "3001112233"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotBlocked(_)));

    // A start just before the block is allowed (block excludes starts only).
    engine
        .book(request(barber_id, service_id, at(&engine, date, "11:30"), "3001112233"))
        .await
        .unwrap();
}

#[tokio::test]
async fn removed_block_frees_slots() {
    let engine = engine("block_remove.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    let block = engine
        .add_block(barber_id, date, false, 720, 780, None)
        .await
        .unwrap();
    let result = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(!available_times(&result).contains(&720));

    engine.remove_block(block.id).await.unwrap();
    let result = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(available_times(&result).contains(&720));
}

#[tokio::test]
async fn concurrent_same_slot_only_one_confirms() {
    let engine = Arc::new(engine("race.wal"));
    let (barber_id, service_id) = setup_shop(&engine).await;
    let start = at(&engine, open_date(), "11:00");

    let r1 = engine.book(request(barber_id, service_id, start, "3001110001"));
    let r2 = engine.book(request(barber_id, service_id, start, "3001110002"));
    let (r1, r2) = tokio::join!(r1, r2);

    assert!(r1.is_ok() != r2.is_ok(), "exactly one booking must win");
    let loser = r1.err().or(r2.err()).unwrap();
    assert!(matches!(loser, EngineError::SlotTaken(_)));
}

#[tokio::test]
async fn different_barbers_do_not_conflict() {
    let engine = engine("two_barbers.wal");
    let (barber_a, service_id) = setup_shop(&engine).await;
    let barber_b = Ulid::new();
    engine
        .register_barber(barber_b, "Luis", None, WeekSchedule::new(540, 1140, 15))
        .await
        .unwrap();

    let start = at(&engine, open_date(), "10:00");
    engine.book(request(barber_a, service_id, start, "3001110001")).await.unwrap();
    engine.book(request(barber_b, service_id, start, "3001110002")).await.unwrap();
}

#[tokio::test]
async fn booking_unknown_service_or_barber() {
    let engine = engine("unknown.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let start = at(&engine, open_date(), "10:00");

    let err = engine
        .book(request(barber_id, Ulid::new(), start, "3001112233"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let err = engine
        .book(request(Ulid::new(), service_id, start, "3001112233"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn duration_is_captured_but_availability_rereads_catalog() {
    let engine = engine("duration_reread.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    engine
        .book(request(barber_id, service_id, at(&engine, date, "10:00"), "3001112233"))
        .await
        .unwrap();

    // Service grows to 45 minutes after the booking.
    engine
        .update_service(service_id, "Classic Cut", 35_000, 45)
        .await
        .unwrap();

    let result = engine.day_slots(barber_id, date, service_id).await.unwrap();
    // Grid now ends at close - 45.
    assert_eq!(result.slots.last().unwrap().minute, 1095);
    let available = available_times(&result);
    // The existing appointment still occupies only its captured 10:00-10:30.
    assert!(available.contains(&630));
    // A 45-minute candidate at 09:45 would now run into it.
    assert!(!available.contains(&585));
}

// ── Identity store ───────────────────────────────────────

#[tokio::test]
async fn find_or_create_client_is_idempotent_on_phone() {
    let engine = engine("identity.wal");

    let first = engine
        .find_or_create_client("Carlos", "3001234567", None)
        .await
        .unwrap();
    let second = engine
        .find_or_create_client("Carlos R.", "3001234567", Some("c@example.com".into()))
        .await
        .unwrap();
    assert_eq!(first, second);

    let other = engine
        .find_or_create_client("Marta", "3007654321", None)
        .await
        .unwrap();
    assert_ne!(first, other);
}

#[tokio::test]
async fn concurrent_find_or_create_single_client() {
    let engine = Arc::new(engine("identity_race.wal"));
    let a = engine.find_or_create_client("Carlos", "3001234567", None);
    let b = engine.find_or_create_client("Carlos", "3001234567", None);
    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.unwrap(), b.unwrap());
}

// ── Status changes ───────────────────────────────────────

#[tokio::test]
async fn status_transitions_are_forward_only() {
    let engine = engine("transitions.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let view = engine
        .book(request(barber_id, service_id, at(&engine, open_date(), "10:00"), "3001112233"))
        .await
        .unwrap();

    engine
        .update_appointment_status(view.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let err = engine
        .update_appointment_status(view.id, AppointmentStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStatusChange {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Confirmed
        }
    ));
}

#[tokio::test]
async fn cancelled_slot_reopens() {
    let engine = engine("reopen.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    let view = engine
        .book(request(barber_id, service_id, at(&engine, date, "14:00"), "3001112233"))
        .await
        .unwrap();
    let taken = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(!available_times(&taken).contains(&840));

    engine
        .update_appointment_status(view.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();
    let freed = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(available_times(&freed).contains(&840));
}

#[tokio::test]
async fn unknown_appointment_status_change() {
    let engine = engine("unknown_status.wal");
    setup_shop(&engine).await;
    let err = engine
        .update_appointment_status(Ulid::new(), AppointmentStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── Waitlist ─────────────────────────────────────────────

#[tokio::test]
async fn duplicate_waiting_entry_rejected() {
    let engine = engine("wl_dup.wal");
    let (_, service_id) = setup_shop(&engine).await;
    let date = open_date();

    engine
        .join_waitlist(date, service_id, "Marta", "3005550001")
        .await
        .unwrap();
    let err = engine
        .join_waitlist(date, service_id, "Marta", "3005550001")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyWaiting { .. }));

    // A different date is a separate queue.
    engine
        .join_waitlist(date.succ_opt().unwrap(), service_id, "Marta", "3005550001")
        .await
        .unwrap();
}

#[tokio::test]
async fn waitlist_manual_transitions() {
    let engine = engine("wl_transitions.wal");
    let (_, service_id) = setup_shop(&engine).await;
    let entry = engine
        .join_waitlist(open_date(), service_id, "Marta", "3005550001")
        .await
        .unwrap();
    assert_eq!(entry.status, WaitlistStatus::Waiting);

    let entry = engine
        .update_waitlist_status(entry.id, WaitlistStatus::Notified)
        .await
        .unwrap();
    assert_eq!(entry.status, WaitlistStatus::Notified);
    assert!(entry.notified);

    let entry = engine
        .update_waitlist_status(entry.id, WaitlistStatus::Expired)
        .await
        .unwrap();
    assert_eq!(entry.status, WaitlistStatus::Expired);

    let err = engine
        .update_waitlist_status(entry.id, WaitlistStatus::Booked)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidWaitlistChange { .. }));
}

#[tokio::test]
async fn cancellation_promotes_matching_waitlist_entry() {
    let engine = engine("promote.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();
    let start = at(&engine, date, "14:00");

    let booked = engine
        .book(request(barber_id, service_id, start, "3001112233"))
        .await
        .unwrap();
    let entry = engine
        .join_waitlist(date, service_id, "Marta", "3005550001")
        .await
        .unwrap();

    engine
        .update_appointment_status(booked.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let entry = engine.get_waitlist_entry(&entry.id).unwrap();
    assert_eq!(entry.status, WaitlistStatus::Booked);
    assert!(entry.notified);

    // A new CONFIRMED appointment sits at the freed instant, system-booked.
    let views = engine.list_appointments(Some(barber_id), Some(date), None).await;
    let promoted = views
        .iter()
        .find(|v| v.start == start && v.status == AppointmentStatus::Confirmed)
        .expect("promoted appointment");
    assert_eq!(promoted.booked_by, BookingOrigin::Barber);
    assert_eq!(promoted.client_name, "Marta");
    assert_ne!(promoted.id, booked.id);
}

#[tokio::test]
async fn promotion_prefers_same_service_over_older_entry() {
    let engine = engine("promote_service.wal");
    let (barber_id, cut_id) = setup_shop(&engine).await;
    let beard_id = Ulid::new();
    engine.add_service(beard_id, "Beard Trim", 25_000, 15).await.unwrap();
    let date = open_date();

    // Older entry wants the beard trim, newer one wants the freed service.
    engine.join_waitlist(date, beard_id, "First", "3005550001").await.unwrap();
    let matching = engine
        .join_waitlist(date, cut_id, "Second", "3005550002")
        .await
        .unwrap();

    let booked = engine
        .book(request(barber_id, cut_id, at(&engine, date, "15:00"), "3001112233"))
        .await
        .unwrap();
    engine
        .update_appointment_status(booked.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let matching = engine.get_waitlist_entry(&matching.id).unwrap();
    assert_eq!(matching.status, WaitlistStatus::Booked);
}

#[tokio::test]
async fn promotion_falls_back_to_oldest_any_service() {
    let engine = engine("promote_fallback.wal");
    let (barber_id, cut_id) = setup_shop(&engine).await;
    let beard_id = Ulid::new();
    engine.add_service(beard_id, "Beard Trim", 25_000, 15).await.unwrap();
    let date = open_date();

    let oldest = engine
        .join_waitlist(date, beard_id, "First", "3005550001")
        .await
        .unwrap();
    engine.join_waitlist(date, beard_id, "Second", "3005550002").await.unwrap();

    let booked = engine
        .book(request(barber_id, cut_id, at(&engine, date, "15:00"), "3001112233"))
        .await
        .unwrap();
    engine
        .update_appointment_status(booked.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let oldest = engine.get_waitlist_entry(&oldest.id).unwrap();
    assert_eq!(oldest.status, WaitlistStatus::Booked);
    // The promoted booking used the entry's own service.
    let views = engine.list_appointments(Some(barber_id), Some(date), None).await;
    let promoted = views
        .iter()
        .find(|v| v.status == AppointmentStatus::Confirmed)
        .unwrap();
    assert_eq!(promoted.service_id, beard_id);
    assert_eq!(promoted.duration_min, 15);
}

#[tokio::test]
async fn notify_policy_marks_entries_without_booking() {
    let engine = engine_with("notify_policy.wal", CancellationPolicy::NotifyWaitlist);
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    let booked = engine
        .book(request(barber_id, service_id, at(&engine, date, "14:00"), "3001112233"))
        .await
        .unwrap();
    let e1 = engine.join_waitlist(date, service_id, "Marta", "3005550001").await.unwrap();
    let e2 = engine.join_waitlist(date, service_id, "Pedro", "3005550002").await.unwrap();

    engine
        .update_appointment_status(booked.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    for id in [e1.id, e2.id] {
        let entry = engine.get_waitlist_entry(&id).unwrap();
        assert_eq!(entry.status, WaitlistStatus::Notified);
        assert!(entry.notified);
    }
    // Nobody was auto-booked; the slot stays free.
    let result = engine.day_slots(barber_id, date, service_id).await.unwrap();
    assert!(available_times(&result).contains(&840));
}

#[tokio::test]
async fn promotion_skipped_when_slot_retaken() {
    let engine = engine("promote_retaken.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let date = open_date();

    let waiting = engine
        .join_waitlist(date, service_id, "Pedro", "3005550002")
        .await
        .unwrap();
    // The slot the promoter is pointed at is already occupied.
    engine
        .book(request(barber_id, service_id, at(&engine, date, "14:30"), "3001110003"))
        .await
        .unwrap();

    let result = engine
        .promote_from_waitlist(barber_id, at(&engine, date, "14:30"), service_id)
        .await
        .unwrap();
    assert!(result.is_none(), "occupied slot must not promote");
    let waiting = engine.get_waitlist_entry(&waiting.id).unwrap();
    assert_eq!(waiting.status, WaitlistStatus::Waiting);
}

#[tokio::test]
async fn promotion_with_empty_waitlist_is_noop() {
    let engine = engine("promote_empty.wal");
    let (barber_id, service_id) = setup_shop(&engine).await;
    let result = engine
        .promote_from_waitlist(barber_id, at(&engine, open_date(), "14:00"), service_id)
        .await
        .unwrap();
    assert!(result.is_none());
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_full_state() {
    let path = test_wal_path("replay.wal");
    let date = open_date();
    let (barber_id, service_id) = {
        let engine =
            Engine::new(path.clone(), Arc::new(LogNotifier), EngineConfig::default()).unwrap();
        let ids = setup_shop(&engine).await;
        engine
            .book(request(ids.0, ids.1, at(&engine, date, "10:00"), "3001112233"))
            .await
            .unwrap();
        engine
            .add_block(ids.0, date, false, 720, 780, Some("lunch".into()))
            .await
            .unwrap();
        engine
            .join_waitlist(date, ids.1, "Marta", "3005550001")
            .await
            .unwrap();
        ids
    };

    let engine = Engine::new(path, Arc::new(LogNotifier), EngineConfig::default()).unwrap();
    let result = engine.day_slots(barber_id, date, service_id).await.unwrap();
    let available = available_times(&result);
    assert!(!available.contains(&600), "booked slot survives restart");
    assert!(!available.contains(&720), "block survives restart");

    let appointments = engine.list_appointments(Some(barber_id), Some(date), None).await;
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].client_name, "Test Client");
    assert_eq!(appointments[0].client_phone, "3001112233");

    let waiting = engine.list_waitlist(Some(date), Some(WaitlistStatus::Waiting));
    assert_eq!(waiting.len(), 1);

    // The phone index also survives: the same phone keeps resolving to one
    // client instead of minting a duplicate.
    let first = engine
        .find_or_create_client("Test Client", "3001112233", None)
        .await
        .unwrap();
    let second = engine
        .find_or_create_client("Test Client", "3001112233", None)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn compaction_preserves_observable_state() {
    let path = test_wal_path("compact_state.wal");
    let date = open_date();
    let engine = Engine::new(path.clone(), Arc::new(LogNotifier), EngineConfig::default()).unwrap();
    let (barber_id, service_id) = setup_shop(&engine).await;

    let view = engine
        .book(request(barber_id, service_id, at(&engine, date, "10:00"), "3001112233"))
        .await
        .unwrap();
    engine
        .update_appointment_status(view.id, AppointmentStatus::Completed)
        .await
        .unwrap();
    engine
        .book(request(barber_id, service_id, at(&engine, date, "11:00"), "3001112233"))
        .await
        .unwrap();

    engine.compact_wal().await.unwrap();
    drop(engine);

    let engine = Engine::new(path, Arc::new(LogNotifier), EngineConfig::default()).unwrap();
    let views = engine.list_appointments(Some(barber_id), Some(date), None).await;
    assert_eq!(views.len(), 2);
    assert!(views.iter().any(|v| v.status == AppointmentStatus::Completed));
    assert!(views.iter().any(|v| v.status == AppointmentStatus::Confirmed));
}

// ── Catalog & configuration ──────────────────────────────

#[tokio::test]
async fn seed_is_idempotent() {
    let engine = engine("seed.wal");
    engine.seed_default_services().await.unwrap();
    let first = engine.list_services().len();
    assert!(first > 0);
    engine.seed_default_services().await.unwrap();
    assert_eq!(engine.list_services().len(), first);
}

#[tokio::test]
async fn invalid_schedule_rejected() {
    let engine = engine("bad_schedule.wal");
    let (barber_id, _) = setup_shop(&engine).await;

    let mut schedule = WeekSchedule::new(1140, 540, 15);
    let err = engine.update_schedule(barber_id, schedule.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchedule(_)));

    schedule = WeekSchedule::new(540, 1140, 15);
    schedule.days_off[2] = true;
    schedule.overrides[2] = Some(DayWindow { open_min: 600, close_min: 700 });
    let err = engine.update_schedule(barber_id, schedule).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchedule(_)));
}

#[tokio::test]
async fn duplicate_barber_rejected() {
    let engine = engine("dup_barber.wal");
    let id = Ulid::new();
    engine
        .register_barber(id, "Ana", None, WeekSchedule::new(540, 1140, 15))
        .await
        .unwrap();
    let err = engine
        .register_barber(id, "Ana", None, WeekSchedule::new(540, 1140, 15))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
}

#[tokio::test]
async fn invalid_block_rejected() {
    let engine = engine("bad_block.wal");
    let (barber_id, _) = setup_shop(&engine).await;
    let err = engine
        .add_block(barber_id, open_date(), false, 780, 720, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidBlock(_)));
}
