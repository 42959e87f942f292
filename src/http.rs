use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use ulid::Ulid;

use crate::clock::{format_hhmm, parse_hhmm};
use crate::engine::{
    AppointmentView, BarberInfo, BlockView, BookingRequest, Engine, EngineError,
};
use crate::model::{
    AppointmentStatus, BookingOrigin, DayWindow, Service, WaitlistEntry, WaitlistStatus,
    WeekSchedule,
};

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slots", get(get_slots))
        .route(
            "/appointments",
            get(list_appointments)
                .post(create_appointment)
                .patch(patch_appointment),
        )
        .route(
            "/waitlist",
            get(list_waitlist).post(join_waitlist).patch(patch_waitlist),
        )
        .route("/blocked-intervals", get(list_blocks).post(create_block))
        .route("/blocked-intervals/{id}", delete(remove_block))
        .route("/barbers", get(list_barbers).post(create_barber))
        .route("/barbers/{id}/schedule", put(put_schedule))
        .route("/services", get(list_services).post(create_service))
        .with_state(engine)
}

type ApiResult<T> = Result<T, ApiError>;

/// Engine taxonomy mapped onto HTTP: validation → 400, conflicts → 409,
/// unknown ids → 404, durability failures → 500.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::SlotTaken(_)
            | EngineError::SlotBlocked(_)
            | EngineError::AlreadyWaiting { .. }
            | EngineError::AlreadyExists(_) => StatusCode::CONFLICT,
            EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::ClosedDay { .. }
            | EngineError::OutsideHours { .. }
            | EngineError::InvalidSchedule(_)
            | EngineError::InvalidBlock(_)
            | EngineError::InvalidStatusChange { .. }
            | EngineError::InvalidWaitlistChange { .. }
            | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
        };
        Self { status, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": { "message": self.message } }));
        (self.status, body).into_response()
    }
}

fn parse_ulid(raw: &str) -> ApiResult<Ulid> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid id: {raw}")))
}

fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("invalid date: {raw}")))
}

fn parse_time(raw: &str) -> ApiResult<u16> {
    parse_hhmm(raw).ok_or_else(|| ApiError::bad_request(format!("invalid time: {raw}")))
}

async fn health() -> &'static str {
    "ok"
}

// ── Slots ────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotsParams {
    barber_id: String,
    date: String,
    service_id: String,
}

async fn get_slots(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<SlotsParams>,
) -> ApiResult<Json<Value>> {
    let barber_id = parse_ulid(&params.barber_id)?;
    let service_id = parse_ulid(&params.service_id)?;
    let date = parse_date(&params.date)?;

    let result = engine.day_slots(barber_id, date, service_id).await?;
    let slots: Vec<Value> = result
        .slots
        .iter()
        .map(|s| json!({ "time": format_hhmm(s.minute), "available": s.available }))
        .collect();

    Ok(Json(json!({
        "date": date.to_string(),
        "dayOff": result.day_off,
        "blocked": result.blocked,
        "slots": slots,
    })))
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAppointment {
    barber_id: String,
    service_id: String,
    date: String,
    time: String,
    client_name: String,
    phone: String,
    email: Option<String>,
    booked_by: Option<BookingOrigin>,
}

async fn create_appointment(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<CreateAppointment>,
) -> ApiResult<(StatusCode, Json<AppointmentView>)> {
    let barber_id = parse_ulid(&body.barber_id)?;
    let service_id = parse_ulid(&body.service_id)?;
    let date = parse_date(&body.date)?;
    let minute = parse_time(&body.time)?;
    let start = engine.clock.instant(date, minute);

    let view = engine
        .book(BookingRequest {
            barber_id,
            service_id,
            start,
            client_name: body.client_name,
            phone: body.phone,
            email: body.email,
            booked_by: body.booked_by.unwrap_or(BookingOrigin::Client),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentFilter {
    barber_id: Option<String>,
    date: Option<String>,
    status: Option<AppointmentStatus>,
}

async fn list_appointments(
    State(engine): State<Arc<Engine>>,
    Query(filter): Query<AppointmentFilter>,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    let barber_id = filter.barber_id.as_deref().map(parse_ulid).transpose()?;
    let date = filter.date.as_deref().map(parse_date).transpose()?;
    let views = engine.list_appointments(barber_id, date, filter.status).await;
    Ok(Json(views))
}

#[derive(Deserialize)]
struct PatchAppointment {
    id: String,
    status: AppointmentStatus,
}

async fn patch_appointment(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<PatchAppointment>,
) -> ApiResult<Json<AppointmentView>> {
    let id = parse_ulid(&body.id)?;
    let view = engine.update_appointment_status(id, body.status).await?;
    Ok(Json(view))
}

// ── Waitlist ─────────────────────────────────────────────────────

fn waitlist_json(entry: &WaitlistEntry) -> Value {
    json!({
        "id": entry.id.to_string(),
        "date": entry.date.to_string(),
        "serviceId": entry.service_id.to_string(),
        "name": entry.name,
        "phone": entry.phone,
        "status": entry.status,
        "notified": entry.notified,
        "createdAt": entry.created_at,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinWaitlist {
    date: String,
    service_id: String,
    name: String,
    phone: String,
}

async fn join_waitlist(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<JoinWaitlist>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let date = parse_date(&body.date)?;
    let service_id = parse_ulid(&body.service_id)?;
    let entry = engine
        .join_waitlist(date, service_id, &body.name, &body.phone)
        .await?;
    Ok((StatusCode::CREATED, Json(waitlist_json(&entry))))
}

#[derive(Deserialize)]
struct WaitlistFilter {
    date: Option<String>,
    status: Option<WaitlistStatus>,
}

async fn list_waitlist(
    State(engine): State<Arc<Engine>>,
    Query(filter): Query<WaitlistFilter>,
) -> ApiResult<Json<Vec<Value>>> {
    let date = filter.date.as_deref().map(parse_date).transpose()?;
    let entries = engine.list_waitlist(date, filter.status);
    Ok(Json(entries.iter().map(waitlist_json).collect()))
}

#[derive(Deserialize)]
struct PatchWaitlist {
    id: String,
    status: WaitlistStatus,
}

async fn patch_waitlist(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<PatchWaitlist>,
) -> ApiResult<Json<Value>> {
    let id = parse_ulid(&body.id)?;
    let entry = engine.update_waitlist_status(id, body.status).await?;
    Ok(Json(waitlist_json(&entry)))
}

// ── Blocked intervals ────────────────────────────────────────────

fn block_json(block: &BlockView) -> Value {
    json!({
        "id": block.id.to_string(),
        "barberId": block.barber_id.to_string(),
        "date": block.date.to_string(),
        "allDay": block.all_day,
        "startTime": format_hhmm(block.start_min),
        "endTime": format_hhmm(block.end_min),
        "reason": block.reason,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBlock {
    barber_id: String,
    date: String,
    all_day: Option<bool>,
    start_time: Option<String>,
    end_time: Option<String>,
    reason: Option<String>,
}

async fn create_block(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<CreateBlock>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let barber_id = parse_ulid(&body.barber_id)?;
    let date = parse_date(&body.date)?;
    let all_day = body.all_day.unwrap_or(false);
    let (start_min, end_min) = if all_day {
        (0, 0) // normalized by the engine
    } else {
        let start = body
            .start_time
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("startTime required"))?;
        let end = body
            .end_time
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("endTime required"))?;
        (parse_time(start)?, parse_time(end)?)
    };

    let block = engine
        .add_block(barber_id, date, all_day, start_min, end_min, body.reason)
        .await?;
    let view = BlockView {
        id: block.id,
        barber_id,
        date: block.date,
        all_day: block.all_day,
        start_min: block.start_min,
        end_min: block.end_min,
        reason: block.reason.clone(),
    };
    Ok((StatusCode::CREATED, Json(block_json(&view))))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockFilter {
    barber_id: Option<String>,
    date: Option<String>,
}

async fn list_blocks(
    State(engine): State<Arc<Engine>>,
    Query(filter): Query<BlockFilter>,
) -> ApiResult<Json<Vec<Value>>> {
    let barber_id = filter.barber_id.as_deref().map(parse_ulid).transpose()?;
    let date = filter.date.as_deref().map(parse_date).transpose()?;
    let blocks = engine.list_blocks(barber_id, date).await;
    Ok(Json(blocks.iter().map(block_json).collect()))
}

async fn remove_block(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_ulid(&id)?;
    engine.remove_block(id).await?;
    Ok(Json(json!({ "ok": true })))
}

// ── Barbers & schedules ──────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleBody {
    open_time: String,
    close_time: String,
    slot_minutes: Option<u16>,
    days_off: Option<Vec<u8>>,
    overrides: Option<Vec<OverrideBody>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverrideBody {
    weekday: u8,
    open_time: String,
    close_time: String,
}

fn parse_schedule(body: &ScheduleBody) -> ApiResult<WeekSchedule> {
    let open_min = parse_time(&body.open_time)?;
    let close_min = parse_time(&body.close_time)?;
    let mut schedule = WeekSchedule::new(open_min, close_min, body.slot_minutes.unwrap_or(15));
    for &weekday in body.days_off.iter().flatten() {
        if weekday > 6 {
            return Err(ApiError::bad_request("weekday must be 0-6"));
        }
        schedule.days_off[usize::from(weekday)] = true;
    }
    for o in body.overrides.iter().flatten() {
        if o.weekday > 6 {
            return Err(ApiError::bad_request("weekday must be 0-6"));
        }
        schedule.overrides[usize::from(o.weekday)] = Some(DayWindow {
            open_min: parse_time(&o.open_time)?,
            close_min: parse_time(&o.close_time)?,
        });
    }
    Ok(schedule)
}

fn schedule_json(schedule: &WeekSchedule) -> Value {
    let days_off: Vec<u8> = (0u8..7)
        .filter(|&d| schedule.days_off[usize::from(d)])
        .collect();
    let overrides: Vec<Value> = (0u8..7)
        .filter_map(|d| {
            schedule.overrides[usize::from(d)].map(|w| {
                json!({
                    "weekday": d,
                    "openTime": format_hhmm(w.open_min),
                    "closeTime": format_hhmm(w.close_min),
                })
            })
        })
        .collect();
    json!({
        "openTime": format_hhmm(schedule.open_min),
        "closeTime": format_hhmm(schedule.close_min),
        "slotMinutes": schedule.slot_minutes,
        "daysOff": days_off,
        "overrides": overrides,
    })
}

fn barber_json(info: &BarberInfo) -> Value {
    json!({
        "id": info.id.to_string(),
        "displayName": info.display_name,
        "phone": info.phone,
        "schedule": schedule_json(&info.schedule),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBarber {
    display_name: String,
    phone: Option<String>,
    schedule: Option<ScheduleBody>,
}

async fn create_barber(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<CreateBarber>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let schedule = match &body.schedule {
        Some(s) => parse_schedule(s)?,
        None => WeekSchedule::new(9 * 60, 19 * 60, 15),
    };
    let id = Ulid::new();
    engine
        .register_barber(id, &body.display_name, body.phone.clone(), schedule.clone())
        .await?;
    let info = BarberInfo {
        id,
        display_name: body.display_name.trim().to_string(),
        phone: body.phone,
        schedule,
    };
    Ok((StatusCode::CREATED, Json(barber_json(&info))))
}

async fn list_barbers(State(engine): State<Arc<Engine>>) -> Json<Vec<Value>> {
    let barbers = engine.list_barbers().await;
    Json(barbers.iter().map(barber_json).collect())
}

async fn put_schedule(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<ScheduleBody>,
) -> ApiResult<Json<Value>> {
    let id = parse_ulid(&id)?;
    let schedule = parse_schedule(&body)?;
    engine.update_schedule(id, schedule.clone()).await?;
    Ok(Json(json!({ "ok": true, "schedule": schedule_json(&schedule) })))
}

// ── Services ─────────────────────────────────────────────────────

fn service_json(service: &Service) -> Value {
    json!({
        "id": service.id.to_string(),
        "name": service.name,
        "price": service.price,
        "durationMin": service.duration_min,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateService {
    name: String,
    price: i64,
    duration_min: u16,
}

async fn create_service(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<CreateService>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let id = Ulid::new();
    engine
        .add_service(id, &body.name, body.price, body.duration_min)
        .await?;
    let service = Service {
        id,
        name: body.name.trim().to_string(),
        price: body.price,
        duration_min: body.duration_min,
    };
    Ok((StatusCode::CREATED, Json(service_json(&service))))
}

async fn list_services(State(engine): State<Arc<Engine>>) -> Json<Vec<Value>> {
    Json(engine.list_services().iter().map(service_json).collect())
}
