// libs/calendar-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use professional_cell::models::ProfessionalType;

use crate::error::CalendarError;
use crate::models::{
    AddBreakRequest, BookSlotRequest, CalendarQuery, CleanCalendarsRequest,
    InitializeMonthRequest, ReleaseSlotRequest, RemoveBreakQuery, ScheduleQuery, SlotsQuery,
    UpdateAvailabilityRequest,
};
use crate::services::CalendarService;

fn parse_professional_type(value: &str) -> Result<ProfessionalType, AppError> {
    ProfessionalType::parse(value)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown professional type: {}", value)))
}

fn map_calendar_error(e: CalendarError) -> AppError {
    match e {
        CalendarError::InvalidMonth(_)
        | CalendarError::PastDateNotBookable
        | CalendarError::PastDateNotEditable
        | CalendarError::InvalidTimeRange(_) => AppError::BadRequest(e.to_string()),
        CalendarError::SlotConflict { .. }
        | CalendarError::BreakOverlap
        | CalendarError::BreakConflictsWithBooking { .. }
        | CalendarError::HasExistingBookings { .. }
        | CalendarError::ProfessionalUnavailable => AppError::Conflict(e.to_string()),
        CalendarError::NotFound(msg) => AppError::NotFound(msg),
        CalendarError::AggregateWriteConflict => {
            AppError::Unavailable("Calendar is busy, please retry".to_string())
        }
        CalendarError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// CALENDAR VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_calendar(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<CalendarQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = CalendarService::new(&state);

    let view = service
        .get_calendar(
            query.year,
            query.month,
            query.professional_id,
            query.professional_type,
            token,
        )
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "calendar": view
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppConfig>>,
    Path((professional_type, professional_id)): Path<(String, Uuid)>,
    Query(query): Query<ScheduleQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let professional_type = parse_professional_type(&professional_type)?;

    // Schedules expose patient names, so only the professional themselves
    // or an admin may look.
    let is_self = professional_id.to_string() == user.id;
    let is_admin = user.is_admin();
    if !is_self && !is_admin {
        return Err(AppError::Auth(
            "Not authorized to view this schedule".to_string(),
        ));
    }

    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let service = CalendarService::new(&state);

    if query.week.unwrap_or(false) {
        let week = service
            .week_schedule(professional_id, professional_type, date, token)
            .await
            .map_err(map_calendar_error)?;
        return Ok(Json(json!({
            "success": true,
            "week": week
        })));
    }

    let schedule = service
        .day_schedule(professional_id, professional_type, date, token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path((professional_type, professional_id)): Path<(String, Uuid)>,
    Query(query): Query<SlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let professional_type = parse_professional_type(&professional_type)?;
    let service = CalendarService::new(&state);

    let slots = service
        .get_available_slots(
            professional_id,
            professional_type,
            query.date,
            query.duration_minutes,
            token,
        )
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "date": query.date,
        "count": slots.len(),
        "slots": slots
    })))
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Patients book for themselves; professionals and admins may book on a
    // patient's behalf.
    let is_patient = request.patient_id.to_string() == user.id;
    let is_professional = request.professional_id.to_string() == user.id;
    let is_admin = user.is_admin();
    if !is_patient && !is_professional && !is_admin {
        return Err(AppError::Auth(
            "Not authorized to book this slot".to_string(),
        ));
    }

    let service = CalendarService::new(&state);
    let booked = service
        .book_slot(&request, Some(&user.id), token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "booked_slot": booked,
        "message": "Slot booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn release_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReleaseSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_professional = request.professional_id.to_string() == user.id;
    let is_admin = user.is_admin();
    if !is_professional && !is_admin {
        return Err(AppError::Auth(
            "Not authorized to release this slot".to_string(),
        ));
    }

    let service = CalendarService::new(&state);
    let released = service
        .release_slot(&request, token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "released": released
    })))
}

// ==============================================================================
// PROFESSIONAL SELF-SERVICE
// ==============================================================================

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_self = request.professional_id.to_string() == user.id;
    let is_admin = user.is_admin();
    if !is_self && !is_admin {
        return Err(AppError::Auth(
            "Not authorized to update this schedule".to_string(),
        ));
    }

    let service = CalendarService::new(&state);
    let schedule = service
        .update_availability(&request, Some(&user.id), token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule,
        "message": "Availability updated"
    })))
}

#[axum::debug_handler]
pub async fn add_break(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AddBreakRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_self = request.professional_id.to_string() == user.id;
    let is_admin = user.is_admin();
    if !is_self && !is_admin {
        return Err(AppError::Auth(
            "Not authorized to modify this schedule".to_string(),
        ));
    }

    let service = CalendarService::new(&state);
    let entry = service
        .add_break(&request, Some(&user.id), token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "break": entry,
        "message": "Break added"
    })))
}

#[axum::debug_handler]
pub async fn remove_break(
    State(state): State<Arc<AppConfig>>,
    Path(break_id): Path<Uuid>,
    Query(query): Query<RemoveBreakQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_self = query.professional_id.to_string() == user.id;
    let is_admin = user.is_admin();
    if !is_self && !is_admin {
        return Err(AppError::Auth(
            "Not authorized to modify this schedule".to_string(),
        ));
    }

    let service = CalendarService::new(&state);
    service
        .remove_break(
            query.professional_id,
            query.professional_type,
            query.date,
            break_id,
            token,
        )
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Break removed"
    })))
}

// ==============================================================================
// ADMINISTRATION
// ==============================================================================

#[axum::debug_handler]
pub async fn initialize_month(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<InitializeMonthRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth("Admin access required".to_string()));
    }

    let service = CalendarService::new(&state);
    let calendar = service
        .initialize_month(request.year, request.month, token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "materialized": calendar.is_some(),
        "message": match calendar {
            Some(_) => "Month calendar is ready",
            None => "Past months are never materialized",
        }
    })))
}

#[axum::debug_handler]
pub async fn clean_old_calendars(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CleanCalendarsRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth("Admin access required".to_string()));
    }

    let service = CalendarService::new(&state);
    let removed = service
        .clean_old_calendars(request.months_to_keep, token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "removed_months": removed
    })))
}

#[axum::debug_handler]
pub async fn audit_health(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth("Admin access required".to_string()));
    }

    let service = CalendarService::new(&state);
    let report = service
        .audit_health(token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "report": report
    })))
}

#[axum::debug_handler]
pub async fn repair_inconsistencies(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth("Admin access required".to_string()));
    }

    let service = CalendarService::new(&state);
    let summary = service
        .repair_inconsistencies(token)
        .await
        .map_err(map_calendar_error)?;

    Ok(Json(json!({
        "success": true,
        "repair": summary
    })))
}
