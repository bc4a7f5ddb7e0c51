// libs/calendar-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use professional_cell::models::{OfferedSlot, ProfessionalType, SlotKind};

use crate::time::{day_name, weekday_index};

// ==============================================================================
// MONTH CALENDAR AGGREGATE
// ==============================================================================

/// One materialized month for all professionals. Stored as a single row in
/// `month_calendars` with the day list serialized as JSONB. `(year, month)`
/// is unique; `version` increments on every aggregate rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthCalendar {
    pub id: Uuid,
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonthCalendar {
    pub fn day_for(&self, date: NaiveDate) -> Option<&CalendarDay> {
        self.days.iter().find(|d| d.date == date)
    }

    pub fn day_for_mut(&mut self, date: NaiveDate) -> Option<&mut CalendarDay> {
        self.days.iter_mut().find(|d| d.date == date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub day_name: String,
    pub is_holiday: bool,
    pub professionals: Vec<ProfessionalDaySchedule>,
}

impl CalendarDay {
    /// Day scaffold with no professional entries yet. Sundays are flagged
    /// as holidays; everything else starts as a working day.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            day_name: day_name(date),
            is_holiday: weekday_index(date) == 0,
            professionals: Vec::new(),
        }
    }

    pub fn schedule_for(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
    ) -> Option<&ProfessionalDaySchedule> {
        self.professionals
            .iter()
            .find(|p| p.professional_id == professional_id && p.professional_type == professional_type)
    }

    pub fn schedule_for_mut(
        &mut self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
    ) -> Option<&mut ProfessionalDaySchedule> {
        self.professionals
            .iter_mut()
            .find(|p| p.professional_id == professional_id && p.professional_type == professional_type)
    }

    /// Returns the existing entry for the pair or inserts a fresh one.
    /// Keeps at most one entry per (professional_id, professional_type),
    /// so the same clinician can still appear once per role.
    pub fn ensure_schedule(
        &mut self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
    ) -> &mut ProfessionalDaySchedule {
        if let Some(idx) = self.professionals.iter().position(|p| {
            p.professional_id == professional_id && p.professional_type == professional_type
        }) {
            &mut self.professionals[idx]
        } else {
            self.professionals
                .push(ProfessionalDaySchedule::offered(professional_id, professional_type));
            self.professionals.last_mut().unwrap()
        }
    }
}

/// Per-professional state inside one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionalDaySchedule {
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub is_available: bool,
    /// Day-specific override of the weekly template. `None` means the
    /// template hours apply unchanged.
    pub working_hours: Option<Vec<WorkingHours>>,
    pub breaks: Vec<BreakEntry>,
    pub booked_slots: Vec<BookedSlot>,
}

impl ProfessionalDaySchedule {
    pub fn offered(professional_id: Uuid, professional_type: ProfessionalType) -> Self {
        Self {
            professional_id,
            professional_type,
            is_available: true,
            working_hours: None,
            breaks: Vec::new(),
            booked_slots: Vec::new(),
        }
    }

    pub fn find_break(&self, break_id: Uuid) -> Option<&BreakEntry> {
        self.breaks.iter().find(|b| b.id == break_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakEntry {
    pub id: Uuid,
    pub start_time: String,
    pub end_time: String,
    pub reason: String,
    pub added_by: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Cached snapshot of a booked appointment, denormalized into the day so
/// slot computation never has to join back to the ledger for current months.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedSlot {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub status: AppointmentStatus,
    pub booked_by: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
}

impl BookedSlot {
    /// Snapshot of a ledger row, used when deriving historical views. The
    /// booking audit fields are unknown there and stay empty.
    pub fn from_ledger(appointment: &LedgerAppointment) -> Self {
        Self {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            patient_name: appointment.patient_name.clone(),
            start_time: appointment.start_time.clone(),
            end_time: appointment.end_time.clone(),
            status: appointment.status,
            booked_by: None,
            booked_at: None,
        }
    }
}

// ==============================================================================
// APPOINTMENT LEDGER
// ==============================================================================

/// Row shape of the `appointments` ledger as this cell consumes it. The
/// ledger is the source of truth; calendar snapshots are derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Accepted,
    Completed,
    Cancelled,
    /// Snapshot-only status used for cache entries written by this cell.
    Booked,
}

impl AppointmentStatus {
    /// Statuses that hold a slot against new bookings.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::Accepted
        )
    }

    /// Whether a cached entry with this status blocks slot computation.
    pub fn blocks_slot(&self) -> bool {
        self.is_active() || matches!(self, AppointmentStatus::Booked)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Accepted => write!(f, "accepted"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Booked => write!(f, "booked"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSlotRequest {
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSlotRequest {
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub date: NaiveDate,
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub date: NaiveDate,
    pub is_available: bool,
    pub working_hours: Option<Vec<WorkingHours>>,
    pub breaks: Option<Vec<BreakInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakInput {
    pub start_time: String,
    pub end_time: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBreakRequest {
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveBreakQuery {
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub professional_id: Option<Uuid>,
    pub professional_type: Option<ProfessionalType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleQuery {
    pub date: Option<NaiveDate>,
    /// When true, returns the full week containing `date`.
    pub week: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeMonthRequest {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanCalendarsRequest {
    pub months_to_keep: Option<u32>,
}

/// Where a view was answered from: the materialized store for current and
/// future dates, or the appointment ledger for the past.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSource {
    Calendar,
    Ledger,
}

impl fmt::Display for ScheduleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSource::Calendar => write!(f, "calendar"),
            ScheduleSource::Ledger => write!(f, "ledger"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthCalendarView {
    pub year: i32,
    pub month: u32,
    pub source: ScheduleSource,
    pub days: Vec<CalendarDay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayScheduleView {
    pub date: NaiveDate,
    pub day_name: String,
    pub source: ScheduleSource,
    pub is_available: bool,
    pub working_hours: Option<Vec<WorkingHours>>,
    pub breaks: Vec<BreakEntry>,
    pub booked_slots: Vec<BookedSlot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekScheduleView {
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: Vec<DayScheduleView>,
}

/// A bookable opening annotated with what the patient would pay.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableSlotView {
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
    pub slot_kind: SlotKind,
    pub fee: Option<f64>,
}

impl AvailableSlotView {
    pub fn from_offered(slot: &OfferedSlot, duration_minutes: i64, fee: Option<f64>) -> Self {
        Self {
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            duration_minutes,
            slot_kind: slot.slot_kind,
            fee,
        }
    }
}

// ==============================================================================
// AUDIT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// The appointment's date has no day entry in the stored month.
    MissingDay,
    /// The day exists but carries no entry for the professional.
    MissingProfessional,
    /// The professional's day exists but the booked snapshot is absent.
    MissingSlot,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftKind::MissingDay => write!(f, "missing_day"),
            DriftKind::MissingProfessional => write!(f, "missing_professional"),
            DriftKind::MissingSlot => write!(f, "missing_slot"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftFinding {
    pub kind: DriftKind,
    pub appointment_id: Uuid,
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

/// Cached snapshot whose ledger row is gone or no longer active.
#[derive(Debug, Clone, Serialize)]
pub struct OrphanedSnapshot {
    pub appointment_id: Uuid,
    pub professional_id: Uuid,
    pub professional_type: ProfessionalType,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarAuditReport {
    pub months_checked: u32,
    pub appointments_checked: usize,
    pub findings: Vec<DriftFinding>,
    pub orphaned_snapshots: Vec<OrphanedSnapshot>,
    pub is_consistent: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairSummary {
    pub months_materialized: u32,
    pub days_created: u32,
    pub schedules_created: u32,
    pub slots_restored: u32,
}

// ==============================================================================
// SETTINGS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct CalendarSettings {
    /// Months materialized beyond the current one.
    pub months_ahead: u32,
    /// Past months retained before cleanup deletes them.
    pub months_to_keep: u32,
    pub default_slot_minutes: i64,
    pub lock_expiry_seconds: i64,
    pub lock_retry_attempts: u32,
    pub write_retry_attempts: u32,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            months_ahead: 2,
            months_to_keep: 3,
            default_slot_minutes: 30,
            lock_expiry_seconds: 30,
            lock_retry_attempts: 3,
            write_retry_attempts: 3,
        }
    }
}
