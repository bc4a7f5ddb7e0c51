// libs/calendar-cell/src/services/slots.rs
//
// Computes bookable windows for one professional on one date. The cached
// month aggregate narrows the candidates, but the ledger read is what
// decides: a slot overlapping any active appointment never survives, even
// when the cache has not caught up yet.

use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use professional_cell::models::{OfferedSlot, ProfessionalType};
use professional_cell::services::{AvailabilitySource, ProfessionalDirectory};

use crate::error::CalendarError;
use crate::models::{
    AvailableSlotView, CalendarSettings, LedgerAppointment, ProfessionalDaySchedule,
};
use crate::services::ledger::AppointmentLedger;
use crate::services::materializer::CalendarMaterializer;
use crate::time::{spans_overlap, time_to_minutes, weekday_index, Clock};

pub struct SlotAvailabilityEngine {
    availability: Arc<AvailabilitySource>,
    directory: Arc<ProfessionalDirectory>,
    ledger: Arc<AppointmentLedger>,
    materializer: Arc<CalendarMaterializer>,
    clock: Arc<dyn Clock>,
    settings: CalendarSettings,
}

impl SlotAvailabilityEngine {
    pub fn new(
        availability: Arc<AvailabilitySource>,
        directory: Arc<ProfessionalDirectory>,
        ledger: Arc<AppointmentLedger>,
        materializer: Arc<CalendarMaterializer>,
        clock: Arc<dyn Clock>,
        settings: CalendarSettings,
    ) -> Self {
        Self {
            availability,
            directory,
            ledger,
            materializer,
            clock,
            settings,
        }
    }

    /// Open slots for the date, sorted by start time and annotated with the
    /// fee the patient would pay. Read-only apart from materializing the
    /// month on first touch.
    #[instrument(skip(self, auth_token))]
    pub async fn available_slots(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        duration_minutes: Option<i64>,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlotView>, CalendarError> {
        if date < self.clock.today() {
            return Err(CalendarError::PastDateNotBookable);
        }

        let offered = self
            .availability
            .offered_slots_for_date(
                professional_id,
                professional_type,
                date,
                weekday_index(date),
                auth_token,
            )
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        if offered.is_empty() {
            return Ok(Vec::new());
        }

        let Some(calendar) = self
            .materializer
            .resolve_or_materialize(date.year(), date.month(), auth_token)
            .await?
        else {
            return Ok(Vec::new());
        };

        let schedule = calendar
            .day_for(date)
            .and_then(|day| day.schedule_for(professional_id, professional_type));

        // The professional hid this day entirely.
        if schedule.map(|s| !s.is_available).unwrap_or(false) {
            debug!(
                "{} {} is marked unavailable on {}",
                professional_type, professional_id, date
            );
            return Ok(Vec::new());
        }

        let active = self
            .ledger
            .find_active_for_date(professional_id, professional_type, date, auth_token)
            .await?;

        let requested = duration_minutes.unwrap_or(self.settings.default_slot_minutes);
        let open = compute_open_slots(&offered, schedule, &active, requested);

        let professional = self
            .directory
            .get_professional(professional_id, professional_type, auth_token)
            .await
            .map_err(|e| match e {
                professional_cell::models::ProfessionalError::NotFound => {
                    CalendarError::NotFound("Professional not found".to_string())
                }
                other => CalendarError::DatabaseError(other.to_string()),
            })?;

        Ok(open
            .iter()
            .map(|slot| {
                AvailableSlotView::from_offered(
                    slot,
                    slot_duration(slot),
                    professional.fee_for(slot.slot_kind),
                )
            })
            .collect())
    }
}

/// The pure subtraction step: offered slots minus working-hour restrictions,
/// breaks, cached bookings, and active ledger appointments.
pub fn compute_open_slots(
    offered: &[OfferedSlot],
    schedule: Option<&ProfessionalDaySchedule>,
    active_appointments: &[LedgerAppointment],
    requested_minutes: i64,
) -> Vec<OfferedSlot> {
    let mut open: Vec<OfferedSlot> = offered
        .iter()
        .filter(|slot| slot.is_available)
        .filter(|slot| slot_duration(slot) >= requested_minutes)
        .filter(|slot| fits_working_hours(slot, schedule))
        .filter(|slot| !hits_break(slot, schedule))
        .filter(|slot| !hits_booking(slot, schedule, active_appointments))
        .cloned()
        .collect();

    open.sort_by_key(|slot| time_to_minutes(&slot.start_time));
    open
}

fn slot_duration(slot: &OfferedSlot) -> i64 {
    time_to_minutes(&slot.end_time) as i64 - time_to_minutes(&slot.start_time) as i64
}

/// With working-hour restrictions present, a slot survives only if at least
/// one window fully contains it.
fn fits_working_hours(slot: &OfferedSlot, schedule: Option<&ProfessionalDaySchedule>) -> bool {
    let Some(windows) = schedule.and_then(|s| s.working_hours.as_ref()) else {
        return true;
    };
    if windows.is_empty() {
        return true;
    }

    let start = time_to_minutes(&slot.start_time);
    let end = time_to_minutes(&slot.end_time);

    windows.iter().any(|window| {
        time_to_minutes(&window.start_time) <= start && end <= time_to_minutes(&window.end_time)
    })
}

fn hits_break(slot: &OfferedSlot, schedule: Option<&ProfessionalDaySchedule>) -> bool {
    schedule
        .map(|s| {
            s.breaks.iter().any(|b| {
                spans_overlap(&slot.start_time, &slot.end_time, &b.start_time, &b.end_time)
            })
        })
        .unwrap_or(false)
}

fn hits_booking(
    slot: &OfferedSlot,
    schedule: Option<&ProfessionalDaySchedule>,
    active_appointments: &[LedgerAppointment],
) -> bool {
    let cached_hit = schedule
        .map(|s| {
            s.booked_slots
                .iter()
                .filter(|b| b.status.blocks_slot())
                .any(|b| spans_overlap(&slot.start_time, &slot.end_time, &b.start_time, &b.end_time))
        })
        .unwrap_or(false);

    if cached_hit {
        return true;
    }

    active_appointments.iter().any(|a| {
        spans_overlap(&slot.start_time, &slot.end_time, &a.start_time, &a.end_time)
    })
}
