// libs/calendar-cell/src/services/schedule.rs
//
// Professional self-service over their own calendar days: availability
// toggles, break management, and the day/week schedule views that route
// between the stored aggregate and the ledger-derived past.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use professional_cell::models::ProfessionalType;

use crate::error::CalendarError;
use crate::models::{
    AddBreakRequest, BreakEntry, BreakInput, CalendarSettings, DayScheduleView,
    LedgerAppointment, ProfessionalDaySchedule, ScheduleSource, UpdateAvailabilityRequest,
    WeekScheduleView,
};
use crate::services::ledger::AppointmentLedger;
use crate::services::materializer::CalendarMaterializer;
use crate::services::past::PastCalendarGenerator;
use crate::services::store::CalendarStore;
use crate::time::{day_name, is_valid_time, spans_overlap, time_to_minutes, weekday_index, Clock};

pub struct ScheduleService {
    ledger: Arc<AppointmentLedger>,
    materializer: Arc<CalendarMaterializer>,
    store: Arc<CalendarStore>,
    past: Arc<PastCalendarGenerator>,
    clock: Arc<dyn Clock>,
    settings: CalendarSettings,
}

impl ScheduleService {
    pub fn new(
        ledger: Arc<AppointmentLedger>,
        materializer: Arc<CalendarMaterializer>,
        store: Arc<CalendarStore>,
        past: Arc<PastCalendarGenerator>,
        clock: Arc<dyn Clock>,
        settings: CalendarSettings,
    ) -> Self {
        Self {
            ledger,
            materializer,
            store,
            past,
            clock,
            settings,
        }
    }

    /// Rewrite one day's availability flag and, optionally, its break list
    /// and working-hour restrictions. Hiding a day the professional is
    /// already booked on is refused, and replacement breaks are
    /// conflict-checked the same way `add_break` is: ledger first, cached
    /// snapshots on top.
    #[instrument(skip(self, auth_token))]
    pub async fn update_availability(
        &self,
        request: &UpdateAvailabilityRequest,
        updated_by: Option<&str>,
        auth_token: &str,
    ) -> Result<ProfessionalDaySchedule, CalendarError> {
        if request.date < self.clock.today() {
            return Err(CalendarError::PastDateNotEditable);
        }

        if let Some(hours) = &request.working_hours {
            for window in hours {
                validate_range(&window.start_time, &window.end_time)?;
            }
        }
        if let Some(breaks) = &request.breaks {
            validate_break_list(breaks)?;
        }

        if !request.is_available || request.breaks.is_some() {
            let active = self
                .ledger
                .find_active_for_date(
                    request.professional_id,
                    request.professional_type,
                    request.date,
                    auth_token,
                )
                .await?;
            if !request.is_available && !active.is_empty() {
                return Err(CalendarError::HasExistingBookings {
                    count: active.len(),
                });
            }
            if let Some(breaks) = &request.breaks {
                let conflicts = count_ledger_conflicts(&active, breaks);
                if conflicts > 0 {
                    return Err(CalendarError::BreakConflictsWithBooking { conflicts });
                }
            }
        }

        for attempt in 1..=self.settings.write_retry_attempts {
            let mut calendar = self
                .materializer
                .resolve_or_materialize(request.date.year(), request.date.month(), auth_token)
                .await?
                .ok_or(CalendarError::PastDateNotEditable)?;

            let day = calendar
                .day_for_mut(request.date)
                .ok_or_else(|| CalendarError::NotFound(format!("Calendar day {}", request.date)))?;
            let schedule = day.ensure_schedule(request.professional_id, request.professional_type);

            schedule.is_available = request.is_available;

            if let Some(hours) = &request.working_hours {
                schedule.working_hours = Some(hours.clone());
            }
            if let Some(breaks) = &request.breaks {
                let conflicts = count_cached_conflicts(schedule, breaks);
                if conflicts > 0 {
                    return Err(CalendarError::BreakConflictsWithBooking { conflicts });
                }

                let now = Utc::now();
                schedule.breaks = breaks
                    .iter()
                    .map(|input| BreakEntry {
                        id: Uuid::new_v4(),
                        start_time: input.start_time.clone(),
                        end_time: input.end_time.clone(),
                        reason: input.reason.clone(),
                        added_by: updated_by.map(String::from),
                        added_at: now,
                    })
                    .collect();
            }

            let updated = schedule.clone();
            match self.store.update_month(&calendar, auth_token).await {
                Ok(_) => {
                    info!(
                        "Availability updated for {} {} on {}: available={}",
                        request.professional_type,
                        request.professional_id,
                        request.date,
                        request.is_available
                    );
                    return Ok(updated);
                }
                Err(CalendarError::AggregateWriteConflict)
                    if attempt < self.settings.write_retry_attempts =>
                {
                    warn!(
                        "Aggregate version conflict updating availability, retry {}/{}",
                        attempt, self.settings.write_retry_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CalendarError::AggregateWriteConflict)
    }

    /// Add one break to the day. Active ledger appointments are the
    /// authoritative conflict source; cached snapshots catch cache-ahead
    /// cases on top.
    #[instrument(skip(self, auth_token))]
    pub async fn add_break(
        &self,
        request: &AddBreakRequest,
        added_by: Option<&str>,
        auth_token: &str,
    ) -> Result<BreakEntry, CalendarError> {
        if request.date < self.clock.today() {
            return Err(CalendarError::PastDateNotEditable);
        }
        validate_range(&request.start_time, &request.end_time)?;

        let overlapping = self
            .ledger
            .find_overlapping(
                request.professional_id,
                request.professional_type,
                request.date,
                &request.start_time,
                &request.end_time,
                None,
                auth_token,
            )
            .await?;
        if !overlapping.is_empty() {
            return Err(CalendarError::BreakConflictsWithBooking {
                conflicts: overlapping.len(),
            });
        }

        for attempt in 1..=self.settings.write_retry_attempts {
            let mut calendar = self
                .materializer
                .resolve_or_materialize(request.date.year(), request.date.month(), auth_token)
                .await?
                .ok_or(CalendarError::PastDateNotEditable)?;

            let day = calendar
                .day_for_mut(request.date)
                .ok_or_else(|| CalendarError::NotFound(format!("Calendar day {}", request.date)))?;
            let schedule = day.ensure_schedule(request.professional_id, request.professional_type);

            let overlaps_existing = schedule.breaks.iter().any(|existing| {
                spans_overlap(
                    &request.start_time,
                    &request.end_time,
                    &existing.start_time,
                    &existing.end_time,
                )
            });
            if overlaps_existing {
                return Err(CalendarError::BreakOverlap);
            }

            let cached_conflicts = schedule
                .booked_slots
                .iter()
                .filter(|slot| slot.status.blocks_slot())
                .filter(|slot| {
                    spans_overlap(
                        &request.start_time,
                        &request.end_time,
                        &slot.start_time,
                        &slot.end_time,
                    )
                })
                .count();
            if cached_conflicts > 0 {
                return Err(CalendarError::BreakConflictsWithBooking {
                    conflicts: cached_conflicts,
                });
            }

            let entry = BreakEntry {
                id: Uuid::new_v4(),
                start_time: request.start_time.clone(),
                end_time: request.end_time.clone(),
                reason: request.reason.clone(),
                added_by: added_by.map(String::from),
                added_at: Utc::now(),
            };
            schedule.breaks.push(entry.clone());

            match self.store.update_month(&calendar, auth_token).await {
                Ok(_) => {
                    info!(
                        "Break {} added for {} {} on {} {}-{}",
                        entry.id,
                        request.professional_type,
                        request.professional_id,
                        request.date,
                        request.start_time,
                        request.end_time
                    );
                    return Ok(entry);
                }
                Err(CalendarError::AggregateWriteConflict)
                    if attempt < self.settings.write_retry_attempts =>
                {
                    warn!(
                        "Aggregate version conflict adding break, retry {}/{}",
                        attempt, self.settings.write_retry_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CalendarError::AggregateWriteConflict)
    }

    /// Remove a break by id. Days in retired months are not stored anymore,
    /// so those naturally come back as not found.
    #[instrument(skip(self, auth_token))]
    pub async fn remove_break(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        break_id: Uuid,
        auth_token: &str,
    ) -> Result<(), CalendarError> {
        for attempt in 1..=self.settings.write_retry_attempts {
            let mut calendar = self
                .store
                .fetch_month(date.year(), date.month(), auth_token)
                .await?
                .ok_or_else(|| CalendarError::NotFound(format!("Break {}", break_id)))?;

            let schedule = calendar
                .day_for_mut(date)
                .and_then(|day| day.schedule_for_mut(professional_id, professional_type))
                .ok_or_else(|| CalendarError::NotFound(format!("Break {}", break_id)))?;

            let position = schedule
                .breaks
                .iter()
                .position(|b| b.id == break_id)
                .ok_or_else(|| CalendarError::NotFound(format!("Break {}", break_id)))?;
            schedule.breaks.remove(position);

            match self.store.update_month(&calendar, auth_token).await {
                Ok(_) => {
                    info!("Break {} removed from {}", break_id, date);
                    return Ok(());
                }
                Err(CalendarError::AggregateWriteConflict)
                    if attempt < self.settings.write_retry_attempts =>
                {
                    warn!(
                        "Aggregate version conflict removing break, retry {}/{}",
                        attempt, self.settings.write_retry_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CalendarError::AggregateWriteConflict)
    }

    /// One professional's day: stored aggregate for today and the future,
    /// ledger reconstruction for the past.
    pub async fn day_schedule(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DayScheduleView, CalendarError> {
        if date < self.clock.today() {
            return self
                .past
                .professional_day_view(professional_id, professional_type, date, auth_token)
                .await;
        }

        let schedule = match self
            .materializer
            .resolve_or_materialize(date.year(), date.month(), auth_token)
            .await?
        {
            Some(calendar) => calendar
                .day_for(date)
                .and_then(|day| day.schedule_for(professional_id, professional_type))
                .cloned(),
            None => None,
        };

        Ok(match schedule {
            Some(schedule) => DayScheduleView {
                date,
                day_name: day_name(date),
                source: ScheduleSource::Calendar,
                is_available: schedule.is_available,
                working_hours: schedule.working_hours,
                breaks: schedule.breaks,
                booked_slots: schedule.booked_slots,
            },
            // Not offering that day.
            None => DayScheduleView {
                date,
                day_name: day_name(date),
                source: ScheduleSource::Calendar,
                is_available: false,
                working_hours: None,
                breaks: Vec::new(),
                booked_slots: Vec::new(),
            },
        })
    }

    /// The whole week containing `date`, Sunday first. Each day routes
    /// independently, so a week straddling today mixes ledger and calendar
    /// sourced entries.
    pub async fn week_schedule(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<WeekScheduleView, CalendarError> {
        let start = date - Duration::days(weekday_index(date) as i64);

        let mut days = Vec::with_capacity(7);
        for offset in 0..7 {
            let day = start + Duration::days(offset);
            days.push(
                self.day_schedule(professional_id, professional_type, day, auth_token)
                    .await?,
            );
        }

        Ok(WeekScheduleView {
            professional_id,
            professional_type,
            start_date: start,
            end_date: start + Duration::days(6),
            days,
        })
    }
}

fn validate_range(start: &str, end: &str) -> Result<(), CalendarError> {
    if !is_valid_time(start) || !is_valid_time(end) || time_to_minutes(end) <= time_to_minutes(start)
    {
        return Err(CalendarError::InvalidTimeRange(format!("{} to {}", start, end)));
    }
    Ok(())
}

fn validate_break_list(breaks: &[BreakInput]) -> Result<(), CalendarError> {
    for input in breaks {
        validate_range(&input.start_time, &input.end_time)?;
    }

    for (i, a) in breaks.iter().enumerate() {
        for b in breaks.iter().skip(i + 1) {
            if spans_overlap(&a.start_time, &a.end_time, &b.start_time, &b.end_time) {
                return Err(CalendarError::BreakOverlap);
            }
        }
    }

    Ok(())
}

fn count_cached_conflicts(schedule: &ProfessionalDaySchedule, breaks: &[BreakInput]) -> usize {
    schedule
        .booked_slots
        .iter()
        .filter(|slot| slot.status.blocks_slot())
        .filter(|slot| {
            breaks.iter().any(|input| {
                spans_overlap(
                    &input.start_time,
                    &input.end_time,
                    &slot.start_time,
                    &slot.end_time,
                )
            })
        })
        .count()
}

fn count_ledger_conflicts(appointments: &[LedgerAppointment], breaks: &[BreakInput]) -> usize {
    appointments
        .iter()
        .filter(|appointment| {
            breaks.iter().any(|input| {
                spans_overlap(
                    &input.start_time,
                    &input.end_time,
                    &appointment.start_time,
                    &appointment.end_time,
                )
            })
        })
        .count()
}
