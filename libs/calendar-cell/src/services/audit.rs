// libs/calendar-cell/src/services/audit.rs
//
// Reconciles the current month's stored aggregate against the ledger.
// Auditing never writes; repair is a separate, explicitly invoked operation
// that only ever adds missing structure. Cache entries whose ledger row
// vanished or was cancelled are reported as orphans, not deleted, because
// a concurrent cancellation can race the audit. Completed rows are settled
// bookings and never flag the month inconsistent.

use chrono::{Datelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::CalendarError;
use crate::models::{
    AppointmentStatus, BookedSlot, CalendarAuditReport, CalendarDay, CalendarSettings,
    DriftFinding, DriftKind, LedgerAppointment, OrphanedSnapshot, RepairSummary,
};
use crate::services::ledger::AppointmentLedger;
use crate::services::materializer::CalendarMaterializer;
use crate::services::store::CalendarStore;
use crate::time::Clock;

const ACTIVE_STATUSES: [AppointmentStatus; 3] = [
    AppointmentStatus::Pending,
    AppointmentStatus::Confirmed,
    AppointmentStatus::Accepted,
];

const ALL_STATUSES: [AppointmentStatus; 5] = [
    AppointmentStatus::Pending,
    AppointmentStatus::Confirmed,
    AppointmentStatus::Accepted,
    AppointmentStatus::Completed,
    AppointmentStatus::Cancelled,
];

pub struct ConsistencyAuditor {
    store: Arc<CalendarStore>,
    ledger: Arc<AppointmentLedger>,
    materializer: Arc<CalendarMaterializer>,
    clock: Arc<dyn Clock>,
    settings: CalendarSettings,
}

impl ConsistencyAuditor {
    pub fn new(
        store: Arc<CalendarStore>,
        ledger: Arc<AppointmentLedger>,
        materializer: Arc<CalendarMaterializer>,
        clock: Arc<dyn Clock>,
        settings: CalendarSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            materializer,
            clock,
            settings,
        }
    }

    /// Compare the current month's aggregate against the ledger and report
    /// every discrepancy in both directions.
    #[instrument(skip(self, auth_token))]
    pub async fn audit_health(&self, auth_token: &str) -> Result<CalendarAuditReport, CalendarError> {
        let today = self.clock.today();
        let (year, month) = (today.year(), today.month());

        let active = self
            .ledger
            .find_in_month(year, month, &ACTIVE_STATUSES, auth_token)
            .await?;
        let calendar = self.store.fetch_month(year, month, auth_token).await?;

        let mut findings = Vec::new();
        let mut orphans = Vec::new();

        match &calendar {
            None => {
                // Nothing materialized yet: every active appointment is
                // missing its day.
                for appointment in &active {
                    findings.push(drift(DriftKind::MissingDay, appointment));
                }
            }
            Some(calendar) => {
                for appointment in &active {
                    let Some(day) = calendar.day_for(appointment.appointment_date) else {
                        findings.push(drift(DriftKind::MissingDay, appointment));
                        continue;
                    };
                    let Some(schedule) =
                        day.schedule_for(appointment.professional_id, appointment.professional_type)
                    else {
                        findings.push(drift(DriftKind::MissingProfessional, appointment));
                        continue;
                    };
                    let cached = schedule
                        .booked_slots
                        .iter()
                        .any(|slot| slot.appointment_id == appointment.id);
                    if !cached {
                        findings.push(drift(DriftKind::MissingSlot, appointment));
                    }
                }

                let all_rows = self
                    .ledger
                    .find_in_month(year, month, &ALL_STATUSES, auth_token)
                    .await?;
                let status_by_id: HashMap<Uuid, AppointmentStatus> =
                    all_rows.iter().map(|row| (row.id, row.status)).collect();

                for day in &calendar.days {
                    for schedule in &day.professionals {
                        for slot in &schedule.booked_slots {
                            // A completed row is a settled booking, not drift;
                            // only vanished or cancelled rows orphan a snapshot.
                            let reason = match status_by_id.get(&slot.appointment_id) {
                                None => Some("no matching ledger row".to_string()),
                                Some(AppointmentStatus::Cancelled) => {
                                    Some("ledger row is cancelled".to_string())
                                }
                                Some(_) => None,
                            };
                            if let Some(reason) = reason {
                                orphans.push(OrphanedSnapshot {
                                    appointment_id: slot.appointment_id,
                                    professional_id: schedule.professional_id,
                                    professional_type: schedule.professional_type,
                                    date: day.date,
                                    start_time: slot.start_time.clone(),
                                    end_time: slot.end_time.clone(),
                                    reason,
                                });
                            }
                        }
                    }
                }
            }
        }

        let is_consistent = findings.is_empty() && orphans.is_empty();
        if is_consistent {
            info!("Calendar audit for {}-{:02}: consistent", year, month);
        } else {
            warn!(
                "Calendar audit for {}-{:02}: {} drift findings, {} orphans",
                year,
                month,
                findings.len(),
                orphans.len()
            );
        }

        Ok(CalendarAuditReport {
            months_checked: 1,
            appointments_checked: active.len(),
            findings,
            orphaned_snapshots: orphans,
            is_consistent,
            generated_at: Utc::now(),
        })
    }

    /// Recreate whatever the audit found missing: the month itself, day
    /// entries, professional schedules, and booked-slot snapshots. Never
    /// deletes anything, in either store.
    #[instrument(skip(self, auth_token))]
    pub async fn repair_inconsistencies(
        &self,
        auth_token: &str,
    ) -> Result<RepairSummary, CalendarError> {
        let today = self.clock.today();
        let (year, month) = (today.year(), today.month());

        let mut summary = RepairSummary::default();

        if self.store.fetch_month(year, month, auth_token).await?.is_none() {
            self.materializer
                .materialize_month(year, month, auth_token)
                .await?;
            summary.months_materialized = 1;
        }

        let active = self
            .ledger
            .find_in_month(year, month, &ACTIVE_STATUSES, auth_token)
            .await?;

        for attempt in 1..=self.settings.write_retry_attempts {
            let Some(mut calendar) = self.store.fetch_month(year, month, auth_token).await? else {
                return Err(CalendarError::DatabaseError(format!(
                    "Month {}-{:02} missing after materialization",
                    year, month
                )));
            };

            let mut days_created = 0;
            let mut schedules_created = 0;
            let mut slots_restored = 0;

            for appointment in &active {
                if calendar.day_for(appointment.appointment_date).is_none() {
                    let position = calendar
                        .days
                        .iter()
                        .position(|day| day.date > appointment.appointment_date)
                        .unwrap_or(calendar.days.len());
                    calendar
                        .days
                        .insert(position, CalendarDay::empty(appointment.appointment_date));
                    days_created += 1;
                }

                let Some(day) = calendar.day_for_mut(appointment.appointment_date) else {
                    continue;
                };

                let had_schedule = day
                    .schedule_for(appointment.professional_id, appointment.professional_type)
                    .is_some();
                let schedule =
                    day.ensure_schedule(appointment.professional_id, appointment.professional_type);
                if !had_schedule {
                    schedules_created += 1;
                }

                let cached = schedule
                    .booked_slots
                    .iter()
                    .any(|slot| slot.appointment_id == appointment.id);
                if !cached {
                    schedule.booked_slots.push(BookedSlot::from_ledger(appointment));
                    slots_restored += 1;
                }
            }

            if days_created == 0 && schedules_created == 0 && slots_restored == 0 {
                info!("Calendar repair for {}-{:02}: nothing to do", year, month);
                return Ok(summary);
            }

            match self.store.update_month(&calendar, auth_token).await {
                Ok(_) => {
                    summary.days_created = days_created;
                    summary.schedules_created = schedules_created;
                    summary.slots_restored = slots_restored;
                    info!(
                        "Calendar repair for {}-{:02}: {} days, {} schedules, {} slots restored",
                        year, month, days_created, schedules_created, slots_restored
                    );
                    return Ok(summary);
                }
                Err(CalendarError::AggregateWriteConflict)
                    if attempt < self.settings.write_retry_attempts =>
                {
                    warn!(
                        "Aggregate version conflict during repair, retry {}/{}",
                        attempt, self.settings.write_retry_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CalendarError::AggregateWriteConflict)
    }
}

fn drift(kind: DriftKind, appointment: &LedgerAppointment) -> DriftFinding {
    DriftFinding {
        kind,
        appointment_id: appointment.id,
        professional_id: appointment.professional_id,
        professional_type: appointment.professional_type,
        date: appointment.appointment_date,
        start_time: appointment.start_time.clone(),
        end_time: appointment.end_time.clone(),
    }
}
