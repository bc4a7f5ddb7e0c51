// libs/calendar-cell/src/services/calendar.rs
//
// Entry point for the calendar cell. Wires the store, ledger, materializer
// and the engines on top of one shared Supabase client, and routes month
// requests between the materialized store and the ledger-derived past.

use chrono::Datelike;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use chrono::NaiveDate;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use professional_cell::models::ProfessionalType;
use professional_cell::services::{AvailabilitySource, ProfessionalDirectory};

use crate::error::CalendarError;
use crate::models::{
    AddBreakRequest, AvailableSlotView, BookSlotRequest, BookedSlot, BreakEntry,
    CalendarAuditReport, CalendarDay, CalendarSettings, DayScheduleView, MonthCalendar,
    MonthCalendarView, ProfessionalDaySchedule, ReleaseSlotRequest, RepairSummary,
    ScheduleSource, UpdateAvailabilityRequest, WeekScheduleView,
};
use crate::services::audit::ConsistencyAuditor;
use crate::services::booking::SlotBookingService;
use crate::services::ledger::AppointmentLedger;
use crate::services::materializer::CalendarMaterializer;
use crate::services::past::PastCalendarGenerator;
use crate::services::schedule::ScheduleService;
use crate::services::slots::SlotAvailabilityEngine;
use crate::services::store::CalendarStore;
use crate::time::{month_last_day, shift_month, Clock, SystemClock};

pub struct CalendarService {
    store: Arc<CalendarStore>,
    materializer: Arc<CalendarMaterializer>,
    past: Arc<PastCalendarGenerator>,
    slots: SlotAvailabilityEngine,
    booking: SlotBookingService,
    schedule: ScheduleService,
    auditor: ConsistencyAuditor,
    clock: Arc<dyn Clock>,
    settings: CalendarSettings,
}

impl CalendarService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same wiring with an injected clock, so tests can pin "today".
    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let settings = CalendarSettings::default();

        let store = Arc::new(CalendarStore::new(Arc::clone(&supabase)));
        let ledger = Arc::new(AppointmentLedger::new(Arc::clone(&supabase)));
        let directory = Arc::new(ProfessionalDirectory::new(config));
        let availability = Arc::new(AvailabilitySource::new(config));

        let materializer = Arc::new(CalendarMaterializer::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&availability),
            Arc::clone(&clock),
        ));
        let past = Arc::new(PastCalendarGenerator::new(Arc::clone(&ledger)));

        let slots = SlotAvailabilityEngine::new(
            Arc::clone(&availability),
            Arc::clone(&directory),
            Arc::clone(&ledger),
            Arc::clone(&materializer),
            Arc::clone(&clock),
            settings.clone(),
        );
        let booking = SlotBookingService::new(
            Arc::clone(&supabase),
            Arc::clone(&ledger),
            Arc::clone(&materializer),
            Arc::clone(&store),
            Arc::clone(&clock),
            settings.clone(),
        );
        let schedule = ScheduleService::new(
            Arc::clone(&ledger),
            Arc::clone(&materializer),
            Arc::clone(&store),
            Arc::clone(&past),
            Arc::clone(&clock),
            settings.clone(),
        );
        let auditor = ConsistencyAuditor::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&materializer),
            Arc::clone(&clock),
            settings.clone(),
        );

        Self {
            store,
            materializer,
            past,
            slots,
            booking,
            schedule,
            auditor,
            clock,
            settings,
        }
    }

    /// Month view, routed by age: months entirely in the past are derived
    /// from the ledger on the fly, everything else comes from the store,
    /// materializing on first touch.
    #[instrument(skip(self, auth_token))]
    pub async fn get_calendar(
        &self,
        year: Option<i32>,
        month: Option<u32>,
        professional_id: Option<Uuid>,
        professional_type: Option<ProfessionalType>,
        auth_token: &str,
    ) -> Result<MonthCalendarView, CalendarError> {
        let today = self.clock.today();
        let year = year.unwrap_or_else(|| today.year());
        let month = month.unwrap_or_else(|| today.month());

        if !(1..=12).contains(&month) {
            return Err(CalendarError::InvalidMonth(month));
        }

        let last_day = month_last_day(year, month).ok_or(CalendarError::InvalidMonth(month))?;

        let (source, mut days) = if last_day < today {
            let days = self.past.month_view(year, month, auth_token).await?;
            (ScheduleSource::Ledger, days)
        } else {
            let days = self
                .materializer
                .resolve_or_materialize(year, month, auth_token)
                .await?
                .map(|calendar| calendar.days)
                .unwrap_or_default();
            (ScheduleSource::Calendar, days)
        };

        filter_professionals(&mut days, professional_id, professional_type);

        Ok(MonthCalendarView {
            year,
            month,
            source,
            days,
        })
    }

    pub async fn get_available_slots(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        duration_minutes: Option<i64>,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlotView>, CalendarError> {
        self.slots
            .available_slots(professional_id, professional_type, date, duration_minutes, auth_token)
            .await
    }

    pub async fn book_slot(
        &self,
        request: &BookSlotRequest,
        booked_by: Option<&str>,
        auth_token: &str,
    ) -> Result<BookedSlot, CalendarError> {
        self.booking.book_slot(request, booked_by, auth_token).await
    }

    pub async fn release_slot(
        &self,
        request: &ReleaseSlotRequest,
        auth_token: &str,
    ) -> Result<bool, CalendarError> {
        self.booking.release_slot(request, auth_token).await
    }

    pub async fn update_availability(
        &self,
        request: &UpdateAvailabilityRequest,
        updated_by: Option<&str>,
        auth_token: &str,
    ) -> Result<ProfessionalDaySchedule, CalendarError> {
        self.schedule
            .update_availability(request, updated_by, auth_token)
            .await
    }

    pub async fn add_break(
        &self,
        request: &AddBreakRequest,
        added_by: Option<&str>,
        auth_token: &str,
    ) -> Result<BreakEntry, CalendarError> {
        self.schedule.add_break(request, added_by, auth_token).await
    }

    pub async fn remove_break(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        break_id: Uuid,
        auth_token: &str,
    ) -> Result<(), CalendarError> {
        self.schedule
            .remove_break(professional_id, professional_type, date, break_id, auth_token)
            .await
    }

    pub async fn day_schedule(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DayScheduleView, CalendarError> {
        self.schedule
            .day_schedule(professional_id, professional_type, date, auth_token)
            .await
    }

    pub async fn week_schedule(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<WeekScheduleView, CalendarError> {
        self.schedule
            .week_schedule(professional_id, professional_type, date, auth_token)
            .await
    }

    /// Administrative eager materialization, ahead of first request.
    pub async fn initialize_month(
        &self,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<Option<MonthCalendar>, CalendarError> {
        self.materializer.materialize_month(year, month, auth_token).await
    }

    /// Retention pass: delete stored months older than the keep window.
    pub async fn clean_old_calendars(
        &self,
        months_to_keep: Option<u32>,
        auth_token: &str,
    ) -> Result<u32, CalendarError> {
        let keep = months_to_keep.unwrap_or(self.settings.months_to_keep);
        let today = self.clock.today();
        let (cutoff_year, cutoff_month) = shift_month(today.year(), today.month(), -(keep as i32));

        self.store
            .delete_months_before(cutoff_year, cutoff_month, auth_token)
            .await
    }

    pub async fn audit_health(&self, auth_token: &str) -> Result<CalendarAuditReport, CalendarError> {
        self.auditor.audit_health(auth_token).await
    }

    pub async fn repair_inconsistencies(
        &self,
        auth_token: &str,
    ) -> Result<RepairSummary, CalendarError> {
        self.auditor.repair_inconsistencies(auth_token).await
    }

    /// One periodic maintenance pass: keep the materialization window warm,
    /// drop expired slot locks, report drift, apply retention. Failures are
    /// logged and do not stop the remaining steps.
    pub async fn run_maintenance(&self, auth_token: &str) {
        let today = self.clock.today();

        for offset in 0..=self.settings.months_ahead {
            let (year, month) = shift_month(today.year(), today.month(), offset as i32);
            if let Err(e) = self.materializer.materialize_month(year, month, auth_token).await {
                warn!("Maintenance materialization of {}-{:02} failed: {}", year, month, e);
            }
        }

        if let Err(e) = self.booking.cleanup_expired_locks().await {
            warn!("Maintenance lock cleanup failed: {}", e);
        }

        match self.auditor.audit_health(auth_token).await {
            Ok(report) if !report.is_consistent => {
                warn!(
                    "Maintenance audit found {} drift findings and {} orphans",
                    report.findings.len(),
                    report.orphaned_snapshots.len()
                );
            }
            Ok(_) => info!("Maintenance audit: calendar consistent"),
            Err(e) => warn!("Maintenance audit failed: {}", e),
        }

        match self.clean_old_calendars(None, auth_token).await {
            Ok(removed) if removed > 0 => info!("Maintenance retention removed {} months", removed),
            Ok(_) => {}
            Err(e) => warn!("Maintenance retention failed: {}", e),
        }
    }
}

fn filter_professionals(
    days: &mut [CalendarDay],
    professional_id: Option<Uuid>,
    professional_type: Option<ProfessionalType>,
) {
    if professional_id.is_none() && professional_type.is_none() {
        return;
    }

    for day in days.iter_mut() {
        day.professionals.retain(|schedule| {
            professional_id.map(|id| schedule.professional_id == id).unwrap_or(true)
                && professional_type
                    .map(|kind| schedule.professional_type == kind)
                    .unwrap_or(true)
        });
    }
}
