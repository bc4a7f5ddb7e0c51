// libs/calendar-cell/src/services/materializer.rs
//
// Builds the month aggregate from the availability sources the first time a
// current or future month is needed. Past months are never materialized;
// historical views come from the ledger instead.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use professional_cell::models::{Professional, ProfessionalType};
use professional_cell::services::{AvailabilitySource, ProfessionalDirectory};

use crate::error::CalendarError;
use crate::models::{CalendarDay, MonthCalendar};
use crate::services::store::CalendarStore;
use crate::time::{days_in_month, month_first_day, month_last_day, weekday_index, Clock};

pub struct CalendarMaterializer {
    store: Arc<CalendarStore>,
    directory: Arc<ProfessionalDirectory>,
    availability: Arc<AvailabilitySource>,
    clock: Arc<dyn Clock>,
}

impl CalendarMaterializer {
    pub fn new(
        store: Arc<CalendarStore>,
        directory: Arc<ProfessionalDirectory>,
        availability: Arc<AvailabilitySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            availability,
            clock,
        }
    }

    /// Read-through resolution: the stored aggregate if one exists, a fresh
    /// materialization otherwise. `None` only for months entirely in the past.
    pub async fn resolve_or_materialize(
        &self,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<Option<MonthCalendar>, CalendarError> {
        if let Some(existing) = self.store.fetch_month(year, month, auth_token).await? {
            return Ok(Some(existing));
        }

        self.materialize_month(year, month, auth_token).await
    }

    /// Build and persist the aggregate for one month. Idempotent: an already
    /// stored month is returned as-is, and a concurrent materialization race
    /// resolves to whichever insert won.
    #[instrument(skip(self, auth_token))]
    pub async fn materialize_month(
        &self,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<Option<MonthCalendar>, CalendarError> {
        if !(1..=12).contains(&month) {
            return Err(CalendarError::InvalidMonth(month));
        }

        let last_day = month_last_day(year, month).ok_or(CalendarError::InvalidMonth(month))?;
        if last_day < self.clock.today() {
            debug!("Skipping materialization of past month {}-{:02}", year, month);
            return Ok(None);
        }

        if let Some(existing) = self.store.fetch_month(year, month, auth_token).await? {
            debug!("Month {}-{:02} already materialized", year, month);
            return Ok(Some(existing));
        }

        let days = self.build_month_days(year, month, auth_token).await?;
        let calendar = self.store.insert_month(year, month, days, auth_token).await?;

        info!(
            "Calendar {}-{:02} materialized with {} days",
            year,
            month,
            calendar.days.len()
        );

        Ok(Some(calendar))
    }

    /// Enumerate every day of the month and mark which eligible professionals
    /// offer slots on it. Schedules start available with empty breaks and an
    /// empty booking cache.
    async fn build_month_days(
        &self,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<Vec<CalendarDay>, CalendarError> {
        let mut days: Vec<CalendarDay> = (1..=days_in_month(year, month))
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .map(CalendarDay::empty)
            .collect();

        let professionals = self
            .directory
            .list_active(None, auth_token)
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        debug!(
            "Materializing {}-{:02} for {} eligible professionals",
            year,
            month,
            professionals.len()
        );

        for professional in &professionals {
            match professional.professional_type {
                ProfessionalType::Pathology => {
                    self.mark_lab_days(professional, year, month, &mut days, auth_token)
                        .await?
                }
                _ => {
                    self.mark_template_days(professional, &mut days, auth_token)
                        .await?
                }
            }
        }

        Ok(days)
    }

    /// Doctors and physiotherapists appear on every day whose weekday has at
    /// least one offered template entry.
    async fn mark_template_days(
        &self,
        professional: &Professional,
        days: &mut [CalendarDay],
        auth_token: &str,
    ) -> Result<(), CalendarError> {
        let template = self
            .availability
            .full_weekly_template(professional.id, professional.professional_type, auth_token)
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        let offered_weekdays: HashSet<i32> = template
            .iter()
            .filter(|entry| entry.is_available)
            .map(|entry| entry.day_of_week)
            .collect();

        if offered_weekdays.is_empty() {
            return Ok(());
        }

        for day in days.iter_mut() {
            if offered_weekdays.contains(&weekday_index(day.date)) {
                day.ensure_schedule(professional.id, professional.professional_type);
            }
        }

        Ok(())
    }

    /// Labs publish concrete dates, so they appear only on days with a
    /// published test window.
    async fn mark_lab_days(
        &self,
        professional: &Professional,
        year: i32,
        month: u32,
        days: &mut [CalendarDay],
        auth_token: &str,
    ) -> Result<(), CalendarError> {
        let (first, last) = match (month_first_day(year, month), month_last_day(year, month)) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(CalendarError::InvalidMonth(month)),
        };

        let slots = self
            .availability
            .test_slots_in_range(professional.id, first, last, auth_token)
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        let offered_dates: HashSet<NaiveDate> = slots
            .iter()
            .filter(|slot| slot.is_available)
            .map(|slot| slot.test_date)
            .collect();

        if offered_dates.is_empty() {
            return Ok(());
        }

        for day in days.iter_mut() {
            if offered_dates.contains(&day.date) {
                day.ensure_schedule(professional.id, professional.professional_type);
            }
        }

        Ok(())
    }
}
