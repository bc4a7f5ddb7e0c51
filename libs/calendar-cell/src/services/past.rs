// libs/calendar-cell/src/services/past.rs
//
// Historical calendar views. Nothing here touches the month store: past
// months are reconstructed from the ledger on every call and never
// persisted, so two reads of the same past month cannot drift.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use professional_cell::models::ProfessionalType;

use crate::error::CalendarError;
use crate::models::{
    AppointmentStatus, BookedSlot, CalendarDay, DayScheduleView, ScheduleSource,
};
use crate::services::ledger::AppointmentLedger;
use crate::time::{day_name, days_in_month};

pub struct PastCalendarGenerator {
    ledger: Arc<AppointmentLedger>,
}

impl PastCalendarGenerator {
    pub fn new(ledger: Arc<AppointmentLedger>) -> Self {
        Self { ledger }
    }

    /// Ephemeral month view derived from settled and confirmed ledger rows.
    /// Every day of the month appears, including days nobody worked.
    pub async fn month_view(
        &self,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<Vec<CalendarDay>, CalendarError> {
        if !(1..=12).contains(&month) {
            return Err(CalendarError::InvalidMonth(month));
        }

        let appointments = self
            .ledger
            .find_in_month(
                year,
                month,
                &[
                    AppointmentStatus::Completed,
                    AppointmentStatus::Cancelled,
                    AppointmentStatus::Confirmed,
                ],
                auth_token,
            )
            .await?;

        debug!(
            "Deriving past month {}-{:02} from {} ledger rows",
            year,
            month,
            appointments.len()
        );

        let mut days: Vec<CalendarDay> = (1..=days_in_month(year, month))
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .map(CalendarDay::empty)
            .collect();

        for appointment in &appointments {
            let Some(day) = days.iter_mut().find(|d| d.date == appointment.appointment_date)
            else {
                continue;
            };

            let schedule =
                day.ensure_schedule(appointment.professional_id, appointment.professional_type);
            schedule.booked_slots.push(BookedSlot::from_ledger(appointment));
        }

        Ok(days)
    }

    /// One professional's past day, any appointment status. Breaks and
    /// working hours are gone once the stored month is retired, so the view
    /// carries bookings only.
    pub async fn professional_day_view(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DayScheduleView, CalendarError> {
        let appointments = self
            .ledger
            .find_by_professional_and_date(professional_id, professional_type, date, auth_token)
            .await?;

        Ok(DayScheduleView {
            date,
            day_name: day_name(date),
            source: ScheduleSource::Ledger,
            is_available: false,
            working_hours: None,
            breaks: Vec::new(),
            booked_slots: appointments.iter().map(BookedSlot::from_ledger).collect(),
        })
    }
}
