// libs/calendar-cell/src/services/ledger.rs
//
// Read-only access to the appointments ledger. The ledger is owned by the
// booking flow upstream of this cell; here it is only consulted, never
// written.

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::error::CalendarError;
use crate::models::{AppointmentStatus, LedgerAppointment};
use crate::time::{month_first_day, month_last_day};

use professional_cell::models::ProfessionalType;

pub struct AppointmentLedger {
    supabase: Arc<SupabaseClient>,
}

impl AppointmentLedger {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Active appointments that overlap the given half-open window on one
    /// professional's day. `exclude_appointment_id` keeps the caller's own
    /// ledger row from conflicting with itself.
    pub async fn find_overlapping(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        start_time: &str,
        end_time: &str,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<LedgerAppointment>, CalendarError> {
        let mut query_parts = vec![
            format!("professional_id=eq.{}", professional_id),
            format!("professional_type=eq.{}", professional_type),
            format!("appointment_date=eq.{}", date),
            "status=in.(pending,confirmed,accepted)".to_string(),
            // Half-open overlap: existing.start < new.end AND existing.end > new.start
            format!("start_time=lt.{}", urlencoding::encode(end_time)),
            format!("end_time=gt.{}", urlencoding::encode(start_time)),
        ];

        if let Some(excluded) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", excluded));
        }

        let path = format!("/rest/v1/appointments?{}&select=*", query_parts.join("&"));
        debug!(
            "Checking ledger overlaps for {} {} on {} {}-{}",
            professional_type, professional_id, date, start_time, end_time
        );

        self.fetch(&path, auth_token).await
    }

    /// Active appointments for one professional on one date, ordered by
    /// start time. The authoritative read behind slot computation and the
    /// availability mutation guards.
    pub async fn find_active_for_date(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<LedgerAppointment>, CalendarError> {
        let path = format!(
            "/rest/v1/appointments?professional_id=eq.{}&professional_type=eq.{}&appointment_date=eq.{}&status=in.(pending,confirmed,accepted)&order=start_time.asc&select=*",
            professional_id, professional_type, date
        );

        self.fetch(&path, auth_token).await
    }

    /// Every ledger row for one professional on one date, any status,
    /// ordered by start time. Used for past-day schedule views.
    pub async fn find_by_professional_and_date(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<LedgerAppointment>, CalendarError> {
        let path = format!(
            "/rest/v1/appointments?professional_id=eq.{}&professional_type=eq.{}&appointment_date=eq.{}&order=start_time.asc&select=*",
            professional_id, professional_type, date
        );

        self.fetch(&path, auth_token).await
    }

    /// Ledger rows in one calendar month restricted to the given statuses.
    pub async fn find_in_month(
        &self,
        year: i32,
        month: u32,
        statuses: &[AppointmentStatus],
        auth_token: &str,
    ) -> Result<Vec<LedgerAppointment>, CalendarError> {
        let (first, last) = match (month_first_day(year, month), month_last_day(year, month)) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(CalendarError::InvalidMonth(month)),
        };

        let status_list = statuses
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let path = format!(
            "/rest/v1/appointments?appointment_date=gte.{}&appointment_date=lte.{}&status=in.({})&order=appointment_date.asc,start_time.asc&select=*",
            first, last, status_list
        );

        self.fetch(&path, auth_token).await
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<LedgerAppointment>, CalendarError> {
        let rows: Vec<Value> = self
            .supabase
            .request::<Vec<Value>>(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    CalendarError::DatabaseError(format!("Failed to parse ledger row: {}", e))
                })
            })
            .collect()
    }
}
