// libs/calendar-cell/src/services/store.rs
//
// Persistence for month calendar aggregates. Every write goes through the
// whole-aggregate path: read the row, mutate the day list in memory, write
// it back guarded by the version column.

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::error::CalendarError;
use crate::models::{CalendarDay, MonthCalendar};

pub struct CalendarStore {
    supabase: Arc<SupabaseClient>,
}

impl CalendarStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Fetch the stored aggregate for one month, if it has been materialized.
    pub async fn fetch_month(
        &self,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<Option<MonthCalendar>, CalendarError> {
        let path = format!(
            "/rest/v1/month_calendars?year=eq.{}&month=eq.{}&select=*",
            year, month
        );

        let rows: Vec<Value> = self
            .supabase
            .request::<Vec<Value>>(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        match rows.first() {
            Some(row) => {
                let calendar: MonthCalendar = serde_json::from_value(row.clone())
                    .map_err(|e| {
                        CalendarError::DatabaseError(format!("Failed to parse month calendar: {}", e))
                    })?;
                Ok(Some(calendar))
            }
            None => Ok(None),
        }
    }

    /// Insert a freshly materialized month. `(year, month)` is unique, so a
    /// concurrent materializer losing the race is normal: we re-read and
    /// return whichever row won.
    pub async fn insert_month(
        &self,
        year: i32,
        month: u32,
        days: Vec<CalendarDay>,
        auth_token: &str,
    ) -> Result<MonthCalendar, CalendarError> {
        let now = Utc::now();
        let calendar_data = json!({
            "id": Uuid::new_v4(),
            "year": year,
            "month": month,
            "days": days,
            "version": 1,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let inserted = self
            .supabase
            .request_with_headers::<Vec<Value>>(
                Method::POST,
                "/rest/v1/month_calendars",
                Some(auth_token),
                Some(calendar_data),
                Some(headers),
            )
            .await;

        match inserted {
            Ok(rows) if !rows.is_empty() => {
                let calendar: MonthCalendar = serde_json::from_value(rows[0].clone())
                    .map_err(|e| {
                        CalendarError::DatabaseError(format!("Failed to parse inserted month: {}", e))
                    })?;
                info!("Materialized calendar for {}-{:02}", year, month);
                Ok(calendar)
            }
            Ok(_) | Err(_) => {
                // Unique violation on (year, month): someone materialized
                // this month first. Their row is the aggregate now.
                debug!("Insert for {}-{:02} lost the race, re-reading", year, month);
                self.fetch_month(year, month, auth_token)
                    .await?
                    .ok_or_else(|| {
                        CalendarError::DatabaseError(format!(
                            "Month {}-{:02} could not be inserted or read back",
                            year, month
                        ))
                    })
            }
        }
    }

    /// Write a mutated aggregate back, guarded by the version it was read
    /// at. An empty result means another writer bumped the version first.
    pub async fn update_month(
        &self,
        calendar: &MonthCalendar,
        auth_token: &str,
    ) -> Result<MonthCalendar, CalendarError> {
        let path = format!(
            "/rest/v1/month_calendars?id=eq.{}&version=eq.{}",
            calendar.id, calendar.version
        );
        let update_data = json!({
            "days": &calendar.days,
            "version": calendar.version + 1,
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            warn!(
                "Version conflict writing calendar {}-{:02} at version {}",
                calendar.year, calendar.month, calendar.version
            );
            return Err(CalendarError::AggregateWriteConflict);
        }

        let updated: MonthCalendar = serde_json::from_value(rows[0].clone())
            .map_err(|e| CalendarError::DatabaseError(format!("Failed to parse updated month: {}", e)))?;

        Ok(updated)
    }

    /// Delete stored months strictly older than the cutoff. Returns how many
    /// rows went away.
    pub async fn delete_months_before(
        &self,
        cutoff_year: i32,
        cutoff_month: u32,
        auth_token: &str,
    ) -> Result<u32, CalendarError> {
        let path = format!(
            "/rest/v1/month_calendars?or=(year.lt.{},and(year.eq.{},month.lt.{}))",
            cutoff_year, cutoff_year, cutoff_month
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await
            .map_err(|e| CalendarError::DatabaseError(e.to_string()))?;

        let count = deleted.len() as u32;
        if count > 0 {
            info!(
                "Retention removed {} calendar months older than {}-{:02}",
                count, cutoff_year, cutoff_month
            );
        }

        Ok(count)
    }
}
