// libs/professional-cell/src/services/availability.rs
use anyhow::Result;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{LabTestSlot, OfferedSlot, ProfessionalType, TemplateSlot};

/// Read adapter over the offered-slot sources: recurring weekly templates for
/// doctors and physiotherapists, dated test windows for pathology labs.
pub struct AvailabilitySource {
    supabase: SupabaseClient,
}

impl AvailabilitySource {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Template entries for one weekday, ordered by start time.
    pub async fn weekly_template(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Vec<TemplateSlot>> {
        debug!("Fetching weekly template for {} {} on weekday {}",
               professional_type, professional_id, day_of_week);

        let path = format!(
            "/rest/v1/weekly_templates?professional_id=eq.{}&professional_type=eq.{}&day_of_week=eq.{}&order=start_time.asc",
            professional_id, professional_type, day_of_week
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let slots: Vec<TemplateSlot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<TemplateSlot>, _>>()?;

        Ok(slots)
    }

    /// The whole weekly template in one read. The materializer groups the
    /// entries by weekday instead of issuing one query per day.
    pub async fn full_weekly_template(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        auth_token: &str,
    ) -> Result<Vec<TemplateSlot>> {
        let path = format!(
            "/rest/v1/weekly_templates?professional_id=eq.{}&professional_type=eq.{}&order=day_of_week.asc,start_time.asc",
            professional_id, professional_type
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let slots: Vec<TemplateSlot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<TemplateSlot>, _>>()?;

        Ok(slots)
    }

    /// Lab test windows published for a single date.
    pub async fn test_slots_for_date(
        &self,
        lab_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<LabTestSlot>> {
        debug!("Fetching lab test slots for lab {} on {}", lab_id, date);

        let path = format!(
            "/rest/v1/lab_test_slots?lab_id=eq.{}&test_date=eq.{}&order=start_time.asc",
            lab_id, date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let slots: Vec<LabTestSlot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<LabTestSlot>, _>>()?;

        Ok(slots)
    }

    /// Lab test windows across a date range, used when assembling a whole month.
    pub async fn test_slots_in_range(
        &self,
        lab_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<LabTestSlot>> {
        let path = format!(
            "/rest/v1/lab_test_slots?lab_id=eq.{}&test_date=gte.{}&test_date=lte.{}&order=test_date.asc,start_time.asc",
            lab_id, from, to
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let slots: Vec<LabTestSlot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<LabTestSlot>, _>>()?;

        Ok(slots)
    }

    /// Offered windows for one professional on one date, normalized across the
    /// two source shapes. Pathology routes by exact date, everyone else by
    /// day-of-week.
    pub async fn offered_slots_for_date(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        date: NaiveDate,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Vec<OfferedSlot>> {
        let offered = match professional_type {
            ProfessionalType::Pathology => {
                self.test_slots_for_date(professional_id, date, auth_token)
                    .await?
                    .iter()
                    .map(OfferedSlot::from_lab_slot)
                    .collect()
            }
            _ => {
                self.weekly_template(professional_id, professional_type, day_of_week, auth_token)
                    .await?
                    .iter()
                    .map(OfferedSlot::from_template)
                    .collect()
            }
        };

        Ok(offered)
    }
}
