// libs/professional-cell/src/services/directory.rs
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Professional, ProfessionalError, ProfessionalType, SlotKind};

/// Read adapter over the professionals registry. Eligibility here gates both
/// calendar materialization and booking.
pub struct ProfessionalDirectory {
    supabase: SupabaseClient,
}

impl ProfessionalDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_professional(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        auth_token: &str,
    ) -> Result<Professional, ProfessionalError> {
        debug!("Fetching professional {} ({})", professional_id, professional_type);

        let path = format!(
            "/rest/v1/professionals?id=eq.{}&professional_type=eq.{}",
            professional_id, professional_type
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProfessionalError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ProfessionalError::NotFound);
        }

        let professional: Professional = serde_json::from_value(result[0].clone())
            .map_err(|e| ProfessionalError::DatabaseError(format!("Failed to parse professional: {}", e)))?;

        Ok(professional)
    }

    pub async fn is_verified_and_active(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        auth_token: &str,
    ) -> Result<bool, ProfessionalError> {
        match self.get_professional(professional_id, professional_type, auth_token).await {
            Ok(professional) => Ok(professional.is_eligible()),
            Err(ProfessionalError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn fee(
        &self,
        professional_id: Uuid,
        professional_type: ProfessionalType,
        slot_kind: SlotKind,
        auth_token: &str,
    ) -> Result<Option<f64>, ProfessionalError> {
        let professional = self.get_professional(professional_id, professional_type, auth_token).await?;
        Ok(professional.fee_for(slot_kind))
    }

    /// All professionals eligible for calendar materialization, optionally
    /// narrowed to one type.
    pub async fn list_active(
        &self,
        professional_type: Option<ProfessionalType>,
        auth_token: &str,
    ) -> Result<Vec<Professional>, ProfessionalError> {
        let mut path = String::from(
            "/rest/v1/professionals?is_verified=eq.true&is_active=eq.true&is_approved=eq.true",
        );

        if let Some(kind) = professional_type {
            path.push_str(&format!("&professional_type=eq.{}", kind));
        }

        path.push_str("&order=created_at.asc");

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProfessionalError::DatabaseError(e.to_string()))?;

        let professionals: Vec<Professional> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Professional>, _>>()
            .map_err(|e| ProfessionalError::DatabaseError(format!("Failed to parse professionals: {}", e)))?;

        Ok(professionals)
    }
}
