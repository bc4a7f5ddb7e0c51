// Test-support builders shared by the cell test suites: deterministic
// configuration, JWT minting for every platform role, and PostgREST row
// payloads shaped like the live tables.

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Full process config with test-friendly server tunables. Tests
    /// against wiremock overwrite `supabase_url` with the mock URI.
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            server_port: 3000,
            maintenance_interval_secs: 21600,
        }
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", "patient")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn physiotherapist(email: &str) -> Self {
        Self::new(email, "physiotherapist")
    }

    pub fn pathology(email: &str) -> Self {
        Self::new(email, "pathology")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Mints an HS256 token carrying the user's id, email and role, expiring
    /// `exp_hours` from now (default 24; negative values mint already-expired
    /// tokens).
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::hours(exp_hours.unwrap_or(24));

        let header = encode_segment(&json!({ "alg": "HS256", "typ": "JWT" }));
        let claims = encode_segment(&json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": issued_at.timestamp(),
            "exp": expires_at.timestamp()
        }));

        let signing_input = format!("{}.{}", header, claims);
        let signature = sign(secret, &signing_input);

        format!("{}.{}", signing_input, signature)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

fn encode_segment(value: &Value) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(value.to_string())
}

fn sign(secret: &str, signing_input: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(signing_input.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn professional_response(professional_id: &str, professional_type: &str) -> Value {
        json!({
            "id": professional_id,
            "professional_type": professional_type,
            "first_name": "Asha",
            "last_name": "Nair",
            "email": "asha.nair@example.com",
            "is_verified": true,
            "is_active": true,
            "is_approved": true,
            "consultation_fee": 500.0,
            "home_visit_fee": 900.0,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn weekly_template_response(
        professional_id: &str,
        professional_type: &str,
        day_of_week: i32,
        start_time: &str,
        end_time: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "professional_id": professional_id,
            "professional_type": professional_type,
            "day_of_week": day_of_week,
            "start_time": start_time,
            "end_time": end_time,
            "slot_kind": "clinic",
            "is_available": true,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn lab_test_slot_response(
        lab_id: &str,
        test_date: &str,
        start_time: &str,
        end_time: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "lab_id": lab_id,
            "test_date": test_date,
            "start_time": start_time,
            "end_time": end_time,
            "is_available": true,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        patient_id: &str,
        professional_id: &str,
        professional_type: &str,
        appointment_date: &str,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "patient_name": "Test Patient",
            "professional_id": professional_id,
            "professional_type": professional_type,
            "appointment_date": appointment_date,
            "start_time": start_time,
            "end_time": end_time,
            "status": status,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn month_calendar_response(year: i32, month: u32) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "year": year,
            "month": month,
            "days": [],
            "version": 1,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert_eq!(app_config.server_port, 3000);
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::physiotherapist("physio@example.com");
        assert_eq!(user.email, "physio@example.com");
        assert_eq!(user.role, "physiotherapist");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        assert!(token.contains('.'));
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_appointment_mock_shape() {
        let row = MockSupabaseResponses::appointment_response(
            "p-1", "d-1", "doctor", "2025-03-04", "09:00", "09:30", "confirmed",
        );
        assert_eq!(row["appointment_date"], "2025-03-04");
        assert_eq!(row["start_time"], "09:00");
        assert_eq!(row["status"], "confirmed");
    }
}
