// Service-level tests for slot computation and booking, run against a
// pinned clock so the past/future boundary is deterministic.

use std::sync::Arc;
use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calendar_cell::error::CalendarError;
use calendar_cell::models::BookSlotRequest;
use calendar_cell::services::CalendarService;
use calendar_cell::time::FixedClock;
use professional_cell::models::{ProfessionalType, SlotKind};
use shared_config::AppConfig;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const AUTH: &str = "test-token";

// 2025-03-04 is a Tuesday (weekday index 2).
fn pinned_service(mock_server: &MockServer) -> (CalendarService, AppConfig) {
    let test_config = TestConfig::default();
    let mut config = test_config.to_app_config();
    config.supabase_url = mock_server.uri();

    let clock = FixedClock(Utc.with_ymd_and_hms(2025, 3, 4, 8, 0, 0).unwrap());
    let service = CalendarService::with_clock(&config, Arc::new(clock));
    (service, config)
}

fn today() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
}

fn month_row(days: Value) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "year": 2025,
        "month": 3,
        "days": days,
        "version": 1,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

fn day_with_schedule(schedule: Value) -> Value {
    json!({
        "date": "2025-03-04",
        "day_name": "Tuesday",
        "is_holiday": false,
        "professionals": [schedule]
    })
}

async fn mount_templates(mock_server: &MockServer, doctor_id: &str, windows: &[(&str, &str)]) {
    let rows: Vec<Value> = windows
        .iter()
        .map(|(start, end)| {
            MockSupabaseResponses::weekly_template_response(doctor_id, "doctor", 2, start, end)
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .mount(mock_server)
        .await;
}

async fn mount_month(mock_server: &MockServer, days: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([month_row(days)])))
        .mount(mock_server)
        .await;
}

async fn mount_empty_ledger(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn mount_professional(mock_server: &MockServer, doctor_id: &str, professional_type: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::professional_response(doctor_id, professional_type)
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn open_windows_survive_when_nothing_blocks() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    mount_templates(&mock_server, &doctor_id.to_string(), &[("09:00", "09:30"), ("09:30", "10:00")]).await;
    mount_month(&mock_server, json!([])).await;
    mount_empty_ledger(&mock_server).await;
    mount_professional(&mock_server, &doctor_id.to_string(), "doctor").await;

    let slots = service
        .get_available_slots(doctor_id, ProfessionalType::Doctor, today(), None, AUTH)
        .await
        .unwrap();

    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].start_time, "09:00");
    assert_eq!(slots[1].start_time, "09:30");
    assert_eq!(slots[0].duration_minutes, 30);
    assert_eq!(slots[0].slot_kind, SlotKind::Clinic);
    assert_eq!(slots[0].fee, Some(500.0));
}

#[tokio::test]
async fn cached_break_blocks_overlapping_window() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    mount_templates(&mock_server, &doctor_id.to_string(), &[("09:00", "09:30"), ("09:30", "10:00")]).await;
    let schedule = json!({
        "professional_id": doctor_id,
        "professional_type": "doctor",
        "is_available": true,
        "working_hours": null,
        "breaks": [{
            "id": Uuid::new_v4(),
            "start_time": "09:30",
            "end_time": "10:00",
            "reason": "Ward round",
            "added_by": null,
            "added_at": "2024-01-01T00:00:00Z"
        }],
        "booked_slots": []
    });
    mount_month(&mock_server, json!([day_with_schedule(schedule)])).await;
    mount_empty_ledger(&mock_server).await;
    mount_professional(&mock_server, &doctor_id.to_string(), "doctor").await;

    let slots = service
        .get_available_slots(doctor_id, ProfessionalType::Doctor, today(), None, AUTH)
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, "09:00");
}

#[tokio::test]
async fn ledger_appointment_blocks_window_before_cache_catches_up() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    mount_templates(&mock_server, &doctor_id.to_string(), &[("09:00", "09:30"), ("09:30", "10:00")]).await;
    // The cached aggregate knows nothing about the appointment yet.
    mount_month(&mock_server, json!([])).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "doctor",
                "2025-03-04",
                "09:00",
                "09:30",
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;
    mount_professional(&mock_server, &doctor_id.to_string(), "doctor").await;

    let slots = service
        .get_available_slots(doctor_id, ProfessionalType::Doctor, today(), None, AUTH)
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, "09:30");
}

#[tokio::test]
async fn hidden_day_returns_no_slots() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    mount_templates(&mock_server, &doctor_id.to_string(), &[("09:00", "09:30")]).await;
    let schedule = json!({
        "professional_id": doctor_id,
        "professional_type": "doctor",
        "is_available": false,
        "working_hours": null,
        "breaks": [],
        "booked_slots": []
    });
    mount_month(&mock_server, json!([day_with_schedule(schedule)])).await;
    // A hidden day short-circuits before the ledger and directory reads.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let slots = service
        .get_available_slots(doctor_id, ProfessionalType::Doctor, today(), None, AUTH)
        .await
        .unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn requested_duration_filters_short_windows() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    mount_templates(&mock_server, &doctor_id.to_string(), &[("09:00", "09:30"), ("09:30", "10:00")]).await;
    mount_month(&mock_server, json!([])).await;
    mount_empty_ledger(&mock_server).await;
    mount_professional(&mock_server, &doctor_id.to_string(), "doctor").await;

    let slots = service
        .get_available_slots(doctor_id, ProfessionalType::Doctor, today(), Some(45), AUTH)
        .await
        .unwrap();

    // Whole windows are offered as-is; nothing is sliced to fit.
    assert!(slots.is_empty());
}

#[tokio::test]
async fn working_hours_restriction_requires_full_containment() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    mount_templates(&mock_server, &doctor_id.to_string(), &[("09:00", "09:30"), ("09:30", "10:00")]).await;
    let schedule = json!({
        "professional_id": doctor_id,
        "professional_type": "doctor",
        "is_available": true,
        "working_hours": [{"start_time": "09:00", "end_time": "09:45"}],
        "breaks": [],
        "booked_slots": []
    });
    mount_month(&mock_server, json!([day_with_schedule(schedule)])).await;
    mount_empty_ledger(&mock_server).await;
    mount_professional(&mock_server, &doctor_id.to_string(), "doctor").await;

    let slots = service
        .get_available_slots(doctor_id, ProfessionalType::Doctor, today(), None, AUTH)
        .await
        .unwrap();

    // 09:30-10:00 spills past the 09:45 boundary and is dropped whole.
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, "09:00");
}

#[tokio::test]
async fn lab_slots_come_from_dated_windows() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let lab_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/lab_test_slots"))
        .and(query_param("test_date", "eq.2025-03-04"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::lab_test_slot_response(&lab_id.to_string(), "2025-03-04", "10:00", "10:30")
        ])))
        .mount(&mock_server)
        .await;
    mount_month(&mock_server, json!([])).await;
    mount_empty_ledger(&mock_server).await;
    mount_professional(&mock_server, &lab_id.to_string(), "pathology").await;

    let slots = service
        .get_available_slots(lab_id, ProfessionalType::Pathology, today(), None, AUTH)
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, "10:00");
    assert_eq!(slots[0].slot_kind, SlotKind::Clinic);
}

#[tokio::test]
async fn past_date_request_is_rejected() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);

    let result = service
        .get_available_slots(
            Uuid::new_v4(),
            ProfessionalType::Doctor,
            chrono::NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            None,
            AUTH,
        )
        .await;

    assert_matches!(result, Err(CalendarError::PastDateNotBookable));
}

fn book_request(doctor_id: Uuid, appointment_id: Uuid) -> BookSlotRequest {
    BookSlotRequest {
        professional_id: doctor_id,
        professional_type: ProfessionalType::Doctor,
        appointment_id,
        patient_id: Uuid::new_v4(),
        patient_name: Some("Test Patient".to_string()),
        date: today(),
        start_time: "09:00".to_string(),
        end_time: "09:30".to_string(),
    }
}

async fn mount_lock_happy_path(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .mount(mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn book_slot_surfaces_ledger_conflict_count() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    mount_lock_happy_path(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "doctor",
                "2025-03-04",
                "09:00",
                "09:30",
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = service
        .book_slot(&book_request(doctor_id, Uuid::new_v4()), Some("tester"), AUTH)
        .await;

    assert_matches!(result, Err(CalendarError::SlotConflict { conflicts: 1 }));
}

#[tokio::test]
async fn book_slot_returns_cached_snapshot_without_rewriting() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mount_lock_happy_path(&mock_server).await;
    mount_empty_ledger(&mock_server).await;

    let schedule = json!({
        "professional_id": doctor_id,
        "professional_type": "doctor",
        "is_available": true,
        "working_hours": null,
        "breaks": [],
        "booked_slots": [{
            "appointment_id": appointment_id,
            "patient_id": Uuid::new_v4(),
            "patient_name": "Test Patient",
            "start_time": "09:00",
            "end_time": "09:30",
            "status": "booked",
            "booked_by": "earlier-caller",
            "booked_at": "2025-03-01T10:00:00Z"
        }]
    });
    mount_month(&mock_server, json!([day_with_schedule(schedule)])).await;
    // The retry must not rewrite the aggregate.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let booked = service
        .book_slot(&book_request(doctor_id, appointment_id), Some("retry-caller"), AUTH)
        .await
        .unwrap();

    assert_eq!(booked.appointment_id, appointment_id);
    assert_eq!(booked.booked_by.as_deref(), Some("earlier-caller"));
}

#[tokio::test]
async fn expired_lock_is_cleaned_up_and_retaken() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    // First insert collides with a stale lock row; after cleanup the
    // second insert wins.
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "duplicate key"})))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "lock_key": format!("slot_doctor_{}_2025-03-04", doctor_id),
            "professional_id": doctor_id,
            "acquired_at": "2020-01-01T00:00:00Z",
            "expires_at": "2020-01-01T00:00:30Z",
            "process_id": "calendar_stale"
        }])))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    mount_empty_ledger(&mock_server).await;
    mount_month(
        &mock_server,
        json!([{
            "date": "2025-03-04",
            "day_name": "Tuesday",
            "is_holiday": false,
            "professionals": []
        }]),
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([month_row(json!([]))])))
        .mount(&mock_server)
        .await;

    let booked = service
        .book_slot(&book_request(doctor_id, Uuid::new_v4()), Some("tester"), AUTH)
        .await
        .unwrap();

    assert_eq!(booked.start_time, "09:00");
    assert_eq!(booked.booked_by.as_deref(), Some("tester"));
}

#[tokio::test]
async fn busy_lock_gives_up_after_retries() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "duplicate key"})))
        .mount(&mock_server)
        .await;
    // Holder's lease is still live, so cleanup declines to steal it.
    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "lock_key": format!("slot_doctor_{}_2025-03-04", doctor_id),
            "professional_id": doctor_id,
            "acquired_at": "2025-03-04T07:59:50Z",
            "expires_at": "2099-01-01T00:00:00Z",
            "process_id": "calendar_other"
        }])))
        .mount(&mock_server)
        .await;

    let result = service
        .book_slot(&book_request(doctor_id, Uuid::new_v4()), None, AUTH)
        .await;

    assert_matches!(result, Err(CalendarError::DatabaseError(msg)) if msg.contains("lock"));
}

#[tokio::test]
async fn release_slot_removes_cached_snapshot() {
    let mock_server = MockServer::start().await;
    let (service, _config) = pinned_service(&mock_server);
    let doctor_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    let schedule = json!({
        "professional_id": doctor_id,
        "professional_type": "doctor",
        "is_available": true,
        "working_hours": null,
        "breaks": [],
        "booked_slots": [{
            "appointment_id": appointment_id,
            "patient_id": Uuid::new_v4(),
            "patient_name": null,
            "start_time": "09:00",
            "end_time": "09:30",
            "status": "booked",
            "booked_by": null,
            "booked_at": null
        }]
    });
    mount_month(&mock_server, json!([day_with_schedule(schedule)])).await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([month_row(json!([]))])))
        .mount(&mock_server)
        .await;

    let released = service
        .release_slot(
            &calendar_cell::models::ReleaseSlotRequest {
                professional_id: doctor_id,
                professional_type: ProfessionalType::Doctor,
                date: today(),
                appointment_id,
            },
            AUTH,
        )
        .await
        .unwrap();

    assert!(released);
}
