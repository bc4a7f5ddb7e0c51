// Materialization tests. The insert response is mocked, so day marking is
// verified by inspecting the POST body the store actually sent.

use std::sync::Arc;
use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calendar_cell::error::CalendarError;
use calendar_cell::services::CalendarService;
use calendar_cell::time::FixedClock;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const AUTH: &str = "test-token";

fn pinned_service(mock_server: &MockServer, day_of_month: u32) -> CalendarService {
    let test_config = TestConfig::default();
    let mut config = test_config.to_app_config();
    config.supabase_url = mock_server.uri();

    let clock = FixedClock(Utc.with_ymd_and_hms(2025, 3, day_of_month, 8, 0, 0).unwrap());
    CalendarService::with_clock(&config, Arc::new(clock))
}

async fn insert_body(mock_server: &MockServer) -> Value {
    let requests = mock_server.received_requests().await.unwrap();
    let insert = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/rest/v1/month_calendars")
        .expect("no month insert was sent");
    serde_json::from_slice(&insert.body).unwrap()
}

fn day_by_date<'a>(days: &'a [Value], date: &str) -> &'a Value {
    days.iter()
        .find(|d| d["date"] == date)
        .unwrap_or_else(|| panic!("day {} missing from insert body", date))
}

async fn mount_month_absent(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn mount_month_insert(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([MockSupabaseResponses::month_calendar_response(2025, 3)])),
        )
        .mount(mock_server)
        .await;
}

async fn mount_eligible(mock_server: &MockServer, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn template_weekdays_are_marked_across_the_month() {
    let mock_server = MockServer::start().await;
    let service = pinned_service(&mock_server, 4);
    let doctor_id = Uuid::new_v4();

    mount_month_absent(&mock_server).await;
    mount_eligible(
        &mock_server,
        json!([MockSupabaseResponses::professional_response(&doctor_id.to_string(), "doctor")]),
    )
    .await;
    // Offers Tuesdays only.
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::weekly_template_response(
                &doctor_id.to_string(),
                "doctor",
                2,
                "09:00",
                "09:30",
            )
        ])))
        .mount(&mock_server)
        .await;
    mount_month_insert(&mock_server).await;

    let materialized = service.initialize_month(2025, 3, AUTH).await.unwrap();
    assert!(materialized.is_some());

    let body = insert_body(&mock_server).await;
    assert_eq!(body["year"], 2025);
    assert_eq!(body["month"], 3);
    assert_eq!(body["version"], 1);

    let days = body["days"].as_array().unwrap();
    assert_eq!(days.len(), 31);

    // Tuesdays carry the doctor, other weekdays stay empty.
    let tuesday = day_by_date(days, "2025-03-04");
    assert_eq!(tuesday["professionals"].as_array().unwrap().len(), 1);
    assert_eq!(tuesday["professionals"][0]["professional_id"], json!(doctor_id));
    assert_eq!(tuesday["professionals"][0]["is_available"], true);
    let next_tuesday = day_by_date(days, "2025-03-11");
    assert_eq!(next_tuesday["professionals"].as_array().unwrap().len(), 1);
    let wednesday = day_by_date(days, "2025-03-05");
    assert!(wednesday["professionals"].as_array().unwrap().is_empty());

    let sunday = day_by_date(days, "2025-03-02");
    assert_eq!(sunday["is_holiday"], true);
    assert_eq!(sunday["day_name"], "Sunday");
}

#[tokio::test]
async fn past_month_is_never_materialized() {
    let mock_server = MockServer::start().await;
    let service = pinned_service(&mock_server, 4);

    // The age check fires before any store traffic.
    Mock::given(method("GET"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let materialized = service.initialize_month(2025, 2, AUTH).await.unwrap();
    assert!(materialized.is_none());
}

#[tokio::test]
async fn month_still_materializes_on_its_last_day() {
    let mock_server = MockServer::start().await;
    let service = pinned_service(&mock_server, 31);

    mount_month_absent(&mock_server).await;
    mount_eligible(&mock_server, json!([])).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([MockSupabaseResponses::month_calendar_response(2025, 3)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let materialized = service.initialize_month(2025, 3, AUTH).await.unwrap();
    assert!(materialized.is_some());
}

#[tokio::test]
async fn stored_month_is_returned_without_rebuilding() {
    let mock_server = MockServer::start().await;
    let service = pinned_service(&mock_server, 4);

    Mock::given(method("GET"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([MockSupabaseResponses::month_calendar_response(2025, 3)])),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/month_calendars"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let materialized = service.initialize_month(2025, 3, AUTH).await.unwrap().unwrap();
    assert_eq!(materialized.year, 2025);
    assert_eq!(materialized.month, 3);
}

#[tokio::test]
async fn withdrawn_template_rows_mark_nothing() {
    let mock_server = MockServer::start().await;
    let service = pinned_service(&mock_server, 4);
    let doctor_id = Uuid::new_v4();

    mount_month_absent(&mock_server).await;
    mount_eligible(
        &mock_server,
        json!([MockSupabaseResponses::professional_response(&doctor_id.to_string(), "doctor")]),
    )
    .await;
    let mut template = MockSupabaseResponses::weekly_template_response(
        &doctor_id.to_string(),
        "doctor",
        2,
        "09:00",
        "09:30",
    );
    template["is_available"] = json!(false);
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([template])))
        .mount(&mock_server)
        .await;
    mount_month_insert(&mock_server).await;

    service.initialize_month(2025, 3, AUTH).await.unwrap();

    let body = insert_body(&mock_server).await;
    let days = body["days"].as_array().unwrap();
    assert!(days
        .iter()
        .all(|day| day["professionals"].as_array().unwrap().is_empty()));
}

#[tokio::test]
async fn lab_windows_mark_their_exact_dates() {
    let mock_server = MockServer::start().await;
    let service = pinned_service(&mock_server, 4);
    let lab_id = Uuid::new_v4();

    mount_month_absent(&mock_server).await;
    mount_eligible(
        &mock_server,
        json!([MockSupabaseResponses::professional_response(&lab_id.to_string(), "pathology")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/lab_test_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::lab_test_slot_response(&lab_id.to_string(), "2025-03-10", "10:00", "10:30"),
            MockSupabaseResponses::lab_test_slot_response(&lab_id.to_string(), "2025-03-20", "10:00", "10:30"),
        ])))
        .mount(&mock_server)
        .await;
    // Labs publish dates, not weekly recurrences.
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_month_insert(&mock_server).await;

    service.initialize_month(2025, 3, AUTH).await.unwrap();

    let body = insert_body(&mock_server).await;
    let days = body["days"].as_array().unwrap();
    assert_eq!(
        day_by_date(days, "2025-03-10")["professionals"].as_array().unwrap().len(),
        1
    );
    assert_eq!(
        day_by_date(days, "2025-03-20")["professionals"].as_array().unwrap().len(),
        1
    );
    assert!(day_by_date(days, "2025-03-04")["professionals"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn out_of_range_month_is_rejected() {
    let mock_server = MockServer::start().await;
    let service = pinned_service(&mock_server, 4);

    let result = service.initialize_month(2025, 13, AUTH).await;

    assert_matches!(result, Err(CalendarError::InvalidMonth(13)));
}
