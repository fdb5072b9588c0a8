use axum_test::{TestResponse, TestServer};
use fake::{faker, Fake};
use serde_json::json;
use timeslice_server::entities::application_entity::Application;
use timeslice_server::entities::booking_entity::Booking;
use timeslice_server::entities::task_entity::Task;

#[allow(dead_code)]
pub async fn create_fake_task(server: &TestServer, token: &str, offer_credits: i64) -> Task {
    create_fake_task_with_limit(server, token, offer_credits, None).await
}

#[allow(dead_code)]
pub async fn create_fake_task_with_limit(
    server: &TestServer,
    token: &str,
    offer_credits: i64,
    max_applications: Option<i64>,
) -> Task {
    let mut body = json!({
        "title": faker::lorem::en::Sentence(2..5).fake::<String>(),
        "description": faker::lorem::en::Sentence(7..20).fake::<String>(),
        "skills_required": ["assembly"],
        "offer_credits": offer_credits,
        "duration_minutes": 60,
    });
    if let Some(max) = max_applications {
        body["max_applications"] = json!(max);
    }

    let response = server
        .post("/api/tasks")
        .json(&body)
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await;
    response.assert_status_success();
    response.json::<Task>()
}

#[allow(dead_code)]
pub async fn apply_to_task(
    server: &TestServer,
    token: &str,
    task_id: &str,
    proposed_credits: i64,
) -> TestResponse {
    server
        .post(&format!("/api/tasks/{task_id}/applications"))
        .json(&json!({
            "proposal": faker::lorem::en::Sentence(7..20).fake::<String>(),
            "proposed_credits": proposed_credits,
        }))
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await
}

#[allow(dead_code)]
pub async fn apply_to_task_ok(
    server: &TestServer,
    token: &str,
    task_id: &str,
    proposed_credits: i64,
) -> Application {
    let response = apply_to_task(server, token, task_id, proposed_credits).await;
    response.assert_status_success();
    response.json::<Application>()
}

#[allow(dead_code)]
pub async fn respond_to_application(
    server: &TestServer,
    token: &str,
    application_id: &str,
    status: &str,
    agreed_credits: Option<i64>,
) -> TestResponse {
    server
        .put(&format!("/api/applications/{application_id}/respond"))
        .json(&json!({
            "status": status,
            "agreed_credits": agreed_credits,
        }))
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await
}

#[allow(dead_code)]
pub async fn update_booking_status(
    server: &TestServer,
    token: &str,
    booking_id: &str,
    status: &str,
) -> TestResponse {
    server
        .put(&format!("/api/bookings/{booking_id}/status"))
        .json(&json!({ "status": status }))
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await
}

#[allow(dead_code)]
pub async fn submit_booking_work(
    server: &TestServer,
    token: &str,
    booking_id: &str,
) -> TestResponse {
    server
        .post(&format!("/api/bookings/{booking_id}/work"))
        .json(&json!({
            "deliverables": ["https://example.com/result"],
            "note": "done, see link",
        }))
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await
}

#[allow(dead_code)]
pub async fn get_task(server: &TestServer, token: &str, task_id: &str) -> serde_json::Value {
    let response = server
        .get(&format!("/api/tasks/{task_id}"))
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await;
    response.assert_status_success();
    response.json::<serde_json::Value>()
}

#[allow(dead_code)]
pub async fn get_booking(server: &TestServer, token: &str, booking_id: &str) -> Booking {
    let response = server
        .get(&format!("/api/bookings/{booking_id}"))
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await;
    response.assert_status_success();
    response.json::<Booking>()
}

/// Runs a booking from Confirmed all the way to WorkSubmitted.
#[allow(dead_code)]
pub async fn drive_booking_to_submitted(
    server: &TestServer,
    helper_token: &str,
    booking_id: &str,
) {
    let started = update_booking_status(server, helper_token, booking_id, "InProgress").await;
    started.assert_status_success();
    let submitted = submit_booking_work(server, helper_token, booking_id).await;
    submitted.assert_status_success();
}
