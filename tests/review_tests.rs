mod helpers;

use axum::http::StatusCode;
use helpers::task_helpers::{
    apply_to_task_ok, create_fake_task, drive_booking_to_submitted, respond_to_application,
    update_booking_status,
};
use helpers::{create_fake_login_test_user, current_user, endow_user};
use serde_json::json;
use timeslice_server::entities::booking_entity::Booking;

async fn completed_booking(
    server: &axum_test::TestServer,
    provider_token: &str,
    helper_token: &str,
    credits: i64,
) -> String {
    let task = create_fake_task(server, provider_token, credits).await;
    let task_id = task.id.as_ref().unwrap().to_raw();
    let application = apply_to_task_ok(server, helper_token, &task_id, credits).await;
    let application_id = application.id.as_ref().unwrap().to_raw();
    let response =
        respond_to_application(server, provider_token, &application_id, "Accepted", None).await;
    response.assert_status_success();
    let outcome = response.json::<serde_json::Value>();
    let booking: Booking = serde_json::from_value(outcome["booking"].clone()).unwrap();
    let booking_id = booking.id.as_ref().unwrap().to_raw();

    drive_booking_to_submitted(server, helper_token, &booking_id).await;
    let response = update_booking_status(server, provider_token, &booking_id, "Completed").await;
    response.assert_status_success();
    booking_id
}

async fn post_review(
    server: &axum_test::TestServer,
    token: &str,
    booking_id: &str,
    rating: f64,
) -> axum_test::TestResponse {
    server
        .post(&format!("/api/bookings/{booking_id}/review"))
        .json(&json!({ "rating": rating, "text": "solid work" }))
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await
}

test_with_server!(one_review_per_side, |server, state, config| {
    let (server, provider, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;
    endow_user(server, &provider.id.to_raw(), 50).await;

    let booking_id = completed_booking(server, &provider_token, &helper_token, 50).await;

    // helper reviews the provider
    let response = post_review(server, &helper_token, &booking_id, 4.0).await;
    response.assert_status_success();
    let booking = response.json::<Booking>();
    assert_eq!(booking.helper_review.as_ref().unwrap().rating, 4.0);
    assert!(booking.task_provider_review.is_none());

    let provider_view = current_user(server, &provider_token).await;
    assert_eq!(provider_view.rating, 4.0);
    assert_eq!(provider_view.total_ratings, 1);

    // the same side again is rejected idempotently
    let response = post_review(server, &helper_token, &booking_id, 5.0).await;
    response.assert_status(StatusCode::CONFLICT);
    let provider_view = current_user(server, &provider_token).await;
    assert_eq!(provider_view.rating, 4.0);
    assert_eq!(provider_view.total_ratings, 1);

    // provider reviews the helper
    let response = post_review(server, &provider_token, &booking_id, 5.0).await;
    response.assert_status_success();
    let helper_view = current_user(server, &helper_token).await;
    assert_eq!(helper_view.rating, 5.0);
    assert_eq!(helper_view.total_ratings, 1);
});

test_with_server!(rating_running_average, |server, state, config| {
    let (server, provider, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;
    endow_user(server, &provider.id.to_raw(), 100).await;

    let first_booking = completed_booking(server, &provider_token, &helper_token, 40).await;
    let response = post_review(server, &helper_token, &first_booking, 4.0).await;
    response.assert_status_success();

    let second_booking = completed_booking(server, &provider_token, &helper_token, 60).await;
    let response = post_review(server, &helper_token, &second_booking, 5.0).await;
    response.assert_status_success();

    // (4*1 + 5) / 2
    let provider_view = current_user(server, &provider_token).await;
    assert_eq!(provider_view.rating, 4.5);
    assert_eq!(provider_view.total_ratings, 2);
});

test_with_server!(review_requires_completion, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task(server, &provider_token, 50).await;
    let task_id = task.id.as_ref().unwrap().to_raw();
    let application = apply_to_task_ok(server, &helper_token, &task_id, 50).await;
    let application_id = application.id.as_ref().unwrap().to_raw();
    let response =
        respond_to_application(server, &provider_token, &application_id, "Accepted", None).await;
    response.assert_status_success();
    let outcome = response.json::<serde_json::Value>();
    let booking: Booking = serde_json::from_value(outcome["booking"].clone()).unwrap();
    let booking_id = booking.id.as_ref().unwrap().to_raw();

    let response = post_review(server, &helper_token, &booking_id, 4.0).await;
    response.assert_status_bad_request();
});

test_with_server!(reviews_are_party_only, |server, state, config| {
    let (server, provider, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;
    let (server, _, other_token) = create_fake_login_test_user(&server).await;
    endow_user(server, &provider.id.to_raw(), 50).await;

    let booking_id = completed_booking(server, &provider_token, &helper_token, 50).await;

    let response = post_review(server, &other_token, &booking_id, 1.0).await;
    response.assert_status_forbidden();

    // rating bounds are validated
    let response = post_review(server, &helper_token, &booking_id, 0.5).await;
    response.assert_status_bad_request();
    let response = post_review(server, &helper_token, &booking_id, 5.5).await;
    response.assert_status_bad_request();
});
