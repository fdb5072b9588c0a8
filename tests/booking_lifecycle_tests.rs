mod helpers;

use helpers::create_fake_login_test_user;
use helpers::task_helpers::{
    apply_to_task_ok, create_fake_task, get_booking, get_task, respond_to_application,
    submit_booking_work, update_booking_status,
};
use helpers::endow_user;
use serde_json::json;
use timeslice_server::entities::booking_entity::{Booking, BookingStatus};

async fn accepted_booking(
    server: &axum_test::TestServer,
    provider_token: &str,
    helper_token: &str,
    offer: i64,
) -> (String, Booking) {
    let task = create_fake_task(server, provider_token, offer).await;
    let task_id = task.id.as_ref().unwrap().to_raw();
    let application = apply_to_task_ok(server, helper_token, &task_id, offer).await;
    let application_id = application.id.as_ref().unwrap().to_raw();

    let response =
        respond_to_application(server, provider_token, &application_id, "Accepted", None).await;
    response.assert_status_success();
    let outcome = response.json::<serde_json::Value>();
    let booking: Booking = serde_json::from_value(outcome["booking"].clone()).unwrap();
    (task_id, booking)
}

test_with_server!(work_lifecycle_walk, |server, state, config| {
    let (server, provider, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;
    endow_user(server, &provider.id.to_raw(), 100).await;

    let (task_id, booking) = accepted_booking(server, &provider_token, &helper_token, 50).await;
    let booking_id = booking.id.as_ref().unwrap().to_raw();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert!(booking.started_at.is_none());

    // provider may not start the work
    let response = update_booking_status(server, &provider_token, &booking_id, "InProgress").await;
    response.assert_status_forbidden();

    // helper starts - task follows
    let response = update_booking_status(server, &helper_token, &booking_id, "InProgress").await;
    response.assert_status_success();
    let started = response.json::<Booking>();
    assert_eq!(started.status, BookingStatus::InProgress);
    assert!(started.started_at.is_some());
    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["status"], json!("InProgress"));

    // helper submits, provider sends it back, helper resubmits
    let response = submit_booking_work(server, &helper_token, &booking_id).await;
    response.assert_status_success();
    assert_eq!(
        response.json::<Booking>().status,
        BookingStatus::WorkSubmitted
    );

    let response = update_booking_status(server, &helper_token, &booking_id, "InProgress").await;
    response.assert_status_forbidden();
    let response = update_booking_status(server, &provider_token, &booking_id, "InProgress").await;
    response.assert_status_success();
    assert_eq!(response.json::<Booking>().status, BookingStatus::InProgress);

    let response = submit_booking_work(server, &helper_token, &booking_id).await;
    response.assert_status_success();

    // helper may not complete
    let response = update_booking_status(server, &helper_token, &booking_id, "Completed").await;
    response.assert_status_forbidden();

    let response = update_booking_status(server, &provider_token, &booking_id, "Completed").await;
    response.assert_status_success();
    let completed = response.json::<Booking>();
    assert_eq!(completed.status, BookingStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert!(completed.actual_duration_minutes.is_some());

    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["status"], json!("Completed"));
});

test_with_server!(skipped_edges_are_rejected, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;

    let (_, booking) = accepted_booking(server, &provider_token, &helper_token, 50).await;
    let booking_id = booking.id.as_ref().unwrap().to_raw();

    // Confirmed -> Completed skips the whole work phase
    let response = update_booking_status(server, &provider_token, &booking_id, "Completed").await;
    response.assert_status_bad_request();

    // work can not be submitted before the booking started
    let response = submit_booking_work(server, &helper_token, &booking_id).await;
    response.assert_status_bad_request();

    // strangers see nothing
    let (server, _, other_token) = create_fake_login_test_user(&server).await;
    let response = update_booking_status(server, &other_token, &booking_id, "InProgress").await;
    response.assert_status_forbidden();
});

test_with_server!(cancel_before_start_reopens_task, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper2_token) = create_fake_login_test_user(&server).await;

    let (task_id, booking) = accepted_booking(server, &provider_token, &helper_token, 50).await;
    let booking_id = booking.id.as_ref().unwrap().to_raw();

    let response = update_booking_status(server, &helper_token, &booking_id, "Cancelled").await;
    response.assert_status_success();
    assert_eq!(response.json::<Booking>().status, BookingStatus::Cancelled);

    // task is matchable again
    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["status"], json!("Open"));
    assert!(view.get("selected_helper").map(|v| v.is_null()).unwrap_or(true));
    assert_eq!(view["accepts_applications"], json!(true));

    apply_to_task_ok(server, &helper2_token, &task_id, 40).await;

    // the cancelled booking stays a terminal record
    let response = update_booking_status(server, &helper_token, &booking_id, "InProgress").await;
    response.assert_status_bad_request();
});

test_with_server!(cancel_mid_work_terminates_task, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;

    let (task_id, booking) = accepted_booking(server, &provider_token, &helper_token, 50).await;
    let booking_id = booking.id.as_ref().unwrap().to_raw();

    let response = update_booking_status(server, &helper_token, &booking_id, "InProgress").await;
    response.assert_status_success();

    let response = update_booking_status(server, &provider_token, &booking_id, "Cancelled").await;
    response.assert_status_success();

    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["status"], json!("Cancelled"));
});

test_with_server!(dispute_freezes_and_resolves, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;

    let (task_id, booking) = accepted_booking(server, &provider_token, &helper_token, 50).await;
    let booking_id = booking.id.as_ref().unwrap().to_raw();

    let response = update_booking_status(server, &helper_token, &booking_id, "InProgress").await;
    response.assert_status_success();

    let response = update_booking_status(server, &provider_token, &booking_id, "Disputed").await;
    response.assert_status_success();
    assert_eq!(response.json::<Booking>().status, BookingStatus::Disputed);

    // no work while disputed
    let response = submit_booking_work(server, &helper_token, &booking_id).await;
    response.assert_status_bad_request();

    // resolution restores the pre-dispute state
    let response = update_booking_status(server, &helper_token, &booking_id, "InProgress").await;
    response.assert_status_success();
    let restored = get_booking(server, &helper_token, &booking_id).await;
    assert_eq!(restored.status, BookingStatus::InProgress);
    assert!(restored.status_before_dispute.is_none());

    // second dispute resolved as refund terminates booking and task
    let response = update_booking_status(server, &helper_token, &booking_id, "Disputed").await;
    response.assert_status_success();
    let response = update_booking_status(server, &provider_token, &booking_id, "Refunded").await;
    response.assert_status_success();
    assert_eq!(response.json::<Booking>().status, BookingStatus::Refunded);

    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["status"], json!("Cancelled"));
});
