mod helpers;

use helpers::task_helpers::{
    apply_to_task, apply_to_task_ok, create_fake_task, create_fake_task_with_limit, get_task,
};
use helpers::create_fake_login_test_user;
use serde_json::json;
use timeslice_server::entities::application_entity::{Application, ApplicationStatus};

test_with_server!(apply_happy_path, |server, state, config| {
    let (server, provider, provider_token) = create_fake_login_test_user(&server).await;
    let (server, helper, helper_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task(server, &provider_token, 50).await;
    let task_id = task.id.as_ref().unwrap().to_raw();

    let application = apply_to_task_ok(server, &helper_token, &task_id, 45).await;
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(application.proposed_credits, 45);
    assert_eq!(application.applicant, helper.id);
    assert_eq!(application.task_provider, provider.id);
    assert!(application.match_score >= 0.0 && application.match_score <= 100.0);

    // the applicant count on the task is derived from the collection
    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["application_count"], json!(1));
});

test_with_server!(duplicate_application_conflicts, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task(server, &provider_token, 50).await;
    let task_id = task.id.as_ref().unwrap().to_raw();

    apply_to_task_ok(server, &helper_token, &task_id, 45).await;

    let second = apply_to_task(server, &helper_token, &task_id, 40).await;
    second.assert_status(axum::http::StatusCode::CONFLICT);
});

test_with_server!(self_application_blocked, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task(server, &provider_token, 50).await;
    let task_id = task.id.as_ref().unwrap().to_raw();

    let response = apply_to_task(server, &provider_token, &task_id, 45).await;
    response.assert_status_bad_request();
});

test_with_server!(apply_to_cancelled_task_blocked, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task(server, &provider_token, 50).await;
    let task_id = task.id.as_ref().unwrap().to_raw();

    let response = server
        .post(&format!("/api/tasks/{task_id}/cancel"))
        .add_header("Cookie", format!("jwt={provider_token}"))
        .await;
    response.assert_status_success();

    let response = apply_to_task(server, &helper_token, &task_id, 45).await;
    response.assert_status_bad_request();
});

test_with_server!(application_limit_closes_task, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper1_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper2_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task_with_limit(server, &provider_token, 50, Some(1)).await;
    let task_id = task.id.as_ref().unwrap().to_raw();

    apply_to_task_ok(server, &helper1_token, &task_id, 45).await;

    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["accepts_applications"], json!(false));

    let response = apply_to_task(server, &helper2_token, &task_id, 40).await;
    response.assert_status_bad_request();
});

test_with_server!(withdrawal_frees_the_slot, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper1_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper2_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task_with_limit(server, &provider_token, 50, Some(1)).await;
    let task_id = task.id.as_ref().unwrap().to_raw();

    let application = apply_to_task_ok(server, &helper1_token, &task_id, 45).await;
    let application_id = application.id.as_ref().unwrap().to_raw();

    let response = server
        .put(&format!("/api/applications/{application_id}/withdraw"))
        .add_header("Cookie", format!("jwt={helper1_token}"))
        .await;
    response.assert_status_success();
    let withdrawn = response.json::<Application>();
    assert_eq!(withdrawn.status, ApplicationStatus::Withdrawn);

    // count excludes the withdrawn application and the task reopened
    let view = get_task(server, &provider_token, &task_id).await;
    assert_eq!(view["application_count"], json!(0));
    assert_eq!(view["accepts_applications"], json!(true));

    apply_to_task_ok(server, &helper2_token, &task_id, 40).await;
});

test_with_server!(withdraw_is_applicant_only, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;
    let (server, _, other_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task(server, &provider_token, 50).await;
    let task_id = task.id.as_ref().unwrap().to_raw();
    let application = apply_to_task_ok(server, &helper_token, &task_id, 45).await;
    let application_id = application.id.as_ref().unwrap().to_raw();

    let response = server
        .put(&format!("/api/applications/{application_id}/withdraw"))
        .add_header("Cookie", format!("jwt={other_token}"))
        .await;
    response.assert_status_forbidden();

    let response = server
        .put(&format!("/api/applications/{application_id}/withdraw"))
        .add_header("Cookie", format!("jwt={provider_token}"))
        .await;
    response.assert_status_forbidden();
});

test_with_server!(applications_listing_access, |server, state, config| {
    let (server, _, provider_token) = create_fake_login_test_user(&server).await;
    let (server, _, helper_token) = create_fake_login_test_user(&server).await;

    let task = create_fake_task(server, &provider_token, 50).await;
    let task_id = task.id.as_ref().unwrap().to_raw();
    apply_to_task_ok(server, &helper_token, &task_id, 45).await;

    // provider sees the list
    let response = server
        .get(&format!("/api/tasks/{task_id}/applications"))
        .add_header("Cookie", format!("jwt={provider_token}"))
        .await;
    response.assert_status_success();
    let list = response.json::<serde_json::Value>();
    assert_eq!(list.as_array().unwrap().len(), 1);

    // applicants do not
    let response = server
        .get(&format!("/api/tasks/{task_id}/applications"))
        .add_header("Cookie", format!("jwt={helper_token}"))
        .await;
    response.assert_status_forbidden();

    // the applicant sees it under their own applications
    let response = server
        .get("/api/applications/mine")
        .add_header("Cookie", format!("jwt={helper_token}"))
        .await;
    response.assert_status_success();
    let mine = response.json::<serde_json::Value>();
    assert_eq!(mine.as_array().unwrap().len(), 1);
});
