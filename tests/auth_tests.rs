mod helpers;

use helpers::{create_fake_login_test_user, create_login_test_user, TEST_PASSWORD};
use serde_json::json;
use timeslice_server::routes::users::CurrentUserView;
use uuid::Uuid;

test_with_server!(register_and_fetch_current_user, |server, state, config| {
    let (server, registered, token) = create_fake_login_test_user(&server).await;
    assert_eq!(registered.credits, 0);
    assert_eq!(registered.rating, 0.0);

    let response = server
        .get("/api/users/current")
        .add_header("Cookie", format!("jwt={token}"))
        .await;
    response.assert_status_success();
    let current = response.json::<CurrentUserView>();
    assert_eq!(current.id, registered.id);
    assert_eq!(current.username, registered.username);
});

test_with_server!(register_rejects_taken_username, |server, state, config| {
    let username = format!("user{}", &Uuid::new_v4().simple().to_string()[..10]);
    let (server, ..) = create_login_test_user(&server, username.clone()).await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({ "username": username, "password": TEST_PASSWORD }))
        .await;
    response.assert_status_bad_request();
});

test_with_server!(login_verifies_password, |server, state, config| {
    let username = format!("user{}", &Uuid::new_v4().simple().to_string()[..10]);
    let (server, ..) = create_login_test_user(&server, username.clone()).await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "username": username, "password": "not-the-password1" }))
        .await;
    response.assert_status_forbidden();

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "username": username, "password": TEST_PASSWORD }))
        .await;
    response.assert_status_success();
    assert!(!response.cookie("jwt").value().is_empty());
});

test_with_server!(protected_routes_need_a_token, |server, state, config| {
    let response = server.get("/api/users/current").await;
    response.assert_status_forbidden();

    let response = server
        .get("/api/users/current")
        .add_header("Cookie", "jwt=not-a-real-token")
        .await;
    response.assert_status_forbidden();
});
