pub mod task_helpers;
pub mod test_with_server;

use axum_test::TestServer;
use serde_json::json;
use timeslice_server::routes::users::CurrentUserView;
use uuid::Uuid;

#[allow(dead_code)]
pub const TEST_PASSWORD: &str = "some3242paSs#$";

#[allow(dead_code)]
pub async fn create_login_test_user(
    server: &TestServer,
    username: String,
) -> (&TestServer, CurrentUserView, String) {
    create_login_test_user_with_skills(server, username, vec![]).await
}

#[allow(dead_code)]
pub async fn create_login_test_user_with_skills<'a>(
    server: &'a TestServer,
    username: String,
    skills: Vec<&'a str>,
) -> (&'a TestServer, CurrentUserView, String) {
    let create_user = server
        .post("/api/auth/register")
        .json(&json!({
            "username": username,
            "password": TEST_PASSWORD,
            "skills": skills,
        }))
        .await;
    create_user.assert_status_success();

    let registered = create_user.json::<CurrentUserView>();
    let token = create_user.cookie("jwt").value().to_string();

    (server, registered, token)
}

#[allow(dead_code)]
pub async fn create_fake_login_test_user(
    server: &TestServer,
) -> (&TestServer, CurrentUserView, String) {
    let username = format!("user{}", &Uuid::new_v4().simple().to_string()[..10]);
    create_login_test_user(server, username).await
}

#[allow(dead_code)]
pub async fn endow_user(server: &TestServer, user_id: &str, amount: i64) {
    let endow_response = server
        .get(&format!("/test/api/endow/{user_id}/{amount}"))
        .add_header("Accept", "application/json")
        .await;
    endow_response.assert_status_success();
}

#[allow(dead_code)]
pub async fn current_credits(server: &TestServer, token: &str) -> i64 {
    let response = server
        .get("/api/users/current/credits")
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await;
    response.assert_status_success();
    response.json::<serde_json::Value>()["credits"]
        .as_i64()
        .expect("credits number")
}

#[allow(dead_code)]
pub async fn current_user(server: &TestServer, token: &str) -> CurrentUserView {
    let response = server
        .get("/api/users/current")
        .add_header("Cookie", format!("jwt={token}"))
        .add_header("Accept", "application/json")
        .await;
    response.assert_status_success();
    response.json::<CurrentUserView>()
}
