#[macro_export]
macro_rules! test_with_server {
    ($name:ident, |$server:ident, $ctx_state:ident, $config:ident| $body:block) => {
        #[tokio::test(flavor = "multi_thread")]
        #[serial_test::serial]
        async fn $name() {
            use axum_test::{TestServer, TestServerConfig};
            use futures::FutureExt;
            use std::panic::resume_unwind;
            use timeslice_server::config::AppConfig;
            use timeslice_server::database::client::{Database, DbConfig};
            use timeslice_server::middleware::mw_ctx::create_ctx_state;

            let $config = AppConfig {
                db_namespace: "test".to_string(),
                db_database: "test".to_string(),
                db_password: None,
                db_username: None,
                db_url: "mem://".to_string(),
                jwt_secret: "secret".to_string(),
                is_development: true,
                port: 8080,
                default_max_applications: 10,
                starting_credits: 0,
            };

            let $ctx_state = {
                let db = Database::connect(DbConfig {
                    url: &$config.db_url,
                    database: &$config.db_database,
                    namespace: &$config.db_namespace,
                    password: $config.db_password.as_deref(),
                    username: $config.db_username.as_deref(),
                })
                .await;

                timeslice_server::init::run_migrations(&db)
                    .await
                    .expect("migrations run");
                create_ctx_state(db, &$config)
            };

            let routes_all = timeslice_server::init::main_router(&$ctx_state);

            let $server = TestServer::new_with_config(
                routes_all,
                TestServerConfig {
                    transport: None,
                    save_cookies: false,
                    expect_success_by_default: false,
                    restrict_requests_with_http_schema: false,
                    default_content_type: None,
                    default_scheme: None,
                },
            )
            .expect("Failed to create test server");

            let test_result = std::panic::AssertUnwindSafe(async {
                (|| async $body)().await;
            })
            .catch_unwind()
            .await;

            $ctx_state
                .db
                .client
                .query(format!("REMOVE DATABASE {};", $config.db_database))
                .await
                .expect("failed to remove database");

            if let Err(panic) = test_result {
                resume_unwind(panic);
            }
        }
    };
}
