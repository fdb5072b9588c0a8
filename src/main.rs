use std::net::{Ipv4Addr, SocketAddr};

use timeslice_server::config::AppConfig;
use timeslice_server::database::client::{Database, DbConfig};
use timeslice_server::init;
use timeslice_server::middleware::mw_ctx::create_ctx_state;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timeslice_server=debug,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();

    let db = Database::connect(DbConfig {
        url: &config.db_url,
        database: &config.db_database,
        namespace: &config.db_namespace,
        username: config.db_username.as_deref(),
        password: config.db_password.as_deref(),
    })
    .await;

    init::run_migrations(&db).await.expect("migrations should run");

    let ctx_state = create_ctx_state(db, &config);
    let routes_all = init::main_router(&ctx_state);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("bind listener");

    axum::serve(listener, routes_all.into_make_service())
        .await
        .expect("server run");
}
