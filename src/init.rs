use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum::http::StatusCode;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::database::client::Database;
use crate::entities::application_entity::ApplicationDbService;
use crate::entities::booking_entity::BookingDbService;
use crate::entities::credit_transaction_entity::CreditTransactionDbService;
use crate::entities::task_entity::TaskDbService;
use crate::entities::user_entity::UserDbService;
use crate::middleware::auth::mw_ctx_constructor;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::AppResult;
use crate::middleware::mw_ctx::CtxState;
use crate::routes::{applications, auth_routes, bookings, dev, tasks, users};

pub async fn run_migrations(database: &Database) -> AppResult<()> {
    let db = database.client.clone();
    let c = Ctx::new(Ok("migrations".to_string()), Uuid::new_v4());

    UserDbService { db: &db, ctx: &c }.mutate_db().await?;
    TaskDbService { db: &db, ctx: &c }.mutate_db().await?;
    ApplicationDbService { db: &db, ctx: &c }
        .mutate_db()
        .await?;
    BookingDbService { db: &db, ctx: &c }.mutate_db().await?;
    CreditTransactionDbService { db: &db, ctx: &c }
        .mutate_db()
        .await?;
    Ok(())
}

pub fn main_router(ctx_state: &Arc<CtxState>) -> Router {
    Router::new()
        .route("/hc", get(get_hc))
        .merge(auth_routes::routes())
        .merge(users::routes())
        .merge(tasks::routes())
        .merge(applications::routes())
        .merge(bookings::routes())
        .merge(dev::routes())
        .with_state(ctx_state.clone())
        .layer(axum::middleware::from_fn_with_state(
            ctx_state.clone(),
            mw_ctx_constructor,
        ))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn get_hc() -> Response {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    (StatusCode::OK, format!("v{VERSION}")).into_response()
}
