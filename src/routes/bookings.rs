use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::entities::booking_entity::{
    Booking, BookingActor, BookingDbService, BookingReview, BookingStatus,
};
use crate::entities::user_entity::UserView;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::mw_ctx::CtxState;
use crate::middleware::utils::db_utils::{IdentIdName, ViewFieldSelector};
use crate::middleware::utils::extractor_utils::JsonOrFormValidated;
use crate::middleware::utils::string_utils::get_string_thing;
use crate::services::booking_service::{
    BookingService, BookingStatusInput, ReviewInput, WorkSubmitInput,
};

pub fn routes() -> Router<Arc<CtxState>> {
    Router::new()
        .route("/api/bookings", get(list_bookings))
        .route("/api/bookings/:booking_id", get(get_booking))
        .route("/api/bookings/:booking_id/status", put(update_status))
        .route("/api/bookings/:booking_id/work", post(submit_work))
        .route("/api/bookings/:booking_id/review", post(add_review))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingView {
    pub id: Thing,
    pub task: Thing,
    pub application: Thing,
    pub helper: UserView,
    pub task_provider: UserView,
    pub agreed_credits: i64,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_review: Option<BookingReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_provider_review: Option<BookingReview>,
    pub created_at: DateTime<Utc>,
}

impl ViewFieldSelector for BookingView {
    fn get_select_query_fields() -> String {
        "id,
        task,
        application,
        helper.{id, username, full_name, skills, rating, total_ratings, completed_tasks, tasks_created} as helper,
        task_provider.{id, username, full_name, skills, rating, total_ratings, completed_tasks, tasks_created} as task_provider,
        agreed_credits,
        status,
        started_at,
        completed_at,
        actual_duration_minutes,
        helper_review,
        task_provider_review,
        created_at"
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct BookingListQuery {
    role: Option<String>,
}

async fn list_bookings(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Query(query): Query<BookingListQuery>,
) -> CtxResult<Json<Vec<BookingView>>> {
    let user_id = ctx.user_thing()?;
    let service = BookingDbService {
        db: &state.db.client,
        ctx: &ctx,
    };

    let list = match query.role.as_deref() {
        Some("helper") => {
            service
                .list_by_actor::<BookingView>(&user_id, BookingActor::Helper, None)
                .await?
        }
        Some("provider") => {
            service
                .list_by_actor::<BookingView>(&user_id, BookingActor::TaskProvider, None)
                .await?
        }
        Some(other) => {
            return Err(ctx.to_ctx_error(AppError::Validation {
                source: format!("unknown role '{other}'"),
            }))
        }
        None => {
            let mut list = service
                .list_by_actor::<BookingView>(&user_id, BookingActor::Helper, None)
                .await?;
            list.extend(
                service
                    .list_by_actor::<BookingView>(&user_id, BookingActor::TaskProvider, None)
                    .await?,
            );
            list
        }
    };
    Ok(Json(list))
}

async fn get_booking(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(booking_id): Path<String>,
) -> CtxResult<Json<Booking>> {
    let user_id = ctx.user_thing()?;
    let booking_thing = get_string_thing(booking_id).map_err(|e| ctx.to_ctx_error(e))?;

    let booking = BookingDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get(IdentIdName::Id(booking_thing))
    .await?;

    // bookings are visible to their two parties only
    if booking.actor_role(&user_id).is_none() {
        return Err(ctx.to_ctx_error(AppError::Forbidden));
    }
    Ok(Json(booking))
}

async fn update_status(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(booking_id): Path<String>,
    JsonOrFormValidated(input): JsonOrFormValidated<BookingStatusInput>,
) -> CtxResult<Json<Booking>> {
    let user_id = ctx.user_thing()?;
    let booking_thing = get_string_thing(booking_id).map_err(|e| ctx.to_ctx_error(e))?;

    let booking = BookingService::new(
        &state.db.client,
        &ctx,
        &state.event_sender,
        &state.notifications,
    )
    .update_status(&user_id, &booking_thing, input)
    .await?;

    Ok(Json(booking))
}

async fn submit_work(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(booking_id): Path<String>,
    JsonOrFormValidated(input): JsonOrFormValidated<WorkSubmitInput>,
) -> CtxResult<Json<Booking>> {
    let user_id = ctx.user_thing()?;
    let booking_thing = get_string_thing(booking_id).map_err(|e| ctx.to_ctx_error(e))?;

    let booking = BookingService::new(
        &state.db.client,
        &ctx,
        &state.event_sender,
        &state.notifications,
    )
    .submit_work(&user_id, &booking_thing, input)
    .await?;

    Ok(Json(booking))
}

async fn add_review(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(booking_id): Path<String>,
    JsonOrFormValidated(input): JsonOrFormValidated<ReviewInput>,
) -> CtxResult<Json<Booking>> {
    let user_id = ctx.user_thing()?;
    let booking_thing = get_string_thing(booking_id).map_err(|e| ctx.to_ctx_error(e))?;

    let booking = BookingService::new(
        &state.db.client,
        &ctx,
        &state.event_sender,
        &state.notifications,
    )
    .add_review(&user_id, &booking_thing, input)
    .await?;

    Ok(Json(booking))
}
