use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use validator::Validate;

use crate::entities::task_entity::{Task, TaskDbService, TaskStatus};
use crate::entities::user_entity::{UserDbService, UserView};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::mw_ctx::CtxState;
use crate::middleware::utils::db_utils::{IdentIdName, Pagination, QryOrder, ViewFieldSelector};
use crate::middleware::utils::extractor_utils::JsonOrFormValidated;
use crate::middleware::utils::string_utils::get_string_thing;
use crate::services::task_service::{CanApplyView, TaskCreateInput, TaskService};

pub fn routes() -> Router<Arc<CtxState>> {
    Router::new()
        .route("/api/tasks", post(create_task).get(list_open_tasks))
        .route("/api/tasks/given", get(list_given_tasks))
        .route("/api/tasks/:task_id", get(get_task).delete(delete_task))
        .route("/api/tasks/:task_id/can_apply", get(can_apply))
        .route("/api/tasks/:task_id/status", put(set_task_status))
        .route("/api/tasks/:task_id/cancel", post(cancel_task))
}

#[derive(Deserialize, Serialize, Debug)]
pub struct TaskView {
    pub id: Thing,
    pub from_user: UserView,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub skills_required: Vec<String>,
    pub offer_credits: i64,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_helper: Option<Thing>,
    pub max_applications: i64,
    pub accepts_applications: bool,
    pub application_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ViewFieldSelector for TaskView {
    fn get_select_query_fields() -> String {
        "id,
        from_user.{id, username, full_name, skills, rating, total_ratings, completed_tasks, tasks_created} as from_user,
        title,
        description,
        skills_required,
        offer_credits,
        status,
        selected_helper,
        max_applications,
        accepts_applications,
        (SELECT count() FROM application WHERE task = $parent.id AND status != 'Withdrawn' GROUP ALL)[0].count || 0 as application_count,
        scheduled_at,
        duration_minutes,
        created_at"
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    start: Option<i32>,
    count: Option<i8>,
}

#[derive(Debug, Deserialize, Validate)]
struct TaskStatusInput {
    status: TaskStatus,
}

async fn create_task(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    JsonOrFormValidated(input): JsonOrFormValidated<TaskCreateInput>,
) -> CtxResult<Json<Task>> {
    let user_id = ctx.user_thing()?;
    let task = TaskService::new(&state.db.client, &ctx, state.default_max_applications)
        .create(&user_id, input)
        .await?;
    Ok(Json(task))
}

async fn list_open_tasks(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Query(query): Query<ListQuery>,
) -> CtxResult<Json<Vec<TaskView>>> {
    let list = TaskDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .list_open::<TaskView>(Some(Pagination {
        order_by: Some("created_at".to_string()),
        order_dir: Some(QryOrder::DESC),
        count: query.count.unwrap_or(20),
        start: query.start.unwrap_or(0),
    }))
    .await?;
    Ok(Json(list))
}

async fn list_given_tasks(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
) -> CtxResult<Json<Vec<TaskView>>> {
    let from_user = UserDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get_ctx_user_thing()
    .await?;

    let list = TaskDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get_by_creator::<TaskView>(from_user, None)
    .await?;
    Ok(Json(list))
}

async fn get_task(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(task_id): Path<String>,
) -> CtxResult<Json<TaskView>> {
    let task_thing = get_string_thing(task_id).map_err(|e| ctx.to_ctx_error(e))?;
    let view = TaskDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get_view::<TaskView>(IdentIdName::Id(task_thing))
    .await?;
    Ok(Json(view))
}

async fn can_apply(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(task_id): Path<String>,
) -> CtxResult<Json<CanApplyView>> {
    let user_id = ctx.user_thing()?;
    let task_thing = get_string_thing(task_id).map_err(|e| ctx.to_ctx_error(e))?;
    let view = TaskService::new(&state.db.client, &ctx, state.default_max_applications)
        .can_user_apply(&user_id, &task_thing)
        .await?;
    Ok(Json(view))
}

/// The only client-settable status is InReview - every other task status is
/// owned by the lifecycle transitions.
async fn set_task_status(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(task_id): Path<String>,
    JsonOrFormValidated(input): JsonOrFormValidated<TaskStatusInput>,
) -> CtxResult<Json<Task>> {
    let user_id = ctx.user_thing()?;
    let task_thing = get_string_thing(task_id).map_err(|e| ctx.to_ctx_error(e))?;

    if input.status != TaskStatus::InReview {
        return Err(ctx.to_ctx_error(AppError::Validation {
            source: "Only InReview can be set directly".to_string(),
        }));
    }

    let task = TaskService::new(&state.db.client, &ctx, state.default_max_applications)
        .set_in_review(&user_id, &task_thing)
        .await?;
    Ok(Json(task))
}

async fn cancel_task(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(task_id): Path<String>,
) -> CtxResult<Json<Task>> {
    let user_id = ctx.user_thing()?;
    let task_thing = get_string_thing(task_id).map_err(|e| ctx.to_ctx_error(e))?;
    let task = TaskService::new(&state.db.client, &ctx, state.default_max_applications)
        .cancel(&user_id, &task_thing)
        .await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(task_id): Path<String>,
) -> CtxResult<()> {
    let user_id = ctx.user_thing()?;
    let task_thing = get_string_thing(task_id).map_err(|e| ctx.to_ctx_error(e))?;
    TaskService::new(&state.db.client, &ctx, state.default_max_applications)
        .delete(&user_id, &task_thing)
        .await
}
