use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::entities::application_entity::{Application, ApplicationDbService, ApplicationView};
use crate::entities::task_entity::TaskDbService;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::mw_ctx::CtxState;
use crate::middleware::utils::db_utils::IdentIdName;
use crate::middleware::utils::extractor_utils::JsonOrFormValidated;
use crate::middleware::utils::string_utils::get_string_thing;
use crate::services::application_service::{
    ApplicationCreateInput, ApplicationRespondInput, ApplicationService, RespondOutcome,
};

pub fn routes() -> Router<Arc<CtxState>> {
    Router::new()
        .route(
            "/api/tasks/:task_id/applications",
            post(apply).get(list_task_applications),
        )
        .route("/api/applications/mine", get(my_applications))
        .route("/api/applications/:application_id/respond", put(respond))
        .route("/api/applications/:application_id/withdraw", put(withdraw))
}

/// Applications on a task, visible to the task provider only.
async fn list_task_applications(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(task_id): Path<String>,
) -> CtxResult<Json<Vec<ApplicationView>>> {
    let user_id = ctx.user_thing()?;
    let task_thing = get_string_thing(task_id).map_err(|e| ctx.to_ctx_error(e))?;

    let task = TaskDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get(IdentIdName::Id(task_thing.clone()))
    .await?;
    if task.from_user != user_id {
        return Err(ctx.to_ctx_error(AppError::Forbidden));
    }

    let list = ApplicationDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .list_by_task::<ApplicationView>(&task_thing, None)
    .await?;
    Ok(Json(list))
}

async fn apply(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(task_id): Path<String>,
    JsonOrFormValidated(input): JsonOrFormValidated<ApplicationCreateInput>,
) -> CtxResult<Json<Application>> {
    let user_id = ctx.user_thing()?;
    let task_thing = get_string_thing(task_id).map_err(|e| ctx.to_ctx_error(e))?;

    let application = ApplicationService::new(
        &state.db.client,
        &ctx,
        &state.event_sender,
        &state.notifications,
    )
    .apply(&user_id, &task_thing, input)
    .await?;

    Ok(Json(application))
}

async fn my_applications(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
) -> CtxResult<Json<Vec<ApplicationView>>> {
    let user_id = ctx.user_thing()?;
    let list = ApplicationDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .list_by_applicant::<ApplicationView>(&user_id, None)
    .await?;
    Ok(Json(list))
}

async fn respond(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(application_id): Path<String>,
    JsonOrFormValidated(input): JsonOrFormValidated<ApplicationRespondInput>,
) -> CtxResult<Json<RespondOutcome>> {
    let user_id = ctx.user_thing()?;
    let application_thing = get_string_thing(application_id).map_err(|e| ctx.to_ctx_error(e))?;

    let outcome = ApplicationService::new(
        &state.db.client,
        &ctx,
        &state.event_sender,
        &state.notifications,
    )
    .respond(&user_id, &application_thing, input)
    .await?;

    Ok(Json(outcome))
}

async fn withdraw(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(application_id): Path<String>,
) -> CtxResult<Json<Application>> {
    let user_id = ctx.user_thing()?;
    let application_thing = get_string_thing(application_id).map_err(|e| ctx.to_ctx_error(e))?;

    let application = ApplicationService::new(
        &state.db.client,
        &ctx,
        &state.event_sender,
        &state.notifications,
    )
    .withdraw(&user_id, &application_thing)
    .await?;

    Ok(Json(application))
}
