use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::entities::credit_transaction_entity::{
    CreditTransactionDbService, CreditTransactionView,
};
use crate::entities::user_entity::{User, UserDbService, UserView};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::CtxResult;
use crate::middleware::mw_ctx::CtxState;
use crate::middleware::utils::db_utils::IdentIdName;
use crate::middleware::utils::string_utils::get_string_thing;

pub fn routes() -> Router<Arc<CtxState>> {
    Router::new()
        .route("/api/users/current", get(current_user))
        .route("/api/users/current/credits", get(current_user_credits))
        .route(
            "/api/users/current/credits/history",
            get(current_user_credit_history),
        )
        .route("/api/users/:user_id", get(user_profile))
}

/// Profile of the signed-in user - the only view that exposes the balance.
#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentUserView {
    pub id: Thing,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub skills: Vec<String>,
    pub credits: i64,
    pub rating: f64,
    pub total_ratings: i64,
    pub completed_tasks: i64,
    pub tasks_created: i64,
}

impl From<User> for CurrentUserView {
    fn from(user: User) -> Self {
        CurrentUserView {
            id: user.id.expect("persisted user has id"),
            username: user.username,
            full_name: user.full_name,
            skills: user.skills,
            credits: user.credits,
            rating: user.rating,
            total_ratings: user.total_ratings,
            completed_tasks: user.completed_tasks,
            tasks_created: user.tasks_created,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreditBalanceView {
    pub credits: i64,
}

async fn current_user(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
) -> CtxResult<Json<CurrentUserView>> {
    let user = UserDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get_ctx_user()
    .await?;
    Ok(Json(CurrentUserView::from(user)))
}

async fn current_user_credits(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
) -> CtxResult<Json<CreditBalanceView>> {
    let user = UserDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get_ctx_user()
    .await?;
    Ok(Json(CreditBalanceView {
        credits: user.credits,
    }))
}

async fn current_user_credit_history(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
) -> CtxResult<Json<Vec<CreditTransactionView>>> {
    let user_id = UserDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get_ctx_user_thing()
    .await?;

    let history = CreditTransactionDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .user_history(&user_id, None)
    .await?;
    Ok(Json(history))
}

async fn user_profile(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path(user_id): Path<String>,
) -> CtxResult<Json<UserView>> {
    let user_thing = get_string_thing(user_id).map_err(|e| ctx.to_ctx_error(e))?;
    let view = UserDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .get_view::<UserView>(IdentIdName::Id(user_thing))
    .await?;
    Ok(Json(view))
}
